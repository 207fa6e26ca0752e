//! Restricted arithmetic expressions over usage metrics.
//!
//! Expressions come from user-authored configuration, so they are never
//! handed to a general evaluator. Parsing runs in two stages:
//!
//! 1. A tokenizer and recursive-descent parser accept a wider, Python-like
//!    grammar (`**`, `//`, `%`, comparisons, bitwise and boolean operators,
//!    calls, attribute access, subscripts, list and string literals,
//!    conditional expressions) so that every well-formed input produces a
//!    syntax tree.
//! 2. The tree is lowered into [`Expr`], which only has nodes for numbers,
//!    metric names, unary minus and `+ - * /`. Anything else is rejected
//!    with [`ExprError::UnsupportedOperator`].
//!
//! Malformed input fails in stage 1 with [`ExprError::InvalidSyntax`], as
//! does input nested deeper than [`MAX_DEPTH`] or using more than
//! [`MAX_OPERATORS`] operators. Unknown names fail at evaluation with
//! [`ExprError::UnknownMetric`].

use std::fmt;

use rust_decimal::Decimal;

use crate::error::ExprError;
use crate::usage::MetricSource;

/// Binary operators in precedence order, lowest first. Only `+ - * /` survive
/// lowering.
const BINARY_LEVELS: &[&[&str]] = &[
    &["or"],
    &["and"],
    &["<", ">", "<=", ">=", "==", "!="],
    &["|"],
    &["^"],
    &["&"],
    &["<<", ">>"],
    &["+", "-"],
    &["*", "/", "//", "%"],
];

const UNARY_OPS: &[&str] = &["-", "+", "~", "not"];

/// Multi-character operators first so the tokenizer matches greedily.
const SYMBOLS: &[&str] = &[
    "**", "//", "<<", ">>", "<=", ">=", "==", "!=", "+", "-", "*", "/", "%", "<", ">", "&", "|",
    "^", "~", ".",
];

const KEYWORD_OPS: &[&str] = &["and", "or", "not", "if", "else"];

/// Deepest nesting of brackets, calls and prefix operators accepted.
pub const MAX_DEPTH: usize = 100;

/// Most operators accepted in one expression. Bounds the height of the tree.
pub const MAX_OPERATORS: usize = 1000;

/// A parsed expression that only uses supported constructs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    source: String,
    root: Node,
}

/// A node of a validated expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    /// A numeric literal.
    Number(Decimal),
    /// A metric reference.
    Metric(String),
    /// Unary minus.
    Neg(Box<Node>),
    /// A binary arithmetic operation.
    Binary {
        /// The operator.
        op: BinaryOp,
        /// Left operand.
        lhs: Box<Node>,
        /// Right operand.
        rhs: Box<Node>,
    },
}

/// Supported binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
}

impl BinaryOp {
    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(Self::Add),
            "-" => Some(Self::Sub),
            "*" => Some(Self::Mul),
            "/" => Some(Self::Div),
            _ => None,
        }
    }

    fn apply(self, lhs: Decimal, rhs: Decimal) -> Result<Decimal, ExprError> {
        match self {
            Self::Add => lhs.checked_add(rhs).ok_or(ExprError::Overflow),
            Self::Sub => lhs.checked_sub(rhs).ok_or(ExprError::Overflow),
            Self::Mul => lhs.checked_mul(rhs).ok_or(ExprError::Overflow),
            Self::Div => {
                if rhs.is_zero() {
                    return Err(ExprError::DivisionByZero);
                }
                lhs.checked_div(rhs).ok_or(ExprError::Overflow)
            }
        }
    }
}

impl Expr {
    /// Parse `source`, rejecting malformed input and unsupported constructs.
    ///
    /// # Errors
    ///
    /// Returns [`ExprError::InvalidSyntax`] if the input is not a well-formed
    /// expression, or [`ExprError::UnsupportedOperator`] if it uses anything
    /// besides numbers, names, unary minus, `+ - * /` and parentheses.
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        let tokens = tokenize(source)?;
        let tree = Parser::new(&tokens).parse()?;
        let root = lower(tree)?;
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    /// The expression as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// The root of the validated tree.
    #[must_use]
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Names referenced by the expression, in order of first use.
    #[must_use]
    pub fn metrics(&self) -> Vec<&str> {
        fn walk<'a>(node: &'a Node, out: &mut Vec<&'a str>) {
            match node {
                Node::Number(_) => {}
                Node::Metric(name) => {
                    if !out.contains(&name.as_str()) {
                        out.push(name.as_str());
                    }
                }
                Node::Neg(inner) => walk(inner, out),
                Node::Binary { lhs, rhs, .. } => {
                    walk(lhs, out);
                    walk(rhs, out);
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.root, &mut out);
        out
    }

    /// Evaluate against a set of metrics.
    ///
    /// # Errors
    ///
    /// Returns [`ExprError::UnknownMetric`] for a name `metrics` cannot
    /// resolve, [`ExprError::DivisionByZero`] or [`ExprError::Overflow`] for
    /// arithmetic failures.
    pub fn evaluate<M: MetricSource + ?Sized>(&self, metrics: &M) -> Result<Decimal, ExprError> {
        eval_node(&self.root, metrics)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for Expr {
    type Err = ExprError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Parse and evaluate `source` in one step.
///
/// # Errors
///
/// Any error from [`Expr::parse`] or [`Expr::evaluate`].
pub fn evaluate<M: MetricSource + ?Sized>(source: &str, metrics: &M) -> Result<Decimal, ExprError> {
    Expr::parse(source)?.evaluate(metrics)
}

fn eval_node<M: MetricSource + ?Sized>(node: &Node, metrics: &M) -> Result<Decimal, ExprError> {
    match node {
        Node::Number(value) => Ok(*value),
        Node::Metric(name) => metrics
            .metric(name)
            .ok_or_else(|| ExprError::UnknownMetric(name.clone())),
        Node::Neg(inner) => Ok(-eval_node(inner, metrics)?),
        Node::Binary { op, lhs, rhs } => {
            let lhs = eval_node(lhs, metrics)?;
            let rhs = eval_node(rhs, metrics)?;
            op.apply(lhs, rhs)
        }
    }
}

// ============================================================================
// Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(Decimal),
    Name(String),
    Op(&'static str),
    Str,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
}

fn tokenize(source: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        let starts_number =
            c.is_ascii_digit() || (c == '.' && chars.get(pos + 1).is_some_and(char::is_ascii_digit));
        if starts_number {
            let (value, next) = scan_number(&chars, pos)?;
            tokens.push(Token::Number(value));
            pos = next;
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = pos;
            while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                pos += 1;
            }
            let word: String = chars[start..pos].iter().collect();
            match KEYWORD_OPS.iter().find(|kw| **kw == word) {
                Some(kw) => tokens.push(Token::Op(*kw)),
                None => tokens.push(Token::Name(word)),
            }
            continue;
        }

        match c {
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            '[' => tokens.push(Token::LBracket),
            ']' => tokens.push(Token::RBracket),
            ',' => tokens.push(Token::Comma),
            '\'' | '"' => {
                let close = chars[pos + 1..]
                    .iter()
                    .position(|&q| q == c)
                    .ok_or_else(|| syntax("unterminated string literal"))?;
                tokens.push(Token::Str);
                pos += close + 2;
                continue;
            }
            _ => {
                let symbol = SYMBOLS
                    .iter()
                    .find(|sym| {
                        sym.chars()
                            .enumerate()
                            .all(|(i, sc)| chars.get(pos + i) == Some(&sc))
                    })
                    .ok_or_else(|| {
                        ExprError::InvalidSyntax(format!("unexpected character '{c}'"))
                    })?;
                tokens.push(Token::Op(*symbol));
                pos += symbol.len();
                continue;
            }
        }
        pos += 1;
    }

    Ok(tokens)
}

/// Scan `digits [. digits] [e [+-] digits]` starting at `start`.
fn scan_number(chars: &[char], start: usize) -> Result<(Decimal, usize), ExprError> {
    let mut pos = start;
    let digits = |pos: &mut usize| {
        while *pos < chars.len() && chars[*pos].is_ascii_digit() {
            *pos += 1;
        }
    };

    digits(&mut pos);
    if chars.get(pos) == Some(&'.') {
        pos += 1;
        digits(&mut pos);
    }

    let mut scientific = false;
    if matches!(chars.get(pos), Some('e' | 'E')) {
        let mut exp = pos + 1;
        if matches!(chars.get(exp), Some('+' | '-')) {
            exp += 1;
        }
        if chars.get(exp).is_some_and(char::is_ascii_digit) {
            pos = exp;
            digits(&mut pos);
            scientific = true;
        }
    }

    let text: String = chars[start..pos].iter().collect();
    let parsed = if scientific {
        Decimal::from_scientific(&text)
    } else {
        Decimal::from_str_exact(&text)
    };
    let value = parsed
        .map_err(|_| ExprError::InvalidSyntax(format!("invalid number literal '{text}'")))?;
    Ok((value, pos))
}

// ============================================================================
// Parser
// ============================================================================

/// Unrestricted syntax tree produced by the parser.
#[derive(Debug)]
enum Tree {
    Number(Decimal),
    Name(String),
    Unary(&'static str, Box<Tree>),
    Binary(&'static str, Box<Tree>, Box<Tree>),
    /// A recognised construct with no counterpart in [`Node`].
    Unsupported(&'static str),
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    depth: usize,
    operators: usize,
}

impl<'t> Parser<'t> {
    fn new(tokens: &'t [Token]) -> Self {
        Self {
            tokens,
            pos: 0,
            depth: 0,
            operators: 0,
        }
    }

    /// Enter one level of recursion that the input controls.
    fn descend(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(syntax("expression nested too deeply"));
        }
        Ok(())
    }

    fn ascend(&mut self) {
        self.depth -= 1;
    }

    fn count_operator(&mut self) -> Result<(), ExprError> {
        self.operators += 1;
        if self.operators > MAX_OPERATORS {
            return Err(syntax("expression has too many operators"));
        }
        Ok(())
    }

    fn parse(mut self) -> Result<Tree, ExprError> {
        if self.tokens.is_empty() {
            return Err(syntax("empty expression"));
        }
        let tree = self.expression()?;
        match self.peek() {
            None => Ok(tree),
            Some(token) => Err(syntax(&format!("unexpected {}", describe(token)))),
        }
    }

    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn peek_op(&self, ops: &[&str]) -> Option<&'static str> {
        match self.peek() {
            Some(Token::Op(op)) if ops.contains(op) => Some(*op),
            _ => None,
        }
    }

    /// `binary ['if' binary 'else' expression]`
    fn expression(&mut self) -> Result<Tree, ExprError> {
        let value = self.binary(0)?;
        if self.peek_op(&["if"]).is_none() {
            return Ok(value);
        }
        self.pos += 1;
        self.count_operator()?;
        self.descend()?;
        self.binary(0)?;
        match self.advance() {
            Some(Token::Op("else")) => {}
            _ => return Err(syntax("expected 'else' in conditional expression")),
        }
        self.expression()?;
        self.ascend();
        Ok(Tree::Unsupported("conditional expression"))
    }

    fn binary(&mut self, level: usize) -> Result<Tree, ExprError> {
        let Some(ops) = BINARY_LEVELS.get(level) else {
            return self.unary();
        };
        let mut lhs = self.binary(level + 1)?;
        while let Some(op) = self.peek_op(ops) {
            self.pos += 1;
            self.count_operator()?;
            let rhs = self.binary(level + 1)?;
            lhs = Tree::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Tree, ExprError> {
        if let Some(op) = self.peek_op(UNARY_OPS) {
            self.pos += 1;
            self.count_operator()?;
            self.descend()?;
            let operand = self.unary()?;
            self.ascend();
            return Ok(Tree::Unary(op, Box::new(operand)));
        }
        self.power()
    }

    fn power(&mut self) -> Result<Tree, ExprError> {
        let base = self.postfix()?;
        if self.peek_op(&["**"]).is_some() {
            self.pos += 1;
            self.count_operator()?;
            self.descend()?;
            let exponent = self.unary()?;
            self.ascend();
            return Ok(Tree::Binary("**", Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn postfix(&mut self) -> Result<Tree, ExprError> {
        let mut tree = self.primary()?;
        loop {
            match self.peek() {
                Some(Token::LParen) => {
                    self.pos += 1;
                    self.sequence(&Token::RParen)?;
                    tree = Tree::Unsupported("function call");
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    self.sequence(&Token::RBracket)?;
                    tree = Tree::Unsupported("subscript");
                }
                Some(Token::Op(".")) => {
                    self.pos += 1;
                    match self.advance() {
                        Some(Token::Name(_)) => tree = Tree::Unsupported("attribute access"),
                        _ => return Err(syntax("expected a name after '.'")),
                    }
                }
                _ => return Ok(tree),
            }
        }
    }

    /// Comma-separated expressions up to and including `close`.
    fn sequence(&mut self, close: &Token) -> Result<(), ExprError> {
        self.descend()?;
        if self.peek() == Some(close) {
            self.pos += 1;
            self.ascend();
            return Ok(());
        }
        loop {
            self.expression()?;
            match self.advance() {
                Some(Token::Comma) => {}
                Some(token) if token == close => {
                    self.ascend();
                    return Ok(());
                }
                _ => return Err(syntax(&format!("expected {}", describe(close)))),
            }
        }
    }

    fn primary(&mut self) -> Result<Tree, ExprError> {
        match self.advance() {
            Some(Token::Number(value)) => Ok(Tree::Number(*value)),
            Some(Token::Name(name)) => Ok(Tree::Name(name.clone())),
            Some(Token::Str) => Ok(Tree::Unsupported("string literal")),
            Some(Token::LParen) => {
                self.descend()?;
                let inner = self.expression()?;
                self.ascend();
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(syntax("unmatched '('")),
                }
            }
            Some(Token::LBracket) => {
                self.sequence(&Token::RBracket)?;
                Ok(Tree::Unsupported("list literal"))
            }
            Some(token) => Err(syntax(&format!("unexpected {}", describe(token)))),
            None => Err(syntax("unexpected end of expression")),
        }
    }
}

fn syntax(reason: &str) -> ExprError {
    ExprError::InvalidSyntax(reason.to_string())
}

fn describe(token: &Token) -> String {
    match token {
        Token::Number(value) => format!("number {value}"),
        Token::Name(name) => format!("name '{name}'"),
        Token::Op(op) => format!("'{op}'"),
        Token::Str => "string literal".to_string(),
        Token::LParen => "'('".to_string(),
        Token::RParen => "')'".to_string(),
        Token::LBracket => "'['".to_string(),
        Token::RBracket => "']'".to_string(),
        Token::Comma => "','".to_string(),
    }
}

/// Keep only whitelisted node kinds.
fn lower(tree: Tree) -> Result<Node, ExprError> {
    match tree {
        Tree::Number(value) => Ok(Node::Number(value)),
        Tree::Name(name) => Ok(Node::Metric(name)),
        Tree::Unary("-", operand) => Ok(Node::Neg(Box::new(lower(*operand)?))),
        Tree::Unary(op, _) => Err(ExprError::UnsupportedOperator(format!("unary {op}"))),
        Tree::Binary(symbol, lhs, rhs) => {
            let op = BinaryOp::from_symbol(symbol)
                .ok_or_else(|| ExprError::UnsupportedOperator(symbol.to_string()))?;
            Ok(Node::Binary {
                op,
                lhs: Box::new(lower(*lhs)?),
                rhs: Box::new(lower(*rhs)?),
            })
        }
        Tree::Unsupported(what) => Err(ExprError::UnsupportedOperator(what.to_string())),
    }
}
