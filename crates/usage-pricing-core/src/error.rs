//! Error types for the pricing engine.
//!
//! Construction-time failures surface as [`ValidationError`]; evaluation-time
//! failures surface as [`PricingError`], which wraps [`ExprError`] for
//! problems inside an expression string.

use rust_decimal::Decimal;

/// Result type for cost evaluation.
pub type Result<T> = std::result::Result<T, PricingError>;

/// Errors raised by the restricted expression evaluator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExprError {
    /// The expression could not be parsed.
    #[error("Invalid expression syntax: {0}")]
    InvalidSyntax(String),

    /// The expression references a name that is neither a usage field nor a
    /// context value.
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    /// The expression parsed, but uses a construct outside `+ - * / ()`.
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// Division by a zero-valued operand.
    #[error("division by zero")]
    DivisionByZero,

    /// The result does not fit in a `Decimal`.
    #[error("arithmetic overflow")]
    Overflow,
}

/// Errors raised while computing a cost.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PricingError {
    /// An `expr` or `based_on` expression failed to evaluate.
    #[error(transparent)]
    Expression(#[from] ExprError),

    /// A variant needs a context value that the caller did not supply.
    #[error("{variant} pricing requires `{key}` in the usage context")]
    MissingContext {
        /// The pricing variant that needed the value.
        variant: &'static str,
        /// The missing context key.
        key: &'static str,
    },

    /// The volume is above the last bounded tier and no unlimited tier exists.
    #[error("volume {volume} exceeds the highest tier")]
    VolumeExceedsTiers {
        /// The evaluated volume.
        volume: Decimal,
    },

    /// Cost arithmetic overflowed.
    #[error("arithmetic overflow in {variant} pricing")]
    Overflow {
        /// The pricing variant being evaluated.
        variant: &'static str,
    },
}

/// A pricing definition that failed validation, with the location of the
/// offending node.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid pricing at {path}: {kind}")]
pub struct ValidationError {
    /// Location of the offending node, e.g. `$.prices[1].base`.
    pub path: String,

    /// What was wrong.
    #[source]
    pub kind: ValidationErrorKind,
}

impl ValidationError {
    /// Create an error at the root of a pricing definition.
    #[must_use]
    pub fn new(kind: ValidationErrorKind) -> Self {
        Self {
            path: ROOT_PATH.to_string(),
            kind,
        }
    }

    /// Relocate the error to `path`.
    #[must_use]
    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }
}

/// Path of the outermost pricing node.
pub(crate) const ROOT_PATH: &str = "$";

/// The reason a pricing definition was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationErrorKind {
    /// The node is not a JSON object.
    #[error("expected an object")]
    NotAnObject,

    /// The `type` field is absent.
    #[error("missing `type` field")]
    MissingType,

    /// The `type` field names no known variant.
    #[error("unknown pricing type `{0}`")]
    UnknownType(String),

    /// A field required by the variant is absent.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// A field has the wrong shape.
    #[error("field `{field}` {reason}")]
    InvalidField {
        /// The field name.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },

    /// A field that must hold a decimal amount could not be parsed as one.
    #[error("field `{field}` is not a valid decimal: {value}")]
    InvalidDecimal {
        /// The field name.
        field: &'static str,
        /// The rejected value as written.
        value: String,
    },

    /// An `expr` or `based_on` string is not a valid expression.
    #[error("field `{field}`: {source}")]
    InvalidExpression {
        /// The field name.
        field: &'static str,
        /// The parse failure.
        source: ExprError,
    },

    /// A tier list breaks the ordering rules.
    #[error("invalid tiers: {0}")]
    InvalidTiers(String),

    /// Fields that cannot be combined were given together, or none of a
    /// required group was given.
    #[error("{0}")]
    InvalidCombination(String),
}

impl From<ValidationErrorKind> for ValidationError {
    fn from(kind: ValidationErrorKind) -> Self {
        Self::new(kind)
    }
}
