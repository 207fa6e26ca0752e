//! Pricing trees and cost evaluation.
//!
//! A [`Pricing`] is an immutable tree built once from configuration (see
//! [`crate::validate_pricing`]) and evaluated per billable event with
//! [`Pricing::calculate_cost`]. Leaf variants price a single metric or
//! expression; `add`, `multiply`, `tiered` and `graduated` nest other
//! pricings and pass the same usage and context down to them.
//!
//! All amounts are [`Decimal`]; evaluation never goes through floating point.

use rust_decimal::Decimal;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::{PricingError, Result, ValidationError, ValidationErrorKind};
use crate::expr::Expr;
use crate::tier::{Graduation, PriceTiers, Tier, Tiers, UnitPriceTiers};
use crate::usage::{MetricContext, Metrics, UsageData};

/// Context key holding what the customer was charged, read by
/// revenue-share pricing.
pub const CUSTOMER_CHARGE: &str = "customer_charge";

/// A validated, immutable pricing definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pricing {
    kind: PricingKind,
    description: Option<String>,
    reference: Option<String>,
}

/// The pricing variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PricingKind {
    /// A fixed amount, independent of usage. Negative amounts are discounts.
    Constant {
        /// The amount charged.
        amount: Decimal,
    },

    /// An arithmetic expression over usage metrics.
    Expr {
        /// The parsed expression.
        expr: Expr,
    },

    /// A price per one million tokens.
    OneMillionTokens(TokenRates),

    /// A price per second of `seconds`.
    OneSecond {
        /// Price per second.
        price: Decimal,
    },

    /// A price per unit of `count`.
    Image {
        /// Price per image.
        price: Decimal,
    },

    /// A percentage of the `customer_charge` context value.
    RevenueShare {
        /// Share in percent, `0..=100`.
        percentage: Decimal,
    },

    /// The sum of several pricings.
    Add {
        /// The summed pricings; never empty.
        prices: Vec<Pricing>,
    },

    /// A pricing scaled by a factor.
    Multiply {
        /// The scale factor.
        factor: Decimal,
        /// The scaled pricing.
        base: Box<Pricing>,
    },

    /// Flat pricing by volume bracket: the whole cost comes from the one tier
    /// the volume falls in.
    Tiered {
        /// Expression giving the volume.
        based_on: Expr,
        /// The brackets.
        tiers: PriceTiers,
    },

    /// Marginal pricing: each band of volume is charged at its own unit price.
    Graduated {
        /// Expression giving the volume.
        based_on: Expr,
        /// The bands.
        tiers: UnitPriceTiers,
    },
}

/// Rates for per-million-token pricing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRates {
    /// One rate for all billable tokens.
    Unified {
        /// Price per million tokens.
        price: Decimal,
    },

    /// Separate rates per token kind. A missing rate charges nothing.
    Split {
        /// Price per million input tokens.
        input: Option<Decimal>,
        /// Price per million output tokens.
        output: Option<Decimal>,
        /// Price per million cached input tokens.
        cached_input: Option<Decimal>,
    },
}

impl TokenRates {
    /// Cost of `usage` at these rates, or `None` on overflow.
    ///
    /// With a unified price the billable tokens are `input_tokens +
    /// output_tokens`, or `total_tokens` when both are zero.
    #[must_use]
    pub fn cost(&self, usage: &UsageData) -> Option<Decimal> {
        match *self {
            Self::Unified { price } => {
                let split = usage.input_tokens.checked_add(usage.output_tokens)?;
                let billable = if split == 0 { usage.total_tokens } else { split };
                per_million(billable, price)
            }
            Self::Split {
                input,
                output,
                cached_input,
            } => [
                (usage.input_tokens, input),
                (usage.output_tokens, output),
                (usage.cached_input_tokens, cached_input),
            ]
            .into_iter()
            .try_fold(Decimal::ZERO, |total, (tokens, rate)| match rate {
                Some(rate) => total.checked_add(per_million(tokens, rate)?),
                None => Some(total),
            }),
        }
    }
}

fn per_million(tokens: u64, rate: Decimal) -> Option<Decimal> {
    Decimal::from(tokens)
        .checked_mul(rate)?
        .checked_div(Decimal::from(1_000_000_u32))
}

impl PricingKind {
    /// The configuration `type` tag of this variant.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Constant { .. } => "constant",
            Self::Expr { .. } => "expr",
            Self::OneMillionTokens(_) => "one_million_tokens",
            Self::OneSecond { .. } => "one_second",
            Self::Image { .. } => "image",
            Self::RevenueShare { .. } => "revenue_share",
            Self::Add { .. } => "add",
            Self::Multiply { .. } => "multiply",
            Self::Tiered { .. } => "tiered",
            Self::Graduated { .. } => "graduated",
        }
    }
}

// ============================================================================
// Construction
// ============================================================================

impl Pricing {
    fn from_kind(kind: PricingKind) -> Self {
        Self {
            kind,
            description: None,
            reference: None,
        }
    }

    /// A fixed amount.
    #[must_use]
    pub fn constant(amount: impl Into<Decimal>) -> Self {
        Self::from_kind(PricingKind::Constant {
            amount: amount.into(),
        })
    }

    /// An expression over usage metrics.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationErrorKind::InvalidExpression`] if `expr` does not
    /// parse or uses an unsupported operator.
    pub fn expr(expr: &str) -> std::result::Result<Self, ValidationError> {
        let expr = parse_field("expr", expr)?;
        Ok(Self::from_kind(PricingKind::Expr { expr }))
    }

    /// One price per million tokens.
    #[must_use]
    pub fn one_million_tokens(price: Decimal) -> Self {
        Self::from_kind(PricingKind::OneMillionTokens(TokenRates::Unified { price }))
    }

    /// Separate per-million rates for input, output and cached input tokens.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationErrorKind::InvalidCombination`] if every rate is
    /// `None`.
    pub fn split_token_rates(
        input: Option<Decimal>,
        output: Option<Decimal>,
        cached_input: Option<Decimal>,
    ) -> std::result::Result<Self, ValidationError> {
        if input.is_none() && output.is_none() && cached_input.is_none() {
            return Err(ValidationErrorKind::InvalidCombination(
                "one_million_tokens needs `price` or at least one of `input`, `output`, `cached_input`"
                    .to_string(),
            )
            .into());
        }
        Ok(Self::from_kind(PricingKind::OneMillionTokens(
            TokenRates::Split {
                input,
                output,
                cached_input,
            },
        )))
    }

    /// A price per second.
    #[must_use]
    pub fn one_second(price: Decimal) -> Self {
        Self::from_kind(PricingKind::OneSecond { price })
    }

    /// A price per image.
    #[must_use]
    pub fn image(price: Decimal) -> Self {
        Self::from_kind(PricingKind::Image { price })
    }

    /// A percentage of the customer charge.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationErrorKind::InvalidField`] unless `percentage` is in
    /// `0..=100`.
    pub fn revenue_share(percentage: Decimal) -> std::result::Result<Self, ValidationError> {
        if percentage < Decimal::ZERO || percentage > Decimal::ONE_HUNDRED {
            return Err(ValidationErrorKind::InvalidField {
                field: "percentage",
                reason: format!("must be between 0 and 100, got {percentage}"),
            }
            .into());
        }
        Ok(Self::from_kind(PricingKind::RevenueShare { percentage }))
    }

    /// The sum of `prices`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationErrorKind::InvalidField`] if `prices` is empty.
    pub fn add(prices: Vec<Pricing>) -> std::result::Result<Self, ValidationError> {
        if prices.is_empty() {
            return Err(ValidationErrorKind::InvalidField {
                field: "prices",
                reason: "must not be empty".to_string(),
            }
            .into());
        }
        Ok(Self::from_kind(PricingKind::Add { prices }))
    }

    /// `base` scaled by `factor`.
    #[must_use]
    pub fn multiply(factor: Decimal, base: Pricing) -> Self {
        Self::from_kind(PricingKind::Multiply {
            factor,
            base: Box::new(base),
        })
    }

    /// Flat pricing by the bracket `based_on` falls in.
    ///
    /// # Errors
    ///
    /// Returns an error if `based_on` is not a valid expression or the tiers
    /// break the ordering rules.
    pub fn tiered(
        based_on: &str,
        tiers: Vec<Tier<Pricing>>,
    ) -> std::result::Result<Self, ValidationError> {
        let based_on = parse_field("based_on", based_on)?;
        let tiers = Tiers::new(tiers)?;
        Ok(Self::from_kind(PricingKind::Tiered { based_on, tiers }))
    }

    /// Marginal pricing over the bands `based_on` spans.
    ///
    /// # Errors
    ///
    /// Returns an error if `based_on` is not a valid expression or the tiers
    /// break the ordering rules.
    pub fn graduated(
        based_on: &str,
        tiers: Vec<Tier<Decimal>>,
    ) -> std::result::Result<Self, ValidationError> {
        let based_on = parse_field("based_on", based_on)?;
        let tiers = Tiers::new(tiers)?;
        Ok(Self::from_kind(PricingKind::Graduated { based_on, tiers }))
    }

    /// Attach a human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach a reference (typically a URL to the upstream price sheet).
    #[must_use]
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// The variant and its parameters.
    #[must_use]
    pub fn kind(&self) -> &PricingKind {
        &self.kind
    }

    /// The configuration `type` tag.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// The description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// The reference, if any.
    #[must_use]
    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }
}

fn parse_field(field: &'static str, source: &str) -> std::result::Result<Expr, ValidationError> {
    Expr::parse(source)
        .map_err(|source| ValidationErrorKind::InvalidExpression { field, source }.into())
}

// ============================================================================
// Evaluation
// ============================================================================

impl Pricing {
    /// Compute the cost of one billable event.
    ///
    /// `context` supplies metrics that are not part of [`UsageData`], such as
    /// `request_count` or `customer_charge`. Nested pricings see the same
    /// usage and context.
    ///
    /// # Errors
    ///
    /// - [`PricingError::Expression`] if an `expr` or `based_on` expression
    ///   references an unknown metric or fails arithmetically.
    /// - [`PricingError::MissingContext`] for revenue-share pricing without
    ///   `customer_charge` in `context`.
    /// - [`PricingError::VolumeExceedsTiers`] if the volume is beyond the last
    ///   bounded tier and there is no unbounded tier.
    /// - [`PricingError::Overflow`] if the cost does not fit in a `Decimal`.
    pub fn calculate_cost(&self, usage: &UsageData, context: &MetricContext) -> Result<Decimal> {
        self.cost(Metrics::new(usage, context))
    }

    fn cost(&self, metrics: Metrics<'_>) -> Result<Decimal> {
        let variant = self.type_name();
        let overflow = || PricingError::Overflow { variant };

        let cost = match &self.kind {
            PricingKind::Constant { amount } => *amount,
            PricingKind::Expr { expr } => expr.evaluate(&metrics)?,
            PricingKind::OneMillionTokens(rates) => rates.cost(metrics.usage).ok_or_else(overflow)?,
            PricingKind::OneSecond { price } => metrics
                .usage
                .seconds
                .checked_mul(*price)
                .ok_or_else(overflow)?,
            PricingKind::Image { price } => Decimal::from(metrics.usage.count)
                .checked_mul(*price)
                .ok_or_else(overflow)?,
            PricingKind::RevenueShare { percentage } => {
                let charge =
                    metrics
                        .context
                        .get(CUSTOMER_CHARGE)
                        .ok_or(PricingError::MissingContext {
                            variant,
                            key: CUSTOMER_CHARGE,
                        })?;
                charge
                    .checked_mul(*percentage)
                    .and_then(|share| share.checked_div(Decimal::ONE_HUNDRED))
                    .ok_or_else(overflow)?
            }
            PricingKind::Add { prices } => {
                let mut total = Decimal::ZERO;
                for price in prices {
                    total = total.checked_add(price.cost(metrics)?).ok_or_else(overflow)?;
                }
                total
            }
            PricingKind::Multiply { factor, base } => {
                base.cost(metrics)?.checked_mul(*factor).ok_or_else(overflow)?
            }
            PricingKind::Tiered { based_on, tiers } => {
                let volume = based_on.evaluate(&metrics)?;
                let tier = tiers
                    .select(volume)
                    .ok_or(PricingError::VolumeExceedsTiers { volume })?;
                tier.price.cost(metrics)?
            }
            PricingKind::Graduated { based_on, tiers } => {
                let volume = based_on.evaluate(&metrics)?;
                match tiers.graduate(volume) {
                    Graduation::Billed(total) => total,
                    Graduation::Exceeded => return Err(PricingError::VolumeExceedsTiers { volume }),
                    Graduation::Overflow => return Err(overflow()),
                }
            }
        };

        tracing::trace!(pricing = variant, cost = %cost, "Evaluated pricing");
        Ok(cost)
    }
}

// ============================================================================
// Serialization
// ============================================================================

#[derive(Serialize)]
struct FlatTier<'a> {
    up_to: Option<Decimal>,
    price: &'a Pricing,
}

#[derive(Serialize)]
struct UnitTier {
    up_to: Option<Decimal>,
    unit_price: Decimal,
}

/// Serializes to the same shape [`crate::validate_pricing`] accepts.
impl Serialize for Pricing {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("type", self.type_name())?;

        match &self.kind {
            PricingKind::Constant { amount } => map.serialize_entry("amount", amount)?,
            PricingKind::Expr { expr } => map.serialize_entry("expr", expr.as_str())?,
            PricingKind::OneMillionTokens(TokenRates::Unified { price })
            | PricingKind::OneSecond { price }
            | PricingKind::Image { price } => map.serialize_entry("price", price)?,
            PricingKind::OneMillionTokens(TokenRates::Split {
                input,
                output,
                cached_input,
            }) => {
                for (field, rate) in [("input", input), ("output", output), ("cached_input", cached_input)] {
                    if let Some(rate) = rate {
                        map.serialize_entry(field, rate)?;
                    }
                }
            }
            PricingKind::RevenueShare { percentage } => {
                map.serialize_entry("percentage", percentage)?;
            }
            PricingKind::Add { prices } => map.serialize_entry("prices", prices)?,
            PricingKind::Multiply { factor, base } => {
                map.serialize_entry("factor", factor)?;
                map.serialize_entry("base", base)?;
            }
            PricingKind::Tiered { based_on, tiers } => {
                map.serialize_entry("based_on", based_on.as_str())?;
                let tiers: Vec<FlatTier<'_>> = tiers
                    .iter()
                    .map(|tier| FlatTier {
                        up_to: tier.up_to,
                        price: &tier.price,
                    })
                    .collect();
                map.serialize_entry("tiers", &tiers)?;
            }
            PricingKind::Graduated { based_on, tiers } => {
                map.serialize_entry("based_on", based_on.as_str())?;
                let tiers: Vec<UnitTier> = tiers
                    .iter()
                    .map(|tier| UnitTier {
                        up_to: tier.up_to,
                        unit_price: tier.price,
                    })
                    .collect();
                map.serialize_entry("tiers", &tiers)?;
            }
        }

        if let Some(description) = &self.description {
            map.serialize_entry("description", description)?;
        }
        if let Some(reference) = &self.reference {
            map.serialize_entry("reference", reference)?;
        }
        map.end()
    }
}
