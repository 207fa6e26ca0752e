//! Composable usage-based pricing.
//!
//! This crate provides the pricing engine used for marketplace offerings and
//! listings:
//!
//! - **Usage**: `UsageData`, `MetricContext`, `Metrics`
//! - **Expressions**: `Expr`, a restricted `+ - * /` evaluator over metrics
//! - **Pricing**: `Pricing`, `PricingKind`, `TokenRates`
//! - **Tiers**: `Tier`, `Tiers`, for tiered and graduated pricing
//! - **Validation**: `validate_pricing`, building pricing from JSON data
//!
//! # Example
//!
//! ```
//! use rust_decimal::Decimal;
//! use serde_json::json;
//! use usage_pricing_core::{validate_pricing, MetricContext, UsageData};
//!
//! let pricing = validate_pricing(&json!({
//!     "type": "one_million_tokens",
//!     "input": "0.50",
//!     "output": "1.50"
//! }))?;
//!
//! let usage = UsageData::new().with_tokens(2_000_000, 1_000_000);
//! let cost = pricing.calculate_cost(&usage, &MetricContext::new())?;
//! assert_eq!(cost, Decimal::new(250, 2));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Money
//!
//! Every amount is a `rust_decimal::Decimal`. String amounts in configuration
//! (`"10.00"`) are parsed straight to decimals and evaluation never goes
//! through `f64`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod expr;
pub mod pricing;
pub mod tier;
pub mod usage;
pub mod validate;

pub use error::{ExprError, PricingError, Result, ValidationError, ValidationErrorKind};
pub use expr::{BinaryOp, Expr, Node};
pub use pricing::{Pricing, PricingKind, TokenRates, CUSTOMER_CHARGE};
pub use tier::{Graduation, PriceTiers, Tier, Tiers, UnitPriceTiers};
pub use usage::{MetricContext, MetricSource, Metrics, UsageData};
pub use validate::validate_pricing;
