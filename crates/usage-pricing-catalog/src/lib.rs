//! Offering and listing catalog for usage-pricing.
//!
//! A catalog pairs each seller offering (`payout_price`) with the listings
//! that sell it to customers (`list_price`). Quoting a usage event against a
//! listing evaluates both prices and reports the margin between them.
//!
//! # Example
//!
//! ```
//! use rust_decimal::Decimal;
//! use usage_pricing_catalog::Catalog;
//! use usage_pricing_core::{MetricContext, UsageData};
//!
//! let catalog = Catalog::from_json_str(r#"{
//!     "offerings": [{"name": "sdxl", "payout_price": {"type": "revenue_share", "percentage": "80"}}],
//!     "listings": [{"name": "sdxl-public", "offering": "sdxl",
//!                   "list_price": {"type": "image", "price": "0.05"}}]
//! }"#)?;
//!
//! let usage = UsageData::new().with_count(10);
//! let quote = catalog.quote("sdxl-public", &usage, &MetricContext::new())?;
//! assert_eq!(quote.customer_charge, Decimal::new(50, 2));
//! assert_eq!(quote.payout, Decimal::new(40, 2));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod ids;
pub mod quote;

pub use catalog::{Catalog, Listing, Offering};
pub use config::{CatalogConfig, CATALOG_PATH_VAR, ROUND_DP_VAR};
pub use error::{CatalogError, ConfigError, Result};
pub use ids::{ParseQuoteIdError, QuoteId};
pub use quote::{Quote, QuoteRequest};
