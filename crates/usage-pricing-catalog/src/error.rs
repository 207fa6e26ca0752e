//! Error types for catalog loading and quoting.

use std::path::PathBuf;

use usage_pricing_core::PricingError;

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Errors that can occur while loading a catalog or quoting against it.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The catalog file could not be read.
    #[error("failed to read catalog {path}: {source}")]
    Io {
        /// The file that failed.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The catalog document is malformed, including invalid pricing.
    #[error("invalid catalog document: {0}")]
    Parse(#[from] serde_json::Error),

    /// Two offerings share a name.
    #[error("duplicate offering: {name}")]
    DuplicateOffering {
        /// The repeated name.
        name: String,
    },

    /// Two listings share a name.
    #[error("duplicate listing: {name}")]
    DuplicateListing {
        /// The repeated name.
        name: String,
    },

    /// A listing references an offering the catalog does not contain.
    #[error("listing {listing} references unknown offering {offering}")]
    UnknownOffering {
        /// The listing name.
        listing: String,
        /// The missing offering name.
        offering: String,
    },

    /// No listing with this name exists.
    #[error("listing not found: {name}")]
    ListingNotFound {
        /// The requested name.
        name: String,
    },

    /// Pricing evaluation failed.
    #[error("{price} of {name}: {source}")]
    Pricing {
        /// Which price failed, `list_price` or `payout_price`.
        price: &'static str,
        /// The listing or offering whose price failed.
        name: String,
        /// The evaluation failure.
        source: PricingError,
    },
}

/// Errors in environment configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A required variable is unset.
    #[error("missing environment variable {0}")]
    Missing(&'static str),

    /// A variable is set to an unusable value.
    #[error("invalid value for {name}: {value}")]
    Invalid {
        /// The variable name.
        name: &'static str,
        /// The rejected value.
        value: String,
    },
}
