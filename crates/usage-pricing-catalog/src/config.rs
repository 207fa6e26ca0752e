//! Catalog configuration.

use std::path::PathBuf;

use crate::error::ConfigError;

/// Variable naming the catalog JSON file.
pub const CATALOG_PATH_VAR: &str = "PRICING_CATALOG_PATH";

/// Variable giving the decimal places reported amounts are rounded to.
pub const ROUND_DP_VAR: &str = "QUOTE_ROUND_DP";

/// Largest scale a `Decimal` can carry.
const MAX_ROUND_DP: u32 = 28;

/// Catalog configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogConfig {
    /// Path to the catalog JSON document.
    pub catalog_path: PathBuf,

    /// Decimal places to round quoted amounts to (banker's rounding).
    /// `None` reports exact amounts.
    pub round_dp: Option<u32>,
}

impl CatalogConfig {
    /// Create a configuration for `catalog_path` with exact amounts.
    #[must_use]
    pub fn new(catalog_path: impl Into<PathBuf>) -> Self {
        Self {
            catalog_path: catalog_path.into(),
            round_dp: None,
        }
    }

    /// Round quoted amounts to `dp` decimal places.
    #[must_use]
    pub fn with_round_dp(mut self, dp: u32) -> Self {
        self.round_dp = Some(dp);
        self
    }

    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `PRICING_CATALOG_PATH` is unset or
    /// `QUOTE_ROUND_DP` is not an integer in `0..=28`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// See [`CatalogConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let catalog_path = lookup(CATALOG_PATH_VAR)
            .filter(|path| !path.trim().is_empty())
            .ok_or(ConfigError::Missing(CATALOG_PATH_VAR))?;

        let round_dp = match lookup(ROUND_DP_VAR) {
            None => None,
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => Some(
                raw.trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|dp| *dp <= MAX_ROUND_DP)
                    .ok_or(ConfigError::Invalid {
                        name: ROUND_DP_VAR,
                        value: raw.clone(),
                    })?,
            ),
        };

        Ok(Self {
            catalog_path: PathBuf::from(catalog_path),
            round_dp,
        })
    }
}
