//! Quote types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use usage_pricing_core::{MetricContext, UsageData};

use crate::ids::QuoteId;

/// The priced outcome of one billable event against a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Unique quote ID (ULID for time-ordering).
    pub id: QuoteId,

    /// The listing the event was priced against.
    pub listing: String,

    /// The offering behind the listing.
    pub offering: String,

    /// What the customer is charged (`list_price`).
    pub customer_charge: Decimal,

    /// What the seller is paid (`payout_price`).
    pub payout: Decimal,

    /// `customer_charge - payout`. Negative when the listing sells at a loss.
    pub margin: Decimal,

    /// When the quote was produced.
    pub quoted_at: DateTime<Utc>,
}

impl Quote {
    /// Round every amount to `dp` decimal places using banker's rounding.
    ///
    /// The margin is recomputed from the rounded amounts so the three figures
    /// stay consistent.
    #[must_use]
    pub fn rounded(mut self, dp: u32) -> Self {
        self.customer_charge = self.customer_charge.round_dp(dp);
        self.payout = self.payout.round_dp(dp);
        self.margin = self.customer_charge - self.payout;
        self
    }
}

/// One usage event to be quoted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteRequest {
    /// Listing to price against.
    pub listing: String,

    /// The consumption being billed.
    #[serde(default)]
    pub usage: UsageData,

    /// Extra metrics such as `request_count`.
    #[serde(default)]
    pub context: MetricContext,
}
