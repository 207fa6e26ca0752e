//! Offerings, listings and the catalog that joins them.
//!
//! A seller's offering carries the `payout_price` the marketplace pays out; a
//! customer-facing listing of that offering carries the `list_price` the
//! customer is charged. The catalog document looks like:
//!
//! ```json
//! {
//!   "offerings": [{"name": "gpt-4o", "payout_price": {"type": "revenue_share", "percentage": "70"}}],
//!   "listings": [{"name": "gpt-4o-standard", "offering": "gpt-4o",
//!                 "list_price": {"type": "one_million_tokens", "input": "2.50", "output": "10.00"}}]
//! }
//! ```

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use usage_pricing_core::{MetricContext, Pricing, PricingError, UsageData, CUSTOMER_CHARGE};

use crate::error::{CatalogError, Result};
use crate::ids::QuoteId;
use crate::quote::Quote;

/// A seller's service offering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offering {
    /// Unique offering name.
    pub name: String,

    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// What the marketplace pays the seller per billable event.
    pub payout_price: Pricing,
}

/// A customer-facing listing of an offering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    /// Unique listing name.
    pub name: String,

    /// Name of the offering this listing sells.
    pub offering: String,

    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// What the customer is charged per billable event.
    pub list_price: Pricing,
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    offerings: Vec<Offering>,
    #[serde(default)]
    listings: Vec<Listing>,
}

/// A validated, immutable set of offerings and listings.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    offerings: BTreeMap<String, Offering>,
    listings: BTreeMap<String, Listing>,
}

impl Catalog {
    /// Build a catalog, checking names are unique and every listing points at
    /// a known offering.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::DuplicateOffering`],
    /// [`CatalogError::DuplicateListing`] or [`CatalogError::UnknownOffering`].
    pub fn new(offerings: Vec<Offering>, listings: Vec<Listing>) -> Result<Self> {
        let mut catalog = Self::default();

        for offering in offerings {
            match catalog.offerings.entry(offering.name.clone()) {
                Entry::Occupied(_) => {
                    return Err(CatalogError::DuplicateOffering {
                        name: offering.name,
                    })
                }
                Entry::Vacant(slot) => {
                    slot.insert(offering);
                }
            }
        }

        for listing in listings {
            if !catalog.offerings.contains_key(&listing.offering) {
                return Err(CatalogError::UnknownOffering {
                    listing: listing.name,
                    offering: listing.offering,
                });
            }
            match catalog.listings.entry(listing.name.clone()) {
                Entry::Occupied(_) => {
                    return Err(CatalogError::DuplicateListing { name: listing.name })
                }
                Entry::Vacant(slot) => {
                    slot.insert(listing);
                }
            }
        }

        tracing::debug!(
            offerings = catalog.offerings.len(),
            listings = catalog.listings.len(),
            "Catalog loaded"
        );
        Ok(catalog)
    }

    /// Parse and validate a catalog JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Parse`] if the document or any pricing in it is
    /// invalid, or any error from [`Catalog::new`].
    pub fn from_json_str(json: &str) -> Result<Self> {
        let document: CatalogDocument = serde_json::from_str(json)?;
        Self::new(document.offerings, document.listings)
    }

    /// Read and validate a catalog JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Io`] if the file cannot be read, or any error
    /// from [`Catalog::from_json_str`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::debug!(path = %path.display(), "Reading catalog");
        let json = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Look up an offering by name.
    #[must_use]
    pub fn offering(&self, name: &str) -> Option<&Offering> {
        self.offerings.get(name)
    }

    /// Look up a listing by name.
    #[must_use]
    pub fn listing(&self, name: &str) -> Option<&Listing> {
        self.listings.get(name)
    }

    /// All offerings, in name order.
    pub fn offerings(&self) -> impl Iterator<Item = &Offering> {
        self.offerings.values()
    }

    /// All listings, in name order.
    pub fn listings(&self) -> impl Iterator<Item = &Listing> {
        self.listings.values()
    }

    /// Price one billable event against a listing.
    ///
    /// The listing's `list_price` gives the customer charge. The offering's
    /// `payout_price` is then evaluated with `customer_charge` set to that
    /// charge, replacing any caller-supplied value, so revenue-share payouts
    /// see what the customer actually paid.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ListingNotFound`] for an unknown listing, or
    /// [`CatalogError::Pricing`] if either price fails to evaluate.
    pub fn quote(
        &self,
        listing: &str,
        usage: &UsageData,
        context: &MetricContext,
    ) -> Result<Quote> {
        let listing = self
            .listings
            .get(listing)
            .ok_or_else(|| CatalogError::ListingNotFound {
                name: listing.to_string(),
            })?;
        let offering = self
            .offerings
            .get(&listing.offering)
            .ok_or_else(|| CatalogError::UnknownOffering {
                listing: listing.name.clone(),
                offering: listing.offering.clone(),
            })?;

        let customer_charge = listing
            .list_price
            .calculate_cost(usage, context)
            .map_err(|source| CatalogError::Pricing {
                price: "list_price",
                name: listing.name.clone(),
                source,
            })?;

        let mut payout_context = context.clone();
        payout_context.insert(CUSTOMER_CHARGE, customer_charge);
        let payout = offering
            .payout_price
            .calculate_cost(usage, &payout_context)
            .map_err(|source| CatalogError::Pricing {
                price: "payout_price",
                name: offering.name.clone(),
                source,
            })?;

        let margin = customer_charge
            .checked_sub(payout)
            .ok_or_else(|| CatalogError::Pricing {
                price: "margin",
                name: listing.name.clone(),
                source: PricingError::Overflow { variant: "margin" },
            })?;

        tracing::debug!(
            listing = %listing.name,
            offering = %offering.name,
            customer_charge = %customer_charge,
            payout = %payout,
            "Quoted usage event"
        );

        Ok(Quote {
            id: QuoteId::generate(),
            listing: listing.name.clone(),
            offering: offering.name.clone(),
            customer_charge,
            payout,
            margin,
            quoted_at: Utc::now(),
        })
    }
}
