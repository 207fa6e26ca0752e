//! Volume tiers for tiered and graduated pricing.
//!
//! A tier list is validated once, on construction: it is non-empty, bounded
//! `up_to` values are non-negative and strictly ascending, and an unbounded
//! tier (`up_to = None`) may only appear last.

use rust_decimal::Decimal;

use crate::error::{ValidationError, ValidationErrorKind};
use crate::pricing::Pricing;

/// One band of a tier list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tier<P> {
    /// Inclusive upper bound of the band, or `None` for "everything above".
    pub up_to: Option<Decimal>,

    /// The band's price: a nested [`Pricing`] for tiered pricing, a unit price
    /// for graduated pricing.
    pub price: P,
}

impl<P> Tier<P> {
    /// A band ending at `up_to` (inclusive).
    pub fn up_to(up_to: impl Into<Decimal>, price: P) -> Self {
        Self {
            up_to: Some(up_to.into()),
            price,
        }
    }

    /// The final, unbounded band.
    pub fn unlimited(price: P) -> Self {
        Self { up_to: None, price }
    }

    /// Whether `volume` falls at or below this band's upper bound.
    fn covers(&self, volume: Decimal) -> bool {
        match self.up_to {
            Some(up_to) => volume <= up_to,
            None => true,
        }
    }
}

/// A tier list that satisfies the ordering rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tiers<P>(Vec<Tier<P>>);

/// Tiers of flat, nested prices.
pub type PriceTiers = Tiers<Pricing>;

/// Tiers of marginal unit prices.
pub type UnitPriceTiers = Tiers<Decimal>;

impl<P> Tiers<P> {
    /// Validate and wrap a tier list.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationErrorKind::InvalidTiers`] if the list is empty, a
    /// bound is negative, bounds are not strictly ascending, or an unbounded
    /// tier is not last.
    pub fn new(tiers: Vec<Tier<P>>) -> Result<Self, ValidationError> {
        if tiers.is_empty() {
            return Err(invalid("at least one tier is required".to_string()));
        }

        let last = tiers.len() - 1;
        let mut previous: Option<Decimal> = None;
        for (index, tier) in tiers.iter().enumerate() {
            match tier.up_to {
                None if index != last => {
                    return Err(invalid(format!(
                        "tier {index} has no upper bound but is not the last tier"
                    )));
                }
                None => {}
                Some(up_to) if up_to < Decimal::ZERO => {
                    return Err(invalid(format!("tier {index} has a negative bound {up_to}")));
                }
                Some(up_to) => {
                    if let Some(prev) = previous {
                        if up_to <= prev {
                            return Err(invalid(format!(
                                "tier {index} bound {up_to} is not above the previous bound {prev}"
                            )));
                        }
                    }
                    previous = Some(up_to);
                }
            }
        }

        Ok(Self(tiers))
    }

    /// The tiers in ascending order.
    #[must_use]
    pub fn as_slice(&self) -> &[Tier<P>] {
        &self.0
    }

    /// Iterate over the tiers in ascending order.
    pub fn iter(&self) -> std::slice::Iter<'_, Tier<P>> {
        self.0.iter()
    }

    /// Number of tiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; a validated tier list has at least one tier.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The first tier whose upper bound is at or above `volume`.
    ///
    /// A volume exactly equal to a bound belongs to that tier, not the next.
    #[must_use]
    pub fn select(&self, volume: Decimal) -> Option<&Tier<P>> {
        self.0.iter().find(|tier| tier.covers(volume))
    }
}

impl<'a, P> IntoIterator for &'a Tiers<P> {
    type Item = &'a Tier<P>;
    type IntoIter = std::slice::Iter<'a, Tier<P>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// The outcome of walking graduated tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Graduation {
    /// The whole volume was billed.
    Billed(Decimal),
    /// Volume was left over after the last (bounded) tier.
    Exceeded,
    /// Intermediate arithmetic overflowed.
    Overflow,
}

impl UnitPriceTiers {
    /// Bill `volume` progressively: each band is charged at its own unit
    /// price, and the unbounded tier absorbs whatever remains.
    ///
    /// Zero or negative volume bills exactly `0`.
    #[must_use]
    pub fn graduate(&self, volume: Decimal) -> Graduation {
        let mut remaining = volume;
        let mut floor = Decimal::ZERO;
        let mut total = Decimal::ZERO;

        for tier in &self.0 {
            if remaining <= Decimal::ZERO {
                break;
            }
            let band = match tier.up_to {
                Some(up_to) => (up_to - floor).min(remaining),
                None => remaining,
            };
            let Some(charge) = band.checked_mul(tier.price) else {
                return Graduation::Overflow;
            };
            let Some(sum) = total.checked_add(charge) else {
                return Graduation::Overflow;
            };
            total = sum;
            remaining -= band;
            if let Some(up_to) = tier.up_to {
                floor = up_to;
            }
        }

        if remaining > Decimal::ZERO {
            Graduation::Exceeded
        } else {
            Graduation::Billed(total)
        }
    }
}

fn invalid(reason: String) -> ValidationError {
    ValidationError::new(ValidationErrorKind::InvalidTiers(reason))
}
