//! Usage records and metric resolution.
//!
//! A [`UsageData`] describes one billable event. Metrics that are not part of
//! the record (`request_count`, `customer_charge`, ...) travel alongside it in
//! a [`MetricContext`]. [`Metrics`] joins the two into the name lookup that
//! expressions evaluate against.

use std::collections::{BTreeMap, HashMap};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Consumption recorded for one billable event.
///
/// Every field defaults to zero, so an expression that references a field the
/// caller never set evaluates it as `0`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsageData {
    /// Prompt tokens.
    pub input_tokens: u64,

    /// Completion tokens.
    pub output_tokens: u64,

    /// Total tokens, for providers that only report a combined figure.
    pub total_tokens: u64,

    /// Prompt tokens served from the provider's cache.
    pub cached_input_tokens: u64,

    /// Billable duration in seconds.
    pub seconds: Decimal,

    /// Generic unit count (images, pages, calls).
    pub count: u64,
}

impl UsageData {
    /// Names of the metrics carried by a usage record.
    pub const FIELDS: [&'static str; 6] = [
        "input_tokens",
        "output_tokens",
        "total_tokens",
        "cached_input_tokens",
        "seconds",
        "count",
    ];

    /// Create an empty usage record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set input and output token counts.
    #[must_use]
    pub fn with_tokens(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.input_tokens = input_tokens;
        self.output_tokens = output_tokens;
        self
    }

    /// Set the combined token count.
    #[must_use]
    pub fn with_total_tokens(mut self, total_tokens: u64) -> Self {
        self.total_tokens = total_tokens;
        self
    }

    /// Set the cached input token count.
    #[must_use]
    pub fn with_cached_input_tokens(mut self, cached_input_tokens: u64) -> Self {
        self.cached_input_tokens = cached_input_tokens;
        self
    }

    /// Set the billable duration.
    #[must_use]
    pub fn with_seconds(mut self, seconds: impl Into<Decimal>) -> Self {
        self.seconds = seconds.into();
        self
    }

    /// Set the unit count.
    #[must_use]
    pub fn with_count(mut self, count: u64) -> Self {
        self.count = count;
        self
    }

    /// Look up a usage field by metric name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<Decimal> {
        match name {
            "input_tokens" => Some(self.input_tokens.into()),
            "output_tokens" => Some(self.output_tokens.into()),
            "total_tokens" => Some(self.total_tokens.into()),
            "cached_input_tokens" => Some(self.cached_input_tokens.into()),
            "seconds" => Some(self.seconds),
            "count" => Some(self.count.into()),
            _ => None,
        }
    }
}

/// Extra named metrics supplied per evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricContext(BTreeMap<String, Decimal>);

impl MetricContext {
    /// Create an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a metric, replacing any previous value of the same name.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Decimal>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert a metric, returning the previous value if there was one.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Decimal>) -> Option<Decimal> {
        self.0.insert(name.into(), value.into())
    }

    /// Get a metric by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Decimal> {
        self.0.get(name).copied()
    }

    /// Number of metrics in the context.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the context holds no metrics.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Decimal)> {
        self.0.iter().map(|(name, value)| (name.as_str(), *value))
    }
}

impl<K: Into<String>, V: Into<Decimal>> FromIterator<(K, V)> for MetricContext {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

/// A source of named metric values for expression evaluation.
pub trait MetricSource {
    /// Resolve `name`, or `None` if the metric is unknown.
    fn metric(&self, name: &str) -> Option<Decimal>;
}

impl MetricSource for HashMap<String, Decimal> {
    fn metric(&self, name: &str) -> Option<Decimal> {
        self.get(name).copied()
    }
}

impl MetricSource for MetricContext {
    fn metric(&self, name: &str) -> Option<Decimal> {
        self.get(name)
    }
}

impl MetricSource for UsageData {
    fn metric(&self, name: &str) -> Option<Decimal> {
        self.field(name)
    }
}

/// The metrics visible to an expression: usage fields plus context values.
///
/// Context values shadow usage fields of the same name.
#[derive(Debug, Clone, Copy)]
pub struct Metrics<'a> {
    /// The usage record being priced.
    pub usage: &'a UsageData,
    /// Extra per-call metrics.
    pub context: &'a MetricContext,
}

impl<'a> Metrics<'a> {
    /// Join a usage record and its context.
    #[must_use]
    pub const fn new(usage: &'a UsageData, context: &'a MetricContext) -> Self {
        Self { usage, context }
    }
}

impl MetricSource for Metrics<'_> {
    fn metric(&self, name: &str) -> Option<Decimal> {
        self.context.get(name).or_else(|| self.usage.field(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn unset_fields_resolve_to_zero() {
        let usage = UsageData::new();
        for name in UsageData::FIELDS {
            assert_eq!(usage.field(name), Some(Decimal::ZERO), "{name}");
        }
        assert_eq!(usage.field("request_count"), None);
    }

    #[test]
    fn context_shadows_usage_fields() {
        let usage = UsageData::new().with_count(3);
        let context = MetricContext::new().with("count", 7u64);
        let metrics = Metrics::new(&usage, &context);
        assert_eq!(metrics.metric("count"), Some(dec!(7)));
        assert_eq!(metrics.metric("input_tokens"), Some(dec!(0)));
        assert_eq!(metrics.metric("customer_charge"), None);
    }

    #[test]
    fn usage_deserializes_with_defaults() {
        let usage: UsageData =
            serde_json::from_str(r#"{"input_tokens": 10, "seconds": "1.5"}"#).unwrap();
        assert_eq!(usage.input_tokens, 10);
        assert_eq!(usage.output_tokens, 0);
        assert_eq!(usage.seconds, dec!(1.5));
    }

    #[test]
    fn context_deserializes_from_map() {
        let context: MetricContext =
            serde_json::from_str(r#"{"request_count": 500, "customer_charge": "12.50"}"#)
                .unwrap();
        assert_eq!(context.get("request_count"), Some(dec!(500)));
        assert_eq!(context.get("customer_charge"), Some(dec!(12.50)));
        assert_eq!(context.len(), 2);
    }
}
