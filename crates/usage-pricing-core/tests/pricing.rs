//! End-to-end pricing scenarios: configuration in, decimal cost out.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use usage_pricing_core::{
    validate_pricing, ExprError, MetricContext, Pricing, PricingError, UsageData,
};

fn pricing(value: Value) -> Pricing {
    validate_pricing(&value).expect("pricing should validate")
}

fn requests(count: u64) -> MetricContext {
    MetricContext::new().with("request_count", count)
}

fn none() -> MetricContext {
    MetricContext::new()
}

// ============================================================================
// Leaf variants
// ============================================================================

#[test]
fn constant_is_independent_of_usage() {
    let fee = pricing(json!({"type": "constant", "amount": "10.00"}));
    let discount = pricing(json!({"type": "constant", "amount": "-3.00"}));
    let heavy = UsageData::new().with_tokens(9_000_000, 1_000_000).with_count(50);

    for usage in [UsageData::new(), heavy] {
        assert_eq!(fee.calculate_cost(&usage, &requests(7)).unwrap(), dec!(10.00));
        assert_eq!(discount.calculate_cost(&usage, &none()).unwrap(), dec!(-3.00));
    }
}

#[test]
fn token_pricing_with_separate_rates() {
    let tokens = pricing(json!({
        "type": "one_million_tokens",
        "input": "0.50",
        "output": "1.50"
    }));
    let usage = UsageData::new().with_tokens(2_000_000, 1_000_000);
    assert_eq!(tokens.calculate_cost(&usage, &none()).unwrap(), dec!(2.50));
}

#[test]
fn token_pricing_with_unified_price() {
    let tokens = pricing(json!({"type": "one_million_tokens", "price": "10.00"}));

    let split = UsageData::new().with_tokens(300_000, 200_000);
    assert_eq!(tokens.calculate_cost(&split, &none()).unwrap(), dec!(5.00));

    let total_only = UsageData::new().with_total_tokens(250_000);
    assert_eq!(tokens.calculate_cost(&total_only, &none()).unwrap(), dec!(2.50));
}

#[test]
fn expression_pricing() {
    let expr = pricing(json!({"type": "expr", "expr": "input_tokens + output_tokens * 4"}));

    let usage = UsageData::new().with_tokens(5000, 1000);
    assert_eq!(expr.calculate_cost(&usage, &none()).unwrap(), dec!(9000));

    let usage = UsageData::new().with_tokens(5000, 2000);
    assert_eq!(expr.calculate_cost(&usage, &none()).unwrap(), dec!(13000));
}

#[test]
fn expression_unary_minus() {
    let expr = pricing(json!({"type": "expr", "expr": "input_tokens - -100"}));
    let usage = UsageData::new().with_tokens(950, 0);
    assert_eq!(expr.calculate_cost(&usage, &none()).unwrap(), dec!(1050));
}

#[test]
fn expression_with_context_metric() {
    let expr = pricing(json!({"type": "expr", "expr": "request_count * 0.001 + seconds * 0.01"}));
    let usage = UsageData::new().with_seconds(dec!(30));
    assert_eq!(expr.calculate_cost(&usage, &requests(2000)).unwrap(), dec!(2.30));
}

#[test]
fn expression_error_modes() {
    let usage = UsageData::new().with_tokens(1, 1);

    let err = validate_pricing(&json!({"type": "expr", "expr": "input_tokens +"})).unwrap_err();
    assert!(err.to_string().contains("Invalid expression syntax"));

    let unknown = pricing(json!({"type": "expr", "expr": "input_tokens + unknown_field"}));
    assert_eq!(
        unknown.calculate_cost(&usage, &none()).unwrap_err(),
        PricingError::Expression(ExprError::UnknownMetric("unknown_field".into()))
    );

    let err = validate_pricing(&json!({"type": "expr", "expr": "input_tokens ** 2"})).unwrap_err();
    assert!(err.to_string().contains("Unsupported operator"));
}

#[test]
fn deeply_nested_expressions_are_rejected_not_fatal() {
    let nested = format!("{}input_tokens{}", "(".repeat(300), ")".repeat(300));
    let err = validate_pricing(&json!({"type": "expr", "expr": nested})).unwrap_err();
    assert!(err.to_string().contains("nested too deeply"), "{err}");

    let negations = format!("{}request_count", "-".repeat(5000));
    let err = validate_pricing(&json!({
        "type": "tiered",
        "based_on": negations,
        "tiers": [{"up_to": null, "price": "1.00"}]
    }))
    .unwrap_err();
    assert!(err.to_string().contains("nested too deeply"), "{err}");

    let shallow = format!("{}input_tokens{}", "(".repeat(50), ")".repeat(50));
    let usage = UsageData::new().with_tokens(7, 0);
    let expr = pricing(json!({"type": "expr", "expr": shallow}));
    assert_eq!(expr.calculate_cost(&usage, &none()).unwrap(), dec!(7));
}

#[test]
fn unset_usage_fields_are_zero_but_context_metrics_are_required() {
    let expr = pricing(json!({"type": "expr", "expr": "count + request_count"}));
    assert_eq!(
        expr.calculate_cost(&UsageData::new(), &requests(3)).unwrap(),
        dec!(3)
    );
    assert_eq!(
        expr.calculate_cost(&UsageData::new(), &none()).unwrap_err(),
        PricingError::Expression(ExprError::UnknownMetric("request_count".into()))
    );
}

#[test]
fn revenue_share_requires_customer_charge() {
    let share = pricing(json!({"type": "revenue_share", "percentage": "15"}));
    assert!(matches!(
        share.calculate_cost(&UsageData::new(), &none()),
        Err(PricingError::MissingContext { key: "customer_charge", .. })
    ));

    let context = MetricContext::new().with("customer_charge", dec!(200.00));
    assert_eq!(share.calculate_cost(&UsageData::new(), &context).unwrap(), dec!(30.00));
}

// ============================================================================
// Tiered and graduated
// ============================================================================

fn flat_tiers() -> Pricing {
    pricing(json!({
        "type": "tiered",
        "based_on": "request_count",
        "tiers": [
            {"up_to": "1000", "price": {"type": "constant", "amount": "10.00"}},
            {"up_to": null, "price": {"type": "constant", "amount": "50.00"}}
        ]
    }))
}

#[test]
fn tiered_boundary_is_inclusive() {
    let tiers = flat_tiers();
    let usage = UsageData::new();
    assert_eq!(tiers.calculate_cost(&usage, &requests(999)).unwrap(), dec!(10.00));
    assert_eq!(tiers.calculate_cost(&usage, &requests(1000)).unwrap(), dec!(10.00));
    assert_eq!(tiers.calculate_cost(&usage, &requests(1001)).unwrap(), dec!(50.00));
}

#[test]
fn tiered_based_on_expression() {
    let tiers = pricing(json!({
        "type": "tiered",
        "based_on": "input_tokens + output_tokens",
        "tiers": [
            {"up_to": "100", "price": "1.00"},
            {"up_to": "1000", "price": "2.00"},
            {"up_to": null, "price": "3.00"}
        ]
    }));
    let usage = UsageData::new().with_tokens(60, 40);
    assert_eq!(tiers.calculate_cost(&usage, &none()).unwrap(), dec!(1.00));
    let usage = UsageData::new().with_tokens(600, 40);
    assert_eq!(tiers.calculate_cost(&usage, &none()).unwrap(), dec!(2.00));
}

#[test]
fn tiered_and_graduated_diverge_on_the_same_structure() {
    let tiered = pricing(json!({
        "type": "tiered",
        "based_on": "request_count",
        "tiers": [
            {"up_to": "1000", "price": {"type": "expr", "expr": "request_count * 0.010"}},
            {"up_to": null, "price": {"type": "expr", "expr": "request_count * 0.008"}}
        ]
    }));
    let graduated = pricing(json!({
        "type": "graduated",
        "based_on": "request_count",
        "tiers": [
            {"up_to": "1000", "unit_price": "0.010"},
            {"up_to": null, "unit_price": "0.008"}
        ]
    }));

    let usage = UsageData::new();
    assert_eq!(tiered.calculate_cost(&usage, &requests(5000)).unwrap(), dec!(40.00));
    assert_eq!(graduated.calculate_cost(&usage, &requests(5000)).unwrap(), dec!(42.000));

    // Below the first boundary both bill the same way.
    assert_eq!(tiered.calculate_cost(&usage, &requests(500)).unwrap(), dec!(5.00));
    assert_eq!(graduated.calculate_cost(&usage, &requests(500)).unwrap(), dec!(5.00));
}

#[test]
fn graduated_zero_volume_is_zero() {
    let graduated = pricing(json!({
        "type": "graduated",
        "based_on": "count",
        "tiers": [
            {"up_to": "10", "unit_price": "1.00"},
            {"up_to": null, "unit_price": "0.50"}
        ]
    }));
    let cost = graduated.calculate_cost(&UsageData::new(), &none()).unwrap();
    assert_eq!(cost, Decimal::ZERO);
    assert!(cost.is_zero());
}

#[test]
fn graduated_exactly_on_boundary() {
    let graduated = pricing(json!({
        "type": "graduated",
        "based_on": "count",
        "tiers": [
            {"up_to": "10", "unit_price": "1.00"},
            {"up_to": "20", "unit_price": "0.50"},
            {"up_to": null, "unit_price": "0.25"}
        ]
    }));
    let usage = UsageData::new().with_count(20);
    assert_eq!(graduated.calculate_cost(&usage, &none()).unwrap(), dec!(15.00));
    let usage = UsageData::new().with_count(24);
    assert_eq!(graduated.calculate_cost(&usage, &none()).unwrap(), dec!(16.00));
}

// ============================================================================
// Composition
// ============================================================================

#[test]
fn multiply_composes() {
    let discounted = pricing(json!({
        "type": "multiply",
        "factor": "0.80",
        "base": {"type": "constant", "amount": "100.00"}
    }));
    assert_eq!(discounted.calculate_cost(&UsageData::new(), &none()).unwrap(), dec!(80.00));

    let stacked = pricing(json!({
        "type": "multiply",
        "factor": "0.90",
        "base": {
            "type": "multiply",
            "factor": "0.80",
            "base": {"type": "constant", "amount": "100.00"}
        }
    }));
    assert_eq!(stacked.calculate_cost(&UsageData::new(), &none()).unwrap(), dec!(72.00));
}

#[test]
fn add_includes_discounts() {
    let net = pricing(json!({
        "type": "add",
        "prices": [
            {"type": "one_million_tokens", "price": "4.00"},
            {"type": "constant", "amount": "-3.00"}
        ]
    }));
    let usage = UsageData::new().with_tokens(500_000, 500_000);
    assert_eq!(net.calculate_cost(&usage, &none()).unwrap(), dec!(1.00));

    let small = UsageData::new().with_tokens(250_000, 250_000);
    assert_eq!(net.calculate_cost(&small, &none()).unwrap(), dec!(-1.00));
}

fn volume_discounted_tokens() -> Pricing {
    pricing(json!({
        "type": "add",
        "prices": [
            {
                "type": "multiply",
                "factor": "0.90",
                "base": {
                    "type": "tiered",
                    "based_on": "request_count",
                    "tiers": [
                        {"up_to": "1000", "price": {"type": "one_million_tokens", "price": "10.00"}},
                        {"up_to": null, "price": {"type": "one_million_tokens", "price": "5.00"}}
                    ]
                }
            },
            {"type": "constant", "amount": "2.00"}
        ]
    }))
}

#[test]
fn nested_composition_end_to_end() {
    let pricing = volume_discounted_tokens();
    let usage = UsageData::new().with_total_tokens(1_000_000);

    assert_eq!(pricing.calculate_cost(&usage, &requests(500)).unwrap(), dec!(11.00));
    assert_eq!(pricing.calculate_cost(&usage, &requests(5000)).unwrap(), dec!(6.50));
}

#[test]
fn nested_composition_propagates_missing_context() {
    let pricing = volume_discounted_tokens();
    let usage = UsageData::new().with_total_tokens(1_000_000);
    assert_eq!(
        pricing.calculate_cost(&usage, &none()).unwrap_err(),
        PricingError::Expression(ExprError::UnknownMetric("request_count".into()))
    );
}

#[test]
fn evaluation_is_idempotent() {
    let pricing = volume_discounted_tokens();
    let usage = UsageData::new().with_total_tokens(1_000_000);
    let context = requests(5000);

    let first = pricing.calculate_cost(&usage, &context).unwrap();
    let second = pricing.calculate_cost(&usage, &context).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.to_string(), second.to_string());
}

#[test]
fn deep_nesting() {
    let mut value = json!({"type": "constant", "amount": "1"});
    for _ in 0..64 {
        value = json!({"type": "add", "prices": [value, {"type": "constant", "amount": "1"}]});
    }
    let pricing = pricing(value);
    assert_eq!(pricing.calculate_cost(&UsageData::new(), &none()).unwrap(), dec!(65));
}

#[test]
fn serialized_pricing_validates_back_to_itself() {
    let original = volume_discounted_tokens().with_description("volume discount");
    let value = serde_json::to_value(&original).unwrap();
    let rebuilt = validate_pricing(&value).unwrap();
    assert_eq!(rebuilt, original);
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn shared_tree_evaluates_concurrently_without_locks() {
    let pricing = Arc::new(volume_discounted_tokens());
    let usage = UsageData::new().with_total_tokens(1_000_000);

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16_u64)
            .map(|worker| {
                let pricing = Arc::clone(&pricing);
                let usage = usage.clone();
                scope.spawn(move || {
                    let count = if worker % 2 == 0 { 500 } else { 5000 };
                    let expected = if worker % 2 == 0 { dec!(11.00) } else { dec!(6.50) };
                    for _ in 0..200 {
                        let cost = pricing.calculate_cost(&usage, &requests(count)).unwrap();
                        assert_eq!(cost, expected);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker panicked");
        }
    });
}
