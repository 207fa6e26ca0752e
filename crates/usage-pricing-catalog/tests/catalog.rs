//! Catalog loading and quoting against files on disk.

use std::io::Write;

use rust_decimal_macros::dec;
use serde_json::json;
use usage_pricing_catalog::{Catalog, CatalogError, Quote};
use usage_pricing_core::{MetricContext, PricingError, UsageData};

fn write_catalog(document: &serde_json::Value) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{document}").unwrap();
    file
}

fn llm_catalog() -> serde_json::Value {
    json!({
        "offerings": [
            {
                "name": "llama-70b",
                "description": "Llama 70B hosted by the seller",
                "payout_price": {"type": "revenue_share", "percentage": "70"}
            },
            {
                "name": "whisper",
                "payout_price": {"type": "one_second", "price": "0.0001"}
            }
        ],
        "listings": [
            {
                "name": "llama-70b-standard",
                "offering": "llama-70b",
                "list_price": {"type": "one_million_tokens", "input": "0.60", "output": "0.80"}
            },
            {
                "name": "llama-70b-volume",
                "offering": "llama-70b",
                "list_price": {
                    "type": "tiered",
                    "based_on": "request_count",
                    "tiers": [
                        {"up_to": 1000, "price": {"type": "one_million_tokens", "price": "1.00"}},
                        {"up_to": null, "price": {"type": "one_million_tokens", "price": "0.50"}}
                    ]
                }
            },
            {
                "name": "whisper-public",
                "offering": "whisper",
                "list_price": {"type": "one_second", "price": "0.0002"}
            }
        ]
    })
}

fn quote(catalog: &Catalog, listing: &str, usage: &UsageData, context: &MetricContext) -> Quote {
    catalog.quote(listing, usage, context).expect("quote should succeed")
}

#[test]
fn loads_catalog_from_file() {
    let file = write_catalog(&llm_catalog());
    let catalog = Catalog::from_path(file.path()).unwrap();

    let offerings: Vec<_> = catalog.offerings().map(|o| o.name.as_str()).collect();
    assert_eq!(offerings, ["llama-70b", "whisper"]);
    assert_eq!(catalog.listings().count(), 3);
    assert_eq!(
        catalog.offering("llama-70b").unwrap().description.as_deref(),
        Some("Llama 70B hosted by the seller")
    );
    assert_eq!(catalog.listing("whisper-public").unwrap().offering, "whisper");
}

#[test]
fn revenue_share_payout_follows_list_price() {
    let catalog = Catalog::from_json_str(&llm_catalog().to_string()).unwrap();
    let usage = UsageData::new().with_tokens(2_000_000, 1_000_000);

    let quote = quote(&catalog, "llama-70b-standard", &usage, &MetricContext::new());
    assert_eq!(quote.customer_charge, dec!(2.00));
    assert_eq!(quote.payout, dec!(1.40));
    assert_eq!(quote.margin, dec!(0.60));
}

#[test]
fn caller_supplied_customer_charge_is_replaced() {
    let catalog = Catalog::from_json_str(&llm_catalog().to_string()).unwrap();
    let usage = UsageData::new().with_tokens(1_000_000, 0);
    let context = MetricContext::new().with("customer_charge", dec!(1000));

    let quote = quote(&catalog, "llama-70b-standard", &usage, &context);
    assert_eq!(quote.customer_charge, dec!(0.60));
    assert_eq!(quote.payout, dec!(0.42));
}

#[test]
fn tiered_listing_uses_request_count() {
    let catalog = Catalog::from_json_str(&llm_catalog().to_string()).unwrap();
    let usage = UsageData::new().with_tokens(1_000_000, 1_000_000);

    let small = quote(
        &catalog,
        "llama-70b-volume",
        &usage,
        &MetricContext::new().with("request_count", 1000u64),
    );
    let large = quote(
        &catalog,
        "llama-70b-volume",
        &usage,
        &MetricContext::new().with("request_count", 1001u64),
    );
    assert_eq!(small.customer_charge, dec!(2.00));
    assert_eq!(large.customer_charge, dec!(1.00));
    assert_eq!(large.payout, dec!(0.70));
}

#[test]
fn missing_request_count_is_a_pricing_error() {
    let catalog = Catalog::from_json_str(&llm_catalog().to_string()).unwrap();
    let err = catalog
        .quote("llama-70b-volume", &UsageData::new(), &MetricContext::new())
        .unwrap_err();

    match err {
        CatalogError::Pricing { price, name, source } => {
            assert_eq!(price, "list_price");
            assert_eq!(name, "llama-70b-volume");
            assert!(matches!(source, PricingError::Expression(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn independent_payout_can_exceed_charge() {
    let mut document = llm_catalog();
    document["listings"][2]["list_price"]["price"] = json!("0.00005");
    let catalog = Catalog::from_json_str(&document.to_string()).unwrap();
    let usage = UsageData::new().with_seconds(dec!(600));

    let quote = quote(&catalog, "whisper-public", &usage, &MetricContext::new());
    assert_eq!(quote.customer_charge, dec!(0.03));
    assert_eq!(quote.payout, dec!(0.06));
    assert_eq!(quote.margin, dec!(-0.03));
}

#[test]
fn rounded_quote_keeps_margin_consistent() {
    let catalog = Catalog::from_json_str(&llm_catalog().to_string()).unwrap();
    let usage = UsageData::new().with_tokens(1234, 5678);

    let exact = quote(&catalog, "llama-70b-standard", &usage, &MetricContext::new());
    let rounded = exact.clone().rounded(4);
    assert_eq!(rounded.customer_charge, exact.customer_charge.round_dp(4));
    assert_eq!(rounded.margin, rounded.customer_charge - rounded.payout);
    assert_eq!(rounded.id, exact.id);
}

#[test]
fn rejects_dangling_listing() {
    let mut document = llm_catalog();
    document["listings"][0]["offering"] = json!("gpt-4o");
    let err = Catalog::from_json_str(&document.to_string()).unwrap_err();
    assert!(matches!(err, CatalogError::UnknownOffering { offering, .. } if offering == "gpt-4o"));
}

#[test]
fn rejects_duplicate_names() {
    let mut document = llm_catalog();
    document["offerings"][1]["name"] = json!("llama-70b");
    let err = Catalog::from_json_str(&document.to_string()).unwrap_err();
    assert!(matches!(err, CatalogError::DuplicateOffering { name } if name == "llama-70b"));
}

#[test]
fn invalid_pricing_fails_load() {
    let mut document = llm_catalog();
    document["listings"][0]["list_price"] = json!({"type": "expr", "expr": "input_tokens ** 2"});
    let err = Catalog::from_json_str(&document.to_string()).unwrap_err();
    assert!(matches!(err, CatalogError::Parse(_)));
    assert!(err.to_string().contains("Unsupported operator"), "{err}");
}

#[test]
fn missing_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.json");
    let err = Catalog::from_path(&path).unwrap_err();
    assert!(matches!(err, CatalogError::Io { path: ref p, .. } if *p == path));
}

#[test]
fn unknown_listing() {
    let catalog = Catalog::from_json_str(&llm_catalog().to_string()).unwrap();
    let err = catalog
        .quote("gpt-4o", &UsageData::new(), &MetricContext::new())
        .unwrap_err();
    assert!(matches!(err, CatalogError::ListingNotFound { name } if name == "gpt-4o"));
}
