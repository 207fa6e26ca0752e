//! Usage-pricing quote runner.
//!
//! Reads quote requests as JSON lines on stdin and writes quotes as JSON lines
//! on stdout. Logs go to stderr.

use std::io::{self, BufWriter};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use usage_pricing_catalog::{Catalog, CatalogConfig};
use usage_pricing_quote::run_batch;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,usage_pricing=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    tracing::info!("Starting usage-pricing quote runner");

    let config = CatalogConfig::from_env()?;
    tracing::info!(
        catalog_path = %config.catalog_path.display(),
        round_dp = ?config.round_dp,
        "Configuration loaded"
    );

    let catalog = Catalog::from_path(&config.catalog_path)?;

    let stdin = io::stdin();
    let stdout = io::stdout();
    let summary = run_batch(
        &catalog,
        config.round_dp,
        stdin.lock(),
        BufWriter::new(stdout.lock()),
    )?;

    tracing::info!(
        quoted = summary.quoted,
        failed = summary.failed,
        "Quote batch complete"
    );
    Ok(())
}
