//! Batch quoting over newline-delimited JSON.
//!
//! Each input line is a [`QuoteRequest`]:
//!
//! ```json
//! {"listing": "llama-70b-standard", "usage": {"input_tokens": 1200}, "context": {"request_count": "3"}}
//! ```
//!
//! and each successfully priced line produces one [`Quote`] line on the
//! output. Lines that fail are logged and skipped; the batch carries on.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

use std::io::{self, BufRead, Write};

use usage_pricing_catalog::{Catalog, CatalogError, Quote, QuoteRequest};

/// Why a single input line could not be quoted.
#[derive(Debug, thiserror::Error)]
pub enum LineError {
    /// The line is not a valid quote request.
    #[error("malformed quote request: {0}")]
    Request(#[source] serde_json::Error),

    /// The catalog rejected the request.
    #[error(transparent)]
    Quote(#[from] CatalogError),
}

/// Counts from one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Lines that produced a quote.
    pub quoted: usize,
    /// Lines that were logged and skipped.
    pub failed: usize,
}

/// Quote a single JSON request line.
///
/// # Errors
///
/// Returns [`LineError::Request`] if the line does not parse, or
/// [`LineError::Quote`] if quoting fails.
pub fn quote_line(catalog: &Catalog, round_dp: Option<u32>, line: &str) -> Result<Quote, LineError> {
    let request: QuoteRequest = serde_json::from_str(line).map_err(LineError::Request)?;
    let quote = catalog.quote(&request.listing, &request.usage, &request.context)?;
    Ok(match round_dp {
        Some(dp) => quote.rounded(dp),
        None => quote,
    })
}

/// Quote every request line from `input`, writing one quote per line to
/// `output`.
///
/// Blank lines are ignored. The output is flushed before returning.
///
/// # Errors
///
/// Returns an error only if reading `input` or writing `output` fails.
pub fn run_batch<R, W>(
    catalog: &Catalog,
    round_dp: Option<u32>,
    input: R,
    mut output: W,
) -> io::Result<BatchSummary>
where
    R: BufRead,
    W: Write,
{
    let mut summary = BatchSummary::default();

    for (index, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        match quote_line(catalog, round_dp, &line) {
            Ok(quote) => {
                serde_json::to_writer(&mut output, &quote)?;
                output.write_all(b"\n")?;
                summary.quoted += 1;
            }
            Err(err) => {
                tracing::warn!(line = index + 1, error = %err, "Skipping quote request");
                summary.failed += 1;
            }
        }
    }

    output.flush()?;
    Ok(summary)
}
