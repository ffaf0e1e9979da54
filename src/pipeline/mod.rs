//! Batch orchestrator: runs many scrape requests through one source.
//!
//! Requests run strictly one after another with a fixed pause in between so
//! the portal never sees more than one session from us at a time. Entries
//! that are not `{state, commodity, market?}` objects are skipped; a failed
//! scrape is logged and the batch moves on.

use crate::models::{PriceRecord, ScrapeRequest};
use crate::scraper::MarketDataSource;
use crate::utils::Timer;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

#[derive(Debug, Default, Deserialize)]
struct BatchEntry {
    state: Option<String>,
    commodity: Option<String>,
    market: Option<String>,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|v| !v.trim().is_empty())
}

/// Lenient conversion of one batch entry; `None` for anything unusable.
pub fn request_from_value(value: &Value) -> Option<ScrapeRequest> {
    let entry: BatchEntry = serde_json::from_value(value.clone()).ok()?;
    Some(ScrapeRequest::new(
        non_empty(entry.state)?,
        non_empty(entry.commodity)?,
        entry.market,
    ))
}

pub struct BatchPipeline {
    source: Arc<dyn MarketDataSource>,
    delay: Duration,
}

impl BatchPipeline {
    pub fn new(source: Arc<dyn MarketDataSource>, delay: Duration) -> Self {
        Self { source, delay }
    }

    pub async fn run(&self, entries: &[Value]) -> BatchOutcome {
        let timer = Timer::start(format!("batch of {}", entries.len()));
        let mut outcome = BatchOutcome {
            requests_processed: entries.len(),
            ..Default::default()
        };

        for (i, entry) in entries.iter().enumerate() {
            let Some(request) = request_from_value(entry) else {
                debug!("Skipping batch entry {}: missing state or commodity", i);
                outcome.skipped += 1;
                continue;
            };

            if outcome.succeeded + outcome.failed > 0 {
                tokio::time::sleep(self.delay).await;
            }

            match self.source.fetch_prices(&request).await {
                Ok(records) => {
                    outcome.succeeded += 1;
                    outcome.records.extend(records);
                }
                Err(e) => {
                    error!("Error processing request {:?}: {}", request, e);
                    outcome.failed += 1;
                }
            }
        }

        info!(
            "Batch done: {} entries | {} ok | {} skipped | {} failed | {} records in {:.1?}",
            outcome.requests_processed,
            outcome.succeeded,
            outcome.skipped,
            outcome.failed,
            outcome.records.len(),
            timer.elapsed(),
        );
        outcome
    }
}

#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub records: Vec<PriceRecord>,
    pub requests_processed: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}
