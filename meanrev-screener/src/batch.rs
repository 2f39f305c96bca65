//! Sequential batch analysis over a stock universe.
//!
//! Each stock runs to completion (calendar → series → stats → growth →
//! merge) before the next begins. A failing stock is logged, recorded,
//! and skipped; the batch always continues.

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use meanrev_common::config::UniverseConfig;

use crate::data::MarketDataProvider;
use crate::error::ScreenError;
use crate::snapshot::{SnapshotBuilder, ValuationSnapshot};

/// One stock the batch could not analyze.
#[derive(Debug, Clone)]
pub struct BatchFailure {
    /// Stock code as given in the universe
    pub code: String,
    /// Stock name, when the universe carried one
    pub name: String,
    /// Rendered error
    pub error: String,
}

/// Result of a batch run.
#[derive(Debug)]
pub struct BatchOutcome {
    /// Snapshots in universe order
    pub snapshots: Vec<ValuationSnapshot>,
    /// Stocks that failed, in encounter order
    pub failures: Vec<BatchFailure>,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// End time
    pub completed_at: DateTime<Utc>,
}

impl BatchOutcome {
    /// Summary string for logging.
    pub fn summary(&self) -> String {
        let total = self.snapshots.len() + self.failures.len();
        let duration_secs =
            (self.completed_at - self.started_at).num_milliseconds() as f64 / 1000.0;
        format!(
            "Analyzed {}/{} stocks in {:.1}s ({} failed)",
            self.snapshots.len(),
            total,
            duration_secs,
            self.failures.len()
        )
    }
}

/// Runs snapshot construction over a whole universe.
pub struct BatchRunner<P> {
    provider: Arc<P>,
    builder: SnapshotBuilder<P>,
}

impl<P: MarketDataProvider> BatchRunner<P> {
    /// Create a runner over the given provider and snapshot builder.
    pub fn new(provider: Arc<P>, builder: SnapshotBuilder<P>) -> Self {
        Self { provider, builder }
    }

    /// Resolve the configured universe into `(code, name)` pairs.
    ///
    /// Explicit codes win; otherwise the configured index's constituents
    /// are fetched under a short-lived session.
    pub async fn resolve_universe(
        &self,
        universe: &UniverseConfig,
    ) -> Result<Vec<(String, String)>, ScreenError> {
        if !universe.codes.is_empty() {
            return Ok(universe
                .codes
                .iter()
                .map(|code| (code.clone(), String::new()))
                .collect());
        }

        let Some(index_id) = universe.index_id.as_deref() else {
            return Err(ScreenError::MalformedInput(
                "universe has neither explicit codes nor an index id".to_string(),
            ));
        };

        let session = self.provider.login().await?;
        let result = self
            .provider
            .query_index_constituents(&session, index_id)
            .await;
        self.provider.logout(session).await;

        let constituents = result?;
        info!(index = %index_id, count = constituents.len(), "Resolved index constituents");

        Ok(constituents
            .into_iter()
            .map(|row| (row.code, row.name))
            .collect())
    }

    /// Analyze every stock in the universe, skipping failures.
    pub async fn run(
        &self,
        universe: &UniverseConfig,
        target_date: NaiveDate,
    ) -> Result<BatchOutcome, ScreenError> {
        let stocks = self.resolve_universe(universe).await?;
        let started_at = Utc::now();
        let total = stocks.len();

        info!(total, target_date = %target_date, "Starting batch analysis");

        let mut snapshots = Vec::new();
        let mut failures = Vec::new();

        for (idx, (code, name)) in stocks.iter().enumerate() {
            match self.builder.build(code, target_date).await {
                Ok(snapshot) => {
                    info!(
                        progress = format!("{}/{}", idx + 1, total),
                        code = %snapshot.code,
                        name = %snapshot.name,
                        "Snapshot built"
                    );
                    snapshots.push(snapshot);
                }
                Err(e) => {
                    // One stock lost per failure; the batch continues.
                    warn!(
                        progress = format!("{}/{}", idx + 1, total),
                        code = %code,
                        error = %e,
                        "Stock analysis failed, skipping"
                    );
                    failures.push(BatchFailure {
                        code: code.clone(),
                        name: name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let outcome = BatchOutcome {
            snapshots,
            failures,
            started_at,
            completed_at: Utc::now(),
        };

        info!("{}", outcome.summary());
        Ok(outcome)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_summary() {
        let now = Utc::now();
        let outcome = BatchOutcome {
            snapshots: vec![],
            failures: vec![BatchFailure {
                code: "sh.601888".into(),
                name: String::new(),
                error: "no data".into(),
            }],
            started_at: now,
            completed_at: now,
        };

        let summary = outcome.summary();
        assert!(summary.contains("0/1"));
        assert!(summary.contains("1 failed"));
    }
}
