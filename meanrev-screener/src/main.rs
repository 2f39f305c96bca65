//! MeanRev Screener - batch valuation analysis entry point.
//!
//! Loads configuration, resolves the universe, builds one valuation
//! snapshot per stock, screens the batch against the reference rules,
//! and writes both the full and the filtered result files.

use anyhow::{Context, Result};
use chrono::{Duration, Local};
use std::sync::Arc;

use meanrev_common::config::Config;
use meanrev_common::logging::init_logging;

use meanrev_screener::batch::BatchRunner;
use meanrev_screener::calendar::HOLIDAY_SAFE_LOOKBACK_DAYS;
use meanrev_screener::data::{parse_iso_date, GatewayProvider, LocalStorage, LocalStorageConfig};
use meanrev_screener::export::{write_screening_csv, write_snapshot_csv};
use meanrev_screener::screening::ScreeningEngine;
use meanrev_screener::snapshot::SnapshotBuilder;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("MeanRev Screener v{}", env!("CARGO_PKG_VERSION"));

    // Yesterday by default, so an intraday run never anchors on a
    // half-finished trading day.
    let target_date = match &config.analysis.target_date {
        Some(raw) => parse_iso_date(raw).context("analysis.target_date is invalid")?,
        None => Local::now().date_naive() - Duration::days(1),
    };

    let floor_date = parse_iso_date(&config.analysis.series_floor_date)
        .context("analysis.series_floor_date is invalid")?;

    // Never resolve an anchor with less margin than a holiday stretch
    // needs, whatever the config says.
    let lookback_days = config
        .analysis
        .calendar_lookback_days
        .max(HOLIDAY_SAFE_LOOKBACK_DAYS);

    let provider = Arc::new(GatewayProvider::from_config(&config.gateway));

    let mut builder = SnapshotBuilder::new(Arc::clone(&provider), floor_date, lookback_days);
    match LocalStorage::open(&LocalStorageConfig::default()) {
        Ok(storage) => {
            builder = builder.with_storage(Arc::new(storage));
        }
        Err(e) => {
            tracing::warn!(error = %e, "Series cache unavailable, fetching everything live");
        }
    }

    let runner = BatchRunner::new(Arc::clone(&provider), builder);
    let outcome = runner
        .run(&config.universe, target_date)
        .await
        .context("Batch analysis failed")?;

    if outcome.snapshots.is_empty() {
        tracing::warn!("No stock analyzed successfully, nothing to export");
        return Ok(());
    }

    let output_dir = config.output_dir();
    let full_path = write_snapshot_csv(
        &output_dir,
        &config.output.file_prefix,
        &outcome.snapshots,
    )?;
    tracing::info!(path = %full_path.display(), rows = outcome.snapshots.len(), "Wrote analysis results");

    let engine = ScreeningEngine::with_reference_rules();
    let results = engine.screen(&outcome.snapshots);

    if results.is_empty() {
        tracing::info!("No stock matched any screening rule");
    } else {
        let rule_ids: Vec<String> = engine.rules().iter().map(|r| r.id.clone()).collect();
        let filtered_path = write_screening_csv(
            &output_dir,
            &config.output.file_prefix,
            &results,
            &rule_ids,
        )?;
        tracing::info!(
            path = %filtered_path.display(),
            rows = results.len(),
            "Wrote screening results"
        );
    }

    Ok(())
}
