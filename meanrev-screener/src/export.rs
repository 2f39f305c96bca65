//! CSV export of snapshot and screening results.
//!
//! One row per stock with the snapshot's full column set, written under
//! a timestamped filename. Missing statistics and NaN sentinels export
//! as empty cells; the `-10`-derived values export as numbers so the
//! files replay cleanly through the screening thresholds.

use anyhow::{Context, Result};
use chrono::Local;
use std::path::{Path, PathBuf};

use crate::screening::ScreeningResult;
use crate::snapshot::ValuationSnapshot;

/// Column headers for snapshot exports, in output order.
pub const SNAPSHOT_HEADERS: &[&str] = &[
    "anchor_date",
    "code",
    "name",
    "industry",
    "mean_pe_5y",
    "mean_pe_10y",
    "min_pe_5y",
    "min_pe_10y",
    "min_pb_5y",
    "min_pb_10y",
    "current_pe",
    "growth_rate_pct",
    "peg",
    "predict_return_5y_pct",
    "predict_return_10y_pct",
    "current_pb",
    "mean_pb_5y",
    "mean_pb_10y",
    "predict_pb_return_5y_pct",
    "predict_pb_return_10y_pct",
    "pe_trough_5y_low",
    "pe_trough_5y_high",
    "pe_trough_5y_hit",
    "pe_trough_10y_low",
    "pe_trough_10y_high",
    "pe_trough_10y_hit",
    "pb_trough_5y_low",
    "pb_trough_5y_high",
    "pb_trough_5y_hit",
    "pb_trough_10y_low",
    "pb_trough_10y_high",
    "pb_trough_10y_hit",
    "report_summaries",
];

/// Write all snapshots to `{dir}/{prefix}_{timestamp}.csv`.
pub fn write_snapshot_csv(
    dir: &Path,
    prefix: &str,
    snapshots: &[ValuationSnapshot],
) -> Result<PathBuf> {
    let path = timestamped_path(dir, prefix, "");
    write_snapshot_csv_to(&path, snapshots)?;
    Ok(path)
}

/// Write snapshots to an exact path.
pub fn write_snapshot_csv_to(path: &Path, snapshots: &[ValuationSnapshot]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    writer.write_record(SNAPSHOT_HEADERS)?;
    for snapshot in snapshots {
        writer.write_record(snapshot_record(snapshot))?;
    }

    writer.flush().context("Failed to flush snapshot csv")?;
    Ok(())
}

/// Write screening results to `{dir}/{prefix}_filtered_{timestamp}.csv`.
///
/// The snapshot columns are followed by one column per rule id holding
/// "1" when the rule matched and an empty cell otherwise. Only flagged
/// rows appear (the engine already dropped non-matching snapshots).
pub fn write_screening_csv(
    dir: &Path,
    prefix: &str,
    results: &[ScreeningResult],
    rule_ids: &[String],
) -> Result<PathBuf> {
    let path = timestamped_path(dir, prefix, "_filtered");
    write_screening_csv_to(&path, results, rule_ids)?;
    Ok(path)
}

/// Write screening results to an exact path.
pub fn write_screening_csv_to(
    path: &Path,
    results: &[ScreeningResult],
    rule_ids: &[String],
) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    let mut headers: Vec<String> = SNAPSHOT_HEADERS.iter().map(|h| h.to_string()).collect();
    headers.extend(rule_ids.iter().cloned());
    writer.write_record(&headers)?;

    for result in results {
        let mut record = snapshot_record(&result.snapshot);
        for rule_id in rule_ids {
            record.push(if result.matches(rule_id) {
                "1".to_string()
            } else {
                String::new()
            });
        }
        writer.write_record(&record)?;
    }

    writer.flush().context("Failed to flush screening csv")?;
    Ok(())
}

fn timestamped_path(dir: &Path, prefix: &str, suffix: &str) -> PathBuf {
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("{prefix}{suffix}_{timestamp}.csv"))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output dir {}", parent.display()))?;
    }
    Ok(())
}

fn snapshot_record(s: &ValuationSnapshot) -> Vec<String> {
    vec![
        s.anchor_date.format("%Y-%m-%d").to_string(),
        s.code.clone(),
        s.name.clone(),
        s.industry.clone(),
        fmt_opt(s.mean_pe_5y),
        fmt_opt(s.mean_pe_10y),
        fmt_opt(s.min_pe_5y),
        fmt_opt(s.min_pe_10y),
        fmt_opt(s.min_pb_5y),
        fmt_opt(s.min_pb_10y),
        fmt_opt(s.current_pe),
        fmt_num(s.growth_rate_pct),
        fmt_num(s.peg),
        fmt_num(s.predict_return_5y_pct),
        fmt_num(s.predict_return_10y_pct),
        fmt_opt(s.current_pb),
        fmt_opt(s.mean_pb_5y),
        fmt_opt(s.mean_pb_10y),
        fmt_num(s.predict_pb_return_5y_pct),
        fmt_num(s.predict_pb_return_10y_pct),
        fmt_opt(s.pe_trough_5y_low),
        fmt_opt(s.pe_trough_5y_high),
        s.pe_trough_5y_hit.to_string(),
        fmt_opt(s.pe_trough_10y_low),
        fmt_opt(s.pe_trough_10y_high),
        s.pe_trough_10y_hit.to_string(),
        fmt_opt(s.pb_trough_5y_low),
        fmt_opt(s.pb_trough_5y_high),
        s.pb_trough_5y_hit.to_string(),
        fmt_opt(s.pb_trough_10y_low),
        fmt_opt(s.pb_trough_10y_high),
        s.pb_trough_10y_hit.to_string(),
        s.report_summaries.clone(),
    ]
}

/// NaN exports as an empty cell; real numbers (sentinels included) as-is.
fn fmt_num(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else {
        v.to_string()
    }
}

fn fmt_opt(v: Option<f64>) -> String {
    v.map(fmt_num).unwrap_or_default()
}

// ============================================================================
// Tests
// ============================================================================
