//! Per-stock valuation snapshot: merge and derive.
//!
//! Pulls the valuation side (anchor date, metric history, window
//! statistics) and the forecast side (growth estimate) together into one
//! immutable record, then derives PEG and the mean-reversion return
//! projections.
//!
//! # Sentinels
//!
//! Derived fields mix three states on purpose, mirroring the screening
//! thresholds downstream:
//! - a real number: the projection is defined;
//! - `-10.0`: the projection is meaningless (non-positive growth or
//!   price ratios) and must auto-reject in every `> threshold` rule;
//! - NaN: an input was missing, exported as an empty cell.
//!
//! Percentage-valued fields are stored ×100; all rounding happens once,
//! after the arithmetic, as a pure presentation step.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::calendar::TradingCalendar;
use crate::data::{
    LocalStorage, MarketDataProvider, MetricPoint, StockCode,
};
use crate::error::ScreenError;
use crate::growth::{GrowthEstimate, GrowthEstimator};
use crate::series::fetch_metric_series_cached;
use crate::stats::{in_band, mean_and_min_in_window, Metric, WindowStats};

/// Sentinel marking a projection as meaningless rather than unknown.
pub const SENTINEL_REJECT: f64 = -10.0;

const HORIZON_5Y: i32 = 5;
const HORIZON_10Y: i32 = 10;

// ============================================================================
// Snapshot Record
// ============================================================================

/// The merged per-stock valuation record.
///
/// Created once per stock per analysis run and never mutated afterward;
/// the screening engine consumes it read-only. Field order matches the
/// exported column order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationSnapshot {
    /// Anchor trading date all values are pinned to
    pub anchor_date: NaiveDate,
    /// Exchange-prefixed stock code (wins over the forecast side's bare
    /// code on merge)
    pub code: String,
    /// Stock display name
    pub name: String,
    /// Industry classification, may be empty
    pub industry: String,

    /// 5y/10y mean trailing P/E, anchor included (1 dp)
    pub mean_pe_5y: Option<f64>,
    pub mean_pe_10y: Option<f64>,
    /// 5y/10y minimum trailing P/E, anchor excluded (1 dp)
    pub min_pe_5y: Option<f64>,
    pub min_pe_10y: Option<f64>,
    /// 5y/10y minimum P/B, anchor excluded (2 dp)
    pub min_pb_5y: Option<f64>,
    pub min_pb_10y: Option<f64>,

    /// Trailing P/E at the anchor (1 dp)
    pub current_pe: Option<f64>,
    /// Mean forecast growth as a percentage (2 dp, NaN when unknown)
    pub growth_rate_pct: f64,
    /// P/E-to-growth ratio (1 dp, -10 when growth is non-positive)
    pub peg: f64,
    /// Expected return if P/E reverts to its 5y/10y mean, percent (2 dp)
    pub predict_return_5y_pct: f64,
    pub predict_return_10y_pct: f64,

    /// P/B at the anchor (2 dp)
    pub current_pb: Option<f64>,
    /// 5y/10y mean P/B, anchor included (2 dp)
    pub mean_pb_5y: Option<f64>,
    pub mean_pb_10y: Option<f64>,
    /// Expected move if P/B reverts to its 5y/10y mean, percent (2 dp)
    pub predict_pb_return_5y_pct: f64,
    pub predict_pb_return_10y_pct: f64,

    /// ±15% trough bands around the historical minima (PE 1 dp, PB 2 dp)
    /// and whether the current value sits inside, as 0/1 flags
    pub pe_trough_5y_low: Option<f64>,
    pub pe_trough_5y_high: Option<f64>,
    pub pe_trough_5y_hit: u8,
    pub pe_trough_10y_low: Option<f64>,
    pub pe_trough_10y_high: Option<f64>,
    pub pe_trough_10y_hit: u8,
    pub pb_trough_5y_low: Option<f64>,
    pub pb_trough_5y_high: Option<f64>,
    pub pb_trough_5y_hit: u8,
    pub pb_trough_10y_low: Option<f64>,
    pub pb_trough_10y_high: Option<f64>,
    pub pb_trough_10y_hit: u8,

    /// Audit lines from the growth estimator, never parsed downstream
    pub report_summaries: String,
}

// ============================================================================
// Derivations
// ============================================================================

/// P/E-to-growth ratio.
///
/// `-10` whenever growth is not strictly positive (NaN growth included);
/// NaN when growth qualifies but the current P/E is missing.
pub fn peg(current_pe: Option<f64>, growth: f64) -> f64 {
    if growth.is_nan() || growth <= 0.0 {
        return SENTINEL_REJECT;
    }
    match current_pe {
        Some(pe) => pe / (growth * 100.0),
        None => f64::NAN,
    }
}

/// Expected return if the current P/E reverts to a historical mean,
/// compounded with forecast growth.
///
/// NaN when either P/E is missing; `-10` when either is non-positive
/// (the square root leaves the real domain). Growth is deliberately not
/// clamped, so extreme forecast noise flows through.
pub fn predict_return(mean_pe: Option<f64>, current_pe: Option<f64>, growth: f64) -> f64 {
    let (Some(mean), Some(current)) = (mean_pe, current_pe) else {
        return f64::NAN;
    };
    if mean <= 0.0 || current <= 0.0 {
        return SENTINEL_REJECT;
    }
    (mean / current).sqrt() * (1.0 + growth) - 1.0
}

/// Expected move if the current P/B reverts to a historical mean.
///
/// NaN when either P/B is missing; `-10` when either is non-positive.
pub fn predict_pb_return(mean_pb: Option<f64>, current_pb: Option<f64>) -> f64 {
    let (Some(mean), Some(current)) = (mean_pb, current_pb) else {
        return f64::NAN;
    };
    if mean <= 0.0 || current <= 0.0 {
        return SENTINEL_REJECT;
    }
    mean / current - 1.0
}

/// Round to 1 decimal place. NaN propagates.
pub fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Round to 2 decimal places. NaN propagates.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round1_opt(v: Option<f64>) -> Option<f64> {
    v.map(round1)
}

fn round2_opt(v: Option<f64>) -> Option<f64> {
    v.map(round2)
}

/// Trough band around an already-rounded minimum, with bounds rounded at
/// the metric's own precision, and the 0/1 hit flag evaluated against
/// the rounded bounds.
fn rounded_band(
    min_rounded: Option<f64>,
    current_rounded: Option<f64>,
    round: fn(f64) -> f64,
) -> (Option<f64>, Option<f64>, u8) {
    match min_rounded {
        Some(min) => {
            let low = round(min * crate::stats::TROUGH_LOW_FACTOR);
            let high = round(min * crate::stats::TROUGH_HIGH_FACTOR);
            let hit = u8::from(in_band(current_rounded, Some((low, high))));
            (Some(low), Some(high), hit)
        }
        None => (None, None, 0),
    }
}

// ============================================================================
// Snapshot Builder
// ============================================================================

/// Raw window statistics feeding one snapshot.
struct WindowInputs {
    mean_pe_5y: WindowStats,
    mean_pe_10y: WindowStats,
    min_pe_5y: WindowStats,
    min_pe_10y: WindowStats,
    mean_pb_5y: WindowStats,
    mean_pb_10y: WindowStats,
    min_pb_5y: WindowStats,
    min_pb_10y: WindowStats,
}

/// Builds one `ValuationSnapshot` per stock per run.
pub struct SnapshotBuilder<P> {
    provider: Arc<P>,
    calendar: TradingCalendar<P>,
    growth: GrowthEstimator<P>,
    storage: Option<Arc<LocalStorage>>,
    /// Earliest date metric history is fetched from
    floor_date: NaiveDate,
    /// Calendar lookback for anchor resolution
    lookback_days: u32,
}

impl<P: MarketDataProvider> SnapshotBuilder<P> {
    /// Create a builder over the given provider.
    pub fn new(provider: Arc<P>, floor_date: NaiveDate, lookback_days: u32) -> Self {
        Self {
            calendar: TradingCalendar::new(Arc::clone(&provider)),
            growth: GrowthEstimator::new(Arc::clone(&provider)),
            provider,
            storage: None,
            floor_date,
            lookback_days,
        }
    }

    /// Attach a local series cache.
    pub fn with_storage(mut self, storage: Arc<LocalStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Build the snapshot for one stock, anchored on or before
    /// `target_date`.
    ///
    /// A session is acquired for the whole fetch unit and released
    /// afterward, error or not.
    pub async fn build(
        &self,
        code_input: &str,
        target_date: NaiveDate,
    ) -> Result<ValuationSnapshot, ScreenError> {
        let code = StockCode::parse(code_input)?;

        let session = self.provider.login().await?;
        let result = self.build_with_session(&session, &code, target_date).await;
        self.provider.logout(session).await;
        result
    }

    async fn build_with_session(
        &self,
        session: &crate::data::Session,
        code: &StockCode,
        target_date: NaiveDate,
    ) -> Result<ValuationSnapshot, ScreenError> {
        let anchor = self
            .calendar
            .last_trading_date_on_or_before(session, target_date, self.lookback_days)
            .await?;

        let series = fetch_metric_series_cached(
            self.provider.as_ref(),
            session,
            self.storage.as_deref(),
            &code.prefixed,
            self.floor_date,
            anchor,
        )
        .await?;

        let current = series
            .point_at(anchor)
            .copied()
            .ok_or_else(|| ScreenError::AnchorNotInSeries {
                code: code.prefixed.clone(),
                anchor,
            })?;

        let windows = WindowInputs {
            mean_pe_5y: mean_and_min_in_window(&series, anchor, HORIZON_5Y, Metric::PeTtm, false),
            mean_pe_10y: mean_and_min_in_window(&series, anchor, HORIZON_10Y, Metric::PeTtm, false),
            min_pe_5y: mean_and_min_in_window(&series, anchor, HORIZON_5Y, Metric::PeTtm, true),
            min_pe_10y: mean_and_min_in_window(&series, anchor, HORIZON_10Y, Metric::PeTtm, true),
            mean_pb_5y: mean_and_min_in_window(&series, anchor, HORIZON_5Y, Metric::PbMrq, false),
            mean_pb_10y: mean_and_min_in_window(&series, anchor, HORIZON_10Y, Metric::PbMrq, false),
            min_pb_5y: mean_and_min_in_window(&series, anchor, HORIZON_5Y, Metric::PbMrq, true),
            min_pb_10y: mean_and_min_in_window(&series, anchor, HORIZON_10Y, Metric::PbMrq, true),
        };

        let growth = self.growth.estimate(session, code).await?;

        debug!(
            code = %code.prefixed,
            anchor = %anchor,
            points = series.len(),
            "Assembling valuation snapshot"
        );

        Ok(assemble(code, anchor, &current, &windows, growth))
    }
}

/// Merge the valuation and forecast sides and derive the projections.
///
/// The valuation side's exchange-prefixed code wins over the forecast
/// side's bare code on the key collision.
fn assemble(
    code: &StockCode,
    anchor: NaiveDate,
    current: &MetricPoint,
    windows: &WindowInputs,
    growth: GrowthEstimate,
) -> ValuationSnapshot {
    let g = growth.mean_growth_rate;

    // Raw derivations first; rounding is presentation-only below.
    let peg_raw = peg(current.pe_ttm, g);
    let ret_5y = predict_return(windows.mean_pe_5y.mean, current.pe_ttm, g);
    let ret_10y = predict_return(windows.mean_pe_10y.mean, current.pe_ttm, g);
    let pb_ret_5y = predict_pb_return(windows.mean_pb_5y.mean, current.pb_mrq);
    let pb_ret_10y = predict_pb_return(windows.mean_pb_10y.mean, current.pb_mrq);

    let current_pe = round1_opt(current.pe_ttm);
    let current_pb = round2_opt(current.pb_mrq);
    let min_pe_5y = round1_opt(windows.min_pe_5y.min);
    let min_pe_10y = round1_opt(windows.min_pe_10y.min);
    let min_pb_5y = round2_opt(windows.min_pb_5y.min);
    let min_pb_10y = round2_opt(windows.min_pb_10y.min);

    let (pe_trough_5y_low, pe_trough_5y_high, pe_trough_5y_hit) =
        rounded_band(min_pe_5y, current_pe, round1);
    let (pe_trough_10y_low, pe_trough_10y_high, pe_trough_10y_hit) =
        rounded_band(min_pe_10y, current_pe, round1);
    let (pb_trough_5y_low, pb_trough_5y_high, pb_trough_5y_hit) =
        rounded_band(min_pb_5y, current_pb, round2);
    let (pb_trough_10y_low, pb_trough_10y_high, pb_trough_10y_hit) =
        rounded_band(min_pb_10y, current_pb, round2);

    ValuationSnapshot {
        anchor_date: anchor,
        code: code.prefixed.clone(),
        name: growth.stock_name,
        industry: growth.industry,

        mean_pe_5y: round1_opt(windows.mean_pe_5y.mean),
        mean_pe_10y: round1_opt(windows.mean_pe_10y.mean),
        min_pe_5y,
        min_pe_10y,
        min_pb_5y,
        min_pb_10y,

        current_pe,
        growth_rate_pct: round2(g * 100.0),
        peg: round1(peg_raw),
        predict_return_5y_pct: round2(ret_5y * 100.0),
        predict_return_10y_pct: round2(ret_10y * 100.0),

        current_pb,
        mean_pb_5y: round2_opt(windows.mean_pb_5y.mean),
        mean_pb_10y: round2_opt(windows.mean_pb_10y.mean),
        predict_pb_return_5y_pct: round2(pb_ret_5y * 100.0),
        predict_pb_return_10y_pct: round2(pb_ret_10y * 100.0),

        pe_trough_5y_low,
        pe_trough_5y_high,
        pe_trough_5y_hit,
        pe_trough_10y_low,
        pe_trough_10y_high,
        pe_trough_10y_hit,
        pb_trough_5y_low,
        pb_trough_5y_high,
        pb_trough_5y_hit,
        pb_trough_10y_low,
        pb_trough_10y_high,
        pb_trough_10y_hit,

        report_summaries: growth.report_summaries,
    }
}

// ============================================================================
// Tests
// ============================================================================
