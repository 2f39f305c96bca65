//! MeanRev Screener - mean-reversion valuation analytics for A-shares.
//!
//! Pulls trailing P/E / P/B history and analyst growth forecasts for a
//! batch of stocks, computes mean-reversion return projections against
//! 5-year and 10-year windows, and flags candidates against a
//! configurable screening rule set.
//!
//! # Pipeline
//!
//! ```text
//! calendar ──► series ──► window stats ──┐
//!                                        ├──► snapshot ──► screening ──► export
//! analyst reports ──► growth estimate ───┘
//! ```
//!
//! Each stock is processed to completion before the next; per-stock
//! failures are recorded and skipped, never batch-aborting. Sessions
//! with the upstream source are explicit values scoped around each
//! fetch unit.

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod batch;
pub mod calendar;
pub mod data;
pub mod error;
pub mod export;
pub mod growth;
pub mod screening;
pub mod series;
pub mod snapshot;
pub mod stats;

pub use batch::{BatchFailure, BatchOutcome, BatchRunner};
pub use calendar::{TradingCalendar, DEFAULT_LOOKBACK_DAYS, HOLIDAY_SAFE_LOOKBACK_DAYS};
pub use error::{Result, ScreenError};
pub use growth::{GrowthEstimate, GrowthEstimator};
pub use screening::{reference_rules, ScreeningEngine, ScreeningResult, ScreeningRule};
pub use snapshot::{SnapshotBuilder, ValuationSnapshot, SENTINEL_REJECT};
pub use stats::{mean_and_min_in_window, window_lower_bound, Metric, WindowStats};
