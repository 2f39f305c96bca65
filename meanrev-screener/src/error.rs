//! Error taxonomy for the valuation pipeline.
//!
//! Distinguishes "no data" conditions (which stay inside the data model as
//! `None`/NaN sentinels) from hard per-stock failures, which surface here
//! and abort only the affected stock's snapshot construction.

use chrono::NaiveDate;
use thiserror::Error;

use crate::data::ProviderError;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, ScreenError>;

/// Hard failures during snapshot construction.
///
/// Each variant aborts a single stock; the batch loop records it and
/// continues with the next stock.
#[derive(Error, Debug)]
pub enum ScreenError {
    /// No flagged trading day inside the lookback window. The caller
    /// chose too small a margin around a market holiday stretch.
    #[error("no trading day found in the {lookback_days} days up to {date}")]
    NoTradingDayFound { date: NaiveDate, lookback_days: u32 },

    /// The metrics source returned zero rows for the requested range.
    /// Distinct from a series that exists but holds only null values.
    #[error("no metric rows returned for {code} in [{start}, {end}]")]
    EmptySeries {
        code: String,
        start: NaiveDate,
        end: NaiveDate,
    },

    /// The resolved anchor date is absent from the fetched series: the
    /// calendar source and the metrics source disagree about the stock's
    /// trading history. Must surface, never be defaulted away.
    #[error("anchor date {anchor} is not present in the metric series for {code}")]
    AnchorNotInSeries { code: String, anchor: NaiveDate },

    /// The report source returned zero forecast rows for the stock.
    /// A non-empty set that filters down to nothing is NOT this error;
    /// it yields a NaN growth rate instead.
    #[error("no analyst forecast rows for {code}")]
    NoForecastData { code: String },

    /// Bad caller input: malformed date strings, non-6-digit stock codes.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// Transient upstream failure (network, auth, provider internals).
    #[error("upstream provider error: {0}")]
    Upstream(#[from] ProviderError),
}

impl ScreenError {
    /// Whether retrying the same stock later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Upstream(e) => e.is_recoverable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_context() {
        let err = ScreenError::AnchorNotInSeries {
            code: "sh.601888".to_string(),
            anchor: NaiveDate::from_ymd_opt(2025, 6, 13).unwrap(),
        };
        let msg = err.to_string();
        assert!(msg.contains("sh.601888"));
        assert!(msg.contains("2025-06-13"));
    }

    #[test]
    fn test_transient_classification() {
        let net = ScreenError::Upstream(ProviderError::Network("timeout".into()));
        assert!(net.is_transient());

        let malformed = ScreenError::MalformedInput("bad code".into());
        assert!(!malformed.is_transient());

        let empty = ScreenError::NoForecastData {
            code: "601888".into(),
        };
        assert!(!empty.is_transient());
    }
}
