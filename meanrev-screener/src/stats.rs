//! Trailing-window statistics over a metric series.
//!
//! Windows are anchored to a reference trading date and reach back a
//! whole number of calendar years. Aggregation runs over non-null values
//! only; a window with no valid samples yields null statistics, never an
//! error. The same code path serves the 5-year and 10-year horizons.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::data::{MetricPoint, MetricSeries};

/// Lower factor of the trough band around a historical minimum.
pub const TROUGH_LOW_FACTOR: f64 = 0.85;
/// Upper factor of the trough band around a historical minimum.
pub const TROUGH_HIGH_FACTOR: f64 = 1.15;

/// Which valuation metric a window statistic aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    /// Trailing-twelve-month price-to-earnings
    PeTtm,
    /// Most-recent-quarter price-to-book
    PbMrq,
}

impl Metric {
    /// Extract this metric's value from a point.
    pub fn value(&self, point: &MetricPoint) -> Option<f64> {
        match self {
            Self::PeTtm => point.pe_ttm,
            Self::PbMrq => point.pb_mrq,
        }
    }
}

/// Statistics over one trailing window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    /// Arithmetic mean of the non-null samples, null when none exist
    pub mean: Option<f64>,
    /// Minimum of the non-null samples, null when none exist
    pub min: Option<f64>,
    /// Number of non-null samples aggregated
    pub count: usize,
}

impl WindowStats {
    /// The empty window.
    pub const EMPTY: Self = Self {
        mean: None,
        min: None,
        count: 0,
    };
}

/// Shift an anchor date back a whole number of calendar years.
///
/// A Feb-29 anchor whose target year is not a leap year clamps to
/// Feb-28 instead of failing.
pub fn window_lower_bound(anchor: NaiveDate, years: i32) -> NaiveDate {
    let year = anchor.year() - years;
    NaiveDate::from_ymd_opt(year, anchor.month(), anchor.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, anchor.month(), 28))
        .expect("clamped day-of-month is valid for every month")
}

/// Mean and minimum of a metric over `[anchor - years, anchor]` inclusive.
///
/// With `exclude_anchor` set, the anchor's own point is removed before
/// aggregation, so a current value cannot self-satisfy a "near its own
/// historical low" test.
pub fn mean_and_min_in_window(
    series: &MetricSeries,
    anchor: NaiveDate,
    years: i32,
    metric: Metric,
    exclude_anchor: bool,
) -> WindowStats {
    let lower = window_lower_bound(anchor, years);

    let mut sum = 0.0;
    let mut count = 0usize;
    let mut min: Option<f64> = None;

    for point in series.iter() {
        if point.date < lower || point.date > anchor {
            continue;
        }
        if exclude_anchor && point.date == anchor {
            continue;
        }
        let Some(value) = metric.value(point) else {
            continue;
        };

        sum += value;
        count += 1;
        min = Some(match min {
            Some(current) if current <= value => current,
            _ => value,
        });
    }

    if count == 0 {
        return WindowStats::EMPTY;
    }

    WindowStats {
        mean: Some(sum / count as f64),
        min,
        count,
    }
}

/// The ±15% band around a historical minimum, or null without one.
pub fn trough_band(min: Option<f64>) -> Option<(f64, f64)> {
    min.map(|m| (m * TROUGH_LOW_FACTOR, m * TROUGH_HIGH_FACTOR))
}

/// Whether a current value sits inside a trough band, bounds inclusive.
///
/// A missing band or missing current value is non-qualifying, never an
/// error.
pub fn in_band(current: Option<f64>, band: Option<(f64, f64)>) -> bool {
    match (current, band) {
        (Some(value), Some((low, high))) => value >= low && value <= high,
        _ => false,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn series(points: Vec<MetricPoint>) -> MetricSeries {
        let start = points.first().map(|p| p.date).unwrap_or(date(2020, 1, 1));
        let end = points.last().map(|p| p.date).unwrap_or(date(2021, 1, 1));
        MetricSeries::new("sh.601888", start, end, points)
    }

    fn pe_point(d: NaiveDate, pe: Option<f64>) -> MetricPoint {
        MetricPoint {
            date: d,
            pe_ttm: pe,
            pb_mrq: None,
        }
    }

    #[test]
    fn test_lower_bound_plain_year_shift() {
        assert_eq!(
            window_lower_bound(date(2025, 6, 13), 5),
            date(2020, 6, 13)
        );
        assert_eq!(
            window_lower_bound(date(2025, 6, 13), 10),
            date(2015, 6, 13)
        );
    }

    #[test]
    fn test_lower_bound_feb29_clamps_to_28() {
        // 2024-02-29 minus 5 years lands in 2019, not a leap year
        assert_eq!(
            window_lower_bound(date(2024, 2, 29), 5),
            date(2019, 2, 28)
        );
        // Minus 4 years lands in 2020, a leap year: no clamping
        assert_eq!(
            window_lower_bound(date(2024, 2, 29), 4),
            date(2020, 2, 29)
        );
    }

    #[test]
    fn test_mean_skips_nulls() {
        // Series [(2020-01-01, 10), (2020-06-01, null), (2021-01-01, 20)]
        // over 2020-01-01..2021-01-01: mean 15.0, count 2
        let s = series(vec![
            pe_point(date(2020, 1, 1), Some(10.0)),
            pe_point(date(2020, 6, 1), None),
            pe_point(date(2021, 1, 1), Some(20.0)),
        ]);

        let stats = mean_and_min_in_window(&s, date(2021, 1, 1), 1, Metric::PeTtm, false);
        assert_eq!(stats.mean, Some(15.0));
        assert_eq!(stats.min, Some(10.0));
        assert_eq!(stats.count, 2);
    }

    #[test]
    fn test_all_null_window_is_empty_not_error() {
        let s = series(vec![
            pe_point(date(2020, 1, 1), None),
            pe_point(date(2020, 6, 1), None),
        ]);

        let stats = mean_and_min_in_window(&s, date(2020, 6, 1), 1, Metric::PeTtm, false);
        assert_eq!(stats, WindowStats::EMPTY);
    }

    #[test]
    fn test_exclude_anchor_removes_anchor_point() {
        let s = series(vec![
            pe_point(date(2020, 1, 1), Some(12.0)),
            pe_point(date(2020, 6, 1), Some(15.0)),
            pe_point(date(2021, 1, 1), Some(8.0)), // anchor: the all-time low
        ]);

        let with_anchor =
            mean_and_min_in_window(&s, date(2021, 1, 1), 1, Metric::PeTtm, false);
        assert_eq!(with_anchor.min, Some(8.0));
        assert_eq!(with_anchor.count, 3);

        let without_anchor =
            mean_and_min_in_window(&s, date(2021, 1, 1), 1, Metric::PeTtm, true);
        assert_eq!(without_anchor.min, Some(12.0));
        assert_eq!(without_anchor.count, 2);
    }

    #[test]
    fn test_window_bounds_inclusive() {
        let s = series(vec![
            pe_point(date(2019, 12, 31), Some(100.0)), // just outside
            pe_point(date(2020, 1, 1), Some(10.0)),    // lower bound
            pe_point(date(2021, 1, 1), Some(20.0)),    // anchor
        ]);

        let stats = mean_and_min_in_window(&s, date(2021, 1, 1), 1, Metric::PeTtm, false);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean, Some(15.0));
    }

    #[test]
    fn test_pb_metric_uses_pb_column() {
        let s = series(vec![MetricPoint {
            date: date(2020, 6, 1),
            pe_ttm: Some(10.0),
            pb_mrq: Some(2.0),
        }]);

        let stats = mean_and_min_in_window(&s, date(2020, 6, 1), 1, Metric::PbMrq, false);
        assert_eq!(stats.mean, Some(2.0));
    }

    #[test]
    fn test_trough_band_bounds() {
        let band = trough_band(Some(10.0)).unwrap();
        assert!((band.0 - 8.5).abs() < 1e-9);
        assert!((band.1 - 11.5).abs() < 1e-9);
        assert!(trough_band(None).is_none());
    }

    #[test]
    fn test_in_band_inclusive_edges() {
        let band = trough_band(Some(10.0));
        assert!(in_band(Some(8.5), band));
        assert!(in_band(Some(11.5), band));
        assert!(in_band(Some(10.0), band));
        assert!(!in_band(Some(8.49), band));
        assert!(!in_band(Some(11.51), band));
    }

    #[test]
    fn test_in_band_null_inputs_non_qualifying() {
        assert!(!in_band(None, trough_band(Some(10.0))));
        assert!(!in_band(Some(10.0), trough_band(None)));
        assert!(!in_band(None, None));
    }
}
