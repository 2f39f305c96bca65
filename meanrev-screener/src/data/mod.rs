//! Data layer for the valuation pipeline.
//!
//! Upstream rows arrive as loosely-typed text from the quote gateway; this
//! module fixes their shapes into record types at the ingestion boundary.
//! Numeric text survives as raw strings until series normalization, where
//! coercion failures deliberately become nulls instead of errors.

mod gateway;
mod provider;
pub mod local_storage;

pub use gateway::GatewayProvider;
pub use local_storage::{LocalStorage, LocalStorageConfig, LocalStorageStats};
pub use provider::{MarketDataProvider, ProviderError, Session};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ScreenError;

// ============================================================================
// Wire Row Types
// ============================================================================

/// One calendar entry from the trade-date source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeDateRow {
    /// Calendar date
    pub date: NaiveDate,
    /// Whether the exchange was open on this date
    pub is_trading_day: bool,
}

/// One daily metrics row as delivered by the source.
///
/// `pe_ttm`/`pb_mrq` stay as raw text here; the series layer coerces them
/// and maps unparseable values to null (dirty-upstream tolerance policy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRow {
    /// Trading date
    pub date: NaiveDate,
    /// Trailing-twelve-month price-to-earnings, raw text
    pub pe_ttm: String,
    /// Most-recent-quarter price-to-book, raw text
    pub pb_mrq: String,
}

/// One analyst forecast report row.
///
/// Forward P/E estimates stay as raw text; the growth estimator coerces
/// them and drops rows missing any of the three values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastRow {
    /// Publishing institution
    pub institution: String,
    /// Stock display name as reported
    pub stock_name: String,
    /// Report publication date
    pub report_date: NaiveDate,
    /// Forecast P/E for fiscal 2025, raw text
    pub pe_2025: String,
    /// Forecast P/E for fiscal 2026, raw text
    pub pe_2026: String,
    /// Forecast P/E for fiscal 2027, raw text
    pub pe_2027: String,
    /// Link to the report PDF
    pub pdf_link: String,
}

/// One index constituent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstituentRow {
    /// Stock code (exchange-prefixed or bare, source-dependent)
    pub code: String,
    /// Stock display name
    pub name: String,
}

/// Basic profile for a stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockProfile {
    /// Bare 6-digit code
    pub code: String,
    /// Stock display name
    pub name: String,
    /// Industry classification
    pub industry: String,
}

// ============================================================================
// Metric Series
// ============================================================================

/// One normalized valuation observation for one stock on one trading date.
///
/// Null means the source had no parseable value for that day, which is
/// normal for loss-making periods (negative earnings publish as blanks).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    /// Trading date
    pub date: NaiveDate,
    /// Trailing-twelve-month price-to-earnings
    pub pe_ttm: Option<f64>,
    /// Most-recent-quarter price-to-book
    pub pb_mrq: Option<f64>,
}

/// Ordered valuation history for one stock over `[start, end]`.
///
/// Dates are strictly increasing and unique. Immutable after
/// construction; may be re-derived from the local cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSeries {
    /// Exchange-prefixed stock code
    pub code: String,
    /// Requested range start
    pub start: NaiveDate,
    /// Requested range end
    pub end: NaiveDate,
    points: Vec<MetricPoint>,
}

impl MetricSeries {
    /// Build a series from normalized points.
    ///
    /// Points are sorted ascending by date; duplicate dates keep the
    /// first occurrence (the source contract is one row per date, so
    /// duplicates indicate upstream noise rather than real data).
    pub fn new(
        code: impl Into<String>,
        start: NaiveDate,
        end: NaiveDate,
        mut points: Vec<MetricPoint>,
    ) -> Self {
        points.sort_by_key(|p| p.date);
        points.dedup_by_key(|p| p.date);
        Self {
            code: code.into(),
            start,
            end,
            points,
        }
    }

    /// Number of points in the series.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the series holds no points at all.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The point recorded for an exact date, if any.
    pub fn point_at(&self, date: NaiveDate) -> Option<&MetricPoint> {
        self.points
            .binary_search_by_key(&date, |p| p.date)
            .ok()
            .map(|idx| &self.points[idx])
    }

    /// Iterate the points in date order.
    pub fn iter(&self) -> impl Iterator<Item = &MetricPoint> {
        self.points.iter()
    }
}

// ============================================================================
// Stock Code Normalization
// ============================================================================

/// A validated A-share stock code in both forms the sources expect.
///
/// The metrics source addresses stocks with an exchange prefix
/// (`sh.601888`), the report source with the bare 6-digit code (`601888`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockCode {
    /// Exchange-prefixed form, e.g. "sh.601888"
    pub prefixed: String,
    /// Bare 6-digit form, e.g. "601888"
    pub bare: String,
}

impl StockCode {
    /// Normalize caller input into both code forms.
    ///
    /// Accepts a bare 6-digit code (prefix derived from the leading
    /// digits) or an already-prefixed `sh.`/`sz.` code. Anything else is
    /// malformed input.
    pub fn parse(input: &str) -> Result<Self, ScreenError> {
        let input = input.trim();

        if is_six_digits(input) {
            return Ok(Self {
                prefixed: format!("{}.{}", exchange_prefix(input), input),
                bare: input.to_string(),
            });
        }

        if let Some((prefix, bare)) = input.split_once('.') {
            if matches!(prefix, "sh" | "sz") && is_six_digits(bare) {
                return Ok(Self {
                    prefixed: input.to_string(),
                    bare: bare.to_string(),
                });
            }
        }

        Err(ScreenError::MalformedInput(format!(
            "stock code must be 6 digits or sh./sz.-prefixed: {input:?}"
        )))
    }
}

impl std::fmt::Display for StockCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.prefixed)
    }
}

fn is_six_digits(s: &str) -> bool {
    s.len() == 6 && s.bytes().all(|b| b.is_ascii_digit())
}

/// Exchange prefix by leading digits:
/// 60 = Shanghai main board, 68 = STAR market (sh);
/// 00 = Shenzhen main board, 30 = ChiNext (sz); anything else defaults to sz.
fn exchange_prefix(bare: &str) -> &'static str {
    if bare.starts_with("60") || bare.starts_with("68") {
        "sh"
    } else {
        "sz"
    }
}

/// Parse an ISO `YYYY-MM-DD` date string, surfacing malformed input.
pub fn parse_iso_date(s: &str) -> Result<NaiveDate, ScreenError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| ScreenError::MalformedInput(format!("expected YYYY-MM-DD date: {s:?}")))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_code_gets_exchange_prefix() {
        let code = StockCode::parse("601888").unwrap();
        assert_eq!(code.prefixed, "sh.601888");
        assert_eq!(code.bare, "601888");

        let star = StockCode::parse("688981").unwrap();
        assert_eq!(star.prefixed, "sh.688981");

        let sz = StockCode::parse("000048").unwrap();
        assert_eq!(sz.prefixed, "sz.000048");

        let chinext = StockCode::parse("300750").unwrap();
        assert_eq!(chinext.prefixed, "sz.300750");

        // Unknown leading digits default to Shenzhen
        let other = StockCode::parse("920001").unwrap();
        assert_eq!(other.prefixed, "sz.920001");
    }

    #[test]
    fn test_prefixed_code_passes_through() {
        let code = StockCode::parse("sh.601888").unwrap();
        assert_eq!(code.prefixed, "sh.601888");
        assert_eq!(code.bare, "601888");

        let code = StockCode::parse(" sz.000001 ").unwrap();
        assert_eq!(code.prefixed, "sz.000001");
    }

    #[test]
    fn test_malformed_codes_rejected() {
        assert!(StockCode::parse("12345").is_err());
        assert!(StockCode::parse("1234567").is_err());
        assert!(StockCode::parse("60188a").is_err());
        assert!(StockCode::parse("bj.601888").is_err());
        assert!(StockCode::parse("sh.1234").is_err());
        assert!(StockCode::parse("").is_err());
    }

    #[test]
    fn test_series_sorts_and_dedups() {
        let d = |day| NaiveDate::from_ymd_opt(2025, 6, day).unwrap();
        let series = MetricSeries::new(
            "sh.601888",
            d(1),
            d(5),
            vec![
                MetricPoint { date: d(3), pe_ttm: Some(11.0), pb_mrq: None },
                MetricPoint { date: d(1), pe_ttm: Some(10.0), pb_mrq: Some(1.5) },
                MetricPoint { date: d(3), pe_ttm: Some(99.0), pb_mrq: None },
            ],
        );

        assert_eq!(series.len(), 2);
        let dates: Vec<_> = series.iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![d(1), d(3)]);
        // First occurrence wins on duplicate dates
        assert_eq!(series.point_at(d(3)).unwrap().pe_ttm, Some(11.0));
    }

    #[test]
    fn test_series_point_lookup() {
        let d = |day| NaiveDate::from_ymd_opt(2025, 6, day).unwrap();
        let series = MetricSeries::new(
            "sz.000048",
            d(1),
            d(5),
            vec![MetricPoint { date: d(2), pe_ttm: None, pb_mrq: Some(2.1) }],
        );

        assert!(series.point_at(d(2)).is_some());
        assert!(series.point_at(d(4)).is_none());
    }

    #[test]
    fn test_parse_iso_date() {
        assert_eq!(
            parse_iso_date("2025-06-13").unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 13).unwrap()
        );
        assert!(parse_iso_date("2025/06/13").is_err());
        assert!(parse_iso_date("not a date").is_err());
    }
}
