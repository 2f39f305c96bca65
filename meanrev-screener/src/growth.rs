//! Forward earnings-growth estimation from analyst forecast reports.
//!
//! Uses only the most recent coverage round: reports are sorted newest
//! first and cut at the first gap of more than 30 days, which discards
//! stale forecasts from earlier rounds. The per-report growth proxy is
//! the implied annual earnings growth between the 2025 and 2027 forecast
//! P/Es, `sqrt(pe_2025 / pe_2027) - 1`.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::data::{ForecastRow, MarketDataProvider, Session, StockCode};
use crate::error::ScreenError;
use crate::series::coerce_metric;

/// Reports further apart than this belong to different coverage rounds.
pub const FORECAST_CYCLE_MAX_GAP_DAYS: i64 = 30;

/// Growth estimate for one stock.
#[derive(Debug, Clone)]
pub struct GrowthEstimate {
    /// Bare 6-digit stock code
    pub code: String,
    /// Stock display name as reported
    pub stock_name: String,
    /// Industry classification, empty when the profile lookup failed
    pub industry: String,
    /// Mean per-report growth, NaN when no report produced a valid value
    pub mean_growth_rate: f64,
    /// One audit line per retained report; never parsed downstream
    pub report_summaries: String,
}

/// A retained report with its parsed forecasts and growth proxy.
struct ParsedReport {
    row: ForecastRow,
    pe_2025: f64,
    pe_2026: f64,
    pe_2027: f64,
    growth: f64,
}

/// Analyst-forecast growth estimator.
pub struct GrowthEstimator<P> {
    provider: Arc<P>,
}

impl<P: MarketDataProvider> GrowthEstimator<P> {
    /// Create an estimator over the given provider.
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    /// Estimate forward growth for one stock.
    ///
    /// Fails with `NoForecastData` only when the source has zero rows at
    /// all; a coverage round that filters down to nothing reports a NaN
    /// mean instead.
    pub async fn estimate(
        &self,
        session: &Session,
        code: &StockCode,
    ) -> Result<GrowthEstimate, ScreenError> {
        let mut rows = self
            .provider
            .query_analyst_reports(session, &code.bare)
            .await?;

        if rows.is_empty() {
            return Err(ScreenError::NoForecastData {
                code: code.bare.clone(),
            });
        }

        rows.sort_by(|a, b| b.report_date.cmp(&a.report_date));
        let fallback_name = rows[0].stock_name.clone();

        let cycle = current_cycle(&rows);
        let parsed = parse_reports(cycle);

        let mean_growth_rate = mean_growth(&parsed);
        if mean_growth_rate.is_nan() {
            debug!(code = %code.bare, reports = cycle.len(), "No valid growth value in current cycle");
        }

        let stock_name = parsed
            .first()
            .map(|r| r.row.stock_name.clone())
            .unwrap_or(fallback_name);

        let industry = match self.provider.query_stock_profile(session, &code.bare).await {
            Ok(profile) => profile.industry,
            Err(e) => {
                // Industry is cosmetic; a failed lookup must not abort
                // the estimation.
                warn!(code = %code.bare, error = %e, "Stock profile lookup failed");
                String::new()
            }
        };

        Ok(GrowthEstimate {
            code: code.bare.clone(),
            stock_name,
            industry,
            mean_growth_rate,
            report_summaries: summarize_reports(&parsed),
        })
    }
}

/// The newest coverage round: the prefix of the descending-sorted rows
/// before the first gap wider than `FORECAST_CYCLE_MAX_GAP_DAYS`.
fn current_cycle(sorted_desc: &[ForecastRow]) -> &[ForecastRow] {
    for i in 1..sorted_desc.len() {
        let gap = sorted_desc[i - 1].report_date - sorted_desc[i].report_date;
        if gap.num_days() > FORECAST_CYCLE_MAX_GAP_DAYS {
            return &sorted_desc[..i];
        }
    }
    sorted_desc
}

/// Parse forecast P/Es and compute the per-report growth proxy, dropping
/// any report missing one of the three values.
fn parse_reports(rows: &[ForecastRow]) -> Vec<ParsedReport> {
    rows.iter()
        .filter_map(|row| {
            let pe_2025 = coerce_metric(&row.pe_2025)?;
            let pe_2026 = coerce_metric(&row.pe_2026)?;
            let pe_2027 = coerce_metric(&row.pe_2027)?;
            Some(ParsedReport {
                row: row.clone(),
                pe_2025,
                pe_2026,
                pe_2027,
                growth: growth_proxy(pe_2025, pe_2027),
            })
        })
        .collect()
}

/// Implied annual earnings growth between the 2025 and 2027 forecasts.
///
/// Defined only for strictly positive P/Es on both ends; a negative or
/// zero P/E makes the square root meaningless in the real domain, so the
/// report contributes NaN and drops out of the mean.
fn growth_proxy(pe_2025: f64, pe_2027: f64) -> f64 {
    if pe_2025 > 0.0 && pe_2027 > 0.0 {
        (pe_2025 / pe_2027).sqrt() - 1.0
    } else {
        f64::NAN
    }
}

/// Arithmetic mean of the finite per-report growth values; NaN when none.
fn mean_growth(reports: &[ParsedReport]) -> f64 {
    let valid: Vec<f64> = reports
        .iter()
        .map(|r| r.growth)
        .filter(|g| g.is_finite())
        .collect();

    if valid.is_empty() {
        f64::NAN
    } else {
        valid.iter().sum::<f64>() / valid.len() as f64
    }
}

/// Human-readable audit lines, one per retained report.
fn summarize_reports(reports: &[ParsedReport]) -> String {
    reports
        .iter()
        .map(|r| {
            format!(
                "{}  {}  {}  {}  {}  {}  {}",
                r.row.institution,
                r.row.report_date.format("%Y-%m-%d"),
                r.pe_2025,
                r.pe_2026,
                r.pe_2027,
                r.growth,
                r.row.pdf_link,
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{
        ConstituentRow, MetricRow, ProviderError, StockProfile, TradeDateRow,
    };
    use async_trait::async_trait;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn report(d: NaiveDate, pe_2025: &str, pe_2026: &str, pe_2027: &str) -> ForecastRow {
        ForecastRow {
            institution: "中金公司".to_string(),
            stock_name: "中国中免".to_string(),
            report_date: d,
            pe_2025: pe_2025.to_string(),
            pe_2026: pe_2026.to_string(),
            pe_2027: pe_2027.to_string(),
            pdf_link: "https://example.com/report.pdf".to_string(),
        }
    }

    struct ReportsStub {
        rows: Vec<ForecastRow>,
        profile: Option<StockProfile>,
    }

    #[async_trait]
    impl MarketDataProvider for ReportsStub {
        fn name(&self) -> &'static str {
            "stub"
        }

        async fn login(&self) -> Result<Session, ProviderError> {
            Ok(Session::new("stub-session"))
        }

        async fn logout(&self, _session: Session) {}

        async fn query_trade_dates(
            &self,
            _session: &Session,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<TradeDateRow>, ProviderError> {
            Ok(vec![])
        }

        async fn query_daily_metrics(
            &self,
            _session: &Session,
            _prefixed_code: &str,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Vec<MetricRow>, ProviderError> {
            Ok(vec![])
        }

        async fn query_analyst_reports(
            &self,
            _session: &Session,
            _bare_code: &str,
        ) -> Result<Vec<ForecastRow>, ProviderError> {
            Ok(self.rows.clone())
        }

        async fn query_index_constituents(
            &self,
            _session: &Session,
            _index_id: &str,
        ) -> Result<Vec<ConstituentRow>, ProviderError> {
            Ok(vec![])
        }

        async fn query_stock_profile(
            &self,
            _session: &Session,
            bare_code: &str,
        ) -> Result<StockProfile, ProviderError> {
            self.profile
                .clone()
                .ok_or_else(|| ProviderError::DataNotAvailable(format!("no profile for {bare_code}")))
        }
    }

    async fn estimate_with(
        rows: Vec<ForecastRow>,
        profile: Option<StockProfile>,
    ) -> Result<GrowthEstimate, ScreenError> {
        let estimator = GrowthEstimator::new(Arc::new(ReportsStub { rows, profile }));
        let session = Session::new("s");
        let code = StockCode::parse("601888").unwrap();
        estimator.estimate(&session, &code).await
    }

    #[test]
    fn test_growth_proxy_values() {
        // sqrt(10/20) - 1 ≈ -0.2929
        let g = growth_proxy(10.0, 20.0);
        assert!((g - (-0.29289321881345254)).abs() < 1e-12);

        // Negative P/E on either side is undefined
        assert!(growth_proxy(-5.0, 20.0).is_nan());
        assert!(growth_proxy(10.0, -20.0).is_nan());
        assert!(growth_proxy(0.0, 20.0).is_nan());
    }

    #[test]
    fn test_cycle_cut_at_first_wide_gap() {
        // Dates sorted desc: gap between 2025-01-15 and 2024-06-01 is
        // far beyond 30 days, so only the first two rows remain.
        let rows = vec![
            report(date(2025, 1, 15), "10", "11", "12"),
            report(date(2025, 1, 1), "10", "11", "12"),
            report(date(2024, 6, 1), "10", "11", "12"),
        ];
        let mut sorted = rows.clone();
        sorted.sort_by(|a, b| b.report_date.cmp(&a.report_date));

        let cycle = current_cycle(&sorted);
        assert_eq!(cycle.len(), 2);
        assert_eq!(cycle[1].report_date, date(2025, 1, 1));
    }

    #[test]
    fn test_cycle_keeps_all_without_wide_gap() {
        let rows = vec![
            report(date(2025, 1, 30), "10", "11", "12"),
            report(date(2025, 1, 10), "10", "11", "12"),
            report(date(2024, 12, 20), "10", "11", "12"),
        ];
        assert_eq!(current_cycle(&rows).len(), 3);
    }

    #[tokio::test]
    async fn test_estimate_mean_over_valid_rows() {
        // Two rows with the same implied growth, one invalid (negative PE)
        let rows = vec![
            report(date(2025, 1, 15), "10", "15", "20"),
            report(date(2025, 1, 10), "10", "15", "20"),
            report(date(2025, 1, 5), "-5", "15", "20"),
        ];
        let estimate = estimate_with(
            rows,
            Some(StockProfile {
                code: "601888".into(),
                name: "中国中免".into(),
                industry: "旅游零售".into(),
            }),
        )
        .await
        .unwrap();

        let expected = (10.0f64 / 20.0).sqrt() - 1.0;
        assert!((estimate.mean_growth_rate - expected).abs() < 1e-12);
        assert_eq!(estimate.industry, "旅游零售");
        assert_eq!(estimate.stock_name, "中国中免");
        // All three retained rows appear in the audit lines
        assert_eq!(estimate.report_summaries.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_missing_forecast_rows_dropped() {
        let rows = vec![
            report(date(2025, 1, 15), "10", "", "20"),
            report(date(2025, 1, 10), "12", "14", "18"),
        ];
        let estimate = estimate_with(rows, None).await.unwrap();

        let expected = (12.0f64 / 18.0).sqrt() - 1.0;
        assert!((estimate.mean_growth_rate - expected).abs() < 1e-12);
        assert_eq!(estimate.report_summaries.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_all_invalid_yields_nan_not_error() {
        let rows = vec![report(date(2025, 1, 15), "-10", "-11", "-12")];
        let estimate = estimate_with(rows, None).await.unwrap();
        assert!(estimate.mean_growth_rate.is_nan());
    }

    #[tokio::test]
    async fn test_zero_rows_is_no_forecast_data() {
        let result = estimate_with(vec![], None).await;
        assert!(matches!(result, Err(ScreenError::NoForecastData { .. })));
    }

    #[tokio::test]
    async fn test_profile_failure_defaults_industry_to_empty() {
        let rows = vec![report(date(2025, 1, 15), "10", "15", "20")];
        let estimate = estimate_with(rows, None).await.unwrap();
        assert_eq!(estimate.industry, "");
        assert!(estimate.mean_growth_rate.is_finite());
    }
}
