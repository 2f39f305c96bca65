//! Metric series fetch and normalization.
//!
//! Turns raw text rows from the metrics source into a normalized
//! `MetricSeries`. Numeric coercion failures become nulls rather than
//! errors: the upstream publishes blanks and junk for loss-making
//! periods and that must not abort an analysis.

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::data::{
    LocalStorage, MarketDataProvider, MetricPoint, MetricSeries, Session,
};
use crate::error::ScreenError;

/// Coerce a raw metric field to a float.
///
/// Empty strings, unparseable text, and non-finite values all map to
/// `None`. This is the single place the dirty-upstream tolerance policy
/// lives.
pub fn coerce_metric(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Fetch and normalize the metric series for one stock.
///
/// Rows come back sorted ascending with one point per date. Fails with
/// `EmptySeries` when the source returns zero rows, which is distinct
/// from a series whose values are all null.
pub async fn fetch_metric_series<P: MarketDataProvider>(
    provider: &P,
    session: &Session,
    prefixed_code: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<MetricSeries, ScreenError> {
    let rows = provider
        .query_daily_metrics(session, prefixed_code, start, end)
        .await?;

    if rows.is_empty() {
        return Err(ScreenError::EmptySeries {
            code: prefixed_code.to_string(),
            start,
            end,
        });
    }

    let points: Vec<MetricPoint> = rows
        .iter()
        .map(|row| MetricPoint {
            date: row.date,
            pe_ttm: coerce_metric(&row.pe_ttm),
            pb_mrq: coerce_metric(&row.pb_mrq),
        })
        .collect();

    let series = MetricSeries::new(prefixed_code, start, end, points);
    debug!(code = %prefixed_code, points = series.len(), "Fetched metric series");
    Ok(series)
}

/// Cache-aware series fetch.
///
/// Historical rows are immutable, so an exact `(code, start, end)` cache
/// hit is served from disk. After a live fetch the result is written
/// back best-effort; a failed save never fails the fetch.
pub async fn fetch_metric_series_cached<P: MarketDataProvider>(
    provider: &P,
    session: &Session,
    storage: Option<&LocalStorage>,
    prefixed_code: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<MetricSeries, ScreenError> {
    if let Some(storage) = storage {
        match storage.load_metric_series(prefixed_code, start, end).await {
            Ok(Some(series)) if !series.is_empty() => {
                debug!(code = %prefixed_code, points = series.len(), "Metric series served from cache");
                return Ok(series);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(code = %prefixed_code, error = %e, "Metric series cache read failed");
            }
        }
    }

    let series = fetch_metric_series(provider, session, prefixed_code, start, end).await?;

    if let Some(storage) = storage {
        if let Err(e) = storage.save_metric_series(&series).await {
            warn!(code = %prefixed_code, error = %e, "Failed to cache metric series");
        }
    }

    Ok(series)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{
        ConstituentRow, ForecastRow, MetricRow, ProviderError, StockProfile, TradeDateRow,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct MetricsStub {
        rows: Vec<MetricRow>,
        fetch_count: AtomicU32,
    }

    impl MetricsStub {
        fn new(rows: Vec<MetricRow>) -> Self {
            Self {
                rows,
                fetch_count: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl MarketDataProvider for MetricsStub {
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
            self.fetch_count.fetch_add(1, Ordering::Relaxed);
            Ok(self.rows.clone())
        }

        async fn query_analyst_reports(
            &self,
            _session: &Session,
            _bare_code: &str,
        ) -> Result<Vec<ForecastRow>, ProviderError> {
            Ok(vec![])
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
            _bare_code: &str,
        ) -> Result<StockProfile, ProviderError> {
            Err(ProviderError::DataNotAvailable("stub".into()))
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_coerce_metric_happy_path() {
        assert_eq!(coerce_metric("18.53"), Some(18.53));
        assert_eq!(coerce_metric(" -3.2 "), Some(-3.2));
    }

    #[test]
    fn test_coerce_metric_dirty_values() {
        assert_eq!(coerce_metric(""), None);
        assert_eq!(coerce_metric("   "), None);
        assert_eq!(coerce_metric("n/a"), None);
        assert_eq!(coerce_metric("--"), None);
        assert_eq!(coerce_metric("inf"), None);
        assert_eq!(coerce_metric("NaN"), None);
    }

    #[tokio::test]
    async fn test_fetch_normalizes_and_sorts() {
        let provider = MetricsStub::new(vec![
            MetricRow {
                date: date(2025, 6, 13),
                pe_ttm: "18.5".into(),
                pb_mrq: "".into(),
            },
            MetricRow {
                date: date(2025, 6, 11),
                pe_ttm: "junk".into(),
                pb_mrq: "2.31".into(),
            },
        ]);

        let session = Session::new("s");
        let series = fetch_metric_series(
            &provider,
            &session,
            "sh.601888",
            date(2025, 6, 1),
            date(2025, 6, 13),
        )
        .await
        .unwrap();

        assert_eq!(series.len(), 2);
        let first = series.point_at(date(2025, 6, 11)).unwrap();
        assert_eq!(first.pe_ttm, None); // coercion failure became null
        assert_eq!(first.pb_mrq, Some(2.31));
        let last = series.point_at(date(2025, 6, 13)).unwrap();
        assert_eq!(last.pe_ttm, Some(18.5));
        assert_eq!(last.pb_mrq, None);
    }

    #[tokio::test]
    async fn test_empty_series_is_an_error() {
        let provider = MetricsStub::new(vec![]);
        let session = Session::new("s");

        let result = fetch_metric_series(
            &provider,
            &session,
            "sh.601888",
            date(2025, 6, 1),
            date(2025, 6, 13),
        )
        .await;

        assert!(matches!(result, Err(ScreenError::EmptySeries { .. })));
    }

    #[tokio::test]
    async fn test_cached_fetch_skips_provider_on_hit() {
        let provider = MetricsStub::new(vec![MetricRow {
            date: date(2025, 6, 13),
            pe_ttm: "18.5".into(),
            pb_mrq: "2.3".into(),
        }]);
        let storage = LocalStorage::open_in_memory().unwrap();
        let session = Session::new("s");

        let start = date(2025, 6, 1);
        let end = date(2025, 6, 13);

        let first = fetch_metric_series_cached(
            &provider,
            &session,
            Some(&storage),
            "sh.601888",
            start,
            end,
        )
        .await
        .unwrap();
        assert_eq!(provider.fetch_count.load(Ordering::Relaxed), 1);

        let second = fetch_metric_series_cached(
            &provider,
            &session,
            Some(&storage),
            "sh.601888",
            start,
            end,
        )
        .await
        .unwrap();

        // Second call served from cache, provider untouched
        assert_eq!(provider.fetch_count.load(Ordering::Relaxed), 1);
        assert_eq!(first.len(), second.len());
        assert_eq!(
            second.point_at(end).unwrap().pe_ttm,
            first.point_at(end).unwrap().pe_ttm
        );
    }
}
