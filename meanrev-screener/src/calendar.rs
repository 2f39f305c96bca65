//! Trading calendar resolution.
//!
//! Resolves the anchor trading date for an analysis run: the last day the
//! exchange was open on or before a target date. A pure query over the
//! calendar source, idempotent across calls.

use chrono::{Duration, NaiveDate};
use std::sync::Arc;
use tracing::debug;

use crate::data::{MarketDataProvider, Session};
use crate::error::ScreenError;

/// Default lookback window when resolving the anchor date.
/// 30 days clears ordinary holiday gaps.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 30;

/// Wider lookback that also clears the Lunar New Year closure combined
/// with surrounding weekends.
pub const HOLIDAY_SAFE_LOOKBACK_DAYS: u32 = 60;

/// Trading-day resolver over a calendar source.
pub struct TradingCalendar<P> {
    provider: Arc<P>,
}

impl<P: MarketDataProvider> TradingCalendar<P> {
    /// Create a calendar over the given provider.
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    /// Resolve the last trading date on or before `date`.
    ///
    /// Fetches calendar entries in `[date - lookback_days, date]`, keeps
    /// flagged trading days not after `date`, and returns the maximum.
    /// Fails with `NoTradingDayFound` when the window contains none; the
    /// caller picks a lookback wide enough for the holiday stretches it
    /// expects (see `HOLIDAY_SAFE_LOOKBACK_DAYS`).
    pub async fn last_trading_date_on_or_before(
        &self,
        session: &Session,
        date: NaiveDate,
        lookback_days: u32,
    ) -> Result<NaiveDate, ScreenError> {
        let start = date - Duration::days(i64::from(lookback_days));
        let rows = self
            .provider
            .query_trade_dates(session, start, date)
            .await?;

        let anchor = rows
            .iter()
            .filter(|row| row.is_trading_day && row.date <= date)
            .map(|row| row.date)
            .max();

        match anchor {
            Some(anchor) => {
                debug!(target_date = %date, anchor = %anchor, "Resolved anchor trading date");
                Ok(anchor)
            }
            None => Err(ScreenError::NoTradingDayFound {
                date,
                lookback_days,
            }),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
