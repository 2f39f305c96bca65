//! Market data provider abstraction.
//!
//! Defines the `MarketDataProvider` trait behind which the upstream
//! market-data and analyst-report sources sit. Every query takes an
//! explicit `Session` acquired via `login()` and released via `logout()`,
//! so session lifetime is visible at each call site instead of living in
//! ambient module state.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;

use super::{ConstituentRow, ForecastRow, MetricRow, StockProfile, TradeDateRow};

// ============================================================================
// Session
// ============================================================================

/// An authenticated session with the upstream source.
///
/// Sessions are not assumed thread-safe upstream; acquire one per fetch
/// unit and release it afterward. The value is deliberately not `Clone`
/// so a session cannot outlive its `logout`.
#[derive(Debug)]
pub struct Session {
    /// Opaque session identifier issued at login
    pub id: String,
    /// When the session was acquired
    pub acquired_at: DateTime<Utc>,
}

impl Session {
    /// Create a session wrapper around an upstream-issued identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            acquired_at: Utc::now(),
        }
    }
}

// ============================================================================
// Provider Error
// ============================================================================

/// Errors specific to data providers.
#[derive(Debug, Clone)]
pub enum ProviderError {
    /// Network error (connection failed, timeout)
    Network(String),
    /// Authentication error (invalid token, expired session)
    Auth(String),
    /// Data not available for the requested stock/range
    DataNotAvailable(String),
    /// Invalid request parameters
    InvalidRequest(String),
    /// Internal provider error
    Internal(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::Auth(msg) => write!(f, "Authentication error: {}", msg),
            Self::DataNotAvailable(msg) => write!(f, "Data not available: {}", msg),
            Self::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            Self::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    /// Check if the error is recoverable (worth retrying later).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Internal(_))
    }
}

// ============================================================================
// Market Data Provider Trait
// ============================================================================

/// Trait for the upstream market-data and analyst-report capability.
///
/// Method-per-query rather than a generic row interface so each row shape
/// is fixed at the boundary.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Provider name for logging (e.g. "gateway", "mock")
    fn name(&self) -> &'static str;

    /// Acquire an authenticated session.
    async fn login(&self) -> Result<Session, ProviderError>;

    /// Release a session. Best-effort; failures are logged upstream.
    async fn logout(&self, session: Session);

    /// Calendar entries in `[start, end]`, flagged as trading day or not.
    async fn query_trade_dates(
        &self,
        session: &Session,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TradeDateRow>, ProviderError>;

    /// Daily valuation metric rows for an exchange-prefixed code in
    /// `[start, end]`, one row per trading date.
    async fn query_daily_metrics(
        &self,
        session: &Session,
        prefixed_code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MetricRow>, ProviderError>;

    /// All analyst forecast report rows for a bare 6-digit code.
    async fn query_analyst_reports(
        &self,
        session: &Session,
        bare_code: &str,
    ) -> Result<Vec<ForecastRow>, ProviderError>;

    /// Constituents of a named index (e.g. "hs300", "zz500").
    async fn query_index_constituents(
        &self,
        session: &Session,
        index_id: &str,
    ) -> Result<Vec<ConstituentRow>, ProviderError>;

    /// Basic profile (name, industry) for a bare 6-digit code.
    async fn query_stock_profile(
        &self,
        session: &Session,
        bare_code: &str,
    ) -> Result<StockProfile, ProviderError>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_recoverable() {
        assert!(ProviderError::Network("timeout".into()).is_recoverable());
        assert!(ProviderError::Internal("500".into()).is_recoverable());
        assert!(!ProviderError::Auth("bad token".into()).is_recoverable());
        assert!(!ProviderError::DataNotAvailable("no rows".into()).is_recoverable());
        assert!(!ProviderError::InvalidRequest("bad code".into()).is_recoverable());
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::Network("connection refused".into());
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_session_wraps_id() {
        let session = Session::new("abc123");
        assert_eq!(session.id, "abc123");
    }
}
