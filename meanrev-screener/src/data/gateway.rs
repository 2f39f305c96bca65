//! Quote-gateway adapter.
//!
//! Talks to the JSON quote gateway that fronts the upstream market-data
//! and analyst-report sources. All requests are POSTed to a single
//! endpoint with a method name, the session id, and method parameters;
//! responses use a `{code, msg, data}` envelope where code 0 is success.

use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::time::Duration;

use async_trait::async_trait;
use meanrev_common::config::GatewayConfig;

use super::provider::{MarketDataProvider, ProviderError, Session};
use super::{ConstituentRow, ForecastRow, MetricRow, StockProfile, TradeDateRow};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// HTTP adapter for the quote gateway.
pub struct GatewayProvider {
    /// Access token presented at login
    token: Option<String>,
    /// HTTP client
    client: reqwest::Client,
    /// Gateway base URL
    base_url: String,
}

impl GatewayProvider {
    /// Create a new gateway adapter.
    pub fn new(base_url: impl Into<String>, token: Option<String>, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            token,
            client,
            base_url: base_url.into(),
        }
    }

    /// Create from config.
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(
            config.endpoint.clone(),
            config.token.clone(),
            config.timeout_secs,
        )
    }

    /// Call a gateway method.
    async fn call_api<T: DeserializeOwned>(
        &self,
        method: &str,
        session_id: Option<&str>,
        params: serde_json::Value,
    ) -> Result<T, ProviderError> {
        let request = GatewayRequest {
            method: method.to_string(),
            session: session_id.map(String::from),
            token: self.token.clone(),
            params,
        };

        let url = format!("{}/api", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::Network(format!("request to {method} failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Internal(format!(
                "gateway returned {status} for {method}: {body}"
            )));
        }

        let envelope: GatewayResponse<T> = response
            .json()
            .await
            .map_err(|e| ProviderError::Internal(format!("bad {method} response body: {e}")))?;

        match envelope.code {
            0 => envelope.data.ok_or_else(|| {
                ProviderError::DataNotAvailable(format!("{method} returned no payload"))
            }),
            10001 | 10002 => Err(ProviderError::Auth(
                envelope.msg.unwrap_or_else(|| "session rejected".to_string()),
            )),
            code => Err(ProviderError::Internal(format!(
                "gateway error {code}: {}",
                envelope.msg.unwrap_or_default()
            ))),
        }
    }
}

#[async_trait]
impl MarketDataProvider for GatewayProvider {
    fn name(&self) -> &'static str {
        "gateway"
    }

    async fn login(&self) -> Result<Session, ProviderError> {
        let data: LoginData = self
            .call_api("login", None, serde_json::json!({}))
            .await?;
        Ok(Session::new(data.session))
    }

    async fn logout(&self, session: Session) {
        let result: Result<serde_json::Value, ProviderError> = self
            .call_api("logout", Some(&session.id), serde_json::json!({}))
            .await;
        if let Err(e) = result {
            tracing::debug!(error = %e, "Gateway logout failed");
        }
    }

    async fn query_trade_dates(
        &self,
        session: &Session,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<TradeDateRow>, ProviderError> {
        let data: Vec<WireTradeDate> = self
            .call_api(
                "trade_dates",
                Some(&session.id),
                serde_json::json!({
                    "start_date": start.format(DATE_FORMAT).to_string(),
                    "end_date": end.format(DATE_FORMAT).to_string(),
                }),
            )
            .await?;

        data.iter()
            .map(|row| {
                Ok(TradeDateRow {
                    date: parse_wire_date(&row.calendar_date)?,
                    is_trading_day: row.is_trading_day == "1",
                })
            })
            .collect()
    }

    async fn query_daily_metrics(
        &self,
        session: &Session,
        prefixed_code: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MetricRow>, ProviderError> {
        let data: Vec<WireDailyMetrics> = self
            .call_api(
                "daily_metrics",
                Some(&session.id),
                serde_json::json!({
                    "code": prefixed_code,
                    "start_date": start.format(DATE_FORMAT).to_string(),
                    "end_date": end.format(DATE_FORMAT).to_string(),
                    "fields": ["date", "code", "peTTM", "pbMRQ"],
                    "frequency": "d",
                }),
            )
            .await?;

        data.iter()
            .map(|row| {
                Ok(MetricRow {
                    date: parse_wire_date(&row.date)?,
                    pe_ttm: row.pe_ttm.clone().unwrap_or_default(),
                    pb_mrq: row.pb_mrq.clone().unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn query_analyst_reports(
        &self,
        session: &Session,
        bare_code: &str,
    ) -> Result<Vec<ForecastRow>, ProviderError> {
        let data: Vec<WireForecast> = self
            .call_api(
                "analyst_reports",
                Some(&session.id),
                serde_json::json!({ "code": bare_code }),
            )
            .await?;

        data.iter()
            .map(|row| {
                Ok(ForecastRow {
                    institution: row.institution.clone(),
                    stock_name: row.stock_name.clone(),
                    report_date: parse_wire_date(&row.date)?,
                    pe_2025: row.pe_2025.clone().unwrap_or_default(),
                    pe_2026: row.pe_2026.clone().unwrap_or_default(),
                    pe_2027: row.pe_2027.clone().unwrap_or_default(),
                    pdf_link: row.pdf_link.clone().unwrap_or_default(),
                })
            })
            .collect()
    }

    async fn query_index_constituents(
        &self,
        session: &Session,
        index_id: &str,
    ) -> Result<Vec<ConstituentRow>, ProviderError> {
        let data: Vec<WireConstituent> = self
            .call_api(
                "index_constituents",
                Some(&session.id),
                serde_json::json!({ "index": index_id }),
            )
            .await?;

        Ok(data
            .into_iter()
            .map(|row| ConstituentRow {
                code: row.code,
                name: row.code_name.unwrap_or_default(),
            })
            .collect())
    }

    async fn query_stock_profile(
        &self,
        session: &Session,
        bare_code: &str,
    ) -> Result<StockProfile, ProviderError> {
        let data: WireProfile = self
            .call_api(
                "stock_profile",
                Some(&session.id),
                serde_json::json!({ "code": bare_code }),
            )
            .await?;

        Ok(StockProfile {
            code: bare_code.to_string(),
            name: data.name.unwrap_or_default(),
            industry: data.industry.unwrap_or_default(),
        })
    }
}

fn parse_wire_date(raw: &str) -> Result<NaiveDate, ProviderError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|e| ProviderError::Internal(format!("failed to parse date {raw:?}: {e}")))
}

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GatewayRequest {
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    session: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct GatewayResponse<T> {
    code: i32,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct LoginData {
    session: String,
}

#[derive(Debug, Deserialize)]
struct WireTradeDate {
    calendar_date: String,
    is_trading_day: String,
}

#[derive(Debug, Deserialize)]
struct WireDailyMetrics {
    date: String,
    #[serde(rename = "peTTM")]
    pe_ttm: Option<String>,
    #[serde(rename = "pbMRQ")]
    pb_mrq: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireForecast {
    institution: String,
    stock_name: String,
    date: String,
    #[serde(rename = "predict_peTTM_2025")]
    pe_2025: Option<String>,
    #[serde(rename = "predict_peTTM_2026")]
    pe_2026: Option<String>,
    #[serde(rename = "predict_peTTM_2027")]
    pe_2027: Option<String>,
    #[serde(rename = "report_pdf_link")]
    pdf_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireConstituent {
    code: String,
    code_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireProfile {
    name: Option<String>,
    industry: Option<String>,
}

// ============================================================================
// Tests
// ============================================================================
