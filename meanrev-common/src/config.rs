//! Configuration management for the MeanRev tools.
//!
//! All tools share a unified configuration file at `~/.meanrev/config.json`.
//!
//! # Configuration Priority
//!
//! 1. Explicit config file values
//! 2. Environment variables (MEANREV_* prefix)
//! 3. Default values
//!
//! # Environment Variable Mapping
//!
//! - `MEANREV_GATEWAY_ENDPOINT` → gateway.endpoint
//! - `MEANREV_GATEWAY_TOKEN` → gateway.token
//! - `MEANREV_LOG_LEVEL` → observability.log_level

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Get the configuration directory path.
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .map_or_else(|| PathBuf::from(".meanrev"), |home| home.join(".meanrev"))
}

/// Get the configuration file path.
pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

// ============================================================================
// Observability Configuration
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Base log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Output format: "json" for structured JSON, "pretty" for human-readable
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

// ============================================================================
// Gateway Configuration
// ============================================================================

/// Quote-gateway connection configuration.
///
/// The gateway fronts the upstream market-data and analyst-report sources
/// behind a single JSON API with session-based authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway base URL
    #[serde(default = "default_gateway_endpoint")]
    pub endpoint: String,

    /// Access token used at login (optional for anonymous gateways)
    #[serde(default)]
    pub token: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: default_gateway_endpoint(),
            token: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_gateway_endpoint() -> String {
    "http://127.0.0.1:8710".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

// ============================================================================
// Analysis Configuration
// ============================================================================

/// Valuation analysis parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Earliest date from which metric history is fetched (YYYY-MM-DD)
    #[serde(default = "default_series_floor_date")]
    pub series_floor_date: String,

    /// Calendar lookback when resolving the anchor trading date (days)
    #[serde(default = "default_calendar_lookback_days")]
    pub calendar_lookback_days: u32,

    /// Target date for the analysis run (YYYY-MM-DD).
    /// When unset, yesterday's date is used so intraday runs never anchor
    /// on a half-finished trading day.
    #[serde(default)]
    pub target_date: Option<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            series_floor_date: default_series_floor_date(),
            calendar_lookback_days: default_calendar_lookback_days(),
            target_date: None,
        }
    }
}

fn default_series_floor_date() -> String {
    "2010-01-01".to_string()
}

fn default_calendar_lookback_days() -> u32 {
    30
}

// ============================================================================
// Universe Configuration
// ============================================================================

/// Which stocks a batch run covers.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UniverseConfig {
    /// Explicit stock codes (bare 6-digit or exchange-prefixed).
    /// Takes precedence over `index_id` when non-empty.
    #[serde(default)]
    pub codes: Vec<String>,

    /// Index whose constituents form the universe (e.g. "hs300", "zz500")
    #[serde(default)]
    pub index_id: Option<String>,
}

// ============================================================================
// Output Configuration
// ============================================================================

/// Result file output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for result files
    #[serde(default = "default_output_dir")]
    pub dir: String,

    /// Filename prefix for result files
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            file_prefix: default_file_prefix(),
        }
    }
}

fn default_output_dir() -> String {
    "~/.meanrev/reports".to_string()
}

fn default_file_prefix() -> String {
    "stock_analysis".to_string()
}

// ============================================================================
// Main Configuration
// ============================================================================

/// Unified configuration for the MeanRev tools.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub universe: UniverseConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

impl Config {
    /// Load configuration from the default path, falling back to defaults
    /// when the file does not exist. Environment overrides are applied last.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let mut config = if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply MEANREV_* environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = std::env::var("MEANREV_GATEWAY_ENDPOINT") {
            if !endpoint.is_empty() {
                self.gateway.endpoint = endpoint;
            }
        }
        if let Ok(token) = std::env::var("MEANREV_GATEWAY_TOKEN") {
            if !token.is_empty() {
                self.gateway.token = Some(token);
            }
        }
        if let Ok(level) = std::env::var("MEANREV_LOG_LEVEL") {
            if !level.is_empty() {
                self.observability.log_level = level;
            }
        }
    }

    /// Resolve the output directory, expanding a leading `~`.
    pub fn output_dir(&self) -> PathBuf {
        expand_home(&self.output.dir)
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

// ============================================================================
// Tests
// ============================================================================
