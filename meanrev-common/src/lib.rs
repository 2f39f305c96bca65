//! MeanRev Common - Shared configuration and logging for the MeanRev tools.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Logging setup and structured logging helpers

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod logging;

pub use config::{
    AnalysisConfig, Config, GatewayConfig, ObservabilityConfig, OutputConfig, UniverseConfig,
};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::{AnalysisConfig, Config, GatewayConfig, OutputConfig, UniverseConfig};
    pub use crate::logging::init_logging;
}
