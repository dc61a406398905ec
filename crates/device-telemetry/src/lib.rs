//! # Device Telemetry
//!
//! Logging and metrics plumbing for the device transaction chain runtime.
//!
//! ## Components
//!
//! - **Logs**: `tracing-subscriber` with an `EnvFilter`, pretty or JSON output
//! - **Metrics**: Prometheus text rendering of the default registry
//! - **Macros**: `log_device_event!` and `log_chain_event!` with the standard
//!   correlation fields
//!
//! ## Usage
//!
//! ```rust,ignore
//! use device_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `TXC_SERVICE_NAME` | `device-txchain` | Service name in logs |
//! | `TXC_LOG_LEVEL` | `info` | Log level filter (`RUST_LOG` also honored) |
//! | `TXC_JSON_LOGS` | `false` | JSON output |
//! | `TXC_CONSOLE_OUTPUT` | `true` | Write logs to stdout |

mod config;
mod logging;
mod metrics;
mod subscriber;

pub use config::TelemetryConfig;
pub use metrics::render_metrics;
pub use subscriber::{build_filter, init_subscriber};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to install tracing subscriber: {0}")]
    SubscriberInit(String),

    #[error("Invalid log filter: {0}")]
    Filter(String),

    #[error("Failed to encode metrics: {0}")]
    MetricsEncode(String),
}

/// Initialize logging.
///
/// Returns a guard to hold for the lifetime of the application. A second call
/// in the same process fails with [`TelemetryError::SubscriberInit`].
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    init_subscriber(&config)?;
    Ok(TelemetryGuard {
        service_name: config.service_name,
    })
}

/// Guard that keeps telemetry active
pub struct TelemetryGuard {
    service_name: String,
}

impl TelemetryGuard {
    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry");
    }
}
