//! Prometheus text exposition of everything registered in the default registry.

use prometheus::{Encoder, TextEncoder};

use crate::TelemetryError;

/// Render all registered metrics in the Prometheus text format
pub fn render_metrics() -> Result<String, TelemetryError> {
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsEncode(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsEncode(e.to_string()))
}
