//! Structured logging helpers.
//!
//! Every line about a device carries the same correlation fields so log
//! aggregation can follow one device across managers and drivers:
//! - `device_id`: device identity (e.g. `openflow:1`)
//! - `chain_id`: transaction chain, when one is involved
//! - additional context fields

/// Log an event about one device.
///
/// ```rust,ignore
/// log_device_event!(info, "Mastership gained", device_id, role = "master");
/// ```
#[macro_export]
macro_rules! log_device_event {
    ($level:ident, $msg:expr, $device_id:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            device_id = %$device_id,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log an event about one device's transaction chain.
#[macro_export]
macro_rules! log_chain_event {
    ($level:ident, $msg:expr, $device_id:expr, $chain_id:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            device_id = %$device_id,
            chain_id = %$chain_id,
            $($($field)*,)?
            $msg
        )
    };
}
