//! # Transaction Chain Metrics
//!
//! Prometheus metrics for the per-device transaction chain managers.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! device-txchain = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `txchain_commits_submitted_total` - Counter of transactions handed to the store
//! - `txchain_commits_failed_total` - Counter of commits the store rejected
//! - `txchain_chain_recreations_total` - Counter of chains replaced after failure
//! - `txchain_writes_rejected_total` - Counter of writes refused (no active transaction)
//! - `txchain_managers_working` - Gauge of managers currently in `Working`

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{register_int_counter, register_int_gauge, IntCounter, IntGauge};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Transactions handed to the store
    pub static ref COMMITS_SUBMITTED: IntCounter = register_int_counter!(
        "txchain_commits_submitted_total",
        "Total number of write transactions submitted"
    )
    .expect("Failed to create COMMITS_SUBMITTED metric");

    /// Commits that resolved with an error
    pub static ref COMMITS_FAILED: IntCounter = register_int_counter!(
        "txchain_commits_failed_total",
        "Total number of write transactions whose commit failed"
    )
    .expect("Failed to create COMMITS_FAILED metric");

    /// Chains recreated after a failure report
    pub static ref CHAIN_RECREATIONS: IntCounter = register_int_counter!(
        "txchain_chain_recreations_total",
        "Total number of transaction chains recreated after failure"
    )
    .expect("Failed to create CHAIN_RECREATIONS metric");

    /// Writes refused because no transaction could be opened
    pub static ref WRITES_REJECTED: IntCounter = register_int_counter!(
        "txchain_writes_rejected_total",
        "Total number of writes rejected with no active transaction"
    )
    .expect("Failed to create WRITES_REJECTED metric");

    /// Managers currently holding mastership
    pub static ref MANAGERS_WORKING: IntGauge = register_int_gauge!(
        "txchain_managers_working",
        "Number of transaction chain managers in working status"
    )
    .expect("Failed to create MANAGERS_WORKING metric");
}

// =============================================================================
// METRIC RECORDING FUNCTIONS
// =============================================================================

#[cfg(feature = "metrics")]
pub fn record_commit_submitted() {
    COMMITS_SUBMITTED.inc();
}

#[cfg(feature = "metrics")]
pub fn record_commit_failed() {
    COMMITS_FAILED.inc();
}

#[cfg(feature = "metrics")]
pub fn record_chain_recreated() {
    CHAIN_RECREATIONS.inc();
}

#[cfg(feature = "metrics")]
pub fn record_write_rejected() {
    WRITES_REJECTED.inc();
}

/// Track a manager entering (`true`) or leaving (`false`) `Working`
#[cfg(feature = "metrics")]
pub fn record_working(entered: bool) {
    if entered {
        MANAGERS_WORKING.inc();
    } else {
        MANAGERS_WORKING.dec();
    }
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature disabled)
// =============================================================================

#[cfg(not(feature = "metrics"))]
pub fn record_commit_submitted() {}

#[cfg(not(feature = "metrics"))]
pub fn record_commit_failed() {}

#[cfg(not(feature = "metrics"))]
pub fn record_chain_recreated() {}

#[cfg(not(feature = "metrics"))]
pub fn record_write_rejected() {}

#[cfg(not(feature = "metrics"))]
pub fn record_working(_entered: bool) {}
