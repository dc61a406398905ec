//! # Flush Ticker
//!
//! Calls `submit` on every registered manager at a fixed period, so staged
//! writes reach the store even when producers never flush themselves.

use std::sync::Arc;
use std::time::Duration;

use device_txchain::ports::TransactionChainFactory;
use device_txchain::TransactionWriter;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::registry::DeviceRegistry;

/// Outcome of one pass over the registry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Managers whose submit went through (or had nothing to flush)
    pub submitted: usize,
    /// Managers with submission disabled
    pub blocked: usize,
}

/// Submit once on every manager
pub fn flush_once<F: TransactionChainFactory>(registry: &DeviceRegistry<F>) -> FlushReport {
    let mut report = FlushReport::default();
    for manager in registry.managers() {
        if manager.submit() {
            report.submitted += 1;
        } else {
            report.blocked += 1;
        }
    }
    trace!(submitted = report.submitted, blocked = report.blocked, "Flush pass");
    report
}

/// Flush every `interval` until `shutdown` flips to `true` or its sender is dropped
pub async fn run_flush_loop<F: TransactionChainFactory>(
    registry: Arc<DeviceRegistry<F>>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                flush_once(&registry);
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    debug!("Flush ticker stopped");
}
