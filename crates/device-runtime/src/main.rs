//! # Device Runtime
//!
//! Demo node hosting transaction chain managers over the in-memory store.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging from `TXC_*` / `RUST_LOG`
//! 2. Load and validate the runtime configuration
//! 3. Connect the configured devices, start drivers and the flush ticker
//! 4. Take mastership of every device and start a statistics producer per device
//! 5. Run until Ctrl+C, then shut down gracefully

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use device_runtime::{DeviceRuntime, RuntimeConfig};
use device_telemetry::{init_telemetry, log_device_event, render_metrics, TelemetryConfig};
use device_txchain::{
    ChainManagerError, InMemoryDataStore, InstancePath, LogicalDatastore,
    MastershipEvent, TransactionChainManager, TransactionWriter,
};
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Ports reported per simulated device
const PORTS_PER_DEVICE: u32 = 4;

/// Stage port counters for one device every `period` until told to stop.
async fn produce_statistics(
    manager: TransactionChainManager<InMemoryDataStore>,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    let mut round: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.changed() => break,
        }
        round += 1;

        for port in 1..=PORTS_PER_DEVICE {
            let path = InstancePath::node(manager.device_id().as_str())
                .child("port")
                .child(port.to_string());
            let stats = json!({ "rx_packets": round * u64::from(port), "round": round });

            match manager.write(LogicalDatastore::Operational, path, stats) {
                Ok(()) => {}
                Err(ChainManagerError::NoActiveTransaction { .. }) => {
                    debug!(device_id = %manager.device_id(), "Not master, statistics dropped");
                    break;
                }
                Err(e) => {
                    warn!(device_id = %manager.device_id(), error = %e, "Staging statistics failed");
                    break;
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let telemetry = init_telemetry(TelemetryConfig::from_env())
        .context("Failed to initialize logging")?;
    info!(service = telemetry.service_name(), "Starting device runtime");

    let config = RuntimeConfig::from_env().context("Invalid runtime configuration")?;
    let store = InMemoryDataStore::new();
    let runtime = Arc::new(
        DeviceRuntime::new(config, Arc::new(store.clone()))
            .context("Failed to create device runtime")?,
    );
    runtime.start().context("Failed to start device runtime")?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut producers = Vec::new();
    for device in runtime.registry().device_ids() {
        runtime
            .publish(MastershipEvent::BecameMaster(device.clone()))
            .context("No mastership driver running")?;
        log_device_event!(info, "Mastership requested", device);

        if let Some(manager) = runtime.registry().get(&device) {
            producers.push(tokio::spawn(produce_statistics(
                manager,
                Duration::from_millis(100),
                stop_rx.clone(),
            )));
        }
    }

    info!("Device runtime is running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    let _ = stop_tx.send(true);
    for producer in producers {
        if let Err(e) = producer.await {
            warn!(error = %e, "Statistics producer failed");
        }
    }
    runtime.shutdown().await;

    info!(
        transactions = store.committed().len(),
        chains = store.chains_created(),
        objects = store.object_count(LogicalDatastore::Operational),
        "Data store summary"
    );
    match render_metrics() {
        Ok(text) if !text.is_empty() => debug!("Metrics at shutdown:\n{}", text),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Rendering metrics failed"),
    }

    Ok(())
}
