//! # Device Runtime
//!
//! Hosts the per-device transaction chain managers of one node.
//!
//! ## Modular Structure
//!
//! - `config` - runtime configuration from defaults and `TXC_*` variables
//! - `registry` - one manager per connected device
//! - `flush` - periodic submit on every manager
//!
//! ## Flow
//!
//! ```text
//! Cluster ──MastershipEvent──→ broadcast ──→ MastershipDriver (one per device)
//!                                                   │ activate / deactivate / shutdown
//!                                                   ↓
//! Producers ──write/delete──────────────→ TransactionChainManager ──→ data store
//!                                                   ↑
//! Flush ticker ──submit (every flush_interval)──────┘
//! ```
//!
//! ## Shutdown Sequence
//!
//! 1. Publish `Disconnected` for every device, drivers drain and close
//! 2. Wait for drivers, bounded by `shutdown_timeout`
//! 3. Stop the flush ticker
//! 4. Close whatever managers are still open

pub mod config;
pub mod flush;
pub mod registry;

use std::sync::Arc;

use device_txchain::ports::TransactionChainFactory;
use device_txchain::{
    ChainManagerError, DeviceId, MastershipDriver, MastershipEvent, TransactionChainManager,
};
use futures::future::join_all;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub use config::{ConfigError, RuntimeConfig};
pub use flush::{flush_once, FlushReport};
pub use registry::DeviceRegistry;

/// Runtime errors
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Device {0} is already connected")]
    AlreadyConnected(DeviceId),

    #[error("Device {0} is not connected")]
    UnknownDevice(DeviceId),

    #[error("No mastership driver is listening")]
    NoDrivers,

    #[error("Chain manager error: {0}")]
    ChainManager(#[from] ChainManagerError),

    #[error("Must be created inside a Tokio runtime")]
    NoRuntime,
}

/// Runtime hosting the device managers.
pub struct DeviceRuntime<F: TransactionChainFactory> {
    config: RuntimeConfig,
    registry: Arc<DeviceRegistry<F>>,
    roles: broadcast::Sender<MastershipEvent>,
    shutdown_tx: watch::Sender<bool>,
    drivers: Mutex<Vec<JoinHandle<()>>>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl<F: TransactionChainFactory> DeviceRuntime<F> {
    /// Create a runtime over `factory`. Must be called inside a Tokio runtime.
    pub fn new(config: RuntimeConfig, factory: Arc<F>) -> Result<Self, RuntimeError> {
        config.validate()?;
        let handle = Handle::try_current().map_err(|_| RuntimeError::NoRuntime)?;

        let (roles, _) = broadcast::channel(config.role_channel_capacity);
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            registry: Arc::new(DeviceRegistry::new(factory, handle)),
            config,
            roles,
            shutdown_tx,
            drivers: Mutex::new(Vec::new()),
            flusher: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry<F>> {
        &self.registry
    }

    /// Connect the configured devices and start the flush ticker.
    pub fn start(&self) -> Result<(), RuntimeError> {
        info!(devices = self.config.devices.len(), "Starting device runtime");

        for device in &self.config.devices {
            self.connect_device(device.as_str())?;
        }

        let flusher = tokio::spawn(flush::run_flush_loop(
            Arc::clone(&self.registry),
            self.config.flush_interval,
            self.shutdown_tx.subscribe(),
        ));
        *self.flusher.lock() = Some(flusher);

        info!(
            flush_interval_ms = self.config.flush_interval.as_millis() as u64,
            "Device runtime running"
        );
        Ok(())
    }

    /// Register a device and spawn its mastership driver.
    pub fn connect_device(
        &self,
        device_id: impl Into<DeviceId>,
    ) -> Result<TransactionChainManager<F>, RuntimeError> {
        let manager = self.registry.connect(device_id)?;
        let driver = MastershipDriver::new(manager.clone(), self.config.driver.clone());
        let handle = tokio::spawn(driver.run(self.roles.subscribe()));
        self.drivers.lock().push(handle);
        Ok(manager)
    }

    /// Broadcast a role change to the drivers. Returns how many received it.
    pub fn publish(&self, event: MastershipEvent) -> Result<usize, RuntimeError> {
        self.roles.send(event).map_err(|_| RuntimeError::NoDrivers)
    }

    /// Disconnect a device: its driver drains and closes the manager, then
    /// the registry forgets it.
    pub async fn disconnect_device(&self, device_id: &DeviceId) -> Result<(), RuntimeError> {
        if self.registry.get(device_id).is_none() {
            return Err(RuntimeError::UnknownDevice(device_id.clone()));
        }
        // driver may already be gone; the registry close below covers it
        let _ = self.publish(MastershipEvent::Disconnected(device_id.clone()));
        self.registry.disconnect(device_id).await
    }

    /// Graceful shutdown. Safe to call once; later calls find nothing to close.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown...");

        for device_id in self.registry.device_ids() {
            let _ = self.publish(MastershipEvent::Disconnected(device_id));
        }

        let drivers: Vec<_> = self.drivers.lock().drain(..).collect();
        let waited =
            tokio::time::timeout(self.config.shutdown_timeout, join_all(drivers)).await;
        match waited {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        error!(error = %e, "Mastership driver task failed");
                    }
                }
            }
            Err(_) => warn!(
                timeout_ms = self.config.shutdown_timeout.as_millis() as u64,
                "Drivers did not finish in time"
            ),
        }

        if self.shutdown_tx.send(true).is_err() {
            warn!("Flush ticker already stopped");
        }
        let flusher = self.flusher.lock().take();
        if let Some(flusher) = flusher {
            if let Err(e) = flusher.await {
                error!(error = %e, "Flush ticker task failed");
            }
        }

        self.registry.shutdown_all().await;
        info!("Shutdown complete");
    }
}
