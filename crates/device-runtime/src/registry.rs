//! # Device Registry
//!
//! Owns one [`TransactionChainManager`] per connected device. Producers look
//! managers up here; the flush ticker walks all of them.

use std::collections::HashMap;
use std::sync::Arc;

use device_telemetry::log_chain_event;
use device_txchain::ports::TransactionChainFactory;
use device_txchain::{DeviceId, MastershipControl, TransactionChainManager};
use futures::future::join_all;
use parking_lot::RwLock;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::RuntimeError;

/// Registry of per-device managers sharing one data store.
pub struct DeviceRegistry<F: TransactionChainFactory> {
    factory: Arc<F>,
    runtime: Handle,
    managers: RwLock<HashMap<DeviceId, TransactionChainManager<F>>>,
}

impl<F: TransactionChainFactory> DeviceRegistry<F> {
    pub fn new(factory: Arc<F>, runtime: Handle) -> Self {
        Self {
            factory,
            runtime,
            managers: RwLock::new(HashMap::new()),
        }
    }

    /// Create the manager for a newly connected device, in `Sleeping` status.
    pub fn connect(
        &self,
        device_id: impl Into<DeviceId>,
    ) -> Result<TransactionChainManager<F>, RuntimeError> {
        let device_id = device_id.into();
        let mut managers = self.managers.write();
        if managers.contains_key(&device_id) {
            return Err(RuntimeError::AlreadyConnected(device_id));
        }

        let manager = TransactionChainManager::new(
            device_id.clone(),
            Arc::clone(&self.factory),
            self.runtime.clone(),
        );
        managers.insert(device_id.clone(), manager.clone());
        info!(device_id = %device_id, "Device connected");
        Ok(manager)
    }

    pub fn get(&self, device_id: &DeviceId) -> Option<TransactionChainManager<F>> {
        self.managers.read().get(device_id).cloned()
    }

    /// Managers of all connected devices
    pub fn managers(&self) -> Vec<TransactionChainManager<F>> {
        self.managers.read().values().cloned().collect()
    }

    pub fn device_ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self.managers.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.managers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.read().is_empty()
    }

    /// Forget a device and close its manager.
    ///
    /// Waits for the shutdown drain; a failed final commit is logged, the
    /// chain is released either way.
    pub async fn disconnect(&self, device_id: &DeviceId) -> Result<(), RuntimeError> {
        let manager = self
            .managers
            .write()
            .remove(device_id)
            .ok_or_else(|| RuntimeError::UnknownDevice(device_id.clone()))?;

        close_manager(&manager).await;
        info!(device_id = %device_id, "Device disconnected");
        Ok(())
    }

    /// Close every manager concurrently and empty the registry
    pub async fn shutdown_all(&self) {
        let managers: Vec<_> = self.managers.write().drain().map(|(_, m)| m).collect();
        debug!(count = managers.len(), "Closing all device managers");

        join_all(managers.iter().map(close_manager)).await;
    }
}

async fn close_manager<F: TransactionChainFactory>(manager: &TransactionChainManager<F>) {
    if let Some(chain_id) = manager.chain_id() {
        log_chain_event!(debug, "Releasing transaction chain", manager.device_id(), chain_id);
    }
    if let Err(e) = manager.begin_shutdown().await {
        warn!(device_id = %manager.device_id(), error = %e, "Final commit before close failed");
    }
    if let Err(e) = manager.finalize_close() {
        warn!(device_id = %manager.device_id(), error = %e, "Closing device manager failed");
    }
}
