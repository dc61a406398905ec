//! # Mastership Handoff Tests
//!
//! Two cluster nodes own a manager each for the same device and share one
//! data store. Only the master may write; the old master drains before the
//! new one starts.
//!
//! ```text
//! node A: [WORKING] ──BecameSlave──→ drain ──→ close chain ──→ [SLEEPING]
//!                                                  │
//! node B: [SLEEPING] ─────────────────BecameMaster─┴─→ [WORKING]
//! ```

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use device_txchain::{
        ChainManagerStatus, DeviceId, InMemoryDataStore, InstancePath, LogicalDatastore,
        MastershipControl, MastershipDriver, MastershipDriverConfig, MastershipEvent,
        TransactionChainManager, TransactionWriter,
    };
    use futures::FutureExt;
    use serde_json::json;
    use tokio::runtime::Handle;
    use tokio::sync::broadcast;
    use tokio::time::timeout;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    const DEVICE: &str = "openflow:5";

    fn create_node(store: &InMemoryDataStore) -> TransactionChainManager<InMemoryDataStore> {
        TransactionChainManager::new(DEVICE, Arc::new(store.clone()), Handle::current())
    }

    fn write_counter(manager: &TransactionChainManager<InMemoryDataStore>, value: u64) {
        manager
            .write(
                LogicalDatastore::Operational,
                InstancePath::node(DEVICE).child("counter"),
                json!(value),
            )
            .unwrap();
    }

    async fn wait_for(
        manager: &TransactionChainManager<InMemoryDataStore>,
        status: ChainManagerStatus,
    ) {
        timeout(Duration::from_secs(2), async {
            while manager.status() != status {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("manager never reached the expected status");
    }

    // =============================================================================
    // HANDOFF
    // =============================================================================

    #[tokio::test]
    async fn test_old_master_drains_before_new_master_writes() {
        let store = InMemoryDataStore::new();
        let node_a = create_node(&store);
        let node_b = create_node(&store);

        node_a.activate_then_submit().unwrap();
        write_counter(&node_a, 1);
        assert!(node_a.submit());

        // last batch of A is still in flight when mastership moves
        store.pause_commits();
        write_counter(&node_a, 2);
        let drained = node_a.deactivate();
        assert!(drained.clone().now_or_never().is_none());
        assert_eq!(node_a.status(), ChainManagerStatus::Sleeping);

        store.release_commits();
        drained.await.unwrap();

        node_b.activate_then_submit().unwrap();
        write_counter(&node_b, 3);
        assert!(node_b.submit());
        node_b.last_submit_result().await.unwrap();

        let committed = store.committed();
        let chains: Vec<_> = committed.iter().map(|tx| tx.chain_id).collect();
        assert_eq!(committed.len(), 3);
        assert_eq!(chains[0], chains[1]);
        assert_ne!(chains[1], chains[2]);
        assert_eq!(
            store.read(LogicalDatastore::Operational, &InstancePath::node(DEVICE).child("counter")),
            Some(json!(3))
        );
        assert_eq!(store.open_chains(), vec![chains[2]]);
    }

    #[tokio::test]
    async fn test_late_writes_of_old_master_are_refused() {
        let store = InMemoryDataStore::new();
        let node_a = create_node(&store);
        let node_b = create_node(&store);
        node_a.activate_then_submit().unwrap();

        node_a.deactivate().await.unwrap();
        node_b.activate_then_submit().unwrap();

        assert!(node_a
            .write(LogicalDatastore::Operational, InstancePath::node(DEVICE), json!({}))
            .is_err());
        assert_eq!(store.transactions_allocated(), 0);
    }

    // =============================================================================
    // DRIVER-BASED FLAPPING
    // =============================================================================

    #[tokio::test]
    async fn test_role_flapping_leaves_one_open_chain() {
        let store = InMemoryDataStore::new();
        let manager = create_node(&store);
        let driver = MastershipDriver::new(manager.clone(), MastershipDriverConfig::default());
        let (roles, rx) = broadcast::channel(32);
        let device = DeviceId::new(DEVICE);
        let task = tokio::spawn(driver.run(rx));

        for round in 0..3u64 {
            roles.send(MastershipEvent::BecameMaster(device.clone())).unwrap();
            wait_for(&manager, ChainManagerStatus::Working).await;
            write_counter(&manager, round);

            roles.send(MastershipEvent::BecameSlave(device.clone())).unwrap();
            wait_for(&manager, ChainManagerStatus::Sleeping).await;
        }
        roles.send(MastershipEvent::BecameMaster(device.clone())).unwrap();
        wait_for(&manager, ChainManagerStatus::Working).await;

        assert_eq!(store.chains_created(), 4);
        // chain closes run after each drain; give the last one a moment
        timeout(Duration::from_secs(2), async {
            while store.chains_closed() < 3 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(store.open_chains().len(), 1);
        assert_eq!(store.committed().len(), 3);

        roles.send(MastershipEvent::Disconnected(device)).unwrap();
        task.await.unwrap();
        assert!(store.open_chains().is_empty());
        assert!(!manager.has_chain());
    }

    #[tokio::test]
    async fn test_redundant_role_events_are_harmless() {
        let store = InMemoryDataStore::new();
        let manager = create_node(&store);
        let driver = MastershipDriver::new(manager.clone(), MastershipDriverConfig::default());
        let device = DeviceId::new(DEVICE);

        driver.handle_event(&MastershipEvent::BecameSlave(device.clone())).await;
        driver.handle_event(&MastershipEvent::BecameMaster(device.clone())).await;
        driver.handle_event(&MastershipEvent::BecameMaster(device.clone())).await;

        assert_eq!(manager.status(), ChainManagerStatus::Working);
        assert_eq!(store.chains_created(), 1);
        assert!(manager.is_submit_enabled());
    }
}
