//! # Producer Flow Tests
//!
//! Several producers (statistics, inventory) share one device manager:
//!
//! ```text
//! [Statistics] ──write──┐
//! [Inventory]  ──write──┼──→ [TransactionChainManager] ──commit──→ [Data store]
//! [Flush ticker] ─submit┘
//! ```
//!
//! ## Test Categories
//!
//! 1. **Batching**: concurrent writes land in one transaction
//! 2. **Gating**: writes outside mastership are refused, not lost silently
//! 3. **Flush ticker**: periodic submit reaches the store in order

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use device_runtime::flush::run_flush_loop;
    use device_runtime::DeviceRegistry;
    use device_txchain::{
        ChainManagerError, ChainManagerStatus, InMemoryDataStore, InstancePath, LogicalDatastore,
        MastershipControl, Mutation, TransactionChainManager, TransactionWriter,
    };
    use serde_json::json;
    use tokio::runtime::Handle;
    use tokio::sync::watch;
    use tokio::time::timeout;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    const DEVICE: &str = "openflow:42";

    fn create_manager(store: &InMemoryDataStore) -> TransactionChainManager<InMemoryDataStore> {
        TransactionChainManager::new(DEVICE, Arc::new(store.clone()), Handle::current())
    }

    fn port_path(port: usize) -> InstancePath {
        InstancePath::node(DEVICE).child("port").child(port.to_string())
    }

    // =============================================================================
    // BATCHING
    // =============================================================================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_producers_share_one_transaction() {
        let store = InMemoryDataStore::new();
        let manager = create_manager(&store);
        manager.activate_then_submit().unwrap();

        let producers: Vec<_> = (0..8)
            .map(|producer| {
                let manager = manager.clone();
                tokio::spawn(async move {
                    for i in 0..25 {
                        let port = producer * 100 + i;
                        manager
                            .write(LogicalDatastore::Operational, port_path(port), json!(port))
                            .unwrap();
                    }
                })
            })
            .collect();
        for result in futures::future::join_all(producers).await {
            result.unwrap();
        }

        assert!(manager.submit());
        manager.last_submit_result().await.unwrap();

        let committed = store.committed();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].mutations.len(), 200);
        let paths: HashSet<_> = committed[0]
            .mutations
            .iter()
            .map(|m| m.path().to_string())
            .collect();
        assert_eq!(paths.len(), 200);
        assert_eq!(store.transactions_allocated(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_interleaved_submits_never_split_a_mutation() {
        let store = InMemoryDataStore::new();
        let manager = create_manager(&store);
        manager.activate_then_submit().unwrap();

        let writer = {
            let manager = manager.clone();
            tokio::spawn(async move {
                for port in 0..500 {
                    manager
                        .write(LogicalDatastore::Operational, port_path(port), json!(port))
                        .unwrap();
                    if port % 7 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
            })
        };
        let flusher = {
            let manager = manager.clone();
            tokio::spawn(async move {
                for _ in 0..100 {
                    assert!(manager.submit());
                    tokio::task::yield_now().await;
                }
            })
        };
        writer.await.unwrap();
        flusher.await.unwrap();
        assert!(manager.submit());
        manager.last_submit_result().await.unwrap();

        // every staged write committed exactly once, in staging order
        let ports: Vec<u64> = store
            .committed()
            .iter()
            .flat_map(|tx| tx.mutations.iter())
            .map(|m| match m {
                Mutation::Put { data, .. } => data.as_u64().unwrap(),
                Mutation::Delete { .. } => panic!("unexpected delete"),
            })
            .collect();
        assert_eq!(ports, (0..500).collect::<Vec<u64>>());
    }

    // =============================================================================
    // GATING
    // =============================================================================

    #[tokio::test]
    async fn test_writes_refused_after_mastership_loss() {
        let store = InMemoryDataStore::new();
        let manager = create_manager(&store);
        manager.activate_then_submit().unwrap();
        manager
            .write(LogicalDatastore::Operational, port_path(1), json!(1))
            .unwrap();

        manager.deactivate().await.unwrap();

        let err = manager
            .write(LogicalDatastore::Operational, port_path(2), json!(2))
            .unwrap_err();
        assert!(matches!(err, ChainManagerError::NoActiveTransaction { .. }));
        assert!(!manager.submit());

        // only the batch staged while master reached the store
        assert_eq!(store.committed().len(), 1);
        assert_eq!(
            store.read(LogicalDatastore::Operational, &port_path(1)),
            Some(json!(1))
        );
        assert_eq!(store.read(LogicalDatastore::Operational, &port_path(2)), None);
    }

    #[tokio::test]
    async fn test_configuration_and_operational_in_one_batch() {
        let store = InMemoryDataStore::new();
        let manager = create_manager(&store);
        manager.activate_then_submit().unwrap();

        let node = InstancePath::node(DEVICE);
        manager
            .write(LogicalDatastore::Configuration, node.child("flow").child("1"), json!({ "priority": 10 }))
            .unwrap();
        manager
            .write(LogicalDatastore::Operational, node.child("flow").child("1"), json!({ "packets": 0 }))
            .unwrap();
        manager.submit();
        manager.last_submit_result().await.unwrap();

        assert_eq!(store.committed()[0].mutations.len(), 2);
        assert_eq!(store.object_count(LogicalDatastore::Configuration), 1);
        assert_eq!(store.object_count(LogicalDatastore::Operational), 1);
    }

    // =============================================================================
    // FLUSH TICKER
    // =============================================================================

    #[tokio::test]
    async fn test_flush_ticker_commits_staged_writes() {
        let store = InMemoryDataStore::new();
        let registry = Arc::new(DeviceRegistry::new(Arc::new(store.clone()), Handle::current()));
        let manager = registry.connect(DEVICE).unwrap();
        manager.activate_then_submit().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let ticker = tokio::spawn(run_flush_loop(
            Arc::clone(&registry),
            Duration::from_millis(10),
            shutdown_rx,
        ));

        for port in 0..3 {
            manager
                .write(LogicalDatastore::Operational, port_path(port), json!(port))
                .unwrap();
        }

        timeout(Duration::from_secs(2), async {
            while store.object_count(LogicalDatastore::Operational) < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("flush ticker never committed the staged writes");

        shutdown_tx.send(true).unwrap();
        ticker.await.unwrap();
        registry.shutdown_all().await;
        assert_eq!(manager.status(), ChainManagerStatus::ShuttingDown);
    }
}
