//! # Failure Recovery Tests
//!
//! The data store may fail a chain at any time. The manager replaces the
//! chain, drops the uncommitted batch and keeps accepting writes; commits that
//! were already in flight resolve with the chain's failure.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use device_txchain::{
        ChainManagerError, ChainManagerStatus, CommitError, InMemoryDataStore, InstancePath,
        LogicalDatastore, MastershipControl, TransactionChainManager, TransactionWriter,
    };
    use serde_json::json;
    use tokio::runtime::Handle;
    use tokio::time::timeout;

    const DEVICE: &str = "openflow:11";

    fn create_manager(store: &InMemoryDataStore) -> TransactionChainManager<InMemoryDataStore> {
        TransactionChainManager::new(DEVICE, Arc::new(store.clone()), Handle::current())
    }

    fn stage(manager: &TransactionChainManager<InMemoryDataStore>, leaf: &str) {
        manager
            .write(
                LogicalDatastore::Operational,
                InstancePath::node(DEVICE).child(leaf),
                json!(leaf),
            )
            .unwrap();
    }

    #[tokio::test]
    async fn test_in_flight_commit_fails_with_its_chain() {
        let store = InMemoryDataStore::new();
        let manager = create_manager(&store);
        manager.activate_then_submit().unwrap();
        let failed_chain = manager.chain_id().unwrap();

        store.pause_commits();
        stage(&manager, "in-flight");
        assert!(manager.submit());
        stage(&manager, "staged");

        store.fail_chain(failed_chain, "backend restarted");

        let outcome = manager.last_submit_result().await;
        assert!(matches!(outcome, Err(CommitError::ChainFailed { chain_id, .. }) if chain_id == failed_chain));
        assert!(!manager.has_pending_transaction());
        assert_ne!(manager.chain_id(), Some(failed_chain));

        // recovery keeps submission enabled
        store.release_commits();
        stage(&manager, "after");
        assert!(manager.submit());
        manager.last_submit_result().await.unwrap();

        let committed = store.committed();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].mutations.len(), 1);
        assert_eq!(
            store.read(LogicalDatastore::Operational, &InstancePath::node(DEVICE).child("staged")),
            None
        );
    }

    #[tokio::test]
    async fn test_refused_recreation_rejects_writes_until_reactivation() {
        let store = InMemoryDataStore::new();
        let manager = create_manager(&store);
        manager.activate_then_submit().unwrap();
        let chain = manager.chain_id().unwrap();

        store.refuse_chain_creation(true);
        store.fail_chain(chain, "disk full");

        assert_eq!(manager.status(), ChainManagerStatus::Working);
        assert!(!manager.has_chain());
        assert!(!manager.is_submit_enabled());
        assert!(!manager.submit());
        let err = manager
            .write(LogicalDatastore::Operational, InstancePath::node(DEVICE), json!({}))
            .unwrap_err();
        assert!(matches!(err, ChainManagerError::NoActiveTransaction { .. }));

        // draining without a chain resolves at once
        manager.deactivate().await.unwrap();
        store.refuse_chain_creation(false);
        manager.activate_then_submit().unwrap();

        stage(&manager, "recovered");
        manager.submit();
        manager.last_submit_result().await.unwrap();
        assert_eq!(store.committed().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rejected_commit_replaces_chain_asynchronously() {
        let store = InMemoryDataStore::new();
        let manager = create_manager(&store);
        manager.activate_then_submit().unwrap();
        let first = manager.chain_id().unwrap();

        store.reject_next_commit("schema violation");
        stage(&manager, "bad");
        assert!(manager.submit());
        assert!(matches!(
            manager.last_submit_result().await,
            Err(CommitError::Rejected { .. })
        ));

        timeout(Duration::from_secs(2), async {
            while manager.chain_id() == Some(first) || !manager.has_chain() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("chain was never replaced");

        stage(&manager, "good");
        assert!(manager.submit());
        manager.last_submit_result().await.unwrap();
        assert_eq!(store.committed().len(), 1);
        assert_eq!(store.chains_created(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_drain_survives_rejection() {
        let store = InMemoryDataStore::new();
        let manager = create_manager(&store);
        manager.activate().unwrap();
        stage(&manager, "last");
        store.reject_next_commit("conflict");

        let outcome = manager.begin_shutdown().await;
        assert!(matches!(outcome, Err(CommitError::Rejected { .. })));

        // failure during shutdown does not bring a chain back
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.chains_created(), 1);

        manager.finalize_close().unwrap();
        assert_eq!(manager.status(), ChainManagerStatus::ShuttingDown);
        assert!(!manager.has_chain());
        assert_eq!(store.chains_closed(), 1);
    }
}
