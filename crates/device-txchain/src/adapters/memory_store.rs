//! In-memory data store with ordered transaction chains.
//!
//! Applies committed mutations to one tree per logical datastore and keeps a
//! commit log. Fault injection hooks let tests reject commits, fail chains,
//! refuse chain creation and hold commits in flight.

use crate::domain::{
    ChainId, DataObject, InstancePath, LogicalDatastore, Mutation, TransactionId,
};
use crate::ports::outbound::{
    ChainError, CommitError, CommitFuture, TransactionChain, TransactionChainFactory,
    TransactionChainListener, WriteTransaction,
};
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, trace};

/// A transaction the store has applied
#[derive(Clone, Debug, PartialEq)]
pub struct CommittedTransaction {
    pub tx_id: TransactionId,
    pub chain_id: ChainId,
    pub mutations: Vec<Mutation>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ChainStatus {
    Open,
    Failed,
}

struct ChainRecord {
    status: ChainStatus,
    listener: Arc<dyn TransactionChainListener>,
}

/// Commit waiting for `release_commits`
struct HeldCommit {
    record: CommittedTransaction,
    reply: oneshot::Sender<Result<(), CommitError>>,
}

#[derive(Default)]
struct StoreState {
    trees: HashMap<LogicalDatastore, BTreeMap<InstancePath, DataObject>>,
    log: Vec<CommittedTransaction>,
    /// Open and failed chains; a record is dropped when its chain is closed
    chains: HashMap<ChainId, ChainRecord>,
    chains_created: usize,
    chains_closed: usize,
    transactions_allocated: usize,
    refuse_chains: bool,
    reject_next: Option<String>,
    paused: bool,
    held: VecDeque<HeldCommit>,
}

impl StoreState {
    fn apply(&mut self, record: CommittedTransaction) {
        for mutation in &record.mutations {
            let tree = self.trees.entry(mutation.store()).or_default();
            match mutation {
                Mutation::Put { path, data, .. } => {
                    tree.insert(path.clone(), data.clone());
                }
                Mutation::Delete { path, .. } => {
                    tree.retain(|key, _| !key.starts_with(path));
                }
            }
        }
        trace!(tx_id = %record.tx_id, chain_id = %record.chain_id, "Transaction applied");
        self.log.push(record);
    }

    fn chain_status(&self, chain_id: ChainId) -> Option<ChainStatus> {
        self.chains.get(&chain_id).map(|record| record.status)
    }
}

struct StoreInner {
    next_chain_id: AtomicU64,
    state: Mutex<StoreState>,
}

/// In-memory [`TransactionChainFactory`].
///
/// Clones share the same store.
#[derive(Clone)]
pub struct InMemoryDataStore {
    inner: Arc<StoreInner>,
}

impl InMemoryDataStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                next_chain_id: AtomicU64::new(1),
                state: Mutex::new(StoreState::default()),
            }),
        }
    }

    /// Current value at `path`, if any
    pub fn read(&self, store: LogicalDatastore, path: &InstancePath) -> Option<DataObject> {
        let state = self.inner.state.lock();
        state.trees.get(&store)?.get(path).cloned()
    }

    /// Number of objects stored in `store`
    pub fn object_count(&self, store: LogicalDatastore) -> usize {
        let state = self.inner.state.lock();
        state.trees.get(&store).map_or(0, BTreeMap::len)
    }

    /// Applied transactions in commit order
    pub fn committed(&self) -> Vec<CommittedTransaction> {
        self.inner.state.lock().log.clone()
    }

    pub fn chains_created(&self) -> usize {
        self.inner.state.lock().chains_created
    }

    pub fn chains_closed(&self) -> usize {
        self.inner.state.lock().chains_closed
    }

    pub fn transactions_allocated(&self) -> usize {
        self.inner.state.lock().transactions_allocated
    }

    pub fn open_chains(&self) -> Vec<ChainId> {
        let state = self.inner.state.lock();
        let mut open: Vec<ChainId> = state
            .chains
            .iter()
            .filter(|(_, record)| record.status == ChainStatus::Open)
            .map(|(id, _)| *id)
            .collect();
        open.sort();
        open
    }

    pub fn held_commits(&self) -> usize {
        self.inner.state.lock().held.len()
    }

    /// Make `create_chain` fail until switched off again
    pub fn refuse_chain_creation(&self, refuse: bool) {
        self.inner.state.lock().refuse_chains = refuse;
    }

    /// Reject the next commit with `reason`. The owning chain fails with it
    /// and its listener is notified from a separate thread.
    pub fn reject_next_commit(&self, reason: impl Into<String>) {
        self.inner.state.lock().reject_next = Some(reason.into());
    }

    /// Keep commits in flight until [`release_commits`](Self::release_commits)
    pub fn pause_commits(&self) {
        self.inner.state.lock().paused = true;
    }

    /// Apply every held commit in order and resume immediate commits
    pub fn release_commits(&self) {
        let mut state = self.inner.state.lock();
        state.paused = false;
        while let Some(held) = state.held.pop_front() {
            state.apply(held.record);
            // the committer may have stopped waiting
            let _ = held.reply.send(Ok(()));
        }
    }

    /// Fail an open chain and notify its listener on the calling thread.
    ///
    /// Held commits of that chain resolve with `ChainFailed`. Returns `false`
    /// if the chain was not open.
    pub fn fail_chain(&self, chain_id: ChainId, reason: impl Into<String>) -> bool {
        let listener = {
            let mut state = self.inner.state.lock();
            let Some(record) = state.chains.get_mut(&chain_id) else {
                return false;
            };
            if record.status != ChainStatus::Open {
                return false;
            }
            record.status = ChainStatus::Failed;
            let listener = Arc::clone(&record.listener);

            let held = std::mem::take(&mut state.held);
            for commit in held {
                if commit.record.chain_id == chain_id {
                    let _ = commit.reply.send(Err(CommitError::ChainFailed {
                        tx_id: commit.record.tx_id,
                        chain_id,
                    }));
                } else {
                    state.held.push_back(commit);
                }
            }
            listener
        };

        debug!(chain_id = %chain_id, "Chain failed by request");
        listener.on_chain_failed(
            chain_id,
            None,
            &ChainError::Failed {
                chain_id,
                reason: reason.into(),
            },
        );
        true
    }

    fn commit(&self, tx: InMemoryWriteTransaction) -> CommitFuture {
        let mut state = self.inner.state.lock();
        let record = CommittedTransaction {
            tx_id: tx.id,
            chain_id: tx.chain_id,
            mutations: tx.mutations,
        };

        match state.chain_status(record.chain_id) {
            Some(ChainStatus::Open) => {}
            _ => {
                return futures::future::ready(Err(CommitError::ChainFailed {
                    tx_id: record.tx_id,
                    chain_id: record.chain_id,
                }))
                .boxed();
            }
        }

        if let Some(reason) = state.reject_next.take() {
            let chain_id = record.chain_id;
            let tx_id = record.tx_id;
            if let Some(chain) = state.chains.get_mut(&chain_id) {
                chain.status = ChainStatus::Failed;
                let listener = Arc::clone(&chain.listener);
                let cause = ChainError::Failed {
                    chain_id,
                    reason: reason.clone(),
                };
                std::thread::spawn(move || listener.on_chain_failed(chain_id, Some(tx_id), &cause));
            }
            debug!(tx_id = %tx_id, reason = %reason, "Commit rejected");
            return futures::future::ready(Err(CommitError::Rejected { tx_id, reason })).boxed();
        }

        if state.paused {
            let (reply, outcome) = oneshot::channel();
            state.held.push_back(HeldCommit { record, reply });
            return outcome
                .map(|received| received.unwrap_or(Err(CommitError::Dropped)))
                .boxed();
        }

        state.apply(record);
        futures::future::ready(Ok(())).boxed()
    }
}

impl Default for InMemoryDataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionChainFactory for InMemoryDataStore {
    type Chain = InMemoryChain;

    fn create_chain(
        &self,
        listener: Arc<dyn TransactionChainListener>,
    ) -> Result<InMemoryChain, ChainError> {
        let mut state = self.inner.state.lock();
        if state.refuse_chains {
            return Err(ChainError::CreationFailed(
                "data store refuses new chains".into(),
            ));
        }

        let id = ChainId(self.inner.next_chain_id.fetch_add(1, Ordering::Relaxed));
        state.chains.insert(
            id,
            ChainRecord {
                status: ChainStatus::Open,
                listener,
            },
        );
        state.chains_created += 1;
        debug!(chain_id = %id, "Chain opened");

        Ok(InMemoryChain {
            id,
            store: self.clone(),
        })
    }
}

/// Chain handed out by [`InMemoryDataStore`]
pub struct InMemoryChain {
    id: ChainId,
    store: InMemoryDataStore,
}

impl TransactionChain for InMemoryChain {
    type Transaction = InMemoryWriteTransaction;

    fn id(&self) -> ChainId {
        self.id
    }

    fn new_write_transaction(&self) -> Result<InMemoryWriteTransaction, ChainError> {
        let mut state = self.store.inner.state.lock();
        match state.chain_status(self.id) {
            Some(ChainStatus::Open) => {}
            Some(ChainStatus::Failed) => {
                return Err(ChainError::Failed {
                    chain_id: self.id,
                    reason: "chain already failed".into(),
                })
            }
            None => return Err(ChainError::Closed(self.id)),
        }
        state.transactions_allocated += 1;

        Ok(InMemoryWriteTransaction {
            id: TransactionId::new_v4(),
            chain_id: self.id,
            mutations: Vec::new(),
            store: self.store.clone(),
        })
    }

    fn close(&self) -> Result<(), ChainError> {
        let mut state = self.store.inner.state.lock();
        let Some(record) = state.chains.remove(&self.id) else {
            return Err(ChainError::Closed(self.id));
        };
        state.chains_closed += 1;
        debug!(chain_id = %self.id, "Chain closed");

        if record.status == ChainStatus::Open {
            let id = self.id;
            let listener = record.listener;
            std::thread::spawn(move || listener.on_chain_succeeded(id));
        }
        Ok(())
    }
}

/// Write transaction staging mutations until commit
pub struct InMemoryWriteTransaction {
    id: TransactionId,
    chain_id: ChainId,
    mutations: Vec<Mutation>,
    store: InMemoryDataStore,
}

impl InMemoryWriteTransaction {
    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }
}

impl WriteTransaction for InMemoryWriteTransaction {
    fn id(&self) -> TransactionId {
        self.id
    }

    fn put(&mut self, store: LogicalDatastore, path: InstancePath, data: DataObject) {
        self.mutations.push(Mutation::Put { store, path, data });
    }

    fn delete(&mut self, store: LogicalDatastore, path: InstancePath) {
        self.mutations.push(Mutation::Delete { store, path });
    }

    fn commit(self) -> CommitFuture {
        let store = self.store.clone();
        store.commit(self)
    }
}
