//! Transaction Chain Manager - per-device write serialization
//!
//! One manager per device. It owns the device's transaction chain and at most
//! one pending write transaction, and decides when writes are legal based on
//! mastership.
//!
//! ## Locking
//!
//! All mutable state sits behind one `parking_lot::Mutex`. The invariants span
//! several fields, so they are updated together in one critical section. No
//! store call made under the lock waits on I/O: chain creation, chain close
//! and commit all return immediately.
//!
//! Lock order is manager → store. The store reports chain failure through a
//! listener that only holds a weak reference back to the manager, from a
//! thread that does not hold any store lock.

use crate::domain::{
    transition, ChainId, ChainManagerStatus, DataObject, DeviceId, InstancePath,
    LifecycleOperation, LogicalDatastore, TransactionId, Transition,
};
use crate::error::{ChainManagerError, ChainManagerResult};
use crate::metrics;
use crate::ports::inbound::{MastershipControl, TransactionWriter};
use crate::ports::outbound::{
    completed, ChainError, CommitError, CommitResult, CompletionSignal, TransactionChain,
    TransactionChainFactory, TransactionChainListener, WriteTransaction,
};
use futures::FutureExt;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tracing::{debug, error, trace, warn};

type ChainOf<F> = <F as TransactionChainFactory>::Chain;
type TxOf<F> = <ChainOf<F> as TransactionChain>::Transaction;

/// Status together with the handles that status is allowed to own.
///
/// `Sleeping` owns nothing, only `Working` can hold a pending transaction.
enum Lifecycle<F: TransactionChainFactory> {
    Sleeping,
    Working {
        /// `None` only if recreating the chain after a failure was refused
        chain: Option<ChainOf<F>>,
        pending: Option<TxOf<F>>,
    },
    ShuttingDown {
        /// `None` once `finalize_close` released it
        chain: Option<ChainOf<F>>,
    },
}

impl<F: TransactionChainFactory> Lifecycle<F> {
    fn status(&self) -> ChainManagerStatus {
        match self {
            Self::Sleeping => ChainManagerStatus::Sleeping,
            Self::Working { .. } => ChainManagerStatus::Working,
            Self::ShuttingDown { .. } => ChainManagerStatus::ShuttingDown,
        }
    }

    fn chain(&self) -> Option<&ChainOf<F>> {
        match self {
            Self::Sleeping => None,
            Self::Working { chain, .. } | Self::ShuttingDown { chain } => chain.as_ref(),
        }
    }

    fn has_pending(&self) -> bool {
        matches!(self, Self::Working { pending: Some(_), .. })
    }

    fn take_pending(&mut self) -> Option<TxOf<F>> {
        match self {
            Self::Working { pending, .. } => pending.take(),
            Self::Sleeping | Self::ShuttingDown { .. } => None,
        }
    }

    /// Dissolve into the chain handle, dropping everything else
    fn into_chain(self) -> Option<ChainOf<F>> {
        match self {
            Self::Sleeping => None,
            Self::Working { chain, .. } | Self::ShuttingDown { chain } => chain,
        }
    }
}

struct ManagerState<F: TransactionChainFactory> {
    lifecycle: Lifecycle<F>,
    /// Only ever true while a chain exists
    submit_enabled: bool,
    /// Tail of in-flight work; resolved success until the first submit
    last_submit: CompletionSignal,
}

struct ManagerShared<F: TransactionChainFactory> {
    device_id: DeviceId,
    factory: Arc<F>,
    runtime: Handle,
    /// Registered with every chain this manager opens
    listener: Arc<dyn TransactionChainListener>,
    state: Mutex<ManagerState<F>>,
}

/// Per-device transaction chain lifecycle manager.
///
/// Cheap to clone; clones share the same state. Producers use it through
/// [`TransactionWriter`], the mastership orchestrator through
/// [`MastershipControl`].
pub struct TransactionChainManager<F: TransactionChainFactory> {
    shared: Arc<ManagerShared<F>>,
}

impl<F: TransactionChainFactory> Clone for TransactionChainManager<F> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<F: TransactionChainFactory> std::fmt::Debug for TransactionChainManager<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionChainManager").finish_non_exhaustive()
    }
}

impl<F: TransactionChainFactory> TransactionChainManager<F> {
    /// Create a manager in `Sleeping` status.
    ///
    /// `runtime` drives commit observers and deferred chain closes.
    pub fn new(device_id: impl Into<DeviceId>, factory: Arc<F>, runtime: Handle) -> Self {
        let device_id = device_id.into();
        debug!(device_id = %device_id, "Created transaction chain manager");

        let shared = Arc::new_cyclic(|manager: &Weak<ManagerShared<F>>| ManagerShared {
            device_id,
            factory,
            runtime,
            listener: Arc::new(ChainFailureListener {
                manager: manager.clone(),
            }),
            state: Mutex::new(ManagerState {
                lifecycle: Lifecycle::Sleeping,
                submit_enabled: false,
                last_submit: completed(),
            }),
        });

        Self { shared }
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.shared.device_id
    }

    pub fn status(&self) -> ChainManagerStatus {
        self.shared.state.lock().lifecycle.status()
    }

    pub fn has_chain(&self) -> bool {
        self.shared.state.lock().lifecycle.chain().is_some()
    }

    /// Id of the currently open chain, if any
    pub fn chain_id(&self) -> Option<ChainId> {
        self.shared
            .state
            .lock()
            .lifecycle
            .chain()
            .map(TransactionChain::id)
    }

    pub fn has_pending_transaction(&self) -> bool {
        self.shared.state.lock().lifecycle.has_pending()
    }

    pub fn is_submit_enabled(&self) -> bool {
        self.shared.state.lock().submit_enabled
    }

    /// Completion signal of the most recently submitted transaction
    pub fn last_submit_result(&self) -> CompletionSignal {
        self.shared.state.lock().last_submit.clone()
    }
}

impl<F: TransactionChainFactory> ManagerShared<F> {
    fn activate(&self) -> ChainManagerResult<()> {
        let mut state = self.state.lock();
        let from = state.lifecycle.status();
        trace!(
            device_id = %self.device_id,
            submit_enabled = state.submit_enabled,
            "activate requested"
        );

        if transition(from, LifecycleOperation::Activate) != Transition::Move(ChainManagerStatus::Working) {
            debug!(device_id = %self.device_id, status = %from, "Transaction chain already active");
            return Err(ChainManagerError::InvalidTransition {
                from,
                operation: LifecycleOperation::Activate,
            });
        }

        let chain = self.open_chain().map_err(|source| {
            error!(device_id = %self.device_id, error = %source, "Failed to create transaction chain");
            ChainManagerError::ChainCreation {
                device_id: self.device_id.clone(),
                source,
            }
        })?;
        debug!(device_id = %self.device_id, chain_id = %chain.id(), "Transaction chain created");

        state.lifecycle = Lifecycle::Working {
            chain: Some(chain),
            pending: None,
        };
        state.submit_enabled = false;
        metrics::record_working(true);
        Ok(())
    }

    fn enable_submit(&self) {
        let mut state = self.state.lock();
        // never enabled without a chain
        state.submit_enabled = state.lifecycle.chain().is_some();
        trace!(device_id = %self.device_id, submit_enabled = state.submit_enabled, "enable_submit");
    }

    fn stage<A>(&self, apply: A) -> ChainManagerResult<()>
    where
        A: FnOnce(&mut TxOf<F>),
    {
        let mut state = self.state.lock();
        let tx = self.pending_transaction(&mut state)?;
        apply(tx);
        Ok(())
    }

    /// Single get-or-create accessor for the pending transaction
    fn pending_transaction<'a>(
        &self,
        state: &'a mut ManagerState<F>,
    ) -> ChainManagerResult<&'a mut TxOf<F>> {
        let status = state.lifecycle.status();
        let Lifecycle::Working {
            chain: Some(chain),
            pending,
        } = &mut state.lifecycle
        else {
            metrics::record_write_rejected();
            debug!(device_id = %self.device_id, status = %status, "Write rejected: no active transaction");
            return Err(self.no_active_transaction());
        };

        if pending.is_none() {
            let tx = chain.new_write_transaction().map_err(|source| {
                warn!(device_id = %self.device_id, error = %source, "Failed to allocate write transaction");
                ChainManagerError::TransactionAllocation {
                    device_id: self.device_id.clone(),
                    source,
                }
            })?;
            trace!(device_id = %self.device_id, tx_id = %tx.id(), "Opened write transaction");
            *pending = Some(tx);
        }

        pending.as_mut().ok_or_else(|| self.no_active_transaction())
    }

    fn no_active_transaction(&self) -> ChainManagerError {
        ChainManagerError::NoActiveTransaction {
            device_id: self.device_id.clone(),
        }
    }

    fn submit(&self) -> bool {
        let mut state = self.state.lock();
        if !state.submit_enabled {
            trace!(device_id = %self.device_id, "Transaction not committed - submit blocked");
            return false;
        }

        let Some(tx) = state.lifecycle.take_pending() else {
            trace!(device_id = %self.device_id, "Nothing to commit - submit returns true");
            return true;
        };

        self.commit_locked(&mut state, tx);
        true
    }

    /// Hand `tx` to the store and record its signal as the new tail.
    /// Never waits for the commit.
    fn commit_locked(&self, state: &mut ManagerState<F>, tx: TxOf<F>) -> CompletionSignal {
        let tx_id = tx.id();
        let device_id = self.device_id.clone();

        let signal = tx
            .commit()
            .inspect(move |outcome| log_commit_outcome(&device_id, tx_id, outcome))
            .boxed()
            .shared();

        // keeps the observer running when nobody waits on the signal
        self.runtime.spawn(signal.clone().map(|_| ()));

        debug!(device_id = %self.device_id, tx_id = %tx_id, "Transaction submitted");
        metrics::record_commit_submitted();
        state.last_submit = signal.clone();
        signal
    }

    /// Disable submission, then flush whatever is outstanding.
    ///
    /// Once the returned signal resolves no pending transaction exists.
    fn drain_locked(&self, state: &mut ManagerState<F>) -> CompletionSignal {
        state.submit_enabled = false;

        if let Some(tx) = state.lifecycle.take_pending() {
            return self.commit_locked(state, tx);
        }

        if state.lifecycle.chain().is_some() {
            state.last_submit.clone()
        } else {
            completed()
        }
    }

    fn deactivate(&self) -> CompletionSignal {
        let mut state = self.state.lock();
        let from = state.lifecycle.status();

        if transition(from, LifecycleOperation::Deactivate) == Transition::Ignore {
            debug!(device_id = %self.device_id, status = %from, "Ignoring redundant deactivate");
            return completed();
        }

        debug!(device_id = %self.device_id, "Submitting all transactions before going to sleep");
        let drain = self.drain_locked(&mut state);
        let chain = std::mem::replace(&mut state.lifecycle, Lifecycle::Sleeping).into_chain();
        metrics::record_working(false);
        drop(state);

        let device_id = self.device_id.clone();
        let signal = async move {
            let outcome = drain.await;
            // closed whatever the drain outcome was
            if let Some(chain) = chain {
                close_chain(&device_id, &chain);
            }
            debug!(device_id = %device_id, "Transaction chain released after deactivation");
            outcome
        }
        .boxed()
        .shared();

        self.runtime.spawn(signal.clone().map(|_| ()));
        signal
    }

    fn begin_shutdown(&self) -> CompletionSignal {
        let mut state = self.state.lock();
        let from = state.lifecycle.status();
        debug!(device_id = %self.device_id, status = %from, "Transaction chain manager is shutting down");

        let drain = self.drain_locked(&mut state);
        if let Transition::Move(_) = transition(from, LifecycleOperation::BeginShutdown) {
            let chain = std::mem::replace(&mut state.lifecycle, Lifecycle::Sleeping).into_chain();
            state.lifecycle = Lifecycle::ShuttingDown { chain };
            if from == ChainManagerStatus::Working {
                metrics::record_working(false);
            }
        }
        drain
    }

    fn finalize_close(&self) -> ChainManagerResult<()> {
        let mut state = self.state.lock();
        let from = state.lifecycle.status();

        match (&mut state.lifecycle, transition(from, LifecycleOperation::FinalizeClose)) {
            (Lifecycle::ShuttingDown { chain }, Transition::Move(_)) => {
                if let Some(chain) = chain.take() {
                    close_chain(&self.device_id, &chain);
                    debug!(device_id = %self.device_id, chain_id = %chain.id(), "Transaction chain closed");
                }
                Ok(())
            }
            _ => {
                error!(device_id = %self.device_id, status = %from, "finalize_close called before begin_shutdown");
                Err(ChainManagerError::InvalidTransition {
                    from,
                    operation: LifecycleOperation::FinalizeClose,
                })
            }
        }
    }

    /// Replace a failed chain. Reports about other chains, or arriving outside
    /// `Working`, are stale and ignored.
    fn recover_from_chain_failure(
        &self,
        failed: ChainId,
        tx_id: Option<TransactionId>,
        cause: &ChainError,
    ) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let status = state.lifecycle.status();
        let Lifecycle::Working { chain, pending } = &mut state.lifecycle else {
            debug!(
                device_id = %self.device_id,
                chain_id = %failed,
                status = %status,
                "Ignoring chain failure outside working status"
            );
            return;
        };

        if chain.as_ref().map(TransactionChain::id) != Some(failed) {
            debug!(device_id = %self.device_id, chain_id = %failed, "Ignoring failure of a replaced chain");
            return;
        }

        warn!(
            device_id = %self.device_id,
            chain_id = %failed,
            tx_id = ?tx_id,
            error = %cause,
            "Transaction chain failed -> recreating"
        );

        if let Some(lost) = pending.take() {
            warn!(device_id = %self.device_id, tx_id = %lost.id(), "Discarding uncommitted transaction");
        }
        if let Some(old) = chain.take() {
            close_chain(&self.device_id, &old);
        }

        match self.open_chain() {
            Ok(fresh) => {
                debug!(device_id = %self.device_id, chain_id = %fresh.id(), "Transaction chain recreated");
                *chain = Some(fresh);
                metrics::record_chain_recreated();
            }
            Err(e) => {
                // submit stays off until a chain exists again
                state.submit_enabled = false;
                error!(
                    device_id = %self.device_id,
                    error = %e,
                    "Failed to recreate transaction chain, writes rejected until reactivation"
                );
            }
        }
    }

    fn open_chain(&self) -> Result<ChainOf<F>, ChainError> {
        self.factory.create_chain(Arc::clone(&self.listener))
    }
}

/// Best-effort close; a failing close is logged and otherwise ignored
fn close_chain<C: TransactionChain>(device_id: &DeviceId, chain: &C) {
    if let Err(e) = chain.close() {
        warn!(device_id = %device_id, chain_id = %chain.id(), error = %e, "Closing transaction chain failed");
    }
}

fn log_commit_outcome(device_id: &DeviceId, tx_id: TransactionId, outcome: &CommitResult) {
    match outcome {
        Ok(()) => trace!(device_id = %device_id, tx_id = %tx_id, "Transaction committed"),
        Err(e @ CommitError::Rejected { .. }) => {
            metrics::record_commit_failed();
            error!(device_id = %device_id, tx_id = %tx_id, error = %e, "Transaction commit failed");
        }
        Err(e) => {
            metrics::record_commit_failed();
            error!(device_id = %device_id, tx_id = %tx_id, error = %e, "Exception during transaction submitting");
        }
    }
}

/// Listener handed to the store with every chain
struct ChainFailureListener<F: TransactionChainFactory> {
    manager: Weak<ManagerShared<F>>,
}

impl<F: TransactionChainFactory> TransactionChainListener for ChainFailureListener<F> {
    fn on_chain_failed(&self, chain_id: ChainId, tx_id: Option<TransactionId>, cause: &ChainError) {
        if let Some(manager) = self.manager.upgrade() {
            manager.recover_from_chain_failure(chain_id, tx_id, cause);
        }
    }

    fn on_chain_succeeded(&self, chain_id: ChainId) {
        trace!(chain_id = %chain_id, "Transaction chain completed");
    }
}

impl<F: TransactionChainFactory> TransactionWriter for TransactionChainManager<F> {
    fn device_id(&self) -> &DeviceId {
        &self.shared.device_id
    }

    fn write(
        &self,
        store: LogicalDatastore,
        path: InstancePath,
        data: DataObject,
    ) -> ChainManagerResult<()> {
        self.shared.stage(|tx| {
            trace!(store = %store, path = %path, "write staged");
            tx.put(store, path, data);
        })
    }

    fn delete(&self, store: LogicalDatastore, path: InstancePath) -> ChainManagerResult<()> {
        self.shared.stage(|tx| {
            trace!(store = %store, path = %path, "delete staged");
            tx.delete(store, path);
        })
    }

    fn submit(&self) -> bool {
        self.shared.submit()
    }
}

impl<F: TransactionChainFactory> MastershipControl for TransactionChainManager<F> {
    fn device_id(&self) -> &DeviceId {
        &self.shared.device_id
    }

    fn status(&self) -> ChainManagerStatus {
        TransactionChainManager::status(self)
    }

    fn activate(&self) -> ChainManagerResult<()> {
        self.shared.activate()
    }

    fn enable_submit(&self) {
        self.shared.enable_submit();
    }

    fn activate_then_submit(&self) -> ChainManagerResult<bool> {
        self.shared.activate()?;
        self.shared.enable_submit();
        Ok(self.shared.submit())
    }

    fn deactivate(&self) -> CompletionSignal {
        self.shared.deactivate()
    }

    fn begin_shutdown(&self) -> CompletionSignal {
        self.shared.begin_shutdown()
    }

    fn finalize_close(&self) -> ChainManagerResult<()> {
        self.shared.finalize_close()
    }
}
