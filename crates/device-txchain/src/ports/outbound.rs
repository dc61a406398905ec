//! Driven Ports (SPI - Outbound Dependencies)
//!
//! The data store side of the manager: a factory of ordered transaction
//! chains, the chains themselves, and the write transactions they hand out.
//! Ordering of transactions submitted on one chain is the store's guarantee.
//!
//! None of these calls may block on I/O. Commit returns a future; chain
//! failure is reported later through [`TransactionChainListener`] from
//! whatever thread the store uses for notifications.

use crate::domain::{ChainId, DataObject, InstancePath, LogicalDatastore, TransactionId};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use thiserror::Error;

/// Chain-level errors reported by the data store
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    /// Chain was already closed
    #[error("Transaction chain {0} is closed")]
    Closed(ChainId),

    /// Chain failed and no longer accepts transactions
    #[error("Transaction chain {chain_id} failed: {reason}")]
    Failed { chain_id: ChainId, reason: String },

    /// Store could not open a new chain
    #[error("Transaction chain creation failed: {0}")]
    CreationFailed(String),

    /// Any other backend error
    #[error("Data store error: {0}")]
    Backend(String),
}

/// Outcome of a commit that did not succeed.
///
/// `Clone` so a completion signal can be observed by several waiters.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CommitError {
    /// Store rejected the transaction (validation, conflict, ...)
    #[error("Transaction {tx_id} rejected: {reason}")]
    Rejected { tx_id: TransactionId, reason: String },

    /// Owning chain failed before the transaction was applied
    #[error("Transaction {tx_id} lost: chain {chain_id} failed")]
    ChainFailed {
        tx_id: TransactionId,
        chain_id: ChainId,
    },

    /// Store dropped the commit without reporting an outcome
    #[error("Commit outcome dropped by the data store")]
    Dropped,
}

/// Result of one commit
pub type CommitResult = Result<(), CommitError>;

/// Future returned by [`WriteTransaction::commit`]
pub type CommitFuture = BoxFuture<'static, CommitResult>;

/// Completion signal handed out by the manager.
///
/// Cloneable; every clone resolves to the same outcome.
pub type CompletionSignal = Shared<CommitFuture>;

/// Signal that is already resolved successfully
pub fn completed() -> CompletionSignal {
    futures::future::ready(Ok(())).boxed().shared()
}

/// Receives chain-level outcome notifications from the data store
pub trait TransactionChainListener: Send + Sync {
    /// Chain failed; every transaction not yet applied on it is lost
    fn on_chain_failed(&self, chain_id: ChainId, tx_id: Option<TransactionId>, cause: &ChainError);

    /// Chain closed after all its transactions were applied
    fn on_chain_succeeded(&self, chain_id: ChainId);
}

/// Creates ordered transaction chains
pub trait TransactionChainFactory: Send + Sync + 'static {
    type Chain: TransactionChain;

    /// Open a new chain. `listener` receives its failure/success report.
    fn create_chain(
        &self,
        listener: Arc<dyn TransactionChainListener>,
    ) -> Result<Self::Chain, ChainError>;
}

/// An open, ordered chain of write transactions
pub trait TransactionChain: Send + 'static {
    type Transaction: WriteTransaction;

    fn id(&self) -> ChainId;

    /// Allocate the next write transaction on this chain
    fn new_write_transaction(&self) -> Result<Self::Transaction, ChainError>;

    /// Close the chain. Transactions already committed still complete.
    fn close(&self) -> Result<(), ChainError>;
}

/// A batch of staged mutations committed atomically
pub trait WriteTransaction: Send + 'static {
    fn id(&self) -> TransactionId;

    /// Stage a full replacement of the object at `path`
    fn put(&mut self, store: LogicalDatastore, path: InstancePath, data: DataObject);

    /// Stage removal of the object at `path` and everything under it
    fn delete(&mut self, store: LogicalDatastore, path: InstancePath);

    /// Hand the batch to the store. Must not wait for the store to apply it.
    fn commit(self) -> CommitFuture;
}
