//! Ports module for the transaction chain manager

pub mod inbound;
pub mod outbound;

pub use inbound::{MastershipControl, TransactionWriter};
pub use outbound::{
    completed, ChainError, CommitError, CommitFuture, CommitResult, CompletionSignal,
    TransactionChain, TransactionChainFactory, TransactionChainListener, WriteTransaction,
};
