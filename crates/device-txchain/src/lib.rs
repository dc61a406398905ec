//! # device-txchain
//!
//! Per-device transaction chain manager.
//!
//! ## Overview
//!
//! Every connected device gets one manager. It serializes the device's writes
//! into a single ordered transaction chain and ties the chain's lifetime to
//! cluster mastership:
//! - **Batching**: producers stage puts/deletes into one pending transaction,
//!   `submit` flushes it
//! - **Mastership gating**: writes are only legal while this node is master
//! - **Failure recovery**: a failed chain is replaced, its uncommitted batch dropped
//! - **Clean handoff**: losing mastership drains outstanding work before the
//!   chain is released
//!
//! ## Architecture
//!
//! ```text
//! Producers ──write/delete/submit──→ ┌──────────────────────────┐
//!                                    │ TransactionChainManager  │──create_chain──→ Data store
//! Mastership ──activate/deactivate──→│  Sleeping                │←─on_chain_failed─┘
//!  driver      begin_shutdown/close  │  Working {chain,pending} │
//!                                    │  ShuttingDown {chain}    │
//!                                    └──────────────────────────┘
//! ```
//!
//! ## Lifecycle
//!
//! ```text
//!             activate                 begin_shutdown
//! [SLEEPING] ─────────→ [WORKING] ─────────────────────→ [SHUTTING DOWN] ──finalize_close──→ (inert)
//!     ↑                     │                                  ↑
//!     └──── deactivate ─────┘                                  │
//!     └──────────────────────── begin_shutdown ────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use device_txchain::{InMemoryDataStore, TransactionChainManager};
//! use device_txchain::ports::{MastershipControl, TransactionWriter};
//!
//! let manager = TransactionChainManager::new("openflow:1", Arc::new(store), Handle::current());
//! manager.activate_then_submit()?;
//!
//! manager.write(LogicalDatastore::Operational, path, data)?;
//! manager.submit();
//!
//! manager.deactivate().await?;
//! ```

pub mod adapters;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod ports;
pub mod service;

pub use adapters::{
    CommittedTransaction, InMemoryDataStore, MastershipDriver, MastershipDriverConfig,
    MastershipEvent,
};
pub use domain::{
    ChainId, ChainManagerStatus, DataObject, DeviceId, InstancePath, LifecycleOperation,
    LogicalDatastore, Mutation, TransactionId,
};
pub use error::{ChainManagerError, ChainManagerResult};
pub use ports::{CommitError, CompletionSignal, MastershipControl, TransactionWriter};
pub use service::TransactionChainManager;
