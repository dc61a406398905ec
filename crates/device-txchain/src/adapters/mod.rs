//! # Adapters Layer (Hexagonal Architecture)
//!
//! - `memory_store`: in-memory data store implementing the outbound ports
//! - `mastership`: drives the inbound lifecycle port from role-change events

mod mastership;
mod memory_store;

pub use mastership::{DriverStep, MastershipDriver, MastershipDriverConfig, MastershipEvent};
pub use memory_store::{
    CommittedTransaction, InMemoryChain, InMemoryDataStore, InMemoryWriteTransaction,
};
