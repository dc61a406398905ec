//! Domain module for the transaction chain manager
//!
//! ## Core Modules
//! - status: lifecycle state machine (Sleeping / Working / ShuttingDown)
//! - identity: device, chain and transaction identifiers
//! - datastore: store-model paths, objects and mutations

pub mod datastore;
pub mod identity;
pub mod status;

pub use datastore::{DataObject, InstancePath, LogicalDatastore, Mutation};
pub use identity::{ChainId, DeviceId, TransactionId};
pub use status::{transition, ChainManagerStatus, LifecycleOperation, Transition};
