//! Error types for the transaction chain manager
//!
//! Port-level errors (`ChainError`, `CommitError`) live in `ports::outbound`
//! because they cross the boundary with the data store.

use crate::domain::{ChainManagerStatus, DeviceId, LifecycleOperation};
use crate::ports::outbound::ChainError;
use thiserror::Error;

/// Transaction chain manager errors
#[derive(Debug, Error)]
pub enum ChainManagerError {
    /// Write or delete attempted while not `Working`, or with no open chain.
    /// Producers decide whether to retry, drop or escalate.
    #[error("No active transaction for device {device_id}")]
    NoActiveTransaction { device_id: DeviceId },

    /// Lifecycle operation is illegal from the current status
    #[error("Invalid lifecycle transition: cannot {operation} while {from}")]
    InvalidTransition {
        from: ChainManagerStatus,
        operation: LifecycleOperation,
    },

    /// Data store refused to open a transaction chain
    #[error("Failed to create transaction chain for device {device_id}: {source}")]
    ChainCreation {
        device_id: DeviceId,
        #[source]
        source: ChainError,
    },

    /// Open chain refused to allocate a write transaction
    #[error("Failed to allocate write transaction for device {device_id}: {source}")]
    TransactionAllocation {
        device_id: DeviceId,
        #[source]
        source: ChainError,
    },
}

impl ChainManagerError {
    /// True for errors that indicate a programming error on the caller side.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }
}

/// Result type for chain manager operations
pub type ChainManagerResult<T> = Result<T, ChainManagerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let err = ChainManagerError::InvalidTransition {
            from: ChainManagerStatus::Working,
            operation: LifecycleOperation::Activate,
        };
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Invalid lifecycle transition: cannot activate while working"
        );

        let err = ChainManagerError::NoActiveTransaction {
            device_id: DeviceId::new("openflow:1"),
        };
        assert!(!err.is_fatal());
        assert_eq!(err.to_string(), "No active transaction for device openflow:1");
    }
}
