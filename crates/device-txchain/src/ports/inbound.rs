//! Driving Ports (API - Inbound)
//!
//! Two callers drive the manager:
//! - write producers (statistics, inventory) stage mutations and flush them
//! - the mastership orchestrator toggles the lifecycle

use crate::domain::{ChainManagerStatus, DataObject, DeviceId, InstancePath, LogicalDatastore};
use crate::error::ChainManagerResult;
use crate::ports::outbound::CompletionSignal;

/// Producer-facing API.
///
/// Staging never touches the store; only `submit` hands the batch over.
pub trait TransactionWriter: Send + Sync {
    fn device_id(&self) -> &DeviceId;

    /// Stage a put into the pending transaction, opening one if needed
    ///
    /// # Errors
    /// `NoActiveTransaction` unless the manager is `Working` with an open chain
    fn write(
        &self,
        store: LogicalDatastore,
        path: InstancePath,
        data: DataObject,
    ) -> ChainManagerResult<()>;

    /// Stage a delete into the pending transaction, opening one if needed
    ///
    /// # Errors
    /// `NoActiveTransaction` unless the manager is `Working` with an open chain
    fn delete(&self, store: LogicalDatastore, path: InstancePath) -> ChainManagerResult<()>;

    /// Flush the pending transaction.
    ///
    /// Returns `false` when submission is disabled (retry later), `true`
    /// otherwise, including when there was nothing to flush. Never waits for
    /// the commit to complete.
    fn submit(&self) -> bool;
}

/// Orchestrator-facing API
pub trait MastershipControl: Send + Sync {
    fn device_id(&self) -> &DeviceId;

    fn status(&self) -> ChainManagerStatus;

    /// Mastership gained: open a fresh chain, submission stays disabled
    fn activate(&self) -> ChainManagerResult<()>;

    /// Allow `submit` to flush; has no effect without an open chain
    fn enable_submit(&self);

    /// `activate`, `enable_submit`, then one `submit`
    fn activate_then_submit(&self) -> ChainManagerResult<bool>;

    /// Mastership lost: drain, go back to `Sleeping`, close the chain once
    /// the drain resolves. Redundant calls resolve immediately.
    fn deactivate(&self) -> CompletionSignal;

    /// Device teardown: move to `ShuttingDown` and drain
    fn begin_shutdown(&self) -> CompletionSignal;

    /// Release the chain after the shutdown drain resolved
    fn finalize_close(&self) -> ChainManagerResult<()>;
}
