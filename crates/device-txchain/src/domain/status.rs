//! Lifecycle state machine for the transaction chain manager
//!
//! The status decides when writes are legal. Mastership drives the
//! `Sleeping`/`Working` toggle; device teardown moves to `ShuttingDown` once.
//!
//! State Machine:
//! ```text
//! [SLEEPING] ──activate──→ [WORKING] ──deactivate──→ [SLEEPING]
//!     │                        │
//!     └──── begin_shutdown ────┴──── begin_shutdown ──→ [SHUTTING_DOWN]
//!                                                           │
//!                                                    finalize_close (stays, inert)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Manager status
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainManagerStatus {
    /// Not master for the device (or not yet told). No chain, no writes.
    #[default]
    Sleeping,
    /// Master for the device. Chain open, writes accepted.
    Working,
    /// Device is being torn down. Terminal.
    ShuttingDown,
}

impl fmt::Display for ChainManagerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sleeping => f.write_str("sleeping"),
            Self::Working => f.write_str("working"),
            Self::ShuttingDown => f.write_str("shutting down"),
        }
    }
}

/// Operations that drive status transitions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleOperation {
    /// Mastership gained
    Activate,
    /// Mastership lost
    Deactivate,
    /// Device teardown started
    BeginShutdown,
    /// Device teardown finished, release the chain
    FinalizeClose,
}

impl fmt::Display for LifecycleOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Activate => f.write_str("activate"),
            Self::Deactivate => f.write_str("deactivate"),
            Self::BeginShutdown => f.write_str("begin shutdown"),
            Self::FinalizeClose => f.write_str("finalize close"),
        }
    }
}

/// Result of applying an operation to a status
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Operation applies; the manager moves to the given status
    Move(ChainManagerStatus),
    /// Redundant call; tolerated, nothing changes
    Ignore,
    /// Illegal from this status
    Reject,
}

/// Pure transition table. Same inputs always produce the same outcome.
pub fn transition(from: ChainManagerStatus, operation: LifecycleOperation) -> Transition {
    use ChainManagerStatus::*;
    use LifecycleOperation::*;

    match (from, operation) {
        (Sleeping, Activate) => Transition::Move(Working),
        (Working | ShuttingDown, Activate) => Transition::Reject,

        // mastership-loss notifications may be delivered more than once
        (Working, Deactivate) => Transition::Move(Sleeping),
        (Sleeping | ShuttingDown, Deactivate) => Transition::Ignore,

        (Sleeping | Working, BeginShutdown) => Transition::Move(ShuttingDown),
        (ShuttingDown, BeginShutdown) => Transition::Ignore,

        (ShuttingDown, FinalizeClose) => Transition::Move(ShuttingDown),
        (Sleeping | Working, FinalizeClose) => Transition::Reject,
    }
}
