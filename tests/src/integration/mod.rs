//! Integration scenarios

pub mod failure_recovery;
pub mod mastership_handoff;
pub mod producer_flows;
