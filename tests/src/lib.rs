//! # Device Transaction Chain Test Suite
//!
//! Cross-crate scenarios that drive managers through the public APIs only.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── producer_flows.rs      # concurrent producers, batching, flush ticker
//!     ├── mastership_handoff.rs  # role changes between nodes sharing a store
//!     └── failure_recovery.rs    # chain failure, rejected commits, refused chains
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p txc-tests
//! cargo test -p txc-tests integration::mastership_handoff
//! ```

pub mod integration;
