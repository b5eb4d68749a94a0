//! Developer tooling: read-only views over a running [`SyncWorld`](physlink_kernel::SyncWorld).
//!
//! # Invariants
//! - Inspection never mutates the world or sends commands.

mod inspector;

pub use inspector::{ObjectInfo, SyncInspector, SyncSummary};

pub fn crate_info() -> &'static str {
    "physlink-tools v0.1.0"
}
