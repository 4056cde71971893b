// Revlog Kernel
//
// Audit log storage and point-in-time revert for tracked objects.

pub mod adapters;
pub mod config;
pub mod invariants;
pub mod log;
pub mod replay;
pub mod revert;
pub mod schema;
pub mod state;
