//! Workspace root crate.
//!
//! Re-exports the service facade so host applications can depend on
//! `setlist-workspace` alone instead of wiring each crate individually.

pub use core_service::*;
