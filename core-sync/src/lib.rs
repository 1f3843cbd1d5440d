//! # Catalog Reconciliation
//!
//! Keeps the catalog consistent with the audio files under a directory root.
//! See [`coordinator`] for the scan workflow.

pub mod coordinator;
pub mod error;

pub use coordinator::{ScanConfig, ScanCoordinator, ScanMode, ScanReport};
pub use error::{Result, SyncError};
