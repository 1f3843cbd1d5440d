//! # Core Runtime Module
//!
//! Runtime plumbing shared by the setlist crates:
//! - Logging and tracing initialisation
//! - Configuration (builder and environment loading)
//! - Event bus for scan and playlist notifications

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
