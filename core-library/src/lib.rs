//! # Library Management Module
//!
//! Owns the catalog database and provides repository patterns for data
//! access.
//!
//! ## Overview
//!
//! This module manages:
//! - SQLite database schema and migrations
//! - The music file catalog and the remote/requested track registries
//! - Playlist and entry persistence
//! - Relevance search and field filters

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;
pub mod search;

pub use error::{LibraryError, Result};
pub use search::{CatalogSearch, TrackFilter};
