//! # imtag Common Library
//!
//! Shared code for the imtag binaries:
//! - Error types
//! - Bootstrap configuration (TOML) and path resolution
//! - Logging initialisation
//! - SQLite pool creation and schema initialisation

pub mod config;
pub mod db;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
