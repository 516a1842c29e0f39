//! imtag-register library interface
//!
//! Exposes the registration pipeline and its adapters for the binary and
//! for integration testing.

pub mod db;
pub mod error;
pub mod models;
pub mod repositories;
pub mod runtime;
pub mod services;
pub mod storage;
pub mod tagger;

pub use crate::error::{RegisterError, RegisterResult};
