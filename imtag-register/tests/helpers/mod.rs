//! Test Helper Utilities
//!
//! Shared utilities for testing imtag-register

#![allow(dead_code)]

pub mod db_utils;
pub mod fake_tagger;
pub mod image_generator;

// Re-export commonly used items
pub use db_utils::{create_test_db, wire_repositories, TestRepositories, TAG_TABLE};
pub use fake_tagger::FakeTagger;
pub use image_generator::{encode_png, write_png};
