//! Tagging inference port

pub mod command;

pub use command::CommandTagger;

use crate::models::TaggerResult;
use async_trait::async_trait;
use thiserror::Error;

/// Tagger errors
#[derive(Debug, Error)]
pub enum TaggerError {
    /// Payload is not an image format the model accepts
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// `tag` called before a successful `initialize`
    #[error("Tagger not initialized, call initialize() first")]
    NotInitialized,

    /// Model could not be loaded or started
    #[error("Tagger initialization failed: {0}")]
    InitializationFailed(String),

    /// Inference ran but did not produce a usable result
    #[error("Tagging failed: {0}")]
    TaggingFailed(String),
}

/// Image tagging model
///
/// `initialize` is called once before the tagger is shared; `tag` may then
/// run concurrently from many tasks.
#[async_trait]
pub trait Tagger: Send + Sync {
    /// Load the model
    async fn initialize(&mut self) -> Result<(), TaggerError>;

    /// Infer category-grouped tags for one image payload
    async fn tag(&self, image_binary: &[u8]) -> Result<TaggerResult, TaggerError>;
}
