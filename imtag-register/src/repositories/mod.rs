//! Repository ports and the unit of work that commits them together
//!
//! Every repository is [`Transactional`]: its writes stay pending until
//! `commit`, and `rollback` discards them.

pub mod unit_of_work;

pub use unit_of_work::{RepositoryHandle, UnitOfWork, UnitOfWorkError};

use crate::models::{ImageEntry, ImageHash, ModelTagEntries, ModelTagEntry, ValidationError};
use async_trait::async_trait;
use thiserror::Error;

/// Repository errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Content hash already stored
    #[error("Duplicate image: {0}")]
    DuplicateImage(String),

    /// Tag rows reference an image id that does not exist
    #[error("Image not found: {0}")]
    ImageNotFound(String),

    /// Update of an entry that was never persisted
    #[error("Entry for {0} has no image_id")]
    MissingImageId(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Stored row does not form a valid domain value
    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<ValidationError> for RepositoryError {
    fn from(e: ValidationError) -> Self {
        RepositoryError::InvalidData(e.to_string())
    }
}

/// Commit/rollback contract shared by all repositories
#[async_trait]
pub trait Transactional: Send + Sync {
    /// Make pending writes durable; no-op when nothing is pending
    async fn commit(&self) -> Result<(), RepositoryError>;

    /// Discard pending writes; no-op when nothing is pending
    async fn rollback(&self) -> Result<(), RepositoryError>;
}

/// Image records keyed by id, unique by content hash
#[async_trait]
pub trait ImagesRepository: Transactional {
    /// Insert entries, returning assigned ids in submission order
    ///
    /// Fails with [`RepositoryError::DuplicateImage`] on a hash collision.
    async fn add(&self, entries: &[ImageEntry]) -> Result<Vec<i64>, RepositoryError>;

    /// Stored entries whose hash is among `hashes`
    async fn find_by_hashes(&self, hashes: &[ImageHash]) -> Result<Vec<ImageEntry>, RepositoryError>;

    async fn get(&self, image_id: i64) -> Result<Option<ImageEntry>, RepositoryError>;

    /// Overwrite stored metadata of persisted entries and bump `updated_at`
    async fn update(&self, entries: &[ImageEntry]) -> Result<(), RepositoryError>;

    /// Delete by id, returning rows removed
    async fn remove(&self, image_ids: &[i64]) -> Result<u64, RepositoryError>;

    async fn contains(&self, image_id: i64) -> Result<bool, RepositoryError>;

    async fn count(&self) -> Result<u64, RepositoryError>;

    /// First `limit` entries by id, for inspection
    async fn list(&self, limit: u32) -> Result<Vec<ImageEntry>, RepositoryError>;
}

/// Tag facts produced by one model
#[async_trait]
pub trait ModelTagRepository: Transactional {
    /// Insert or replace tag facts, returning rows written
    ///
    /// Fails with [`RepositoryError::ImageNotFound`] when an image id is unknown.
    async fn add(&self, entries: &[ModelTagEntries]) -> Result<u64, RepositoryError>;

    /// All facts for one image, possibly empty
    async fn get(&self, image_id: i64) -> Result<ModelTagEntries, RepositoryError>;

    /// Delete every fact for one image, returning rows removed
    async fn remove_all_by_image_id(&self, image_id: i64) -> Result<u64, RepositoryError>;

    async fn count(&self) -> Result<u64, RepositoryError>;

    async fn list(&self, limit: u32) -> Result<Vec<ModelTagEntry>, RepositoryError>;
}
