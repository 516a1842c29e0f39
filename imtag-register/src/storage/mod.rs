//! File storage port
//!
//! File identifiers are plain strings. Implementations decide how they map to
//! physical locations; [`LocalStorage`] resolves relative identifiers against
//! its root directory.

pub mod local;

pub use local::LocalStorage;

use async_trait::async_trait;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Identifier does not name an existing file or directory
    #[error("Not found: {0}")]
    NotFound(String),

    /// Destination exists and overwrite was not requested
    #[error("Destination exists: {0}")]
    AlreadyExists(String),

    /// Operation needs a file (or `recursive`) but got a directory
    #[error("Is a directory: {0}")]
    IsADirectory(String),

    /// Content is not valid UTF-8
    #[error("Not valid UTF-8 text: {0}")]
    InvalidText(String),

    /// Underlying I/O failure
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// Map an I/O error, turning `NotFound` into the dedicated variant
    pub(crate) fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(path)
        } else {
            StorageError::Io { path, source }
        }
    }
}

/// Read and write access to stored files
#[async_trait]
pub trait Storage: Send + Sync {
    /// List file identifiers under `path`
    ///
    /// A file path lists itself. Symlinked directories are not followed.
    async fn list_files(&self, path: &str, recursive: bool) -> Result<Vec<String>, StorageError>;

    async fn exists(&self, file_id: &str) -> bool;

    /// Size in bytes
    async fn get_size(&self, file_id: &str) -> Result<u64, StorageError>;

    async fn read_binary(&self, file_id: &str) -> Result<Vec<u8>, StorageError>;

    async fn read_text(&self, file_id: &str) -> Result<String, StorageError>;

    /// Lower-case extension without the dot, empty when there is none
    async fn get_file_extension(&self, file_id: &str) -> Result<String, StorageError>;

    /// Copy a file, returning the destination identifier
    async fn copy(
        &self,
        source: &str,
        destination: &str,
        overwrite: bool,
    ) -> Result<String, StorageError>;

    /// Move a file, returning the destination identifier
    async fn move_file(
        &self,
        source: &str,
        destination: &str,
        overwrite: bool,
    ) -> Result<String, StorageError>;

    /// Delete a file, or a directory tree when `recursive`
    ///
    /// Deleting something that does not exist succeeds.
    async fn delete(&self, file_id: &str, recursive: bool) -> Result<(), StorageError>;
}
