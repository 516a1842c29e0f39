//! Error types for imtag-register

use crate::repositories::{RepositoryError, UnitOfWorkError};
use crate::services::outcome_classifier::ClassifyError;
use crate::services::parallel_executor::ExecutorError;
use crate::tagger::TaggerError;
use std::fmt;
use thiserror::Error;

/// Registration error
///
/// Only persistence failures and precondition violations reach callers of
/// `RegisterNewImage::handle`; per-file storage, decode and validation
/// problems are logged and skipped, so they have no variant here.
#[derive(Debug, Error)]
pub enum RegisterError {
    #[error(transparent)]
    Tagger(#[from] TaggerError),

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    UnitOfWork(#[from] UnitOfWorkError),

    /// Executor misuse, or a task error with `raise_on_error`
    #[error("Parallel execution failed: {0}")]
    Executor(String),

    #[error(transparent)]
    Common(#[from] imtag_common::Error),
}

impl<E: fmt::Display> From<ExecutorError<E>> for RegisterError {
    fn from(e: ExecutorError<E>) -> Self {
        RegisterError::Executor(e.to_string())
    }
}

impl RegisterError {
    /// Insert-time content hash collision
    pub fn is_duplicate(&self) -> bool {
        matches!(
            self,
            RegisterError::Repository(RepositoryError::DuplicateImage(_))
                | RegisterError::UnitOfWork(UnitOfWorkError::Commit {
                    source: RepositoryError::DuplicateImage(_),
                    ..
                })
        )
    }
}

/// Result type for registration operations
pub type RegisterResult<T> = Result<T, RegisterError>;
