//! Unit of work over named repositories
//!
//! A [`UnitOfWork`] groups repositories under one transactional boundary.
//! [`UnitOfWork::run`] executes a scope and then commits every repository
//! when the scope succeeds, or rolls every repository back when it fails or
//! panics.

use super::{ImagesRepository, ModelTagRepository, RepositoryError};
use futures::FutureExt;
use imtag_common::db::is_valid_identifier;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Conventional name of the images repository
pub const IMAGES: &str = "images";
/// Conventional name of the model tag repository
pub const MODEL_TAG: &str = "model_tag";

/// Unit of work errors
#[derive(Debug, Error)]
pub enum UnitOfWorkError {
    /// Repository name is not an identifier
    #[error("Invalid repository name: {0:?}")]
    InvalidName(String),

    #[error("Repository registered twice: {0}")]
    DuplicateName(String),

    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    /// Name exists but holds a different kind of repository
    #[error("Repository {name} is not a {expected} repository")]
    WrongKind { name: String, expected: &'static str },

    /// Commit failed; repositories after this one were rolled back
    #[error("Commit of {name} failed: {source}")]
    Commit {
        name: String,
        #[source]
        source: RepositoryError,
    },
}

/// A repository managed by a unit of work
#[derive(Clone)]
pub enum RepositoryHandle {
    Images(Arc<dyn ImagesRepository>),
    ModelTag(Arc<dyn ModelTagRepository>),
}

impl RepositoryHandle {
    fn kind(&self) -> &'static str {
        match self {
            RepositoryHandle::Images(_) => "images",
            RepositoryHandle::ModelTag(_) => "model_tag",
        }
    }

    async fn commit(&self) -> Result<(), RepositoryError> {
        match self {
            RepositoryHandle::Images(repo) => repo.commit().await,
            RepositoryHandle::ModelTag(repo) => repo.commit().await,
        }
    }

    async fn rollback(&self) -> Result<(), RepositoryError> {
        match self {
            RepositoryHandle::Images(repo) => repo.rollback().await,
            RepositoryHandle::ModelTag(repo) => repo.rollback().await,
        }
    }
}

impl std::fmt::Debug for RepositoryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RepositoryHandle::{}", self.kind())
    }
}

/// Named repositories committed or rolled back together
///
/// Cloning is cheap and clones share the same repositories.
#[derive(Clone, Debug)]
pub struct UnitOfWork {
    repositories: Vec<(String, RepositoryHandle)>,
}

impl UnitOfWork {
    /// Build from (name, repository) pairs
    ///
    /// Names must be identifiers and unique. Commit and rollback run in the
    /// order given here.
    pub fn new<I, S>(repositories: I) -> Result<Self, UnitOfWorkError>
    where
        I: IntoIterator<Item = (S, RepositoryHandle)>,
        S: Into<String>,
    {
        let mut validated: Vec<(String, RepositoryHandle)> = Vec::new();

        for (name, repository) in repositories {
            let name = name.into();
            if !is_valid_identifier(&name) {
                return Err(UnitOfWorkError::InvalidName(name));
            }
            if validated.iter().any(|(existing, _)| *existing == name) {
                return Err(UnitOfWorkError::DuplicateName(name));
            }
            validated.push((name, repository));
        }

        Ok(Self {
            repositories: validated,
        })
    }

    /// Registered names, in commit order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.repositories.iter().map(|(name, _)| name.as_str())
    }

    /// A unit of work over only the named repositories
    pub fn subset(&self, names: &[&str]) -> Result<UnitOfWork, UnitOfWorkError> {
        let selected = names
            .iter()
            .map(|name| Ok((name.to_string(), self.repository(name)?.clone())))
            .collect::<Result<Vec<_>, UnitOfWorkError>>()?;

        UnitOfWork::new(selected)
    }

    /// Look a repository up by name
    pub fn repository(&self, name: &str) -> Result<&RepositoryHandle, UnitOfWorkError> {
        self.repositories
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, repo)| repo)
            .ok_or_else(|| UnitOfWorkError::RepositoryNotFound(name.to_string()))
    }

    /// Typed access to an images repository
    pub fn images(&self, name: &str) -> Result<Arc<dyn ImagesRepository>, UnitOfWorkError> {
        match self.repository(name)? {
            RepositoryHandle::Images(repo) => Ok(Arc::clone(repo)),
            _ => Err(UnitOfWorkError::WrongKind {
                name: name.to_string(),
                expected: "images",
            }),
        }
    }

    /// Typed access to a model tag repository
    pub fn model_tag(&self, name: &str) -> Result<Arc<dyn ModelTagRepository>, UnitOfWorkError> {
        match self.repository(name)? {
            RepositoryHandle::ModelTag(repo) => Ok(Arc::clone(repo)),
            _ => Err(UnitOfWorkError::WrongKind {
                name: name.to_string(),
                expected: "model_tag",
            }),
        }
    }

    /// Run `scope` and then commit or roll back every repository
    ///
    /// - `Ok` from the scope: commit each repository in order. If a commit
    ///   fails, the remaining repositories are rolled back and
    ///   [`UnitOfWorkError::Commit`] is returned.
    /// - `Err` from the scope: roll back every repository and return the
    ///   scope's error. Rollback failures are logged, not returned.
    /// - Panic in the scope: roll back every repository and resume the panic.
    pub async fn run<F, Fut, T, E>(&self, scope: F) -> Result<T, E>
    where
        F: FnOnce(UnitOfWork) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<UnitOfWorkError> + std::fmt::Display,
    {
        let outcome = AssertUnwindSafe(scope(self.clone())).catch_unwind().await;

        match outcome {
            Ok(Ok(value)) => {
                self.commit_all().await?;
                Ok(value)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Unit of work failed, rolling back");
                self.rollback_from(0).await;
                Err(e)
            }
            Err(panic) => {
                warn!("Unit of work panicked, rolling back");
                self.rollback_from(0).await;
                std::panic::resume_unwind(panic)
            }
        }
    }

    async fn commit_all(&self) -> Result<(), UnitOfWorkError> {
        for (index, (name, repository)) in self.repositories.iter().enumerate() {
            if let Err(source) = repository.commit().await {
                warn!(repository = %name, error = %source, "Commit failed, rolling back the rest");
                self.rollback_from(index + 1).await;
                return Err(UnitOfWorkError::Commit {
                    name: name.clone(),
                    source,
                });
            }
            debug!(repository = %name, "Committed");
        }
        Ok(())
    }

    async fn rollback_from(&self, start: usize) {
        for (name, repository) in self.repositories.iter().skip(start) {
            match repository.rollback().await {
                Ok(()) => debug!(repository = %name, "Rolled back"),
                Err(e) => warn!(repository = %name, error = %e, "Rollback failed"),
            }
        }
    }
}
