//! Explicit wiring of the configured implementations
//!
//! Each configuration enum variant maps to one concrete adapter, chosen here
//! at startup and passed to the use case by constructor.

use crate::db::{SqliteImagesRepository, SqliteModelTagRepository, SqliteSession};
use crate::error::RegisterResult;
use crate::repositories::unit_of_work::{IMAGES, MODEL_TAG};
use crate::repositories::{RepositoryHandle, UnitOfWork};
use crate::services::register_new_image::RegisterNewImage;
use crate::storage::{LocalStorage, Storage};
use crate::tagger::{CommandTagger, Tagger, TaggerError};
use imtag_common::config::{DatabaseConfig, StorageConfig, TaggerConfig, TomlConfig};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Build the configured storage
pub fn build_storage(config: &StorageConfig, root_folder: PathBuf) -> Arc<dyn Storage> {
    match config {
        StorageConfig::Local => Arc::new(LocalStorage::new(root_folder)),
    }
}

/// Build and initialize the configured tagger
pub async fn build_tagger(config: &TaggerConfig) -> Result<Arc<dyn Tagger>, TaggerError> {
    match config {
        TaggerConfig::Command {
            program,
            args,
            threshold,
            ..
        } => {
            let mut tagger = CommandTagger::new(program.clone(), args.clone(), *threshold);
            tagger.initialize().await?;
            Ok(Arc::new(tagger))
        }
    }
}

/// Open the configured database, creating the schema when missing
pub async fn open_database(
    config: &DatabaseConfig,
    db_path: &Path,
    tag_table: &str,
) -> RegisterResult<SqlitePool> {
    match config {
        DatabaseConfig::Sqlite { max_connections } => Ok(imtag_common::db::init_database(
            db_path,
            *max_connections,
            tag_table,
        )
        .await?),
    }
}

/// Everything a command needs, wired from one configuration
pub struct Runtime {
    pub config: TomlConfig,
    pub pool: SqlitePool,
    pub storage: Arc<dyn Storage>,
    pub images: Arc<SqliteImagesRepository>,
    pub model_tag: Arc<SqliteModelTagRepository>,
    pub unit_of_work: UnitOfWork,
}

impl Runtime {
    /// Open storage and database
    ///
    /// The tagger is not built here; see [`Runtime::register_new_image`].
    pub async fn build(config: TomlConfig) -> RegisterResult<Self> {
        let root_folder = config.resolve_root_folder();
        let db_path = config.resolve_database_path();
        let tag_table = config.tagger.tag_table().to_string();

        info!(
            root_folder = %root_folder.display(),
            database = %db_path.display(),
            tag_table = %tag_table,
            "Building runtime"
        );

        let storage = build_storage(&config.storage, root_folder);
        let pool = open_database(&config.database, &db_path, &tag_table).await?;

        let session = Arc::new(SqliteSession::new(pool.clone()));
        let images = Arc::new(SqliteImagesRepository::new(
            Arc::clone(&session),
            config.register.lookup_chunk_size,
        ));
        let model_tag = Arc::new(SqliteModelTagRepository::new(
            Arc::clone(&session),
            tag_table,
        )?);

        let unit_of_work = UnitOfWork::new(vec![
            (IMAGES, RepositoryHandle::Images(images.clone())),
            (MODEL_TAG, RepositoryHandle::ModelTag(model_tag.clone())),
        ])?;

        Ok(Self {
            config,
            pool,
            storage,
            images,
            model_tag,
            unit_of_work,
        })
    }

    /// Registration use case with the configured, initialized tagger
    pub async fn register_new_image(&self) -> RegisterResult<RegisterNewImage> {
        let tagger = build_tagger(&self.config.tagger).await?;
        Ok(
            RegisterNewImage::new(&self.unit_of_work, tagger, Arc::clone(&self.storage))?
                .with_progress(self.config.register.show_progress),
        )
    }
}
