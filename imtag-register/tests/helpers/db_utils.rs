//! Database Test Utilities

use imtag_register::db::{SqliteImagesRepository, SqliteModelTagRepository, SqliteSession};
use imtag_register::repositories::unit_of_work::{IMAGES, MODEL_TAG};
use imtag_register::repositories::{RepositoryHandle, UnitOfWork};
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;

/// Tag table used by every test database
pub const TAG_TABLE: &str = "tags_test_model";

/// Create a temporary database with the schema applied
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test_imtag.db");

    let pool = imtag_common::db::init_database(&db_path, 2, TAG_TABLE)
        .await
        .unwrap();

    (temp_dir, pool)
}

/// Repositories sharing one session, plus a unit of work over them
pub struct TestRepositories {
    pub session: Arc<SqliteSession>,
    pub images: Arc<SqliteImagesRepository>,
    pub model_tag: Arc<SqliteModelTagRepository>,
    pub unit_of_work: UnitOfWork,
}

/// Wire the SQLite repositories the way the runtime does
pub fn wire_repositories(pool: &SqlitePool, lookup_chunk_size: usize) -> TestRepositories {
    let session = Arc::new(SqliteSession::new(pool.clone()));
    let images = Arc::new(SqliteImagesRepository::new(
        Arc::clone(&session),
        lookup_chunk_size,
    ));
    let model_tag =
        Arc::new(SqliteModelTagRepository::new(Arc::clone(&session), TAG_TABLE).unwrap());

    let unit_of_work = UnitOfWork::new(vec![
        (IMAGES, RepositoryHandle::Images(images.clone())),
        (MODEL_TAG, RepositoryHandle::ModelTag(model_tag.clone())),
    ])
    .unwrap();

    TestRepositories {
        session,
        images,
        model_tag,
        unit_of_work,
    }
}
