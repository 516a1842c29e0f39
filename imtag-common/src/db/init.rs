//! Database initialization
//!
//! Opens (creating when missing) the SQLite database and applies the schema.
//! Every statement is idempotent so initialization is safe on every start.

use crate::db::is_valid_identifier;
use crate::{Error, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Current schema version recorded in `schema_version`
pub const SCHEMA_VERSION: i64 = 1;

/// Open a connection pool, creating the database file if needed
///
/// Foreign keys are enforced on every pooled connection, and WAL mode lets
/// readers proceed while a registration transaction holds the write lock.
pub async fn connect(db_path: &Path, max_connections: u32) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(5000));

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    Ok(pool)
}

/// Open the database and make sure the schema exists
pub async fn init_database(
    db_path: &Path,
    max_connections: u32,
    tag_table: &str,
) -> Result<SqlitePool> {
    let pool = connect(db_path, max_connections).await?;
    init_schema(&pool, tag_table).await?;
    Ok(pool)
}

/// Recreate the database file from scratch
///
/// Removes the existing file (and its WAL side files) before initializing.
pub async fn reset_database(
    db_path: &Path,
    max_connections: u32,
    tag_table: &str,
) -> Result<SqlitePool> {
    for suffix in ["", "-wal", "-shm"] {
        let mut path = db_path.as_os_str().to_owned();
        path.push(suffix);
        let path = std::path::PathBuf::from(path);
        if path.exists() {
            warn!("Removing existing database file: {}", path.display());
            std::fs::remove_file(&path)?;
        }
    }

    init_database(db_path, max_connections, tag_table).await
}

/// Create all tables used by image registration
pub async fn init_schema(pool: &SqlitePool, tag_table: &str) -> Result<()> {
    if !is_valid_identifier(tag_table) {
        return Err(Error::InvalidInput(format!(
            "Invalid tag table name: {:?}",
            tag_table
        )));
    }

    create_schema_version_table(pool).await?;
    create_images_table(pool).await?;
    create_model_tag_table(pool, tag_table).await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    info!(tag_table = tag_table, "Database schema initialized");

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the images table
///
/// `hash` is the SHA-256 of the file content and identifies the image.
pub async fn create_images_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS images (
            image_id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_location TEXT NOT NULL,
            width INTEGER NOT NULL,
            height INTEGER NOT NULL,
            file_type TEXT NOT NULL,
            hash TEXT NOT NULL UNIQUE,
            file_size INTEGER NOT NULL,
            added_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CHECK (width > 0),
            CHECK (height > 0),
            CHECK (file_size >= 0),
            CHECK (length(hash) = 64)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_images_file_location ON images(file_location)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the per-model tag table
///
/// One table per tagging model so that tags from different models never mix.
pub async fn create_model_tag_table(pool: &SqlitePool, tag_table: &str) -> Result<()> {
    if !is_valid_identifier(tag_table) {
        return Err(Error::InvalidInput(format!(
            "Invalid tag table name: {:?}",
            tag_table
        )));
    }

    let create_sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            image_id INTEGER NOT NULL REFERENCES images(image_id) ON DELETE CASCADE,
            category TEXT NOT NULL,
            tag TEXT NOT NULL,
            score REAL NOT NULL,
            archived INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (image_id, category, tag)
        )
        "#,
        table = tag_table
    );
    sqlx::query(&create_sql).execute(pool).await?;

    let index_sql = format!(
        "CREATE INDEX IF NOT EXISTS idx_{table}_tag ON {table}(category, tag)",
        table = tag_table
    );
    sqlx::query(&index_sql).execute(pool).await?;

    Ok(())
}

/// List user tables, for debugging views
pub async fn list_tables(pool: &SqlitePool) -> Result<Vec<String>> {
    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(pool)
    .await?;

    Ok(tables)
}
