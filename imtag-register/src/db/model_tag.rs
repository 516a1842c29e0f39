//! SQLite model tag repository
//!
//! Each tagging model writes to its own table, named at construction.

use super::{is_foreign_key_violation, SqliteSession};
use crate::models::{ModelTagEntries, ModelTagEntry};
use crate::repositories::{ModelTagRepository, RepositoryError, Transactional};
use async_trait::async_trait;
use imtag_common::db::is_valid_identifier;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::sync::Arc;
use tracing::debug;

/// Model tag repository on a shared session
pub struct SqliteModelTagRepository {
    session: Arc<SqliteSession>,
    table: String,
}

impl SqliteModelTagRepository {
    pub fn new(session: Arc<SqliteSession>, table: impl Into<String>) -> Result<Self, RepositoryError> {
        let table = table.into();
        if !is_valid_identifier(&table) {
            return Err(RepositoryError::InvalidArgument(format!(
                "Invalid tag table name: {:?}",
                table
            )));
        }
        Ok(Self { session, table })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn select(&self) -> String {
        format!(
            "SELECT image_id, category, tag, score, archived FROM {}",
            self.table
        )
    }
}

fn row_to_entry(row: &SqliteRow) -> Result<ModelTagEntry, RepositoryError> {
    Ok(ModelTagEntry {
        image_id: row.try_get("image_id")?,
        category: row.try_get("category")?,
        tag: row.try_get("tag")?,
        score: row.try_get("score")?,
        archived: row.try_get("archived")?,
    })
}

#[async_trait]
impl Transactional for SqliteModelTagRepository {
    async fn commit(&self) -> Result<(), RepositoryError> {
        Ok(self.session.commit().await?)
    }

    async fn rollback(&self) -> Result<(), RepositoryError> {
        Ok(self.session.rollback().await?)
    }
}

#[async_trait]
impl ModelTagRepository for SqliteModelTagRepository {
    async fn add(&self, entries: &[ModelTagEntries]) -> Result<u64, RepositoryError> {
        if entries.iter().all(ModelTagEntries::is_empty) {
            return Ok(0);
        }

        let sql = format!(
            "INSERT OR REPLACE INTO {} (image_id, category, tag, score, archived) VALUES (?, ?, ?, ?, ?)",
            self.table
        );
        let mut conn = self.session.write().await?;
        let mut written = 0;

        for tags in entries {
            for entry in tags.iter() {
                sqlx::query(&sql)
                    .bind(entry.image_id)
                    .bind(&entry.category)
                    .bind(&entry.tag)
                    .bind(entry.score)
                    .bind(entry.archived)
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        if is_foreign_key_violation(&e) {
                            RepositoryError::ImageNotFound(format!("image_id {}", entry.image_id))
                        } else {
                            RepositoryError::Database(e)
                        }
                    })?;
                written += 1;
            }
        }

        debug!(table = %self.table, rows = written, "Inserted model tags");
        Ok(written)
    }

    async fn get(&self, image_id: i64) -> Result<ModelTagEntries, RepositoryError> {
        let sql = format!("{} WHERE image_id = ? ORDER BY category, score DESC", self.select());
        let mut conn = self.session.read().await?;
        let rows = sqlx::query(&sql)
            .bind(image_id)
            .fetch_all(&mut *conn)
            .await?;

        let entries = rows.iter().map(row_to_entry).collect::<Result<Vec<_>, _>>()?;
        Ok(ModelTagEntries::new(entries))
    }

    async fn remove_all_by_image_id(&self, image_id: i64) -> Result<u64, RepositoryError> {
        let sql = format!("DELETE FROM {} WHERE image_id = ?", self.table);
        let mut conn = self.session.write().await?;
        let removed = sqlx::query(&sql)
            .bind(image_id)
            .execute(&mut *conn)
            .await?
            .rows_affected();

        debug!(table = %self.table, image_id, removed, "Removed model tags");
        Ok(removed)
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let sql = format!("SELECT COUNT(*) FROM {}", self.table);
        let mut conn = self.session.read().await?;
        let count: i64 = sqlx::query_scalar(&sql)
            .fetch_one(&mut *conn)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn list(&self, limit: u32) -> Result<Vec<ModelTagEntry>, RepositoryError> {
        let sql = format!("{} ORDER BY image_id, category, score DESC LIMIT ?", self.select());
        let mut conn = self.session.read().await?;
        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(&mut *conn)
            .await?;

        rows.iter().map(row_to_entry).collect()
    }
}
