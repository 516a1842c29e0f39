//! SQLite images repository

use super::{is_unique_violation, SqliteSession};
use crate::models::{FileLocation, ImageEntry, ImageHash, ImageSize};
use crate::repositories::{ImagesRepository, RepositoryError, Transactional};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use std::sync::Arc;
use tracing::debug;

const SELECT_COLUMNS: &str =
    "SELECT image_id, file_location, width, height, file_type, hash, file_size, added_at, updated_at FROM images";

/// Images repository on a shared session
pub struct SqliteImagesRepository {
    session: Arc<SqliteSession>,
    lookup_chunk_size: usize,
}

impl SqliteImagesRepository {
    /// `lookup_chunk_size` caps the IN-list length of hash lookups
    pub fn new(session: Arc<SqliteSession>, lookup_chunk_size: usize) -> Self {
        Self {
            session,
            lookup_chunk_size: lookup_chunk_size.max(1),
        }
    }
}

fn row_to_entry(row: &SqliteRow) -> Result<ImageEntry, RepositoryError> {
    let size = ImageSize::new(row.try_get("width")?, row.try_get("height")?)?;
    let file_size: i64 = row.try_get("file_size")?;
    let added_at: Option<NaiveDateTime> = row.try_get("added_at")?;
    let updated_at: Option<NaiveDateTime> = row.try_get("updated_at")?;

    Ok(ImageEntry {
        image_id: Some(row.try_get("image_id")?),
        file_location: FileLocation::new(row.try_get::<String, _>("file_location")?)?,
        width: size.width(),
        height: size.height(),
        file_type: row.try_get("file_type")?,
        hash: ImageHash::new(row.try_get::<String, _>("hash")?)?,
        file_size: u64::try_from(file_size)
            .map_err(|_| RepositoryError::InvalidData(format!("negative file_size {}", file_size)))?,
        added_at: added_at.map(|t| t.and_utc()),
        updated_at: updated_at.map(|t| t.and_utc()),
    })
}

fn file_size_param(entry: &ImageEntry) -> Result<i64, RepositoryError> {
    i64::try_from(entry.file_size).map_err(|_| {
        RepositoryError::InvalidArgument(format!(
            "file_size {} of {} out of range",
            entry.file_size, entry.file_location
        ))
    })
}

fn map_write_error(e: sqlx::Error, entry: &ImageEntry) -> RepositoryError {
    if is_unique_violation(&e) {
        RepositoryError::DuplicateImage(entry.hash.to_string())
    } else {
        RepositoryError::Database(e)
    }
}

#[async_trait]
impl Transactional for SqliteImagesRepository {
    async fn commit(&self) -> Result<(), RepositoryError> {
        Ok(self.session.commit().await?)
    }

    async fn rollback(&self) -> Result<(), RepositoryError> {
        Ok(self.session.rollback().await?)
    }
}

#[async_trait]
impl ImagesRepository for SqliteImagesRepository {
    async fn add(&self, entries: &[ImageEntry]) -> Result<Vec<i64>, RepositoryError> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.session.write().await?;
        let mut ids = Vec::with_capacity(entries.len());

        // Row by row so RETURNING yields ids in submission order
        for entry in entries {
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO images (file_location, width, height, file_type, hash, file_size)
                VALUES (?, ?, ?, ?, ?, ?)
                RETURNING image_id
                "#,
            )
            .bind(entry.file_location.as_str())
            .bind(i64::from(entry.width))
            .bind(i64::from(entry.height))
            .bind(&entry.file_type)
            .bind(entry.hash.as_str())
            .bind(file_size_param(entry)?)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| map_write_error(e, entry))?;

            ids.push(id);
        }

        debug!(count = ids.len(), "Inserted images");
        Ok(ids)
    }

    async fn find_by_hashes(&self, hashes: &[ImageHash]) -> Result<Vec<ImageEntry>, RepositoryError> {
        if hashes.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.session.read().await?;
        let mut found = Vec::new();

        for chunk in hashes.chunks(self.lookup_chunk_size) {
            let mut query: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("{} WHERE hash IN (", SELECT_COLUMNS));
            {
                let mut separated = query.separated(", ");
                for hash in chunk {
                    separated.push_bind(hash.as_str().to_string());
                }
                separated.push_unseparated(")");
            }

            let rows = query.build().fetch_all(&mut *conn).await?;
            for row in &rows {
                found.push(row_to_entry(row)?);
            }
        }

        debug!(
            requested = hashes.len(),
            found = found.len(),
            "Looked up image hashes"
        );
        Ok(found)
    }

    async fn get(&self, image_id: i64) -> Result<Option<ImageEntry>, RepositoryError> {
        let sql = format!("{} WHERE image_id = ?", SELECT_COLUMNS);
        let mut conn = self.session.read().await?;
        let row = sqlx::query(&sql)
            .bind(image_id)
            .fetch_optional(&mut *conn)
            .await?;

        row.as_ref().map(row_to_entry).transpose()
    }

    async fn update(&self, entries: &[ImageEntry]) -> Result<(), RepositoryError> {
        if entries.is_empty() {
            return Err(RepositoryError::InvalidArgument(
                "update needs at least one entry".to_string(),
            ));
        }

        let mut conn = self.session.write().await?;

        for entry in entries {
            let image_id = entry
                .image_id
                .ok_or_else(|| RepositoryError::MissingImageId(entry.file_location.to_string()))?;

            let result = sqlx::query(
                r#"
                UPDATE images
                SET file_location = ?, width = ?, height = ?, file_type = ?, hash = ?,
                    file_size = ?, updated_at = CURRENT_TIMESTAMP
                WHERE image_id = ?
                "#,
            )
            .bind(entry.file_location.as_str())
            .bind(i64::from(entry.width))
            .bind(i64::from(entry.height))
            .bind(&entry.file_type)
            .bind(entry.hash.as_str())
            .bind(file_size_param(entry)?)
            .bind(image_id)
            .execute(&mut *conn)
            .await
            .map_err(|e| map_write_error(e, entry))?;

            if result.rows_affected() == 0 {
                return Err(RepositoryError::ImageNotFound(format!("image_id {}", image_id)));
            }
        }

        debug!(count = entries.len(), "Updated images");
        Ok(())
    }

    async fn remove(&self, image_ids: &[i64]) -> Result<u64, RepositoryError> {
        if image_ids.is_empty() {
            return Err(RepositoryError::InvalidArgument(
                "remove needs at least one image_id".to_string(),
            ));
        }

        let mut conn = self.session.write().await?;

        let mut query: QueryBuilder<Sqlite> =
            QueryBuilder::new("DELETE FROM images WHERE image_id IN (");
        {
            let mut separated = query.separated(", ");
            for id in image_ids {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
        }

        let removed = query.build().execute(&mut *conn).await?.rows_affected();
        debug!(requested = image_ids.len(), removed, "Removed images");
        Ok(removed)
    }

    async fn contains(&self, image_id: i64) -> Result<bool, RepositoryError> {
        let mut conn = self.session.read().await?;
        let exists: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM images WHERE image_id = ?)")
                .bind(image_id)
                .fetch_one(&mut *conn)
                .await?;
        Ok(exists != 0)
    }

    async fn count(&self) -> Result<u64, RepositoryError> {
        let mut conn = self.session.read().await?;
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM images")
            .fetch_one(&mut *conn)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn list(&self, limit: u32) -> Result<Vec<ImageEntry>, RepositoryError> {
        let sql = format!("{} ORDER BY image_id LIMIT ?", SELECT_COLUMNS);
        let mut conn = self.session.read().await?;
        let rows = sqlx::query(&sql)
            .bind(i64::from(limit))
            .fetch_all(&mut *conn)
            .await?;

        rows.iter().map(row_to_entry).collect()
    }
}
