//! Local filesystem storage

use super::{Storage, StorageError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Storage backed by the local filesystem
///
/// Absolute identifiers are used as-is; relative ones resolve against
/// `root_dir`. Listed identifiers are the resolved paths.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
}

impl LocalStorage {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn resolve(&self, file_id: &str) -> PathBuf {
        let path = Path::new(file_id);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root_dir.join(path)
        }
    }

    /// Shared precondition checks for copy and move
    async fn prepare_transfer(
        &self,
        source: &str,
        destination: &str,
        overwrite: bool,
    ) -> Result<(PathBuf, PathBuf), StorageError> {
        let src = self.resolve(source);
        let dest = self.resolve(destination);

        let src_meta = tokio::fs::metadata(&src)
            .await
            .map_err(|e| StorageError::io(source, e))?;
        let dest_meta = tokio::fs::metadata(&dest).await.ok();

        if let Some(dest_meta) = &dest_meta {
            if !overwrite {
                return Err(StorageError::AlreadyExists(path_string(&dest)));
            }
            // Never replace a directory with a file, even when overwriting
            if src_meta.is_file() && dest_meta.is_dir() {
                return Err(StorageError::IsADirectory(path_string(&dest)));
            }
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(path_string(parent), e))?;
        }

        Ok((src, dest))
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Blocking directory listing
fn list_dir(root: &Path, recursive: bool) -> Vec<String> {
    let walker = WalkDir::new(root)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .follow_links(false)
        .sort_by_file_name();

    let mut files = Vec::new();
    for entry in walker {
        match entry {
            Ok(entry) => {
                // Symlinks are listed but never descended into
                if !entry.file_type().is_dir() {
                    files.push(path_string(entry.path()));
                }
            }
            Err(e) => {
                warn!(error = %e, "Error accessing entry, skipping");
            }
        }
    }
    files
}

#[async_trait]
impl Storage for LocalStorage {
    async fn list_files(&self, path: &str, recursive: bool) -> Result<Vec<String>, StorageError> {
        let root = self.resolve(path);
        let metadata = tokio::fs::metadata(&root)
            .await
            .map_err(|e| StorageError::io(path, e))?;

        if metadata.is_file() {
            return Ok(vec![path_string(&root)]);
        }

        let files = tokio::task::spawn_blocking(move || list_dir(&root, recursive))
            .await
            .map_err(|e| StorageError::Io {
                path: path.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            })?;

        debug!(path, recursive, count = files.len(), "Listed files");
        Ok(files)
    }

    async fn exists(&self, file_id: &str) -> bool {
        tokio::fs::try_exists(self.resolve(file_id))
            .await
            .unwrap_or(false)
    }

    async fn get_size(&self, file_id: &str) -> Result<u64, StorageError> {
        let metadata = tokio::fs::metadata(self.resolve(file_id))
            .await
            .map_err(|e| StorageError::io(file_id, e))?;
        Ok(metadata.len())
    }

    async fn read_binary(&self, file_id: &str) -> Result<Vec<u8>, StorageError> {
        tokio::fs::read(self.resolve(file_id))
            .await
            .map_err(|e| StorageError::io(file_id, e))
    }

    async fn read_text(&self, file_id: &str) -> Result<String, StorageError> {
        let bytes = self.read_binary(file_id).await?;
        String::from_utf8(bytes).map_err(|_| StorageError::InvalidText(file_id.to_string()))
    }

    async fn get_file_extension(&self, file_id: &str) -> Result<String, StorageError> {
        Ok(Path::new(file_id)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default())
    }

    async fn copy(
        &self,
        source: &str,
        destination: &str,
        overwrite: bool,
    ) -> Result<String, StorageError> {
        let (src, dest) = self.prepare_transfer(source, destination, overwrite).await?;
        tokio::fs::copy(&src, &dest)
            .await
            .map_err(|e| StorageError::io(source, e))?;
        Ok(path_string(&dest))
    }

    async fn move_file(
        &self,
        source: &str,
        destination: &str,
        overwrite: bool,
    ) -> Result<String, StorageError> {
        let (src, dest) = self.prepare_transfer(source, destination, overwrite).await?;

        if tokio::fs::rename(&src, &dest).await.is_err() {
            // Cross-device move: copy then remove
            tokio::fs::copy(&src, &dest)
                .await
                .map_err(|e| StorageError::io(source, e))?;
            tokio::fs::remove_file(&src)
                .await
                .map_err(|e| StorageError::io(source, e))?;
        }
        Ok(path_string(&dest))
    }

    async fn delete(&self, file_id: &str, recursive: bool) -> Result<(), StorageError> {
        let path = self.resolve(file_id);
        let metadata = match tokio::fs::symlink_metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StorageError::io(file_id, e)),
        };

        if metadata.is_dir() {
            if !recursive {
                return Err(StorageError::IsADirectory(path_string(&path)));
            }
            tokio::fs::remove_dir_all(&path)
                .await
                .map_err(|e| StorageError::io(file_id, e))
        } else {
            tokio::fs::remove_file(&path)
                .await
                .map_err(|e| StorageError::io(file_id, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage_with_files() -> (TempDir, LocalStorage) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.PNG"), b"aaa").unwrap();
        std::fs::write(dir.path().join("b.jpg"), b"bbbb").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested").join("c.webp"), b"c").unwrap();
        let storage = LocalStorage::new(dir.path());
        (dir, storage)
    }

    #[tokio::test]
    async fn test_list_files_flat_and_recursive() {
        let (dir, storage) = storage_with_files();

        let flat = storage.list_files(".", false).await.unwrap();
        assert_eq!(flat.len(), 2);
        assert!(flat.iter().all(|f| !f.contains("nested")));

        let all = storage
            .list_files(dir.path().to_str().unwrap(), true)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().any(|f| f.ends_with("c.webp")));
    }

    #[tokio::test]
    async fn test_list_files_on_file_lists_itself() {
        let (_dir, storage) = storage_with_files();
        let files = storage.list_files("b.jpg", true).await.unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("b.jpg"));
    }

    #[tokio::test]
    async fn test_list_files_missing_path() {
        let (_dir, storage) = storage_with_files();
        let result = storage.list_files("missing", false).await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_read_and_metadata() {
        let (_dir, storage) = storage_with_files();

        assert_eq!(storage.read_binary("b.jpg").await.unwrap(), b"bbbb");
        assert_eq!(storage.read_text("a.PNG").await.unwrap(), "aaa");
        assert_eq!(storage.get_size("b.jpg").await.unwrap(), 4);
        assert_eq!(storage.get_file_extension("a.PNG").await.unwrap(), "png");
        assert_eq!(storage.get_file_extension("README").await.unwrap(), "");
        assert!(storage.exists("nested/c.webp").await);
        assert!(!storage.exists("nope.gif").await);
        assert!(matches!(
            storage.read_binary("nope.gif").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_copy_refuses_overwrite() {
        let (_dir, storage) = storage_with_files();

        let result = storage.copy("a.PNG", "b.jpg", false).await;
        assert!(matches!(result, Err(StorageError::AlreadyExists(_))));

        storage.copy("a.PNG", "b.jpg", true).await.unwrap();
        assert_eq!(storage.read_binary("b.jpg").await.unwrap(), b"aaa");
    }

    #[tokio::test]
    async fn test_copy_file_onto_directory_rejected() {
        let (_dir, storage) = storage_with_files();
        let result = storage.copy("a.PNG", "nested", true).await;
        assert!(matches!(result, Err(StorageError::IsADirectory(_))));
    }

    #[tokio::test]
    async fn test_move_creates_parents() {
        let (_dir, storage) = storage_with_files();

        let dest = storage
            .move_file("b.jpg", "deep/er/moved.jpg", false)
            .await
            .unwrap();

        assert!(dest.ends_with("moved.jpg"));
        assert!(!storage.exists("b.jpg").await);
        assert_eq!(storage.read_binary("deep/er/moved.jpg").await.unwrap(), b"bbbb");
    }

    #[tokio::test]
    async fn test_delete() {
        let (_dir, storage) = storage_with_files();

        storage.delete("a.PNG", false).await.unwrap();
        assert!(!storage.exists("a.PNG").await);

        // Missing target is fine
        storage.delete("a.PNG", false).await.unwrap();

        let result = storage.delete("nested", false).await;
        assert!(matches!(result, Err(StorageError::IsADirectory(_))));

        storage.delete("nested", true).await.unwrap();
        assert!(!storage.exists("nested").await);
    }
}
