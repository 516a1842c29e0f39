//! Content-hash deduplication

use crate::models::{ImageEntry, ImageHash};
use crate::repositories::{ImagesRepository, RepositoryError};
use std::collections::HashSet;
use tracing::debug;

/// Filters out images whose content is already known
pub struct ImageDeduplicationService;

impl ImageDeduplicationService {
    /// Keep only entries whose hash is not stored yet, preserving order
    ///
    /// Issues one batched lookup; the repository is not modified.
    pub async fn filter_duplicates(
        entries: &[ImageEntry],
        images: &dyn ImagesRepository,
    ) -> Result<Vec<ImageEntry>, RepositoryError> {
        let hashes: Vec<ImageHash> = entries.iter().map(|e| e.hash.clone()).collect();
        let existing: HashSet<ImageHash> = images
            .find_by_hashes(&hashes)
            .await?
            .into_iter()
            .map(|e| e.hash)
            .collect();

        let survivors: Vec<ImageEntry> = entries
            .iter()
            .filter(|e| !existing.contains(&e.hash))
            .cloned()
            .collect();

        debug!(
            candidates = entries.len(),
            existing = existing.len(),
            survivors = survivors.len(),
            "Filtered stored duplicates"
        );
        Ok(survivors)
    }

    /// Drop later items whose hash repeats an earlier one in the same batch
    ///
    /// Returns the kept items and the number dropped.
    pub fn collapse_batch_duplicates<T, F>(items: Vec<T>, hash_of: F) -> (Vec<T>, usize)
    where
        F: Fn(&T) -> &ImageHash,
    {
        let mut seen: HashSet<ImageHash> = HashSet::with_capacity(items.len());
        let before = items.len();

        let kept: Vec<T> = items
            .into_iter()
            .filter(|item| seen.insert(hash_of(item).clone()))
            .collect();

        let dropped = before - kept.len();
        (kept, dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileLocation, ImageMetadata, ImageSize};
    use crate::repositories::Transactional;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn entry(location: &str, content: &[u8]) -> ImageEntry {
        ImageEntry::from_metadata(ImageMetadata::create(
            FileLocation::new(location).unwrap(),
            content,
            ImageSize::new(1, 1).unwrap(),
            "png",
            content.len() as u64,
        ))
    }

    /// Answers lookups from a fixed set and counts calls
    struct Stored {
        entries: Vec<ImageEntry>,
        lookups: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl Transactional for Stored {
        async fn commit(&self) -> Result<(), RepositoryError> {
            Ok(())
        }
        async fn rollback(&self) -> Result<(), RepositoryError> {
            Ok(())
        }
    }

    #[async_trait]
    impl ImagesRepository for Stored {
        async fn add(&self, _: &[ImageEntry]) -> Result<Vec<i64>, RepositoryError> {
            unreachable!("dedup never writes")
        }
        async fn find_by_hashes(&self, hashes: &[ImageHash]) -> Result<Vec<ImageEntry>, RepositoryError> {
            self.lookups.lock().unwrap().push(hashes.len());
            Ok(self
                .entries
                .iter()
                .filter(|e| hashes.contains(&e.hash))
                .cloned()
                .collect())
        }
        async fn get(&self, _: i64) -> Result<Option<ImageEntry>, RepositoryError> {
            Ok(None)
        }
        async fn update(&self, _: &[ImageEntry]) -> Result<(), RepositoryError> {
            unreachable!("dedup never writes")
        }
        async fn remove(&self, _: &[i64]) -> Result<u64, RepositoryError> {
            unreachable!("dedup never writes")
        }
        async fn contains(&self, _: i64) -> Result<bool, RepositoryError> {
            Ok(false)
        }
        async fn count(&self) -> Result<u64, RepositoryError> {
            Ok(self.entries.len() as u64)
        }
        async fn list(&self, _: u32) -> Result<Vec<ImageEntry>, RepositoryError> {
            Ok(self.entries.clone())
        }
    }

    #[tokio::test]
    async fn test_filter_preserves_order_of_new_entries() {
        let a = entry("a.png", b"a");
        let b = entry("b.png", b"b");
        let c = entry("c.png", b"c");
        let repo = Stored {
            entries: vec![entry("old/b.png", b"b")],
            lookups: Mutex::new(Vec::new()),
        };

        let survivors =
            ImageDeduplicationService::filter_duplicates(&[a.clone(), b, c.clone()], &repo)
                .await
                .unwrap();

        assert_eq!(survivors, vec![a, c]);
        assert_eq!(*repo.lookups.lock().unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn test_filter_empty_input() {
        let repo = Stored {
            entries: Vec::new(),
            lookups: Mutex::new(Vec::new()),
        };
        let survivors = ImageDeduplicationService::filter_duplicates(&[], &repo)
            .await
            .unwrap();
        assert!(survivors.is_empty());
    }

    #[test]
    fn test_collapse_keeps_first_occurrence() {
        let items = vec![
            entry("1.png", b"x"),
            entry("2.png", b"y"),
            entry("3.png", b"x"),
            entry("4.png", b"x"),
        ];

        let (kept, dropped) =
            ImageDeduplicationService::collapse_batch_duplicates(items, |e| &e.hash);

        assert_eq!(dropped, 2);
        let locations: Vec<&str> = kept.iter().map(|e| e.file_location.as_str()).collect();
        assert_eq!(locations, vec!["1.png", "2.png"]);
    }
}
