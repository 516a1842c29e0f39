//! Image metadata extraction
//!
//! Builds an [`ImageEntry`] from a stored file: dimensions from the image
//! header, SHA-256 of the raw bytes, size and extension from storage.

use crate::models::{FileLocation, ImageEntry, ImageMetadata, ImageSize, ValidationError};
use crate::storage::{Storage, StorageError};
use image::{ImageError, ImageReader};
use std::io::Cursor;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

/// Extraction errors
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Not an image format the decoder recognises
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    /// Recognised format but unreadable header
    #[error("Failed to decode {location}: {message}")]
    Decode { location: String, message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Entry together with the bytes it was built from
#[derive(Debug, Clone)]
pub struct ExtractedImage {
    pub entry: ImageEntry,
    pub binary: Vec<u8>,
}

/// Read width and height without decoding pixel data
pub fn read_dimensions(file_id: &str, binary: &[u8]) -> Result<(u32, u32), ExtractError> {
    let reader = ImageReader::new(Cursor::new(binary))
        .with_guessed_format()
        .map_err(|e| ExtractError::Decode {
            location: file_id.to_string(),
            message: e.to_string(),
        })?;

    reader.into_dimensions().map_err(|e| match e {
        ImageError::Unsupported(_) => ExtractError::UnsupportedFormat(file_id.to_string()),
        other => ExtractError::Decode {
            location: file_id.to_string(),
            message: other.to_string(),
        },
    })
}

/// Extracts metadata through a storage port
#[derive(Clone)]
pub struct ImageMetadataExtractor {
    storage: Arc<dyn Storage>,
}

impl ImageMetadataExtractor {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Build the entry for `file_id`, reading it from storage unless
    /// `binary` is supplied
    pub async fn extract(
        &self,
        file_id: &str,
        binary: Option<Vec<u8>>,
    ) -> Result<ExtractedImage, ExtractError> {
        let file_location = FileLocation::new(file_id)?;

        let binary = match binary {
            Some(binary) => binary,
            None => self.storage.read_binary(file_id).await?,
        };

        let (width, height) = read_dimensions(file_id, &binary)?;
        let size = ImageSize::new(i64::from(width), i64::from(height))?;
        let file_size = self.storage.get_size(file_id).await?;
        let file_type = self.storage.get_file_extension(file_id).await?;

        let metadata = ImageMetadata::create(file_location, &binary, size, file_type, file_size);

        Ok(ExtractedImage {
            entry: ImageEntry::from_metadata(metadata),
            binary,
        })
    }

    /// Like [`extract`](Self::extract), but failures are logged and yield `None`
    pub async fn extract_from_file(
        &self,
        file_id: &str,
        binary: Option<Vec<u8>>,
    ) -> Option<ExtractedImage> {
        match self.extract(file_id, binary).await {
            Ok(extracted) => Some(extracted),
            Err(ExtractError::UnsupportedFormat(_)) => {
                warn!(file = file_id, "Skipped: unsupported file type");
                None
            }
            Err(e) => {
                warn!(file = file_id, error = %e, "Skipped: failed to load image");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImageHash;
    use crate::storage::LocalStorage;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use tempfile::TempDir;

    fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut Cursor::new(&mut buf), format)
            .unwrap();
        buf
    }

    fn extractor(dir: &TempDir) -> ImageMetadataExtractor {
        ImageMetadataExtractor::new(Arc::new(LocalStorage::new(dir.path())))
    }

    #[test]
    fn test_read_dimensions() {
        let png = encode(32, 16, ImageFormat::Png);
        assert_eq!(read_dimensions("a.png", &png).unwrap(), (32, 16));

        let jpeg = encode(8, 24, ImageFormat::Jpeg);
        assert_eq!(read_dimensions("a.jpg", &jpeg).unwrap(), (8, 24));

        assert!(matches!(
            read_dimensions("a.bin", b"plain text, not pixels"),
            Err(ExtractError::UnsupportedFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_extract_reads_storage() {
        let dir = TempDir::new().unwrap();
        let png = encode(10, 20, ImageFormat::Png);
        std::fs::write(dir.path().join("Photo.PNG"), &png).unwrap();

        let extracted = extractor(&dir).extract("Photo.PNG", None).await.unwrap();
        let entry = &extracted.entry;

        assert_eq!(entry.image_id, None);
        assert_eq!(entry.file_location.as_str(), "Photo.PNG");
        assert_eq!((entry.width, entry.height), (10, 20));
        assert_eq!(entry.file_type, "png");
        assert_eq!(entry.file_size, png.len() as u64);
        assert_eq!(entry.hash, ImageHash::from_binary(&png));
        assert_eq!(extracted.binary, png);
    }

    #[tokio::test]
    async fn test_preloaded_binary_is_hashed() {
        let dir = TempDir::new().unwrap();
        let png = encode(4, 4, ImageFormat::Png);
        std::fs::write(dir.path().join("x.png"), &png).unwrap();

        let extracted = extractor(&dir)
            .extract("x.png", Some(png.clone()))
            .await
            .unwrap();
        assert_eq!(extracted.entry.hash, ImageHash::from_binary(&png));
    }

    #[tokio::test]
    async fn test_failures_are_absorbed() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("corrupt.bin"), b"garbage bytes").unwrap();
        let extractor = extractor(&dir);

        assert!(extractor.extract_from_file("corrupt.bin", None).await.is_none());
        assert!(extractor.extract_from_file("missing.png", None).await.is_none());
        assert!(extractor.extract_from_file("   ", None).await.is_none());
    }
}
