//! Image identity and metadata
//!
//! Value objects validate at construction, so an `ImageEntry` can only hold a
//! well-formed hash, a non-blank location and positive dimensions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Value construction errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Hash is not 64 lower-case hex characters
    #[error("Invalid image hash {0:?}: expected 64 lower-case hex characters")]
    InvalidHash(String),

    /// File location empty or whitespace only
    #[error("File location cannot be empty or whitespace only")]
    EmptyFileLocation,

    /// Width or height not positive
    #[error("Invalid image size {width}x{height}: width and height must be positive")]
    InvalidImageSize { width: i64, height: i64 },
}

/// SHA-256 of an image's binary content, lower-case hex
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageHash(String);

impl ImageHash {
    /// Validate an existing hex digest
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        let well_formed = value.len() == 64
            && value
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));

        if well_formed {
            Ok(Self(value))
        } else {
            Err(ValidationError::InvalidHash(value))
        }
    }

    /// Hash raw binary content
    pub fn from_binary(binary: &[u8]) -> Self {
        Self(format!("{:x}", Sha256::digest(binary)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ImageHash {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ImageHash> for String {
    fn from(hash: ImageHash) -> Self {
        hash.0
    }
}

/// Storage identifier of an image file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileLocation(String);

impl FileLocation {
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ValidationError::EmptyFileLocation);
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for FileLocation {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<FileLocation> for String {
    fn from(location: FileLocation) -> Self {
        location.0
    }
}

/// Pixel dimensions, both strictly positive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageSize {
    width: u32,
    height: u32,
}

impl ImageSize {
    pub fn new(width: i64, height: i64) -> Result<Self, ValidationError> {
        match (u32::try_from(width), u32::try_from(height)) {
            (Ok(w), Ok(h)) if w > 0 && h > 0 => Ok(Self {
                width: w,
                height: h,
            }),
            _ => Err(ValidationError::InvalidImageSize { width, height }),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// Metadata gathered for one file before it becomes an entry
///
/// Consumed exactly once by [`ImageEntry::from_metadata`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMetadata {
    pub file_location: FileLocation,
    pub hash: ImageHash,
    pub size: ImageSize,
    /// Lower-case extension without the dot
    pub file_type: String,
    /// Bytes on storage
    pub file_size: u64,
}

impl ImageMetadata {
    /// Assemble metadata from already-loaded data, hashing the binary
    pub fn create(
        file_location: FileLocation,
        image_binary: &[u8],
        size: ImageSize,
        file_type: impl Into<String>,
        file_size: u64,
    ) -> Self {
        Self {
            file_location,
            hash: ImageHash::from_binary(image_binary),
            size,
            file_type: file_type.into(),
            file_size,
        }
    }
}

/// Durable record of one image
///
/// `image_id`, `added_at` and `updated_at` are assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageEntry {
    pub image_id: Option<i64>,
    pub file_location: FileLocation,
    pub width: u32,
    pub height: u32,
    pub file_type: String,
    pub hash: ImageHash,
    pub file_size: u64,
    pub added_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ImageEntry {
    /// Build an unsaved entry from extracted metadata
    pub fn from_metadata(metadata: ImageMetadata) -> Self {
        Self {
            image_id: None,
            file_location: metadata.file_location,
            width: metadata.size.width(),
            height: metadata.size.height(),
            file_type: metadata.file_type,
            hash: metadata.hash,
            file_size: metadata.file_size,
            added_at: None,
            updated_at: None,
        }
    }

    pub fn size(&self) -> ImageSize {
        ImageSize {
            width: self.width,
            height: self.height,
        }
    }
}
