//! Domain data model for image registration

pub mod image;
pub mod model_tag;
pub mod tagger_result;

pub use image::{FileLocation, ImageEntry, ImageHash, ImageMetadata, ImageSize, ValidationError};
pub use model_tag::{ModelTagEntries, ModelTagEntry};
pub use tagger_result::{category, TagScore, TaggerResult};
