//! Registration services
//!
//! Stage services (extract, deduplicate, classify) and the parallel executor
//! they run on, composed by [`register_new_image::RegisterNewImage`].

pub mod deduplication;
pub mod metadata_extractor;
pub mod outcome_classifier;
pub mod parallel_executor;
pub mod register_new_image;

pub use deduplication::ImageDeduplicationService;
pub use metadata_extractor::{ExtractError, ExtractedImage, ImageMetadataExtractor};
pub use outcome_classifier::{
    ClassifyError, OutcomeCounts, TaggedImageEntry, TaggingOutcome, TaggingOutcomeClassifier,
};
pub use parallel_executor::{
    ExecutionStrategy, ExecutorError, ExecutorOptions, ParallelExecutor, TaskError, TaskResult,
};
pub use register_new_image::{RegisterNewImage, RegistrationSummary, StopReason};
