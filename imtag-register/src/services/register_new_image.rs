//! New image registration
//!
//! [`RegisterNewImage::handle`] runs a batch of files through
//! extract → deduplicate → tag → classify → persist. The first four stages
//! absorb per-file failures; only the persistence stage can fail the batch,
//! and it commits the images and their tags together or not at all.

use crate::error::{RegisterError, RegisterResult};
use crate::models::{ImageEntry, ImageHash, ModelTagEntries, TaggerResult};
use crate::repositories::unit_of_work::{IMAGES, MODEL_TAG};
use crate::repositories::UnitOfWork;
use crate::services::deduplication::ImageDeduplicationService;
use crate::services::metadata_extractor::{ExtractedImage, ImageMetadataExtractor};
use crate::services::outcome_classifier::{OutcomeCounts, TaggingOutcomeClassifier};
use crate::services::parallel_executor::{
    ExecutionStrategy, ExecutorOptions, ParallelExecutor,
};
use crate::storage::Storage;
use crate::tagger::Tagger;
use std::collections::HashSet;
use std::convert::Infallible;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Repositories the registration scope needs
pub const REQUIRED_REPOSITORIES: [&str; 2] = [IMAGES, MODEL_TAG];

/// Why a run ended before persisting anything
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    NoInputFiles,
    /// Every file failed extraction
    NoValidImages,
    /// Every image is already stored
    NoNewImages,
    /// No image got at least one tag
    NoTaggedImages,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            StopReason::NoInputFiles => "no input files",
            StopReason::NoValidImages => "no valid image entries",
            StopReason::NoNewImages => "no new images after duplicate check",
            StopReason::NoTaggedImages => "no tagged images",
        };
        f.write_str(reason)
    }
}

/// Counts for one `handle` run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationSummary {
    pub input_files: usize,
    /// Files that produced an entry
    pub extracted: usize,
    /// Same content appearing more than once in this batch
    pub batch_duplicates: usize,
    /// Content already in the images store
    pub stored_duplicates: usize,
    pub tagging: OutcomeCounts,
    pub registered_images: usize,
    /// Tag rows written
    pub registered_tag_entries: u64,
    pub stopped: Option<StopReason>,
}

impl RegistrationSummary {
    fn stop(mut self, reason: StopReason) -> Self {
        self.stopped = Some(reason);
        self
    }
}

impl fmt::Display for RegistrationSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "input files:            {}", self.input_files)?;
        writeln!(f, "extracted:              {}", self.extracted)?;
        writeln!(f, "batch duplicates:       {}", self.batch_duplicates)?;
        writeln!(f, "already registered:     {}", self.stored_duplicates)?;
        writeln!(f, "tagging:                {}", self.tagging)?;
        writeln!(f, "registered images:      {}", self.registered_images)?;
        write!(f, "registered tag entries: {}", self.registered_tag_entries)?;
        if let Some(reason) = self.stopped {
            write!(f, "\nstopped early:          {}", reason)?;
        }
        Ok(())
    }
}

/// Registration use case
pub struct RegisterNewImage {
    unit_of_work: UnitOfWork,
    tagger: Arc<dyn Tagger>,
    extractor: ImageMetadataExtractor,
    show_progress: bool,
}

impl RegisterNewImage {
    /// `unit_of_work` must provide `images` and `model_tag`; other
    /// repositories are left out of the registration scope.
    pub fn new(
        unit_of_work: &UnitOfWork,
        tagger: Arc<dyn Tagger>,
        storage: Arc<dyn Storage>,
    ) -> RegisterResult<Self> {
        let unit_of_work = unit_of_work.subset(&REQUIRED_REPOSITORIES)?;
        // Fail at construction rather than mid-run on a mistyped repository
        unit_of_work.images(IMAGES)?;
        unit_of_work.model_tag(MODEL_TAG)?;

        Ok(Self {
            unit_of_work,
            tagger,
            extractor: ImageMetadataExtractor::new(storage),
            show_progress: false,
        })
    }

    /// Draw progress bars for the parallel stages
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    fn executor(&self, n_workers: usize, description: &str) -> ParallelExecutor {
        ParallelExecutor::new(
            ExecutorOptions::new(n_workers)
                .strategy(ExecutionStrategy::Thread)
                .show_progress(self.show_progress)
                .description(description)
                .raise_on_error(false),
        )
    }

    /// Register every new image among `image_files`
    pub async fn handle(
        &self,
        image_files: &[String],
        n_workers: usize,
    ) -> RegisterResult<RegistrationSummary> {
        let mut summary = RegistrationSummary {
            input_files: image_files.len(),
            ..Default::default()
        };

        if image_files.is_empty() {
            warn!("No input files");
            return Ok(summary.stop(StopReason::NoInputFiles));
        }
        info!(total = image_files.len(), "Registering input image files");

        // 1. Read and extract metadata
        let extracted = self.extract_all(image_files, n_workers).await?;
        summary.extracted = extracted.len();
        if extracted.is_empty() {
            warn!("No valid image entries");
            return Ok(summary.stop(StopReason::NoValidImages));
        }

        // 2. Drop content already stored, or repeated within this batch
        let (extracted, batch_duplicates) =
            ImageDeduplicationService::collapse_batch_duplicates(extracted, |e| &e.entry.hash);
        summary.batch_duplicates = batch_duplicates;
        if batch_duplicates > 0 {
            info!(batch_duplicates, "Collapsed identical files within the batch");
        }

        let candidates = extracted.len();
        let new_images = self.filter_stored(extracted).await?;
        summary.stored_duplicates = candidates - new_images.len();
        if new_images.is_empty() {
            info!("No image entries after duplicate check");
            return Ok(summary.stop(StopReason::NoNewImages));
        }

        // 3. Tag
        let (entries, tagger_results) = self.tag_all(new_images, n_workers).await?;

        // 4. Classify
        let outcome = TaggingOutcomeClassifier::classify(entries, tagger_results)?;
        summary.tagging = outcome.counts();
        if !outcome.empty.is_empty() {
            warn!(
                count = outcome.empty.len(),
                "Images with no tag above threshold will not be registered"
            );
        }
        if !outcome.has_any_success() {
            warn!("No valid tagged images after filtering");
            return Ok(summary.stop(StopReason::NoTaggedImages));
        }
        info!(counts = %outcome.counts(), "Tagging result");

        // 5. Persist images and their tags together
        let (registered_images, registered_tag_entries) = self
            .unit_of_work
            .run(|uow| async move {
                let images = uow.images(IMAGES)?;
                let model_tag = uow.model_tag(MODEL_TAG)?;

                let entries: Vec<ImageEntry> = outcome
                    .success
                    .iter()
                    .map(|tagged| tagged.image_entry.clone())
                    .collect();
                let image_ids = images.add(&entries).await?;

                let tag_entries: Vec<ModelTagEntries> = image_ids
                    .iter()
                    .zip(&outcome.success)
                    .map(|(image_id, tagged)| {
                        ModelTagEntries::from_tagger_result(*image_id, &tagged.tagger_result)
                    })
                    .collect();
                let written = model_tag.add(&tag_entries).await?;

                Ok::<_, RegisterError>((image_ids.len(), written))
            })
            .await?;

        summary.registered_images = registered_images;
        summary.registered_tag_entries = registered_tag_entries;

        info!(
            registered_images,
            registered_tag_entries, "Registration complete"
        );
        Ok(summary)
    }

    async fn extract_all(
        &self,
        image_files: &[String],
        n_workers: usize,
    ) -> RegisterResult<Vec<ExtractedImage>> {
        let extractor = self.extractor.clone();
        let results = self
            .executor(n_workers, "Extracting metadata")
            .execute(
                move |file: String| {
                    let extractor = extractor.clone();
                    async move { Ok::<_, Infallible>(extractor.extract_from_file(&file, None).await) }
                },
                image_files.to_vec(),
            )
            .await?;

        let mut extracted = Vec::with_capacity(results.len());
        for (file, result) in image_files.iter().zip(results) {
            match result {
                Ok(Some(image)) => extracted.push(image),
                Ok(None) => {}
                Err(e) => warn!(file = %file, error = %e, "Skipped: extraction task failed"),
            }
        }
        Ok(extracted)
    }

    async fn filter_stored(
        &self,
        extracted: Vec<ExtractedImage>,
    ) -> RegisterResult<Vec<ExtractedImage>> {
        let images = self.unit_of_work.images(IMAGES)?;
        let entries: Vec<ImageEntry> = extracted.iter().map(|e| e.entry.clone()).collect();

        let survivors =
            ImageDeduplicationService::filter_duplicates(&entries, images.as_ref()).await?;
        let allowed: HashSet<ImageHash> = survivors.into_iter().map(|e| e.hash).collect();

        Ok(extracted
            .into_iter()
            .filter(|e| allowed.contains(&e.entry.hash))
            .collect())
    }

    async fn tag_all(
        &self,
        images: Vec<ExtractedImage>,
        n_workers: usize,
    ) -> RegisterResult<(Vec<ImageEntry>, Vec<Option<TaggerResult>>)> {
        let (entries, binaries): (Vec<ImageEntry>, Vec<Vec<u8>>) =
            images.into_iter().map(|e| (e.entry, e.binary)).unzip();

        let tagger = Arc::clone(&self.tagger);
        let results = self
            .executor(n_workers, "Tagging images")
            .execute(
                move |binary: Vec<u8>| {
                    let tagger = Arc::clone(&tagger);
                    async move { tagger.tag(&binary).await }
                },
                binaries,
            )
            .await?;

        let tagger_results = entries
            .iter()
            .zip(results)
            .map(|(entry, result)| match result {
                Ok(tags) => Some(tags),
                Err(e) => {
                    warn!(file = %entry.file_location, error = %e, "Skipped: tagging failed");
                    None
                }
            })
            .collect();

        Ok((entries, tagger_results))
    }
}
