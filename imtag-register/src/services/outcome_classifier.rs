//! Tagging outcome classification

use crate::models::{ImageEntry, TaggerResult};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassifyError {
    /// Entries and results must line up one to one
    #[error("Length mismatch: {entries} entries but {results} tagging results")]
    LengthMismatch { entries: usize, results: usize },
}

/// An entry and the tags inferred for it
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedImageEntry {
    pub image_entry: ImageEntry,
    pub tagger_result: TaggerResult,
}

/// Per-bucket counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OutcomeCounts {
    pub success: usize,
    pub failure: usize,
    pub empty: usize,
}

impl fmt::Display for OutcomeCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "success={} failure={} empty={}",
            self.success, self.failure, self.empty
        )
    }
}

/// Partition of a tagged batch; every input lands in exactly one bucket
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaggingOutcome {
    /// Tagged with at least one tag
    pub success: Vec<TaggedImageEntry>,
    /// Tagging raised or returned nothing
    pub failure: Vec<ImageEntry>,
    /// Tagged, but no tag cleared the threshold
    pub empty: Vec<ImageEntry>,
}

impl TaggingOutcome {
    pub fn total_count(&self) -> usize {
        self.success.len() + self.failure.len() + self.empty.len()
    }

    pub fn counts(&self) -> OutcomeCounts {
        OutcomeCounts {
            success: self.success.len(),
            failure: self.failure.len(),
            empty: self.empty.len(),
        }
    }

    pub fn has_any_success(&self) -> bool {
        !self.success.is_empty()
    }
}

pub struct TaggingOutcomeClassifier;

impl TaggingOutcomeClassifier {
    /// Pair entries with results by index and sort them into buckets
    ///
    /// `None` marks a failed tagging attempt.
    pub fn classify(
        image_entries: Vec<ImageEntry>,
        tagger_results: Vec<Option<TaggerResult>>,
    ) -> Result<TaggingOutcome, ClassifyError> {
        if image_entries.len() != tagger_results.len() {
            return Err(ClassifyError::LengthMismatch {
                entries: image_entries.len(),
                results: tagger_results.len(),
            });
        }

        let mut outcome = TaggingOutcome::default();
        for (image_entry, result) in image_entries.into_iter().zip(tagger_results) {
            match result {
                None => outcome.failure.push(image_entry),
                Some(tags) if tags.is_empty() => outcome.empty.push(image_entry),
                Some(tagger_result) => outcome.success.push(TaggedImageEntry {
                    image_entry,
                    tagger_result,
                }),
            }
        }

        Ok(outcome)
    }
}
