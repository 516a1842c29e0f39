//! Scripted tagger for pipeline tests

use async_trait::async_trait;
use imtag_register::models::{ImageHash, TaggerResult};
use imtag_register::tagger::{Tagger, TaggerError};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Answers every image with the same tags, except scripted failures and
/// images that score nothing
#[derive(Default)]
pub struct FakeTagger {
    failing: HashSet<ImageHash>,
    tagless: HashSet<ImageHash>,
    calls: AtomicUsize,
}

impl FakeTagger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tagging of this content fails
    pub fn fail_on(mut self, binary: &[u8]) -> Self {
        self.failing.insert(ImageHash::from_binary(binary));
        self
    }

    /// Tagging of this content yields no tag
    pub fn nothing_for(mut self, binary: &[u8]) -> Self {
        self.tagless.insert(ImageHash::from_binary(binary));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Tags returned for every ordinary image (3 rows)
    pub fn standard_result() -> TaggerResult {
        TaggerResult::new(vec![
            (
                "general".to_string(),
                vec![("1girl".to_string(), 0.93), ("outdoors".to_string(), 0.61)],
            ),
            ("rating".to_string(), vec![("general".to_string(), 0.88)]),
        ])
    }
}

#[async_trait]
impl Tagger for FakeTagger {
    async fn initialize(&mut self) -> Result<(), TaggerError> {
        Ok(())
    }

    async fn tag(&self, image_binary: &[u8]) -> Result<TaggerResult, TaggerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let hash = ImageHash::from_binary(image_binary);

        if self.failing.contains(&hash) {
            return Err(TaggerError::TaggingFailed(format!(
                "scripted failure for {}",
                hash
            )));
        }
        if self.tagless.contains(&hash) {
            return Ok(TaggerResult::default());
        }
        Ok(Self::standard_result())
    }
}
