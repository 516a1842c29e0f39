//! Tag facts persisted per image

use crate::models::TaggerResult;
use serde::{Deserialize, Serialize};

/// One (image, category, tag, score) fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTagEntry {
    pub image_id: i64,
    pub category: String,
    pub tag: String,
    pub score: f32,
    pub archived: bool,
}

/// All tag facts for one image
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelTagEntries {
    pub entries: Vec<ModelTagEntry>,
}

impl ModelTagEntries {
    pub fn new(entries: Vec<ModelTagEntry>) -> Self {
        Self { entries }
    }

    /// Expand a tagging result for an image whose id is already assigned
    pub fn from_tagger_result(image_id: i64, tags: &TaggerResult) -> Self {
        let entries = tags
            .iter()
            .map(|(category, tag)| ModelTagEntry {
                image_id,
                category: category.to_string(),
                tag: tag.tag.clone(),
                score: tag.score,
                archived: false,
            })
            .collect();

        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ModelTagEntry> {
        self.entries.iter()
    }
}

impl IntoIterator for ModelTagEntries {
    type Item = ModelTagEntry;
    type IntoIter = std::vec::IntoIter<ModelTagEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_tagger_result_flattens_all_categories() {
        let result = TaggerResult::new(vec![
            ("rating".to_string(), vec![("rating_safe".to_string(), 3.21)]),
            (
                "general".to_string(),
                vec![("cardigan".to_string(), 2.32), ("1girl".to_string(), 0.79)],
            ),
        ]);

        let entries = ModelTagEntries::from_tagger_result(7, &result);

        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.image_id == 7 && !e.archived));
        assert!(entries
            .iter()
            .any(|e| e.category == "rating" && e.tag == "rating_safe"));
        assert!(entries
            .iter()
            .any(|e| e.category == "general" && e.tag == "1girl" && e.score == 0.79));
    }

    #[test]
    fn test_empty_result_gives_no_entries() {
        let entries = ModelTagEntries::from_tagger_result(1, &TaggerResult::default());
        assert!(entries.is_empty());
    }
}
