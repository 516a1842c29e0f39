//! Tag inference results grouped by category

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known categories produced by anime-style taggers
pub mod category {
    pub const RATING: &str = "rating";
    pub const GENERAL: &str = "general";
    pub const CHARACTER: &str = "character";
    pub const COPYRIGHT: &str = "copyright";
    pub const ARTIST: &str = "artist";
}

/// One tag and its model score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagScore {
    pub tag: String,
    pub score: f32,
}

/// Category → tags, score-descending within each category
///
/// Categories may be present with no tags; the result is "empty" when every
/// category is.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, Vec<(String, f32)>>",
    into = "BTreeMap<String, Vec<(String, f32)>>"
)]
pub struct TaggerResult {
    categories: BTreeMap<String, Vec<TagScore>>,
}

impl TaggerResult {
    /// Build from raw (tag, score) pairs, sorting each category by score
    pub fn new<C, T>(tags: C) -> Self
    where
        C: IntoIterator<Item = (String, T)>,
        T: IntoIterator<Item = (String, f32)>,
    {
        let categories = tags
            .into_iter()
            .map(|(category, pairs)| {
                let mut scores: Vec<TagScore> = pairs
                    .into_iter()
                    .map(|(tag, score)| TagScore { tag, score })
                    .collect();
                scores.sort_by(|a, b| b.score.total_cmp(&a.score));
                (category, scores)
            })
            .collect();

        Self { categories }
    }

    /// Build from raw model scores, keeping tags scoring at least `threshold`
    ///
    /// NaN scores are dropped, as are categories left with no tag.
    pub fn from_scores<C, T>(tags: C, threshold: f32) -> Self
    where
        C: IntoIterator<Item = (String, T)>,
        T: IntoIterator<Item = (String, f32)>,
    {
        Self::new(tags.into_iter().filter_map(|(category, pairs)| {
            let kept: Vec<(String, f32)> = pairs
                .into_iter()
                .filter(|(_, score)| *score >= threshold)
                .collect();
            (!kept.is_empty()).then_some((category, kept))
        }))
    }

    /// True when no category holds any tag
    pub fn is_empty(&self) -> bool {
        self.categories.values().all(|tags| tags.is_empty())
    }

    /// Total tags across all categories
    pub fn tag_count(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    /// Tags of one category; empty when the category is absent
    pub fn category(&self, name: &str) -> &[TagScore] {
        self.categories.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Highest-scoring tag of a category
    pub fn top(&self, name: &str) -> Option<&TagScore> {
        self.category(name).first()
    }

    /// Flattened (category, tag) view
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TagScore)> {
        self.categories
            .iter()
            .flat_map(|(category, tags)| tags.iter().map(move |t| (category.as_str(), t)))
    }
}

impl From<BTreeMap<String, Vec<(String, f32)>>> for TaggerResult {
    fn from(raw: BTreeMap<String, Vec<(String, f32)>>) -> Self {
        Self::new(raw)
    }
}

impl From<TaggerResult> for BTreeMap<String, Vec<(String, f32)>> {
    fn from(result: TaggerResult) -> Self {
        result
            .categories
            .into_iter()
            .map(|(category, tags)| {
                (
                    category,
                    tags.into_iter().map(|t| (t.tag, t.score)).collect(),
                )
            })
            .collect()
    }
}
