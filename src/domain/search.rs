//! Full-text search strategies and their tuning knobs.

use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

/// How a search query is matched and ordered against post titles and bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// Text-vector containment over title and body, unranked.
    Simple,
    /// Stemmed text-vector match ordered by relevance.
    Rank,
    /// Title weighted above body, filtered by a minimum rank.
    Weighted,
    /// Fuzzy title similarity based on shared trigrams.
    Trigram,
}

impl SearchStrategy {
    pub fn all() -> [SearchStrategy; 4] {
        [
            SearchStrategy::Simple,
            SearchStrategy::Rank,
            SearchStrategy::Weighted,
            SearchStrategy::Trigram,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SearchStrategy::Simple => "simple",
            SearchStrategy::Rank => "rank",
            SearchStrategy::Weighted => "weighted",
            SearchStrategy::Trigram => "trigram",
        }
    }

    pub fn path(self) -> &'static str {
        match self {
            SearchStrategy::Simple => "/search/",
            SearchStrategy::Rank => "/search-rank/",
            SearchStrategy::Weighted => "/search-weight/",
            SearchStrategy::Trigram => "/search-trigram-similarity/",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SearchStrategy::Simple => "Simple match",
            SearchStrategy::Rank => "Ranked",
            SearchStrategy::Weighted => "Title-weighted",
            SearchStrategy::Trigram => "Similar spelling",
        }
    }

    /// Whether results carry a relevance score worth displaying.
    pub fn is_scored(self) -> bool {
        !matches!(self, SearchStrategy::Simple)
    }
}

/// Weights and thresholds applied by the ranked strategies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchTuning {
    pub title_weight: f32,
    pub body_weight: f32,
    pub rank_threshold: f32,
    pub trigram_threshold: f32,
}

impl Default for SearchTuning {
    fn default() -> Self {
        Self {
            title_weight: 1.0,
            body_weight: 0.4,
            rank_threshold: 0.3,
            trigram_threshold: 0.3,
        }
    }
}

impl SearchTuning {
    pub fn validate(&self) -> Result<(), DomainError> {
        check_unit("title_weight", self.title_weight)?;
        check_unit("body_weight", self.body_weight)?;
        check_unit("rank_threshold", self.rank_threshold)?;
        check_unit("trigram_threshold", self.trigram_threshold)
    }

    /// Postgres `ts_rank` weight array, ordered `{D, C, B, A}`. Titles are
    /// indexed as `A` and bodies as `B`; `C` and `D` keep their defaults.
    pub fn rank_weights(&self) -> [f32; 4] {
        [0.1, 0.2, self.body_weight, self.title_weight]
    }
}

fn check_unit(field: &'static str, value: f32) -> Result<(), DomainError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(DomainError::validation(
            field,
            format!("must be between 0 and 1, got {value}"),
        ))
    }
}
