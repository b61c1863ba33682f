use serde::{Deserialize, Serialize};

use crate::error::RejectionReason;

/// Output of Stage 5 (normalization). One row per surviving or
/// duplicate-flagged article.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleIndex {
    pub article_id: String,
    pub raw_article_id: i64,
    pub feed_id: i64,
    pub canonical_url: String,
    pub url_hash: String,
    pub text_hash: String,
    pub title_norm: String,
    pub clean_text: String,
    pub language: String,
    pub language_confidence: f64,
    pub category: Option<String>,
    pub quality_score: f64,
    pub quality_flags: Vec<String>,
    pub is_duplicate: bool,
    pub dup_reason: Option<RejectionReason>,
    pub dup_original_id: Option<String>,
    pub dup_similarity_score: Option<f64>,
    pub ready_for_chunking: bool,
    pub chunking_completed: bool,
    pub indexing_completed: bool,
    /// Lazily populated by the search-indexing stage; left `None` until then.
    pub search_vector: Option<String>,
}

impl ArticleIndex {
    /// `(is_duplicate = true) => dup_reason is a known reason AND dup_original_id is set`.
    pub fn duplicate_marking_is_valid(&self) -> bool {
        if !self.is_duplicate {
            return true;
        }
        matches!(
            self.dup_reason,
            Some(RejectionReason::DuplicateUrl) | Some(RejectionReason::DuplicateContent)
        ) && self.dup_original_id.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(is_dup: bool, reason: Option<RejectionReason>, original: Option<&str>) -> ArticleIndex {
        ArticleIndex {
            article_id: "a1".into(),
            raw_article_id: 1,
            feed_id: 1,
            canonical_url: "https://example.com/a".into(),
            url_hash: "h".into(),
            text_hash: "t".into(),
            title_norm: "title".into(),
            clean_text: "text".into(),
            language: "en".into(),
            language_confidence: 0.9,
            category: None,
            quality_score: 0.5,
            quality_flags: vec![],
            is_duplicate: is_dup,
            dup_reason: reason,
            dup_original_id: original.map(String::from),
            dup_similarity_score: None,
            ready_for_chunking: true,
            chunking_completed: false,
            indexing_completed: false,
            search_vector: None,
        }
    }

    #[test]
    fn non_duplicate_is_always_valid() {
        assert!(base(false, None, None).duplicate_marking_is_valid());
    }

    #[test]
    fn duplicate_requires_reason_and_original() {
        assert!(!base(true, None, None).duplicate_marking_is_valid());
        assert!(base(true, Some(RejectionReason::DuplicateUrl), Some("a0")).duplicate_marking_is_valid());
    }
}
