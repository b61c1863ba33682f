use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Intro,
    Body,
    Conclusion,
    List,
    Quote,
    Code,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStrategy {
    Paragraph,
    SlidingWindow,
}

/// Output of Stage 6 (chunking). `chunk_index` is 0-based and contiguous
/// per article; denormalized fields let downstream search indexing avoid a
/// join back to `ArticleIndex`/`Feed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub article_id: String,
    pub chunk_index: i32,
    pub text: String,
    pub text_clean: String,
    pub word_count: usize,
    pub char_count: usize,
    pub char_start: usize,
    pub char_end: usize,
    pub semantic_type: SemanticType,
    pub importance_score: f64,
    pub chunk_strategy: ChunkStrategy,
    pub title: String,
    pub domain: String,
    pub published_at: Option<DateTime<Utc>>,
    pub language: String,
    pub category: Option<String>,
    pub quality_score: f64,
}

impl Chunk {
    /// `char_start <= char_end`.
    pub fn span_is_valid(&self) -> bool {
        self.char_start <= self.char_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_ordering_enforced() {
        let mut c = Chunk {
            article_id: "a1".into(),
            chunk_index: 0,
            text: "hello world".into(),
            text_clean: "hello world".into(),
            word_count: 2,
            char_count: 11,
            char_start: 0,
            char_end: 11,
            semantic_type: SemanticType::Body,
            importance_score: 0.5,
            chunk_strategy: ChunkStrategy::Paragraph,
            title: "t".into(),
            domain: "example.com".into(),
            published_at: None,
            language: "en".into(),
            category: None,
            quality_score: 0.5,
        };
        assert!(c.span_is_valid());
        c.char_start = 20;
        assert!(!c.span_is_valid());
    }
}
