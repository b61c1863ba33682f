use async_trait::async_trait;
use feedline_core::entities::{Chunk, ChunkStrategy, SemanticType};
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::{PgPool, Row};

use crate::article::PipelineArticle;
use crate::context::ProcessingContext;
use crate::error::PipelineError;
use crate::stage::{Stage, StageOutcome};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static pattern"));
static SEARCH_SAFE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[^\w\s\-.,!?;:()\[\]{}"'/]"#).expect("static pattern"));

const CONCLUSION_MARKERS: &[&str] = &["conclusion", "in conclusion", "to summarize", "finally", "in summary"];

struct IndexedArticle {
    article_id: String,
    clean_text: String,
    title: String,
    domain: String,
    published_at: Option<chrono::DateTime<chrono::Utc>>,
    language: String,
    category: Option<String>,
    quality_score: f64,
}

/// Stage 6 (spec.md §4.9): splits each article's clean text into semantically
/// annotated chunks, preferring paragraph boundaries and falling back to a
/// sliding word window when the text has no paragraph breaks.
pub struct ChunkingStage {
    pub pool: PgPool,
    pub target_size: usize,
    pub overlap: usize,
    pub min_size: usize,
}

#[async_trait]
impl Stage for ChunkingStage {
    fn name(&self) -> &'static str {
        "stage_6_chunking"
    }

    async fn process(
        &self,
        articles: Vec<PipelineArticle>,
        _context: &mut ProcessingContext,
    ) -> Result<StageOutcome, PipelineError> {
        let mut survivors = Vec::with_capacity(articles.len());
        let mut errors = 0;

        for mut article in articles {
            let record = match self.load_indexed(article.id).await? {
                Some(r) => r,
                None => {
                    article.add_error(self.name(), "missing_record", "article not found in index");
                    errors += 1;
                    continue;
                }
            };

            let chunks = build_chunks(&record, self.target_size, self.overlap, self.min_size);
            if !chunks.is_empty() {
                if let Err(e) = self.insert_chunks(&chunks).await {
                    article.add_error(self.name(), "chunk_insert_failed", e.to_string());
                    errors += 1;
                    continue;
                }
                self.mark_chunked(&record.article_id).await?;
            }

            survivors.push(article);
        }

        Ok(StageOutcome::new(survivors, 0, errors))
    }
}

impl ChunkingStage {
    async fn load_indexed(&self, raw_article_id: i64) -> Result<Option<IndexedArticle>, PipelineError> {
        let row = sqlx::query(
            "SELECT article_id, clean_text, title, source_domain, published_at, language, category, quality_score \
             FROM articles_index WHERE raw_article_id = $1",
        )
        .bind(raw_article_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(r) => Some(IndexedArticle {
                article_id: r.try_get("article_id")?,
                clean_text: r.try_get::<Option<String>, _>("clean_text")?.unwrap_or_default(),
                title: r.try_get::<Option<String>, _>("title")?.unwrap_or_default(),
                domain: r.try_get("source_domain")?,
                published_at: r.try_get("published_at")?,
                language: r.try_get("language")?,
                category: r.try_get("category")?,
                quality_score: r.try_get("quality_score")?,
            }),
            None => None,
        })
    }

    async fn insert_chunks(&self, chunks: &[Chunk]) -> Result<(), PipelineError> {
        for chunk in chunks {
            sqlx::query(
                "INSERT INTO article_chunks ( \
                    article_id, chunk_index, text, text_clean, word_count, char_count, \
                    char_start, char_end, semantic_type, importance_score, chunk_strategy, \
                    title, domain, published_at, language, category, quality_score, created_at \
                 ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17, NOW()) \
                 ON CONFLICT (article_id, chunk_index) DO UPDATE SET \
                    text = EXCLUDED.text, text_clean = EXCLUDED.text_clean, created_at = NOW()",
            )
            .bind(&chunk.article_id)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.text_clean)
            .bind(chunk.word_count as i32)
            .bind(chunk.char_count as i32)
            .bind(chunk.char_start as i32)
            .bind(chunk.char_end as i32)
            .bind(semantic_type_str(chunk.semantic_type))
            .bind(chunk.importance_score)
            .bind(chunk_strategy_str(chunk.chunk_strategy))
            .bind(&chunk.title)
            .bind(&chunk.domain)
            .bind(chunk.published_at)
            .bind(&chunk.language)
            .bind(&chunk.category)
            .bind(chunk.quality_score)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn mark_chunked(&self, article_id: &str) -> Result<(), PipelineError> {
        sqlx::query("UPDATE articles_index SET chunking_completed = TRUE, updated_at = NOW() WHERE article_id = $1")
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn semantic_type_str(t: SemanticType) -> &'static str {
    match t {
        SemanticType::Intro => "intro",
        SemanticType::Body => "body",
        SemanticType::Conclusion => "conclusion",
        SemanticType::List => "list",
        SemanticType::Quote => "quote",
        SemanticType::Code => "code",
    }
}

fn chunk_strategy_str(s: ChunkStrategy) -> &'static str {
    match s {
        ChunkStrategy::Paragraph => "paragraph",
        ChunkStrategy::SlidingWindow => "sliding_window",
    }
}

fn build_chunks(record: &IndexedArticle, target_size: usize, overlap: usize, min_size: usize) -> Vec<Chunk> {
    if record.clean_text.split_whitespace().count() < min_size {
        return Vec::new();
    }

    let paragraphs: Vec<&str> = record.clean_text.split("\n\n").collect();
    if paragraphs.len() > 1 {
        chunk_by_paragraphs(record, &paragraphs, target_size, overlap, min_size)
    } else {
        let words: Vec<&str> = record.clean_text.split_whitespace().collect();
        chunk_by_sliding_window(record, &words, target_size, overlap, min_size)
    }
}

fn chunk_by_paragraphs(record: &IndexedArticle, paragraphs: &[&str], target_size: usize, overlap: usize, min_size: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_words = 0usize;
    let mut char_position = 0usize;

    for para in paragraphs {
        let para_words = para.split_whitespace().count();

        if current_words + para_words > target_size && !current.is_empty() {
            let chunk_text = current.join("\n\n");
            let chunk_start = char_position.saturating_sub(chunk_text.chars().count());

            if current_words >= min_size {
                chunks.push(make_chunk(record, chunks.len(), &chunk_text, current_words, chunk_start, char_position, ChunkStrategy::Paragraph));
            }

            if overlap > 0 && !current.is_empty() {
                let keep = (overlap / 50 + 1).min(current.len());
                let mut overlap_paras: Vec<&str> = current[current.len() - keep..].to_vec();
                overlap_paras.push(para);
                current_words = overlap_paras.iter().map(|p| p.split_whitespace().count()).sum();
                current = overlap_paras;
            } else {
                current = vec![para];
                current_words = para_words;
            }
        } else {
            current.push(para);
            current_words += para_words;
        }

        char_position += para.chars().count() + 2;
    }

    if !current.is_empty() && current_words >= min_size {
        let chunk_text = current.join("\n\n");
        let chunk_start = char_position.saturating_sub(chunk_text.chars().count());
        chunks.push(make_chunk(record, chunks.len(), &chunk_text, current_words, chunk_start, char_position, ChunkStrategy::Paragraph));
    }

    chunks
}

fn chunk_by_sliding_window(record: &IndexedArticle, words: &[&str], chunk_size: usize, overlap: usize, min_size: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let stride = chunk_size.saturating_sub(overlap).max(1);
    let mut i = 0usize;

    while i < words.len() {
        let end = (i + chunk_size).min(words.len());
        let chunk_words = &words[i..end];

        if chunk_words.len() < min_size && i > 0 {
            break;
        }

        let chunk_text = chunk_words.join(" ");
        let char_start: usize = words[..i].iter().map(|w| w.chars().count() + 1).sum();
        let char_end = char_start + chunk_text.chars().count();

        chunks.push(make_chunk(record, chunks.len(), &chunk_text, chunk_words.len(), char_start, char_end, ChunkStrategy::SlidingWindow));

        i += stride;
    }

    chunks
}

fn make_chunk(
    record: &IndexedArticle,
    chunk_index: usize,
    text: &str,
    word_count: usize,
    char_start: usize,
    char_end: usize,
    strategy: ChunkStrategy,
) -> Chunk {
    let semantic_type = determine_semantic_type(text, chunk_index);
    let importance_score = calculate_importance_score(text, chunk_index, semantic_type, &record.title);
    let text_clean = clean_text_for_search(text);

    Chunk {
        article_id: record.article_id.clone(),
        chunk_index: chunk_index as i32,
        text: text.to_string(),
        text_clean,
        word_count,
        char_count: text.chars().count(),
        char_start,
        char_end,
        semantic_type,
        importance_score,
        chunk_strategy: strategy,
        title: record.title.clone(),
        domain: record.domain.clone(),
        published_at: record.published_at,
        language: record.language.clone(),
        category: record.category.clone(),
        quality_score: record.quality_score,
    }
}

fn determine_semantic_type(text: &str, chunk_index: usize) -> SemanticType {
    let lower = text.to_lowercase();

    if chunk_index == 0 {
        return SemanticType::Intro;
    }
    if CONCLUSION_MARKERS.iter().any(|m| lower.contains(m)) {
        return SemanticType::Conclusion;
    }
    if text.matches("\n-").count() > 2 || text.matches('\n').count() > 2 || text.contains("\n1.") {
        return SemanticType::List;
    }
    if text.matches('"').count() >= 2 {
        return SemanticType::Quote;
    }
    if text.contains("```") || text.matches('`').count() > 4 {
        return SemanticType::Code;
    }
    SemanticType::Body
}

fn calculate_importance_score(text: &str, chunk_index: usize, semantic_type: SemanticType, title: &str) -> f64 {
    let mut score = 0.5;

    if chunk_index == 0 {
        score += 0.2;
    } else if semantic_type == SemanticType::Conclusion {
        score += 0.15;
    }

    match semantic_type {
        SemanticType::Intro => score += 0.1,
        SemanticType::Quote => score += 0.05,
        SemanticType::List => score -= 0.05,
        _ => {}
    }

    let title_words: std::collections::HashSet<&str> = title.to_lowercase().split_whitespace().collect::<Vec<_>>().into_iter().collect();
    let text_lower = text.to_lowercase();
    let text_words: std::collections::HashSet<&str> = text_lower.split_whitespace().collect();
    if !title_words.is_empty() {
        let overlap = title_words.iter().filter(|w| text_words.contains(**w)).count();
        score += (overlap as f64 / title_words.len() as f64) * 0.2;
    }

    let word_count = text.split_whitespace().count();
    if word_count < 50 {
        score -= 0.1;
    } else if word_count > 300 {
        score += 0.05;
    }

    score.clamp(0.0, 1.0)
}

fn clean_text_for_search(text: &str) -> String {
    let collapsed = WHITESPACE.replace_all(text, " ");
    let safe = SEARCH_SAFE.replace_all(&collapsed, " ");
    safe.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_chunk_is_intro() {
        assert_eq!(determine_semantic_type("anything here", 0), SemanticType::Intro);
    }

    #[test]
    fn conclusion_marker_detected() {
        assert_eq!(determine_semantic_type("In conclusion, this matters.", 1), SemanticType::Conclusion);
    }

    #[test]
    fn sliding_window_respects_min_size_on_tail() {
        let record = IndexedArticle {
            article_id: "a1".into(),
            clean_text: String::new(),
            title: "t".into(),
            domain: "example.com".into(),
            published_at: None,
            language: "en".into(),
            category: None,
            quality_score: 0.5,
        };
        let words: Vec<&str> = "one two three four five".split_whitespace().collect();
        let chunks = chunk_by_sliding_window(&record, &words, 3, 1, 10);
        assert!(chunks.len() <= 1);
    }
}
