use async_trait::async_trait;
use chrono::Utc;
use feedline_core::entities::ArticleStatus;
use feedline_core::hashing::article_id as derive_article_id;
use once_cell::sync::Lazy;
use regex::Regex;
use sqlx::PgPool;

use crate::article::PipelineArticle;
use crate::context::ProcessingContext;
use crate::error::PipelineError;
use crate::stage::{Stage, StageOutcome};

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s]").expect("static pattern"));
static MULTISPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static pattern"));

/// Stage 5 (spec.md §4.9): derive the stable `article_id`, write the
/// `articles_index` row, and mark the raw article processed.
pub struct IndexingStage {
    pub pool: PgPool,
    pub processing_version: String,
}

#[async_trait]
impl Stage for IndexingStage {
    fn name(&self) -> &'static str {
        "stage_5_indexing"
    }

    async fn process(
        &self,
        articles: Vec<PipelineArticle>,
        _context: &mut ProcessingContext,
    ) -> Result<StageOutcome, PipelineError> {
        let mut survivors = Vec::with_capacity(articles.len());
        let mut errors = 0;

        for mut article in articles {
            let published_at = article.published_at.unwrap_or(article.fetched_at);
            let article_id = derive_article_id(&article.url_hash, published_at);
            let canonical_url = article.canonical_url.clone().unwrap_or_else(|| article.url.clone());
            let domain = extract_domain(&canonical_url);

            let insert = self.insert_index_row(&article, &article_id, &canonical_url, &domain, published_at).await;
            if let Err(e) = insert {
                article.add_error(self.name(), "index_insert_failed", e.to_string());
                errors += 1;
                continue;
            }

            article.article_id = Some(article_id);
            article.status = ArticleStatus::Processed;
            article.processed_at = Some(Utc::now());
            survivors.push(article);
        }

        Ok(StageOutcome::new(survivors, 0, errors))
    }
}

impl IndexingStage {
    async fn insert_index_row(
        &self,
        article: &PipelineArticle,
        article_id: &str,
        canonical_url: &str,
        domain: &str,
        published_at: chrono::DateTime<Utc>,
    ) -> Result<(), PipelineError> {
        let title_norm = normalize_for_search(article.title.as_deref().unwrap_or(""));
        let dup_reason = article.dup_reason.map(|r| r.to_string());

        sqlx::query(
            "INSERT INTO articles_index ( \
                article_id, raw_article_id, feed_id, url, canonical_url, source_domain, \
                url_hash, text_hash, title, title_norm, description, clean_text, full_text, \
                authors, published_at, published_is_estimated, fetched_at, language, \
                language_confidence, category, category_confidence, tags, keywords, \
                word_count, char_count, readability_score, quality_score, quality_flags, \
                is_duplicate, dup_reason, dup_original_id, dup_similarity_score, \
                ready_for_chunking, processing_version, created_at \
             ) VALUES ( \
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
                $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, $32, \
                true, $33, NOW() \
             ) \
             ON CONFLICT (article_id) DO NOTHING",
        )
        .bind(article_id)
        .bind(article.id)
        .bind(article.feed_id)
        .bind(&article.url)
        .bind(canonical_url)
        .bind(domain)
        .bind(&article.url_hash)
        .bind(&article.text_hash)
        .bind(&article.title)
        .bind(&title_norm)
        .bind(&article.description)
        .bind(&article.clean_text)
        .bind(&article.content)
        .bind(&article.authors)
        .bind(published_at)
        .bind(article.published_is_estimated)
        .bind(article.fetched_at)
        .bind(article.language_detected.as_deref().unwrap_or("en"))
        .bind(article.language_confidence)
        .bind(&article.category)
        .bind(article.category_confidence)
        .bind(&article.tags)
        .bind(&article.keywords)
        .bind(article.word_count as i32)
        .bind(article.char_count as i32)
        .bind(article.readability_score)
        .bind(article.quality_score)
        .bind(&article.quality_flags)
        .bind(article.is_duplicate)
        .bind(dup_reason)
        .bind(&article.dup_original_id)
        .bind(article.dup_similarity_score)
        .bind(&self.processing_version)
        .execute(&self.pool)
        .await?;

        sqlx::query("UPDATE raw_articles SET status = 'processed' WHERE id = $1")
            .bind(article.id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn extract_domain(url: &str) -> String {
    url::Url::parse(url).ok().and_then(|u| u.host_str().map(str::to_string)).unwrap_or_default()
}

fn normalize_for_search(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let lower = text.to_lowercase();
    let stripped = NON_WORD.replace_all(&lower, " ");
    MULTISPACE.replace_all(&stripped, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_for_search_strips_punctuation() {
        assert_eq!(normalize_for_search("Hello, World!!"), "hello world");
    }

    #[test]
    fn extract_domain_reads_host() {
        assert_eq!(extract_domain("https://example.com/a/b?c=1"), "example.com");
    }
}
