use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use feedline_core::error::RejectionReason;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::article::PipelineArticle;
use crate::context::ProcessingContext;
use crate::error::PipelineError;
use crate::stage::{Stage, StageOutcome};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static pattern"));
static AUTHOR_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(by\s+|author:\s*)").expect("static pattern"));
static AUTHOR_TRAILING_PAREN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\([^)]*\)$").expect("static pattern"));
static AUTHOR_GENERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^(admin|editor|staff|unknown|anonymous)$").expect("static pattern"));

const MAX_AUTHORS: usize = 5;
const MAX_TITLE_LEN: usize = 500;

const CATEGORY_KEYWORDS: &[(&str, &[&str])] = &[
    ("technology", &["tech", "software", "ai", "computer", "digital", "internet"]),
    ("politics", &["election", "government", "congress", "senate", "president", "policy"]),
    ("business", &["market", "stock", "economy", "finance", "company", "earnings"]),
    ("sports", &["game", "team", "player", "championship", "league", "score"]),
    ("health", &["medical", "health", "doctor", "hospital", "disease", "treatment"]),
    ("science", &["research", "study", "scientist", "discovery", "experiment"]),
    ("entertainment", &["movie", "music", "celebrity", "show", "entertainment"]),
];

/// Stage 3 (spec.md §4.9): language detection, date/author/title
/// normalization, basic keyword-heuristic category classification, and the
/// supported-language gate.
pub struct NormalizationStage {
    pub supported_languages: Vec<String>,
}

#[async_trait]
impl Stage for NormalizationStage {
    fn name(&self) -> &'static str {
        "stage_3_normalization"
    }

    async fn process(
        &self,
        articles: Vec<PipelineArticle>,
        _context: &mut ProcessingContext,
    ) -> Result<StageOutcome, PipelineError> {
        let mut survivors = Vec::with_capacity(articles.len());
        let mut rejected = 0;
        let errors = 0;

        for mut article in articles {
            detect_language(&mut article);
            normalize_dates(&mut article);
            normalize_authors(&mut article);
            normalize_text_fields(&mut article);
            classify_category(&mut article);

            let lang = article.language_detected.as_deref().unwrap_or("en");
            if !self.supported_languages.iter().any(|l| l == lang) {
                article.set_rejected(RejectionReason::InvalidLanguage);
                rejected += 1;
                continue;
            }

            survivors.push(article);
        }

        Ok(StageOutcome::new(survivors, rejected, errors))
    }
}

fn detect_language(article: &mut PipelineArticle) {
    let text = format!("{} {}", article.title.as_deref().unwrap_or(""), article.content.as_deref().unwrap_or(""));
    let text = text.trim();
    if text.is_empty() {
        article.language_detected = Some("en".to_string());
        article.language_confidence = 0.5;
        return;
    }
    // No local language model is loaded; fall back to the raw feed-reported
    // language, same as the source's no-fasttext-model branch.
    article.language_detected = Some(article.language_raw.clone().unwrap_or_else(|| "en".to_string()));
    article.language_confidence = 0.3;
}

fn normalize_dates(article: &mut PipelineArticle) {
    if article.published_at.is_some() {
        return;
    }

    let Some(raw) = article.published_at_raw.clone() else {
        article.published_at = Some(article.fetched_at);
        article.published_is_estimated = true;
        return;
    };

    match chrono::DateTime::parse_from_rfc3339(&raw) {
        Ok(parsed) => {
            let parsed = parsed.with_timezone(&Utc);
            let now = Utc::now();
            if parsed > now + ChronoDuration::hours(1) {
                article.published_at = Some(article.fetched_at);
                article.published_is_estimated = true;
                article.add_quality_flag("future_date", "warning");
            } else if parsed < now - ChronoDuration::days(365 * 2) {
                article.add_quality_flag("very_old", "info");
                article.published_at = Some(parsed);
            } else {
                article.published_at = Some(parsed);
            }
        }
        Err(_) => {
            article.published_at = Some(article.fetched_at);
            article.published_is_estimated = true;
            article.add_quality_flag("unparseable_date", "warning");
        }
    }
}

fn normalize_authors(article: &mut PipelineArticle) {
    if article.authors.is_empty() {
        return;
    }

    let mut normalized = Vec::new();
    for author in &article.authors {
        let mut name = author.trim().to_string();
        name = WHITESPACE.replace_all(&name, " ").to_string();
        name = AUTHOR_PREFIX.replace(&name, "").to_string();
        name = AUTHOR_TRAILING_PAREN.replace(&name, "").to_string();

        if name.len() < 2 || name.len() > 100 {
            continue;
        }
        if AUTHOR_GENERIC.is_match(&name) {
            continue;
        }
        normalized.push(name);
    }
    normalized.truncate(MAX_AUTHORS);
    article.authors = normalized;
}

fn normalize_text_fields(article: &mut PipelineArticle) {
    if let Some(title) = article.title.as_mut() {
        let mut t = title.trim().to_string();
        t = WHITESPACE.replace_all(&t, " ").to_string();
        t.truncate(MAX_TITLE_LEN);
        *title = t;
    }
    if let Some(content) = article.content.as_mut() {
        let c = WHITESPACE.replace_all(content, " ").trim().to_string();
        *content = c;
    }
}

fn classify_category(article: &mut PipelineArticle) {
    let text = format!("{} {}", article.title.as_deref().unwrap_or(""), article.content.as_deref().unwrap_or("")).to_lowercase();

    let mut best: Option<(&str, usize)> = None;
    for (category, keywords) in CATEGORY_KEYWORDS {
        let score = keywords.iter().filter(|kw| text.contains(*kw)).count();
        if score > best.map(|(_, s)| s).unwrap_or(0) {
            best = Some((category, score));
        }
    }

    match best {
        Some((category, score)) if score >= 2 => {
            article.category = Some(category.to_string());
            article.category_confidence = (score as f64 / 10.0).min(0.8);
        }
        _ => {
            article.category = Some("general".to_string());
            article.category_confidence = 0.5;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn author_normalization_strips_prefix_and_parenthetical() {
        let mut article = authorless_article();
        article.authors = vec!["by  Jane   Doe (staff writer)".to_string(), "Editor".to_string()];
        normalize_authors(&mut article);
        assert_eq!(article.authors, vec!["Jane Doe".to_string()]);
    }

    #[test]
    fn category_needs_two_keyword_matches() {
        let mut article = authorless_article();
        article.title = Some("Tech company stock surges".to_string());
        classify_category(&mut article);
        assert_eq!(article.category.as_deref(), Some("business"));
    }

    fn authorless_article() -> PipelineArticle {
        use feedline_core::entities::ArticleStatus;
        PipelineArticle {
            id: 1,
            feed_id: 1,
            url: "https://example.com/a".into(),
            url_hash: "h".into(),
            text_hash: None,
            canonical_url: None,
            title: None,
            description: None,
            content: None,
            clean_text: None,
            authors: vec![],
            published_at_raw: None,
            published_at: None,
            published_is_estimated: false,
            language_raw: None,
            language_detected: None,
            language_confidence: 0.0,
            fetched_at: Utc::now(),
            retry_count: 0,
            idempotency_key: "k".into(),
            category: None,
            category_confidence: 0.0,
            tags: vec![],
            keywords: vec![],
            word_count: 0,
            char_count: 0,
            readability_score: None,
            quality_score: 0.0,
            quality_flags: vec![],
            is_duplicate: false,
            dup_reason: None,
            dup_original_id: None,
            dup_similarity_score: None,
            feed_domain: "example.com".into(),
            feed_trust_score: 0.0,
            feed_health_score: 0.0,
            article_id: None,
            status: ArticleStatus::Processing,
            processed_at: None,
            error_log: vec![],
        }
    }
}
