use std::collections::HashSet;

use async_trait::async_trait;
use feedline_core::error::RejectionReason;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::article::PipelineArticle;
use crate::context::ProcessingContext;
use crate::error::PipelineError;
use crate::stage::{Stage, StageOutcome};

static TAG_STRIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<(script|style|nav|header|footer|aside)[^>]*>.*?</\1>").expect("static pattern"));
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").expect("static pattern"));
static PARAGRAPH_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").expect("static pattern"));
static MULTISPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r" +").expect("static pattern"));
static KEYWORD_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[a-zA-Z]{4,}\b").expect("static pattern"));

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "that", "with", "have", "this", "will", "from", "they", "been", "said", "each", "which", "their", "time",
        "about", "would", "there", "could", "other", "after", "first", "well", "many", "some", "these", "more",
    ]
    .into_iter()
    .collect()
});

/// Stage 4 (spec.md §4.9): HTML-to-text extraction, text metrics, weighted
/// quality scoring, and basic keyword extraction.
pub struct TextCleaningStage {
    pub min_quality_score: f64,
}

#[async_trait]
impl Stage for TextCleaningStage {
    fn name(&self) -> &'static str {
        "stage_4_text_cleaning"
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
            if let Some(content) = article.content.clone() {
                article.clean_text = Some(extract_clean_text(&content));
            }

            calculate_text_metrics(&mut article);

            let quality = assess_content_quality(&article);
            article.quality_score = quality;

            if quality < self.min_quality_score {
                article.set_rejected(RejectionReason::LowQuality);
                rejected += 1;
                continue;
            }

            extract_keywords(&mut article);
            survivors.push(article);
        }

        Ok(StageOutcome::new(survivors, rejected, errors))
    }
}

fn extract_clean_text(html: &str) -> String {
    let stripped = TAG_STRIP.replace_all(html, "");
    let text = TAG.replace_all(&stripped, " ");
    let text = PARAGRAPH_BREAK.replace_all(&text, "\n\n");
    let text = MULTISPACE.replace_all(&text, " ");
    text.trim().to_string()
}

fn calculate_text_metrics(article: &mut PipelineArticle) {
    let clean_text = article.clean_text.clone().unwrap_or_default();
    article.char_count = clean_text.chars().count();
    article.word_count = if clean_text.is_empty() { 0 } else { clean_text.split_whitespace().count() };

    article.readability_score = if article.word_count > 10 { Some(flesch_reading_ease(&clean_text)) } else { None };
}

/// Flesch Reading Ease over an approximate syllable count (vowel-group
/// heuristic, no dictionary lookups).
fn flesch_reading_ease(text: &str) -> f64 {
    let words: Vec<&str> = text.split_whitespace().collect();
    let word_count = words.len().max(1) as f64;
    let sentence_count = text.split(['.', '!', '?']).filter(|s| !s.trim().is_empty()).count().max(1) as f64;
    let syllables: usize = words.iter().map(|w| count_syllables(w)).sum();

    206.835 - 1.015 * (word_count / sentence_count) - 84.6 * (syllables as f64 / word_count)
}

fn count_syllables(word: &str) -> usize {
    let lower = word.to_lowercase();
    let mut count = 0;
    let mut prev_vowel = false;
    for c in lower.chars() {
        let is_vowel = matches!(c, 'a' | 'e' | 'i' | 'o' | 'u' | 'y');
        if is_vowel && !prev_vowel {
            count += 1;
        }
        prev_vowel = is_vowel;
    }
    if lower.ends_with('e') && count > 1 {
        count -= 1;
    }
    count.max(1)
}

fn assess_content_quality(article: &PipelineArticle) -> f64 {
    let mut factors: Vec<(f64, f64)> = Vec::new();

    if article.word_count > 0 {
        let word_score = match article.word_count {
            100..=200 => 0.7,
            201..=1000 => 1.0,
            1001..=2000 => 0.9,
            n if n > 2000 => 0.8,
            n => (n as f64 / 100.0).max(0.1),
        };
        factors.push((word_score, 0.3));
    }

    let title_score = match &article.title {
        Some(title) => {
            let len = title.split_whitespace().count();
            match len {
                5..=15 => 1.0,
                3..=20 => 0.8,
                _ => 0.6,
            }
        }
        None => 0.5,
    };
    factors.push((title_score, 0.2));

    let lang_score = (article.language_confidence * 2.0).min(1.0);
    factors.push((lang_score, 0.2));

    let readability_score = match article.readability_score {
        Some(r) if r >= 60.0 => 1.0,
        Some(r) if r >= 30.0 => 0.8,
        Some(_) => 0.6,
        None => 0.7,
    };
    factors.push((readability_score, 0.1));

    let author_score = if article.authors.is_empty() { 0.5 } else { 1.0 };
    factors.push((author_score, 0.1));

    let date_score = if article.published_is_estimated { 0.6 } else { 0.8 };
    factors.push((date_score, 0.1));

    let total_weight: f64 = factors.iter().map(|(_, w)| w).sum();
    let score = if total_weight > 0.0 {
        factors.iter().map(|(s, w)| s * w).sum::<f64>() / total_weight
    } else {
        0.0
    };

    (score - article.error_quality_penalty()).clamp(0.0, 1.0)
}

fn extract_keywords(article: &mut PipelineArticle) {
    let text = article.clean_text.clone().unwrap_or_default().to_lowercase();

    let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for m in KEYWORD_TOKEN.find_iter(&text) {
        let word = m.as_str();
        if STOP_WORDS.contains(word) {
            continue;
        }
        *counts.entry(word.to_string()).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().filter(|(_, c)| *c >= 2).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    article.keywords = ranked.into_iter().take(10).map(|(w, _)| w).collect();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_script_and_tags() {
        let html = "<html><script>evil()</script><p>Hello <b>world</b></p></html>";
        assert_eq!(extract_clean_text(html), "Hello world");
    }

    #[test]
    fn syllable_count_is_at_least_one() {
        assert_eq!(count_syllables("a"), 1);
        assert!(count_syllables("beautiful") >= 3);
    }
}
