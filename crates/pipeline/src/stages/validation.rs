use async_trait::async_trait;
use feedline_core::config::PipelineConfig;
use feedline_core::error::RejectionReason;
use feedline_core::hashing::sha256_hex;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::article::PipelineArticle;
use crate::context::ProcessingContext;
use crate::error::PipelineError;
use crate::stage::{Stage, StageOutcome};

static INVALID_CONTENT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"404\s+(not\s+found|error)",
        r"access\s+denied",
        r"page\s+not\s+found",
        r"site\s+maintenance",
        r"temporarily\s+unavailable",
        r"javascript\s+(required|disabled)",
        r"please\s+enable\s+javascript",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern"))
    .collect()
});

static WEIRD_CHAR: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[^\w\s\-.,!?;:()\[\]{}"'/\\]"#).expect("static pattern"));

const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_content",
    "utm_term",
    "fbclid",
    "gclid",
    "msclkid",
    "ref",
    "referrer",
    "source",
    "campaign_id",
    "ad_id",
    "click_id",
    "affiliate_id",
];

/// Stage 0 (spec.md §4.9): idempotency key, URL hash, basic sanity checks,
/// age limit, invalid-content heuristics, URL canonicalization.
pub struct ValidationStage {
    pub config: PipelineConfig,
}

#[async_trait]
impl Stage for ValidationStage {
    fn name(&self) -> &'static str {
        "stage_0_validation"
    }

    async fn process(
        &self,
        articles: Vec<PipelineArticle>,
        context: &mut ProcessingContext,
    ) -> Result<StageOutcome, PipelineError> {
        let mut survivors = Vec::with_capacity(articles.len());
        let mut rejected = 0;
        let errors = 0;

        for mut article in articles {
            if article.idempotency_key.is_empty() {
                article.idempotency_key = format!("article_{}_{}", article.id, context.batch_id);
            }

            if article.url.len() < 10 {
                article.set_rejected(RejectionReason::InvalidContent);
                rejected += 1;
                continue;
            }

            article.url_hash = sha256_hex(&article.url);

            if article.title.is_none() && article.content.is_none() {
                article.set_rejected(RejectionReason::InvalidContent);
                rejected += 1;
                continue;
            }

            let age_hours = (chrono::Utc::now() - article.fetched_at).num_seconds() as f64 / 3600.0;
            if age_hours > self.config.max_article_age_hours {
                article.set_rejected(RejectionReason::TooOld);
                rejected += 1;
                continue;
            }

            let content_text = format!("{}{}", article.content.as_deref().unwrap_or(""), article.title.as_deref().unwrap_or(""));
            if content_text.len() < self.config.min_content_length {
                article.set_rejected(RejectionReason::TooShort);
                rejected += 1;
                continue;
            }

            if is_invalid_content(&content_text) {
                article.set_rejected(RejectionReason::InvalidContent);
                rejected += 1;
                continue;
            }

            article.canonical_url = Some(canonicalize_url(&article.url));
            survivors.push(article);
        }

        Ok(StageOutcome::new(survivors, rejected, errors))
    }
}

fn is_invalid_content(content: &str) -> bool {
    let lower = content.to_lowercase();
    if INVALID_CONTENT_PATTERNS.iter().any(|re| re.is_match(&lower)) {
        return true;
    }
    let weird_chars = WEIRD_CHAR.find_iter(content).count();
    weird_chars as f64 > content.len() as f64 * 0.1
}

/// Lowercase, strip tracking query params, drop fragment, normalize
/// trailing slash (spec.md §4.9 Stage 0).
fn canonicalize_url(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let Ok(mut parsed) = url::Url::parse(&lowered) else { return lowered };

    let kept_pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if kept_pairs.is_empty() {
        parsed.set_query(None);
    } else {
        let query = kept_pairs.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");
        parsed.set_query(Some(&query));
    }
    parsed.set_fragment(None);

    let path = parsed.path().to_string();
    let trimmed_path = path.trim_end_matches('/');
    let normalized_path = if trimmed_path.is_empty() { "/" } else { trimmed_path };
    parsed.set_path(normalized_path);

    parsed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tracking_params_and_fragment() {
        let url = "https://Example.com/Article/?utm_source=x&id=5#section";
        assert_eq!(canonicalize_url(url), "https://example.com/article?id=5");
    }

    #[test]
    fn trailing_slash_normalized_to_root() {
        assert_eq!(canonicalize_url("https://example.com/"), "https://example.com/");
    }

    #[test]
    fn weird_char_density_flags_invalid() {
        let content = "normal text \u{0}\u{1}\u{2}\u{3}\u{4}\u{5}\u{6}\u{7}".repeat(1);
        assert!(is_invalid_content(&content));
    }

    #[test]
    fn plain_text_is_valid() {
        assert!(!is_invalid_content("A perfectly normal news article about the weather."));
    }
}
