use thiserror::Error;

/// Top-level error type used by the binaries (`cli`, `server`, `worker`) to
/// unify errors bubbling up from every crate in the workspace.
#[derive(Error, Debug)]
pub enum FeedlineError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

/// Error taxonomy for stage-level article rejection, per spec.md §7.
/// These are outcomes, not exceptions — every stage returns one of these
/// alongside the surviving/rejected article split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    // Validation (Stage 0)
    InvalidContent,
    TooShort,
    TooOld,
    // Feed policy (Stage 1)
    FeedQuotaExceeded,
    DomainBlacklisted,
    LowQuality,
    // Deduplication (Stage 2)
    DuplicateUrl,
    DuplicateContent,
    // Language (Stage 3)
    InvalidLanguage,
    // Extraction (Stage 4)
    ExtractionFailed,
    Paywall,
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RejectionReason::InvalidContent => "invalid_content",
            RejectionReason::TooShort => "too_short",
            RejectionReason::TooOld => "too_old",
            RejectionReason::FeedQuotaExceeded => "feed_quota_exceeded",
            RejectionReason::DomainBlacklisted => "domain_blacklisted",
            RejectionReason::LowQuality => "low_quality",
            RejectionReason::DuplicateUrl => "duplicate_url",
            RejectionReason::DuplicateContent => "duplicate_content",
            RejectionReason::InvalidLanguage => "invalid_language",
            RejectionReason::ExtractionFailed => "extraction_failed",
            RejectionReason::Paywall => "paywall",
        };
        write!(f, "{s}")
    }
}

/// Transient-vs-fatal classification used by retry/backoff tables
/// (queue and scheduler consult this; it is not itself an error type).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// DB/cache connectivity, timeouts — retried with backoff.
    Transient,
    /// Operation aborted by cancellation/deadline — never auto-retried.
    Cancelled,
    /// Schema violation, unknown stage, irreconcilable state edge — batch
    /// marked failed, manual intervention.
    Fatal,
}
