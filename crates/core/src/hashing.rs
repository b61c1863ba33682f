//! SHA-256 helpers shared across the pipeline: URL hashing, content hashing,
//! article ids, and config hashes all derive from the same primitive.

use sha2::{Digest, Sha256};

/// Full lowercase hex SHA-256 digest of `input`.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// First `n` hex characters of the SHA-256 digest of `input`.
pub fn sha256_hex_prefix(input: &str, n: usize) -> String {
    let full = sha256_hex(input);
    full[..n.min(full.len())].to_string()
}

/// 16-hex-digit article id derived from `(url_hash, publish_date)`, per
/// spec.md §4.9 Stage 5: `sha256(url_hash + "_" + YYYYMMDD(published_at))[..16]`.
pub fn article_id(url_hash: &str, published_at: chrono::DateTime<chrono::Utc>) -> String {
    let day = published_at.format("%Y%m%d").to_string();
    sha256_hex_prefix(&format!("{url_hash}_{day}"), 16)
}

/// 16-hex-digit config hash over canonical (sorted-key) JSON, per spec.md §4.7
/// step 6 and the `system_configurations.checksum` column in SPEC_FULL.md.
pub fn config_hash(canonical_json: &str) -> String {
    sha256_hex_prefix(canonical_json, 16)
}

/// Stable 32-bit signed hash of a lock key, for PostgreSQL advisory locks
/// (`pg_try_advisory_lock` takes a bigint but the source used a 32-bit range).
pub fn advisory_lock_id(key: &str) -> i32 {
    let digest = Sha256::digest(key.as_bytes());
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&digest[..4]);
    i32::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_prefix_is_deterministic() {
        let a = sha256_hex_prefix("https://example.com/a", 16);
        let b = sha256_hex_prefix("https://example.com/a", 16);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn article_id_is_deterministic_and_16_hex() {
        let ts = chrono::DateTime::parse_from_rfc3339("2026-01-15T10:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        let id1 = article_id("deadbeef", ts);
        let id2 = article_id("deadbeef", ts);
        assert_eq!(id1, id2);
        assert_eq!(id1.len(), 16);
    }

    #[test]
    fn advisory_lock_id_is_stable() {
        assert_eq!(advisory_lock_id("batch_creation"), advisory_lock_id("batch_creation"));
    }
}
