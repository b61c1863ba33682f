//! Thin HTTP client for `feedline-cli --use-coordinator` mode: delegates
//! the spec.md §6 RPCs to a running `feedline-server` instead of opening a
//! direct connection to Postgres/Redis from the CLI process itself.

use anyhow::{bail, Context, Result};
use serde::{de::DeserializeOwned, Serialize};

pub struct ServerClient {
    base_url: String,
    http: reqwest::Client,
}

impl ServerClient {
    pub fn new(base_url: &str) -> Self {
        Self { base_url: base_url.trim_end_matches('/').to_string(), http: reqwest::Client::new() }
    }

    pub async fn health_check(&self) -> Result<serde_json::Value> {
        self.get("/health").await
    }

    pub async fn metrics_text(&self) -> Result<String> {
        let url = format!("{}/metrics", self.base_url);
        let resp = self.http.get(&url).send().await.context("failed to fetch metrics")?;
        resp.text().await.context("failed to read metrics body")
    }

    pub async fn queue_status(&self) -> Result<serde_json::Value> {
        self.get("/queue/status").await
    }

    pub async fn process_batch(&self, batch_id: &str, worker_id: Option<&str>) -> Result<serde_json::Value> {
        self.post("/rpc/process_batch", &serde_json::json!({ "batch_id": batch_id, "worker_id": worker_id })).await
    }

    pub async fn create_batch(&self, worker_id: Option<&str>, priority: &str) -> Result<serde_json::Value> {
        self.post("/rpc/create_batch", &serde_json::json!({ "worker_id": worker_id, "priority": priority })).await
    }

    pub async fn emergency_batch(&self, max_size: u32, worker_id: Option<&str>) -> Result<serde_json::Value> {
        self.post("/rpc/emergency_batch", &serde_json::json!({ "max_size": max_size, "worker_id": worker_id })).await
    }

    pub async fn cleanup_expired_locks(&self) -> Result<serde_json::Value> {
        self.post("/rpc/cleanup_expired_locks", &serde_json::json!({})).await
    }

    pub async fn feed_health_check(&self, feed_ids: Option<&[i64]>) -> Result<serde_json::Value> {
        self.post("/rpc/feed_health_check", &serde_json::json!({ "feed_ids": feed_ids })).await
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.http.get(&url).send().await.with_context(|| format!("GET {url} failed"))?;
        Self::parse(resp).await
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &impl Serialize) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.http.post(&url).json(body).send().await.with_context(|| format!("POST {url} failed"))?;
        Self::parse(resp).await
    }

    async fn parse<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("server returned {status}: {body}");
        }
        resp.json().await.context("failed to parse server response")
    }
}
