use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use feedline_core::entities::LockType;
use feedline_lock::{LockManager, LockStatus};
use feedline_metrics::{empty_tags, MetricsSink};
use redis::AsyncCommands;
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::StateError;
use crate::machine::{article_state_machine, batch_state_machine, EntityState, StateMachine};

const STATE_CACHE_TTL_SECONDS: u64 = 300;
const STATE_LOCK_TTL_SECONDS: u64 = 60;
const HISTORY_LIMIT: isize = 49;

type Action = Arc<dyn Fn(&str, EntityState, &serde_json::Value) + Send + Sync>;

/// An audit-trail entry appended on every successful transition, kept as
/// the last 50 per entity in Redis (`transitions:{entity_type}:{entity_id}`).
#[derive(Debug, Clone, Serialize)]
pub struct TransitionLogEntry {
    pub entity_type: String,
    pub entity_id: String,
    pub from_state: String,
    pub to_state: String,
    pub trigger: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub metadata: serde_json::Value,
}

/// Coordinates entity lifecycle transitions across a set of registered
/// `StateMachine`s, backed by a KV cache (300s TTL) over a relational store
/// of record, guarded per-entity by a short-lived exclusive lock (spec.md
/// §4.8).
pub struct StateManager {
    pool: PgPool,
    redis: redis::aio::ConnectionManager,
    locks: LockManager,
    metrics: Option<MetricsSink>,
    machines: HashMap<&'static str, StateMachine>,
    actions: Mutex<HashMap<(&'static str, String), Vec<Action>>>,
}

impl StateManager {
    pub fn new(pool: PgPool, redis: redis::aio::ConnectionManager, locks: LockManager) -> Self {
        let mut machines = HashMap::new();
        machines.insert("batch", batch_state_machine());
        machines.insert("article", article_state_machine());
        Self { pool, redis, locks, metrics: None, machines, actions: Mutex::new(HashMap::new()) }
    }

    pub fn with_metrics(mut self, metrics: MetricsSink) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Register a side-effecting action to run after the state transitions
    /// to a new state for `(entity_type, trigger)`.
    pub async fn register_action(&self, entity_type: &'static str, trigger: impl Into<String>, action: Action) {
        self.actions.lock().await.entry((entity_type, trigger.into())).or_default().push(action);
    }

    /// `transition(entity_type, entity_id, trigger, metadata) -> bool`
    /// (spec.md §4.8).
    pub async fn transition(
        &self,
        entity_type: &str,
        entity_id: &str,
        trigger: &str,
        metadata: serde_json::Value,
    ) -> Result<bool, StateError> {
        let lock_key = format!("state:{entity_type}:{entity_id}");
        let owner = format!("state_manager_{}", &Uuid::new_v4().simple().to_string()[..8]);

        let lock_status = self
            .locks
            .acquire_lock(
                &lock_key,
                &owner,
                Some(Duration::from_secs(STATE_LOCK_TTL_SECONDS)),
                LockType::Exclusive,
                false,
                serde_json::json!({}),
            )
            .await?;

        if !matches!(lock_status, LockStatus::Acquired | LockStatus::Renewed) {
            warn!(entity_type, entity_id, "failed to acquire lock for state transition");
            return Ok(false);
        }

        let result = self.transition_locked(entity_type, entity_id, trigger, metadata).await;

        if let Err(e) = self.locks.release_lock(&lock_key, &owner).await {
            warn!(error = %e, lock_key, "failed to release state transition lock");
        }

        let success = result?;
        let metric = format!("state.transition.{entity_type}.{trigger}.{}", if success { "success" } else { "failed" });
        if let Some(m) = &self.metrics {
            m.incr(&metric, 1.0, empty_tags());
        }
        Ok(success)
    }

    async fn transition_locked(
        &self,
        entity_type: &str,
        entity_id: &str,
        trigger: &str,
        metadata: serde_json::Value,
    ) -> Result<bool, StateError> {
        let Some(current_state) = self.get_entity_state(entity_type, entity_id).await? else {
            error!(entity_type, entity_id, "entity not found for state transition");
            return Ok(false);
        };

        let Some(machine) = self.machines.get(entity_type) else {
            error!(entity_type, "no state machine registered for entity type");
            return Ok(false);
        };

        let Some(transition) = machine.get_transition(current_state, trigger) else {
            warn!(entity_type, entity_id, trigger, ?current_state, "invalid state transition");
            return Ok(false);
        };
        let to_state = transition.to_state;

        self.update_entity_state_db(entity_type, entity_id, to_state).await?;
        self.cache_state(entity_type, entity_id, to_state).await?;
        self.run_actions(entity_type, trigger, to_state, &metadata).await;
        self.log_transition(entity_type, entity_id, current_state, to_state, trigger, metadata).await;

        info!(entity_type, entity_id, from = current_state.as_str(), to = to_state.as_str(), "state transition applied");
        Ok(true)
    }

    /// KV cache first (300s TTL), relational fallback on miss.
    pub async fn get_entity_state(&self, entity_type: &str, entity_id: &str) -> Result<Option<EntityState>, StateError> {
        let cache_key = format!("state:{entity_type}:{entity_id}");
        let mut redis = self.redis.clone();

        let cached: Option<String> = redis.get(&cache_key).await?;
        if let Some(value) = cached {
            if let Some(state) = parse_state(&value) {
                return Ok(Some(state));
            }
        }

        let db_status: Option<String> = match entity_type {
            "batch" => sqlx::query_scalar("SELECT status FROM batches WHERE batch_id = $1")
                .bind(entity_id)
                .fetch_optional(&self.pool)
                .await?,
            "article" => {
                let id: i64 = entity_id.parse().unwrap_or(-1);
                sqlx::query_scalar("SELECT status FROM raw_articles WHERE id = $1").bind(id).fetch_optional(&self.pool).await?
            }
            _ => None,
        };

        let Some(db_status) = db_status else { return Ok(None) };
        let state = map_db_status(&db_status);
        self.cache_state(entity_type, entity_id, state).await?;
        Ok(Some(state))
    }

    async fn cache_state(&self, entity_type: &str, entity_id: &str, state: EntityState) -> Result<(), StateError> {
        let mut redis = self.redis.clone();
        let cache_key = format!("state:{entity_type}:{entity_id}");
        let _: () = redis.set_ex(&cache_key, state.as_str(), STATE_CACHE_TTL_SECONDS).await?;
        Ok(())
    }

    async fn update_entity_state_db(&self, entity_type: &str, entity_id: &str, to_state: EntityState) -> Result<(), StateError> {
        let db_status = to_state.as_str();
        match entity_type {
            "batch" => {
                sqlx::query("UPDATE batches SET status = $1, updated_at = NOW() WHERE batch_id = $2")
                    .bind(db_status)
                    .bind(entity_id)
                    .execute(&self.pool)
                    .await?;
            }
            "article" => {
                let id: i64 = entity_id.parse().unwrap_or(-1);
                sqlx::query("UPDATE raw_articles SET status = $1, updated_at = NOW() WHERE id = $2")
                    .bind(db_status)
                    .bind(id)
                    .execute(&self.pool)
                    .await?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn run_actions(&self, entity_type: &str, trigger: &str, to_state: EntityState, metadata: &serde_json::Value) {
        let actions = self.actions.lock().await;
        if let Some(handlers) = actions.get(&(intern(entity_type), trigger.to_string())) {
            for handler in handlers {
                handler(entity_type, to_state, metadata);
            }
        }
    }

    async fn log_transition(
        &self,
        entity_type: &str,
        entity_id: &str,
        from_state: EntityState,
        to_state: EntityState,
        trigger: &str,
        metadata: serde_json::Value,
    ) {
        let entry = TransitionLogEntry {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            from_state: from_state.as_str().to_string(),
            to_state: to_state.as_str().to_string(),
            trigger: trigger.to_string(),
            timestamp: Utc::now(),
            metadata,
        };

        let Ok(payload) = serde_json::to_string(&entry) else { return };
        let key = format!("transitions:{entity_type}:{entity_id}");
        let mut redis = self.redis.clone();
        let push: Result<i64, _> = redis.lpush(&key, payload).await;
        if push.is_ok() {
            let _: Result<(), _> = redis.ltrim(&key, 0, HISTORY_LIMIT).await;
        }
    }

    /// Last (up to) 50 transitions for an entity, most recent first.
    pub async fn history(&self, entity_type: &str, entity_id: &str) -> Result<Vec<TransitionLogEntry>, StateError> {
        let key = format!("transitions:{entity_type}:{entity_id}");
        let mut redis = self.redis.clone();
        let raw: Vec<String> = redis.lrange(&key, 0, HISTORY_LIMIT).await?;
        Ok(raw.iter().filter_map(|s| serde_json::from_str(s).ok()).collect())
    }
}

/// `&'static str` entity-type keys are only ever one of `"batch"`/`"article"`
/// today; this just avoids allocating a `String` key for the common case.
fn intern(entity_type: &str) -> &'static str {
    match entity_type {
        "batch" => "batch",
        "article" => "article",
        _ => "unknown",
    }
}

fn parse_state(raw: &str) -> Option<EntityState> {
    match raw {
        "created" => Some(EntityState::Created),
        "pending" => Some(EntityState::Pending),
        "processing" => Some(EntityState::Processing),
        "completed" => Some(EntityState::Completed),
        "failed" => Some(EntityState::Failed),
        "cancelled" => Some(EntityState::Cancelled),
        "archived" => Some(EntityState::Archived),
        _ => None,
    }
}

/// Maps raw DB status columns (which vary slightly per entity type -- e.g.
/// `raw_articles.status = 'processed'` vs `batches.status = 'completed'`)
/// onto the generic `EntityState` vocabulary.
fn map_db_status(db_status: &str) -> EntityState {
    match db_status.to_lowercase().as_str() {
        "created" => EntityState::Created,
        "pending" | "ready" => EntityState::Pending,
        "processing" => EntityState::Processing,
        "processed" | "completed" => EntityState::Completed,
        "failed" => EntityState::Failed,
        "cancelled" => EntityState::Cancelled,
        "archived" => EntityState::Archived,
        _ => EntityState::Created,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_status_aliases_map_onto_generic_states() {
        assert_eq!(map_db_status("ready"), EntityState::Pending);
        assert_eq!(map_db_status("processed"), EntityState::Completed);
        assert_eq!(map_db_status("unknown_value"), EntityState::Created);
    }

    #[test]
    fn parse_state_round_trips_as_str() {
        for state in [
            EntityState::Created,
            EntityState::Pending,
            EntityState::Processing,
            EntityState::Completed,
            EntityState::Failed,
            EntityState::Cancelled,
            EntityState::Archived,
        ] {
            assert_eq!(parse_state(state.as_str()), Some(state));
        }
    }
}
