//! Reads and claims pending rows from the `alert_events` table (spec.md
//! §3's relational schema) for the notify worker to dispatch.

use sqlx::PgPool;

use crate::traits::{AlertEvent, NotifyError};

/// Thin accessor over the `alert_events` table. Dispatch itself (choosing
/// channels, rendering templates) lives in the notify worker binary; this
/// only owns the claim/fetch/mark-outcome SQL.
pub struct AlertStore {
    pool: PgPool,
}

impl AlertStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Claim up to `limit` undispatched alerts, oldest first, marking them
    /// `dispatching` so a second worker polling concurrently won't also
    /// pick them up.
    pub async fn claim_pending(&self, limit: u32) -> Result<Vec<AlertEvent>, NotifyError> {
        let events = sqlx::query_as::<_, AlertEvent>(
            "UPDATE alert_events SET status = 'dispatching' \
             WHERE id IN ( \
                 SELECT id FROM alert_events WHERE status = 'pending' \
                 ORDER BY created_at ASC LIMIT $1 FOR UPDATE SKIP LOCKED \
             ) \
             RETURNING id, alert_type, severity, batch_id, value, message, metadata, created_at",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(events)
    }

    pub async fn mark_dispatched(&self, id: uuid::Uuid) -> Result<(), NotifyError> {
        sqlx::query("UPDATE alert_events SET status = 'dispatched', dispatched_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, id: uuid::Uuid, error: &str) -> Result<(), NotifyError> {
        sqlx::query("UPDATE alert_events SET status = 'failed', dispatch_error = $2, dispatched_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(error)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
