//! # Usage Recording
//!
//! Appends a `usage_events` row after each executed action. Best-effort:
//! failures are logged, never surfaced to the caller.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Record one usage event.
#[allow(clippy::too_many_arguments)]
pub async fn record_usage(
    pool: &Option<PgPool>,
    tenant_id: Uuid,
    action_id: &str,
    method: &str,
    path: &str,
    request_id: &str,
    status_code: i32,
    started_at: DateTime<Utc>,
) {
    let Some(pool) = pool else {
        return;
    };
    let finished_at = Utc::now();
    let duration_ms = (finished_at - started_at).num_milliseconds() as i32;
    let outcome = sqlx::query(
        "WITH s AS (
            SELECT set_config('app.tenant_id', $1, true)
        ) INSERT INTO usage_events
            (tenant_id, action_id, method, path, request_id, status_code,
             duration_ms, started_at, finished_at)
          VALUES ($1::uuid, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(tenant_id.to_string())
    .bind(action_id)
    .bind(method)
    .bind(path)
    .bind(request_id)
    .bind(status_code)
    .bind(duration_ms)
    .bind(started_at)
    .bind(finished_at)
    .execute(pool)
    .await;

    if let Err(err) = outcome {
        tracing::warn!(error = %err, "failed to record usage event");
    }
}
