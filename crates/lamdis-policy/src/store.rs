//! # Decision Store
//!
//! Persists decisions and re-validates the binding at execute time.
//! Decisions are immutable after insert — revocation happens by TTL expiry
//! or by issuing a new decision. Every query is tenant-scoped through the
//! `app.tenant_id` session variable.

use chrono::{DateTime, Utc};
use lamdis_core::{binding_hash, Decision, DecisionStatus, Problem, ProblemKind};
use lamdis_facts::FactsEngine;
use serde_json::Value;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

/// Decision id handed out when no database is configured.
const DEV_DECISION_ID: &str = "dev-decision";

/// Errors raised while persisting a decision.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database failure on insert.
    #[error("decision store error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A binding-validation failure, mapped by the API layer to HTTP 409 with
/// an `application/problem+json` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindFailure {
    /// The problem kind (drives the type URL and title).
    pub kind: ProblemKind,
    /// Occurrence-specific detail.
    pub detail: String,
}

impl BindFailure {
    fn new(kind: ProblemKind, detail: &str) -> Self {
        Self {
            kind,
            detail: detail.to_string(),
        }
    }

    /// Render as a problem document.
    pub fn problem(&self) -> Problem {
        self.kind.problem(self.detail.clone())
    }
}

/// The stored columns consulted at bind time.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StoredDecision {
    /// The action the decision was evaluated for.
    pub action_key: String,
    /// Stored status string.
    pub status: String,
    /// Policy version the decision was evaluated with.
    pub policy_version: i32,
    /// Stored binding hash (may be empty for legacy rows).
    pub hash: String,
    /// Executability deadline.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Status / action / expiry portion of the executability check. Pure so the
/// 409 taxonomy is testable without a database; hash verification happens
/// after facts re-resolution.
pub fn check_executable(
    stored: &StoredDecision,
    action_key: &str,
    now: DateTime<Utc>,
) -> Result<(), BindFailure> {
    if stored.action_key != action_key {
        return Err(BindFailure::new(
            ProblemKind::DecisionMismatch,
            "The decision_id does not match this action",
        ));
    }
    let executable = DecisionStatus::parse_policy_status(&stored.status)
        .is_some_and(|status| status.is_executable());
    if !executable {
        return Err(BindFailure::new(
            ProblemKind::DecisionBlocked,
            "The decision is not allowed for execution",
        ));
    }
    if let Some(expires_at) = stored.expires_at {
        if expires_at < now {
            return Err(BindFailure::new(
                ProblemKind::DecisionExpired,
                "The decision has expired; call preflight again",
            ));
        }
    }
    Ok(())
}

/// The decision store.
#[derive(Debug, Clone)]
pub struct DecisionStore {
    pool: Option<PgPool>,
}

impl DecisionStore {
    /// Create a store over an optional pool. Without a pool the store hands
    /// out a fixed dev decision id and validates every binding.
    pub fn new(pool: Option<PgPool>) -> Self {
        Self { pool }
    }

    /// Persist a decision, computing its binding hash, and return the
    /// assigned id. `NEEDS_INPUT` decisions must not reach this method —
    /// the protocol layer surfaces needs without persistence.
    pub async fn persist(&self, tenant_id: Uuid, decision: &Decision) -> Result<String, StoreError> {
        let Some(pool) = &self.pool else {
            return Ok(DEV_DECISION_ID.to_string());
        };
        let hash = binding_hash(&decision.inputs, &decision.facts, decision.policy_version);
        let id = Uuid::new_v4();
        sqlx::query(
            "WITH s AS (
                SELECT set_config('app.tenant_id', $1, true)
            ) INSERT INTO decisions
                (id, tenant_id, action_key, inputs, facts, policy_version,
                 status, reasons, needs, alternatives, hash, expires_at)
              VALUES ($2, $1::uuid, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(tenant_id.to_string())
        .bind(id)
        .bind(&decision.action_key)
        .bind(&decision.inputs)
        .bind(&decision.facts)
        .bind(decision.policy_version)
        .bind(decision.status.as_str())
        .bind(&decision.reasons)
        .bind(&decision.needs)
        .bind(&decision.alternatives)
        .bind(&hash)
        .bind(decision.expires_at)
        .execute(pool)
        .await?;
        Ok(id.to_string())
    }

    /// Validate that a decision is executable for this action and that its
    /// binding hash still matches the *current* inputs and freshly resolved
    /// facts.
    ///
    /// Each failure maps to a distinct 409 problem; raw store errors never
    /// leak to the caller.
    pub async fn validate_and_bind(
        &self,
        facts_engine: &FactsEngine,
        tenant_id: Uuid,
        decision_id: &str,
        action_key: &str,
        inputs: &Value,
    ) -> Result<(), BindFailure> {
        let Some(pool) = &self.pool else {
            // Dev mode has no stored decisions to check against.
            return Ok(());
        };
        let invalid = || {
            BindFailure::new(
                ProblemKind::InvalidDecision,
                "The provided decision_id is unknown or not accessible",
            )
        };

        let id: Uuid = decision_id.parse().map_err(|_| invalid())?;
        let stored = sqlx::query_as::<_, StoredDecision>(
            "WITH s AS (
                SELECT set_config('app.tenant_id', $1, true)
            ) SELECT action_key, status, policy_version,
                     COALESCE(hash, '') AS hash, expires_at
              FROM decisions WHERE id = $2",
        )
        .bind(tenant_id.to_string())
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|err| {
            tracing::error!(error = %err, "decision lookup failed");
            invalid()
        })?
        .ok_or_else(invalid)?;

        check_executable(&stored, action_key, Utc::now())?;

        // Re-resolve facts with the current inputs and compare the binding
        // hash; resolution errors degrade into a mismatch rather than a 5xx.
        let facts_now = facts_engine
            .resolve(tenant_id, action_key, inputs)
            .await
            .unwrap_or(Value::Null);
        let recomputed = binding_hash(inputs, &facts_now, stored.policy_version);
        if !stored.hash.is_empty() && stored.hash != recomputed {
            return Err(BindFailure::new(
                ProblemKind::DecisionMismatch,
                "Inputs or facts changed; please re-run preflight",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn stored(action_key: &str, status: &str, expires_in: Duration) -> StoredDecision {
        StoredDecision {
            action_key: action_key.to_string(),
            status: status.to_string(),
            policy_version: 1,
            hash: String::new(),
            expires_at: Some(Utc::now() + expires_in),
        }
    }

    #[test]
    fn executable_decision_passes() {
        let row = stored("shop.orders", "ALLOW", Duration::minutes(10));
        assert!(check_executable(&row, "shop.orders", Utc::now()).is_ok());
    }

    #[test]
    fn allow_with_conditions_is_executable() {
        let row = stored("shop.orders", "ALLOW_WITH_CONDITIONS", Duration::minutes(10));
        assert!(check_executable(&row, "shop.orders", Utc::now()).is_ok());
    }

    #[test]
    fn action_mismatch_fails_first() {
        // Even an expired, blocked decision for another action reports the
        // mismatch, mirroring the check order of the bind path.
        let row = stored("other.action", "BLOCKED", Duration::minutes(-10));
        let err = check_executable(&row, "shop.orders", Utc::now()).unwrap_err();
        assert_eq!(err.kind, ProblemKind::DecisionMismatch);
    }

    #[test]
    fn blocked_status_fails() {
        let row = stored("shop.orders", "BLOCKED", Duration::minutes(10));
        let err = check_executable(&row, "shop.orders", Utc::now()).unwrap_err();
        assert_eq!(err.kind, ProblemKind::DecisionBlocked);
    }

    #[test]
    fn needs_input_status_is_not_executable() {
        let row = stored("shop.orders", "NEEDS_INPUT", Duration::minutes(10));
        let err = check_executable(&row, "shop.orders", Utc::now()).unwrap_err();
        assert_eq!(err.kind, ProblemKind::DecisionBlocked);
    }

    #[test]
    fn unknown_status_string_is_not_executable() {
        let row = stored("shop.orders", "garbage", Duration::minutes(10));
        let err = check_executable(&row, "shop.orders", Utc::now()).unwrap_err();
        assert_eq!(err.kind, ProblemKind::DecisionBlocked);
    }

    #[test]
    fn expired_decision_fails() {
        let row = stored("shop.orders", "ALLOW", Duration::seconds(-2));
        let err = check_executable(&row, "shop.orders", Utc::now()).unwrap_err();
        assert_eq!(err.kind, ProblemKind::DecisionExpired);
    }

    #[test]
    fn missing_expiry_never_expires() {
        let mut row = stored("shop.orders", "ALLOW", Duration::minutes(10));
        row.expires_at = None;
        assert!(check_executable(&row, "shop.orders", Utc::now()).is_ok());
    }

    #[test]
    fn bind_failure_renders_problem() {
        let failure = BindFailure::new(ProblemKind::DecisionExpired, "too late");
        let problem = failure.problem();
        assert!(problem.type_url.ends_with("/decision-expired"));
        assert_eq!(problem.detail.as_deref(), Some("too late"));
    }

    #[tokio::test]
    async fn dev_mode_persist_returns_fixed_id() {
        let store = DecisionStore::new(None);
        let decision = Decision {
            id: None,
            action_key: "shop.orders".to_string(),
            inputs: json!({}),
            facts: json!({}),
            policy_version: 0,
            status: DecisionStatus::Allow,
            reasons: None,
            needs: None,
            alternatives: None,
            expires_at: Utc::now() + Duration::minutes(15),
        };
        let id = store.persist(Uuid::nil(), &decision).await.unwrap();
        assert_eq!(id, "dev-decision");
    }

    #[tokio::test]
    async fn dev_mode_bind_always_passes() {
        let store = DecisionStore::new(None);
        let facts = FactsEngine::new(None);
        let outcome = store
            .validate_and_bind(&facts, Uuid::nil(), "dev-decision", "shop.orders", &json!({}))
            .await;
        assert!(outcome.is_ok());
    }
}
