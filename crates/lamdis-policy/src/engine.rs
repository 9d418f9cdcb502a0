//! # Policy Evaluation
//!
//! Loads the latest `published` policy module for `(tenant, action_key)`
//! and evaluates the entrypoint `data.policy.decide` with input
//! `{inputs, facts}` via the embedded Rego interpreter.
//!
//! The module must return an object
//! `{status, reasons?, needs?, alternatives?, ttl_seconds?}`. Anything
//! else — an evaluation error, a non-object result, an unknown status —
//! produces `BLOCKED` with reason `policy_error` and a short TTL.

use chrono::{Duration, Utc};
use lamdis_core::{Decision, DecisionStatus};
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

/// Default decision TTL when the module omits `ttl_seconds` (and for the
/// no-policy default allow).
const DEFAULT_TTL_SECS: i64 = 15 * 60;

/// Short TTL applied to `policy_error` blocks.
const POLICY_ERROR_TTL_SECS: i64 = 5 * 60;

/// Rego entrypoint evaluated for every decision.
const ENTRYPOINT: &str = "data.policy.decide";

/// The policy engine: published-module loading plus pure evaluation.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    pool: Option<PgPool>,
}

impl PolicyEngine {
    /// Create an engine over an optional pool. Without a pool (or without a
    /// published module) every action evaluates to a default `ALLOW`.
    pub fn new(pool: Option<PgPool>) -> Self {
        Self { pool }
    }

    /// Evaluate the published policy for an action.
    ///
    /// Never fails: storage errors and policy errors degrade into the
    /// documented decision statuses.
    pub async fn evaluate(
        &self,
        tenant_id: Uuid,
        action_key: &str,
        inputs: &Value,
        facts: &Value,
    ) -> Decision {
        let (module, version) = match self.load_published(tenant_id, action_key).await {
            Ok(Some((module, version))) => (Some(module), version),
            Ok(None) => (None, 0),
            Err(err) => {
                tracing::warn!(
                    action_key,
                    error = %err,
                    "failed to load published policy; defaulting to allow"
                );
                (None, 0)
            }
        };

        match module {
            Some(module) => evaluate_module(&module, version, action_key, inputs, facts),
            // No published policy: default allow with the standard TTL.
            None => Decision {
                id: None,
                action_key: action_key.to_string(),
                inputs: inputs.clone(),
                facts: facts.clone(),
                policy_version: version,
                status: DecisionStatus::Allow,
                reasons: None,
                needs: None,
                alternatives: None,
                expires_at: Utc::now() + Duration::seconds(DEFAULT_TTL_SECS),
            },
        }
    }

    /// Load the highest published policy version for `(tenant, action_key)`.
    async fn load_published(
        &self,
        tenant_id: Uuid,
        action_key: &str,
    ) -> Result<Option<(String, i32)>, sqlx::Error> {
        let Some(pool) = &self.pool else {
            return Ok(None);
        };
        let row: Option<(String, i32)> = sqlx::query_as(
            "WITH s AS (
                SELECT set_config('app.tenant_id', $1, true)
            ) SELECT COALESCE(compiled_rego, ''), COALESCE(version, 0)
              FROM policy_versions
              WHERE action_key = $2 AND status = 'published'
              ORDER BY version DESC
              LIMIT 1",
        )
        .bind(tenant_id.to_string())
        .bind(action_key)
        .fetch_optional(pool)
        .await?;
        Ok(row.filter(|(module, _)| !module.is_empty()))
    }
}

/// Evaluate a policy module against inputs and facts. Pure (no I/O).
pub fn evaluate_module(
    module: &str,
    version: i32,
    action_key: &str,
    inputs: &Value,
    facts: &Value,
) -> Decision {
    let base = Decision {
        id: None,
        action_key: action_key.to_string(),
        inputs: inputs.clone(),
        facts: facts.clone(),
        policy_version: version,
        status: DecisionStatus::Blocked,
        reasons: None,
        needs: None,
        alternatives: None,
        expires_at: Utc::now() + Duration::seconds(POLICY_ERROR_TTL_SECS),
    };

    let result = match eval_entrypoint(module, inputs, facts) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(action_key, error = %err, "policy evaluation failed");
            return policy_error(base);
        }
    };

    let Value::Object(map) = result else {
        return policy_error(base);
    };
    let status = map
        .get("status")
        .and_then(Value::as_str)
        .and_then(DecisionStatus::parse_policy_status);
    let Some(status) = status else {
        return policy_error(base);
    };

    let ttl = map
        .get("ttl_seconds")
        .and_then(Value::as_f64)
        .filter(|ttl| *ttl > 0.0)
        .map(|ttl| ttl as i64)
        .unwrap_or(DEFAULT_TTL_SECS);

    Decision {
        status,
        reasons: map.get("reasons").cloned().filter(|v| !v.is_null()),
        needs: map.get("needs").cloned().filter(|v| !v.is_null()),
        alternatives: map.get("alternatives").cloned().filter(|v| !v.is_null()),
        expires_at: Utc::now() + Duration::seconds(ttl),
        ..base
    }
}

/// Run the Rego interpreter over the module and return the entrypoint value.
fn eval_entrypoint(module: &str, inputs: &Value, facts: &Value) -> Result<Value, String> {
    let mut engine = regorus::Engine::new();
    engine
        .add_policy("policy.rego".to_string(), module.to_string())
        .map_err(|e| e.to_string())?;
    let input = json!({"inputs": inputs, "facts": facts});
    let input = regorus::Value::from_json_str(&input.to_string()).map_err(|e| e.to_string())?;
    engine.set_input(input);
    let value = engine
        .eval_rule(ENTRYPOINT.to_string())
        .map_err(|e| e.to_string())?;
    serde_json::to_value(&value).map_err(|e| e.to_string())
}

/// A `BLOCKED` decision carrying the `policy_error` reason.
fn policy_error(base: Decision) -> Decision {
    Decision {
        status: DecisionStatus::Blocked,
        reasons: Some(json!(["policy_error"])),
        expires_at: Utc::now() + Duration::seconds(POLICY_ERROR_TTL_SECS),
        ..base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALLOW_MODULE: &str = r#"
package policy

decide = {"status": "ALLOW", "ttl_seconds": 600}
"#;

    const CONDITIONAL_MODULE: &str = r#"
package policy

default decide = {"status": "BLOCKED", "reasons": ["out_of_window"], "alternatives": ["open_support_case"]}

decide = {"status": "ALLOW", "ttl_seconds": 600} {
    input.facts.orders > 0
}
"#;

    const NEEDS_MODULE: &str = r#"
package policy

decide = {"status": "NEEDS_INPUT", "needs": [{"key": "order_id", "prompt": "?"}]}
"#;

    const LOWERCASE_MODULE: &str = r#"
package policy

decide = {"status": "allow_with_conditions", "needs": ["photo_id"]}
"#;

    const NON_OBJECT_MODULE: &str = r#"
package policy

decide = "yes"
"#;

    const UNKNOWN_STATUS_MODULE: &str = r#"
package policy

decide = {"status": "MAYBE"}
"#;

    fn eval(module: &str, facts: Value) -> Decision {
        evaluate_module(module, 3, "shop.orders", &json!({}), &facts)
    }

    #[test]
    fn allow_with_explicit_ttl() {
        let d = eval(ALLOW_MODULE, json!({}));
        assert_eq!(d.status, DecisionStatus::Allow);
        assert_eq!(d.policy_version, 3);
        let remaining = d.expires_at - Utc::now();
        assert!(remaining.num_seconds() > 590 && remaining.num_seconds() <= 600);
    }

    #[test]
    fn conditional_module_reads_facts() {
        let allowed = eval(CONDITIONAL_MODULE, json!({"orders": 2}));
        assert_eq!(allowed.status, DecisionStatus::Allow);

        let blocked = eval(CONDITIONAL_MODULE, json!({"orders": 0}));
        assert_eq!(blocked.status, DecisionStatus::Blocked);
        assert_eq!(blocked.reasons, Some(json!(["out_of_window"])));
        assert_eq!(blocked.alternatives, Some(json!(["open_support_case"])));
    }

    #[test]
    fn needs_input_carries_prompts() {
        let d = eval(NEEDS_MODULE, json!({}));
        assert_eq!(d.status, DecisionStatus::NeedsInput);
        assert_eq!(d.needs, Some(json!([{"key": "order_id", "prompt": "?"}])));
    }

    #[test]
    fn status_is_normalized_to_uppercase() {
        let d = eval(LOWERCASE_MODULE, json!({}));
        assert_eq!(d.status, DecisionStatus::AllowWithConditions);
    }

    #[test]
    fn ttl_defaults_to_fifteen_minutes() {
        let d = eval(NEEDS_MODULE, json!({}));
        let remaining = d.expires_at - Utc::now();
        assert!(remaining.num_seconds() > 890 && remaining.num_seconds() <= 900);
    }

    #[test]
    fn malformed_module_blocks_with_policy_error() {
        let d = eval("package policy\n\ndecide = {", json!({}));
        assert_eq!(d.status, DecisionStatus::Blocked);
        assert_eq!(d.reasons, Some(json!(["policy_error"])));
        let remaining = d.expires_at - Utc::now();
        assert!(remaining.num_seconds() <= 300);
    }

    #[test]
    fn non_object_result_blocks_with_policy_error() {
        let d = eval(NON_OBJECT_MODULE, json!({}));
        assert_eq!(d.status, DecisionStatus::Blocked);
        assert_eq!(d.reasons, Some(json!(["policy_error"])));
    }

    #[test]
    fn unknown_status_blocks_with_policy_error() {
        let d = eval(UNKNOWN_STATUS_MODULE, json!({}));
        assert_eq!(d.status, DecisionStatus::Blocked);
        assert_eq!(d.reasons, Some(json!(["policy_error"])));
    }

    #[test]
    fn non_positive_ttl_falls_back_to_default() {
        let module = r#"
package policy

decide = {"status": "ALLOW", "ttl_seconds": -5}
"#;
        let d = eval(module, json!({}));
        let remaining = d.expires_at - Utc::now();
        assert!(remaining.num_seconds() > 890 && remaining.num_seconds() <= 900);
    }

    #[tokio::test]
    async fn no_pool_defaults_to_allow() {
        let engine = PolicyEngine::new(None);
        let d = engine
            .evaluate(Uuid::nil(), "shop.orders", &json!({"a": 1}), &json!({}))
            .await;
        assert_eq!(d.status, DecisionStatus::Allow);
        assert_eq!(d.policy_version, 0);
        assert!(d.reasons.is_none());
        let remaining = d.expires_at - Utc::now();
        assert!(remaining.num_seconds() > 890 && remaining.num_seconds() <= 900);
    }
}
