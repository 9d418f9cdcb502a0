//! # Orchestrator
//!
//! Turns a validated decision into an upstream side effect: resolves the
//! action key to an enabled connector operation, renders the request
//! template, dispatches with auth injection, and records the execution.
//!
//! Mapping failures (`no-operation`, `unresolved-path-params`) are recorded
//! inside the execution result with status `FAILED`; the HTTP layer still
//! returns 200 because the execute call produced a structured outcome.
//! Transport failures annotate the step and the execution is recorded as
//! produced.

use std::sync::Arc;

use lamdis_core::{short_name, slugify, split_action_key, Problem, ProblemKind};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

use crate::registry::{Operation, OperationRegistry};
use crate::template::render_request;
use crate::upstream::{auth_headers, load_auth_material, UpstreamClient};

/// One step of an execution, as persisted and returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Step kind; currently always `request`.
    pub op: String,
    /// HTTP method dispatched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Fully rendered upstream URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Upstream HTTP status, when a response was received.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Transport or mapping error annotation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Terminal status of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    /// The execution produced an upstream outcome.
    Succeeded,
    /// The execution failed before dispatch (mapping problems).
    Failed,
}

impl ExecutionStatus {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        }
    }
}

/// The structured outcome of one execute call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Ordered execution steps.
    pub steps: Vec<Step>,
    /// Parsed upstream JSON response, or null.
    pub result: Option<Value>,
    /// Terminal status.
    pub status: ExecutionStatus,
    /// Problems encountered (mapping failures).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub problems: Vec<Problem>,
}

/// Outcome of resolving an action key against the enabled operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'a> {
    /// Exactly one operation matched.
    Matched(&'a Operation),
    /// No operation matched the namespace.
    NotFound,
    /// Several operations matched the namespace but none by short name;
    /// resolution refuses rather than depending on iteration order.
    Ambiguous,
}

/// Resolve an action key to an enabled operation.
///
/// The key splits at the first `.` into `ns` and `short`. Candidates are
/// operations whose connector kind-slug or title-slug equals `ns`; an exact
/// `short(path)` match wins immediately, a single remaining candidate is
/// used as the fallback, and an ambiguous candidate set is refused.
pub fn resolve_operation<'a>(operations: &'a [Operation], action_key: &str) -> Resolution<'a> {
    let (ns, short) = split_action_key(action_key);
    let mut candidates = Vec::new();
    for op in operations {
        let kind_slug = op.kind.as_deref().map(slugify).unwrap_or_default();
        let title_slug = op.title.as_deref().map(slugify).unwrap_or_default();
        if kind_slug != ns && title_slug != ns {
            continue;
        }
        if short_name(&op.path) == short {
            return Resolution::Matched(op);
        }
        candidates.push(op);
    }
    match candidates.as_slice() {
        [] => Resolution::NotFound,
        [single] => Resolution::Matched(single),
        _ => Resolution::Ambiguous,
    }
}

/// The orchestrator.
#[derive(Debug)]
pub struct Orchestrator {
    pool: Option<PgPool>,
    registry: Arc<OperationRegistry>,
    client: UpstreamClient,
    encryption_key: Option<String>,
}

impl Orchestrator {
    /// Build an orchestrator over an optional pool and a shared registry.
    pub fn new(
        pool: Option<PgPool>,
        registry: Arc<OperationRegistry>,
        encryption_key: Option<String>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            pool,
            registry,
            client: UpstreamClient::new()?,
            encryption_key,
        })
    }

    /// Execute an action bound to a prior decision.
    ///
    /// Infallible by design: every failure mode lands in the structured
    /// result, and store errors are logged rather than surfaced.
    pub async fn execute(
        &self,
        tenant_id: Uuid,
        action_key: &str,
        decision_id: &str,
        inputs: &Value,
    ) -> ExecutionResult {
        let idempotency_key = inputs
            .get("idempotency_key")
            .and_then(Value::as_str)
            .filter(|k| !k.is_empty())
            .unwrap_or(decision_id)
            .to_string();

        // A retried execute observes the committed row, not a re-dispatch.
        if let Some(stored) = self.load_execution(tenant_id, &idempotency_key).await {
            return stored;
        }

        let operations = match self.registry.load_operations(tenant_id).await {
            Ok(ops) => ops,
            Err(err) => {
                tracing::error!(error = %err, "failed to load operations");
                Arc::new(Vec::new())
            }
        };

        let operation = match resolve_operation(&operations, action_key) {
            Resolution::Matched(op) => op.clone(),
            Resolution::NotFound | Resolution::Ambiguous => {
                let result = no_operation_result();
                self.record(tenant_id, action_key, decision_id, &idempotency_key, &result)
                    .await;
                return result;
            }
        };

        let base_url = operation.base_url.clone().unwrap_or_default();
        let rendered = match render_request(
            &operation.request_template,
            &operation.path,
            &base_url,
            inputs,
        ) {
            Ok(rendered) => rendered,
            Err(err) => {
                let result = unresolved_path_params_result(&err.to_string());
                self.record(tenant_id, action_key, decision_id, &idempotency_key, &result)
                    .await;
                return result;
            }
        };

        let mut headers = rendered.headers.clone();
        if let (Some(pool), Some(auth_ref)) = (&self.pool, &operation.auth_ref) {
            match load_auth_material(pool, tenant_id, auth_ref).await {
                Ok(Some(material)) => {
                    headers.extend(auth_headers(&material, self.encryption_key.as_deref()));
                }
                Ok(None) => {}
                Err(err) => tracing::warn!(error = %err, "failed to load auth config"),
            }
        }

        let outcome = self
            .client
            .dispatch(
                &operation.method,
                &rendered.url,
                &headers,
                rendered.body.as_ref(),
            )
            .await;

        let step = Step {
            op: "request".to_string(),
            method: Some(operation.method.clone()),
            url: Some(rendered.url.clone()),
            status: outcome.status,
            error: outcome.error.clone(),
        };
        let result = ExecutionResult {
            steps: vec![step],
            result: outcome.body,
            status: ExecutionStatus::Succeeded,
            problems: Vec::new(),
        };

        if let Some(stored) = self
            .record(tenant_id, action_key, decision_id, &idempotency_key, &result)
            .await
        {
            // Lost an insert race; the committed row wins.
            return stored;
        }
        result
    }

    /// Load a previously recorded execution by idempotency key.
    async fn load_execution(
        &self,
        tenant_id: Uuid,
        idempotency_key: &str,
    ) -> Option<ExecutionResult> {
        let pool = self.pool.as_ref()?;
        let row: (Value, Option<Value>, String) = sqlx::query_as(
            "WITH s AS (
                SELECT set_config('app.tenant_id', $1, true)
            ) SELECT steps, result, status FROM executions
              WHERE tenant_id = $1::uuid AND idempotency_key = $2",
        )
        .bind(tenant_id.to_string())
        .bind(idempotency_key)
        .fetch_optional(pool)
        .await
        .map_err(|err| tracing::error!(error = %err, "execution lookup failed"))
        .ok()??;

        let (steps, result, status) = row;
        Some(ExecutionResult {
            steps: serde_json::from_value(steps).unwrap_or_default(),
            result: result.filter(|v| !v.is_null()),
            status: if status == "FAILED" {
                ExecutionStatus::Failed
            } else {
                ExecutionStatus::Succeeded
            },
            problems: Vec::new(),
        })
    }

    /// Insert the execution row with conflict handling.
    ///
    /// Returns the stored row when this insert lost the `(tenant,
    /// idempotency_key)` race, so callers can return the committed outcome.
    async fn record(
        &self,
        tenant_id: Uuid,
        action_key: &str,
        decision_id: &str,
        idempotency_key: &str,
        result: &ExecutionResult,
    ) -> Option<ExecutionResult> {
        let pool = self.pool.as_ref()?;
        let steps = serde_json::to_value(&result.steps).unwrap_or_else(|_| json!([]));
        let outcome = sqlx::query(
            "WITH s AS (
                SELECT set_config('app.tenant_id', $1, true)
            ) INSERT INTO executions
                (tenant_id, action_key, decision_id, idempotency_key, steps, result, status)
              VALUES ($1::uuid, $2, $3, $4, $5, $6, $7)
              ON CONFLICT DO NOTHING",
        )
        .bind(tenant_id.to_string())
        .bind(action_key)
        .bind(decision_id)
        .bind(idempotency_key)
        .bind(steps)
        .bind(result.result.clone().unwrap_or(Value::Null))
        .bind(result.status.as_str())
        .execute(pool)
        .await;

        match outcome {
            Ok(done) if done.rows_affected() == 0 => {
                self.load_execution(tenant_id, idempotency_key).await
            }
            Ok(_) => None,
            Err(err) => {
                tracing::error!(error = %err, "failed to record execution");
                None
            }
        }
    }
}

/// `FAILED` result for an action key with no (or an ambiguous) operation.
fn no_operation_result() -> ExecutionResult {
    ExecutionResult {
        steps: vec![Step {
            op: "request".to_string(),
            method: None,
            url: None,
            status: None,
            error: Some("no_operation_mapping".to_string()),
        }],
        result: Some(json!({"ok": false})),
        status: ExecutionStatus::Failed,
        problems: vec![ProblemKind::NoOperation.problem(
            "No enabled connector operation was found for this action key. \
             Ensure the connector title or kind matches the action key, or add \
             an explicit mapping.",
        )],
    }
}

/// `FAILED` result for a path with unbound placeholders.
fn unresolved_path_params_result(detail: &str) -> ExecutionResult {
    ExecutionResult {
        steps: vec![Step {
            op: "request".to_string(),
            method: None,
            url: None,
            status: None,
            error: Some("unresolved_path_params".to_string()),
        }],
        result: Some(json!({"ok": false})),
        status: ExecutionStatus::Failed,
        problems: vec![ProblemKind::UnresolvedPathParams.problem(format!(
            "One or more path placeholders were not bound ({detail}). Ensure \
             request_template.path_params maps every {{name}} in the path and \
             inputs provide values."
        ))],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(kind: &str, title: Option<&str>, method: &str, path: &str) -> Operation {
        Operation {
            method: method.to_string(),
            path: path.to_string(),
            summary: String::new(),
            scopes: vec![],
            params: vec![],
            request_template: json!({}),
            base_url: None,
            auth_ref: None,
            kind: Some(kind.to_string()),
            title: title.map(str::to_string),
        }
    }

    #[test]
    fn exact_short_name_match_wins() {
        let ops = vec![
            op("shop", None, "GET", "/v1/orders"),
            op("shop", None, "POST", "/v1/orders/{id}/refund"),
        ];
        match resolve_operation(&ops, "shop.refund") {
            Resolution::Matched(matched) => assert_eq!(matched.path, "/v1/orders/{id}/refund"),
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn title_slug_also_matches_namespace() {
        let ops = vec![op("internal-kind", Some("Catcher Test"), "GET", "/v1/orders")];
        match resolve_operation(&ops, "catcher-test.orders") {
            Resolution::Matched(matched) => assert_eq!(matched.path, "/v1/orders"),
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn single_candidate_is_fallback() {
        let ops = vec![op("shop", None, "GET", "/v1/orders")];
        match resolve_operation(&ops, "shop.unknown-short") {
            Resolution::Matched(matched) => assert_eq!(matched.path, "/v1/orders"),
            other => panic!("expected fallback match, got {other:?}"),
        }
    }

    #[test]
    fn ambiguous_candidates_are_refused() {
        let ops = vec![
            op("shop", None, "GET", "/v1/orders"),
            op("shop", None, "GET", "/v1/customers"),
        ];
        assert_eq!(
            resolve_operation(&ops, "shop.unknown-short"),
            Resolution::Ambiguous
        );
    }

    #[test]
    fn foreign_namespace_is_not_found() {
        let ops = vec![op("shop", None, "GET", "/v1/orders")];
        assert_eq!(
            resolve_operation(&ops, "warehouse.orders"),
            Resolution::NotFound
        );
    }

    #[test]
    fn camel_case_kind_slugs_match() {
        let ops = vec![op("SampleShop", None, "GET", "/v1/orders")];
        match resolve_operation(&ops, "sample-shop.orders") {
            Resolution::Matched(_) => {}
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn no_operation_result_shape() {
        let result = no_operation_result();
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(result.steps.len(), 1);
        assert_eq!(result.steps[0].error.as_deref(), Some("no_operation_mapping"));
        assert!(result.problems[0].type_url.ends_with("/no-operation"));
    }

    #[test]
    fn execution_result_serializes_like_the_wire_contract() {
        let result = no_operation_result();
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "FAILED");
        assert_eq!(value["result"]["ok"], false);
        assert_eq!(value["steps"][0]["op"], "request");
        // Unset step fields are omitted entirely.
        assert!(value["steps"][0].get("method").is_none());
    }
}
