//! # Action Protocol
//!
//! The two-phase contract every action is invoked through:
//!
//! - `POST /v1/actions/:key/preflight` — resolve facts, evaluate policy,
//!   mint a TTL- and hash-bound decision (or surface needs/refusal).
//! - `POST /v1/actions/:key/execute` — re-validate the binding and hand
//!   the call to the orchestrator.
//!
//! Binding failures are 409 problem documents; mapping failures inside the
//! orchestrator come back as a structured `FAILED` result with HTTP 200.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use chrono::{SecondsFormat, Utc};
use lamdis_core::{DecisionStatus, ProblemKind};
use serde::Deserialize;
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::context::RequestContext;
use crate::error::{extract_json, ApiError};
use crate::state::AppState;
use crate::usage::record_usage;

/// Preflight request body.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct PreflightRequest {
    /// Action inputs the policy is evaluated against.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub inputs: Value,
    /// Optional caller hints (accepted, currently unused).
    #[serde(default)]
    #[schema(value_type = Object)]
    pub hints: Option<Value>,
}

/// Execute request body.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ExecuteRequest {
    /// The decision minted by preflight.
    #[serde(default)]
    pub decision_id: Option<String>,
    /// Inputs; must re-resolve to the facts the decision was bound to.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub inputs: Value,
}

/// POST /v1/actions/:key/preflight
pub async fn preflight(
    State(state): State<AppState>,
    Path(key): Path<String>,
    ctx: RequestContext,
    body: Result<Json<PreflightRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let req = extract_json(body)?;
    let inputs = normalize_inputs(req.inputs);
    let tenant_id = ctx.tenant.id;

    // Facts failures degrade to an empty document; the policy still runs
    // and classifies the situation.
    let facts = match state.facts.resolve(tenant_id, &key, &inputs).await {
        Ok(facts) => facts,
        Err(err) => {
            tracing::warn!(action_key = %key, error = %err, "fact resolution failed");
            Value::Null
        }
    };

    let decision = state.policy.evaluate(tenant_id, &key, &inputs, &facts).await;

    if decision.status == DecisionStatus::NeedsInput {
        // Surface the resolver-configured prompts, falling back to the
        // prompts the policy itself returned. Nothing is persisted.
        let mut needs = state.facts.needs(tenant_id, &key).await.unwrap_or_default();
        if needs.is_empty() {
            if let Some(Value::Array(policy_needs)) = decision.needs {
                needs = policy_needs;
            }
        }
        return Ok(Json(json!({
            "status": DecisionStatus::NeedsInput.as_str(),
            "needs": needs,
        })));
    }

    let id = state
        .decisions
        .persist(tenant_id, &decision)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    let mut response = json!({"status": decision.status.as_str()});
    if decision.status.is_executable() {
        response["decision_id"] = json!(id);
        response["expires_at"] = json!(decision
            .expires_at
            .to_rfc3339_opts(SecondsFormat::Secs, true));
        if let Some(reasons) = &decision.reasons {
            response["reasons"] = reasons.clone();
        }
        if let Some(conditions) = &decision.needs {
            response["conditions"] = conditions.clone();
        }
    } else {
        response["reasons"] = decision.reasons.clone().unwrap_or(Value::Null);
        response["alternatives"] = decision.alternatives.clone().unwrap_or(Value::Null);
    }
    Ok(Json(response))
}

/// POST /v1/actions/:key/execute
pub async fn execute(
    State(state): State<AppState>,
    Path(key): Path<String>,
    ctx: RequestContext,
    body: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let started_at = Utc::now();
    let req = extract_json(body)?;
    let inputs = normalize_inputs(req.inputs);
    let tenant_id = ctx.tenant.id;

    let decision_id = req
        .decision_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            ApiError::conflict(ProblemKind::PreflightRequired.problem(
                "Call preflight first and pass decision_id to execute",
            ))
        })?;

    state
        .decisions
        .validate_and_bind(&state.facts, tenant_id, decision_id, &key, &inputs)
        .await
        .map_err(|failure| ApiError::conflict(failure.problem()))?;

    let result = state
        .orchestrator
        .execute(tenant_id, &key, decision_id, &inputs)
        .await;

    record_usage(
        &state.pool,
        tenant_id,
        &key,
        "POST",
        &format!("/v1/actions/{key}/execute"),
        &ctx.request_id,
        200,
        started_at,
    )
    .await;

    let body = serde_json::to_value(&result).map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok(Json(body))
}

/// Treat an absent or non-object `inputs` as an empty object so facts and
/// hashing always see a JSON object.
fn normalize_inputs(inputs: Value) -> Value {
    match inputs {
        Value::Object(_) => inputs,
        Value::Null => json!({}),
        other => {
            tracing::debug!(got = %other, "non-object inputs replaced with empty object");
            json!({})
        }
    }
}
