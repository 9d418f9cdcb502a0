//! # Discovery Surface
//!
//! Public per-tenant manifest and OpenAPI documents, plus the health
//! probe. Both documents are projections of the tenant's enabled
//! operations and carry no secrets.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::context::RequestContext;
use crate::error::ApiError;
use crate::manifest::{build_manifest, Manifest};
use crate::openapi::build_openapi;
use crate::state::AppState;

/// GET /healthz — liveness probe, reachable without tenant context.
pub async fn healthz() -> Json<Value> {
    Json(json!({"ok": true}))
}

/// GET /.well-known/ai-actions — the per-tenant action manifest.
pub async fn ai_actions(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Manifest>, ApiError> {
    let operations = state
        .registry
        .load_operations(ctx.tenant.id)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok(Json(build_manifest(&state.config, &ctx.tenant, &operations)))
}

/// GET /.well-known/openapi.json — OpenAPI 3.1 for the tenant's operations.
pub async fn openapi_json(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Value>, ApiError> {
    let operations = state
        .registry
        .load_operations(ctx.tenant.id)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    Ok(Json(build_openapi(&operations)))
}
