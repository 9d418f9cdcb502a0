//! # Passthrough Operations
//!
//! The direct REST surface over a tenant's enabled connector operations.
//! Unlike the two-phase action protocol, passthrough requests are checked
//! for scope only and relayed straight to the upstream — no decision is
//! minted or bound. This is the escape hatch for plain REST callers; agents
//! are steered to preflight/execute by the manifest.
//!
//! Requests that match no enabled operation fall through to 404. Matched
//! operations with an upstream base URL are proxied (body relayed verbatim,
//! content-type and accept forwarded, tenant auth injected); operations
//! without one echo the received payload, which keeps the dev sample
//! operations exercisable end-to-end.
//!
//! Passthrough bodies are capped at 2 MiB (the action protocol caps at
//! 1 MiB); upstream responses at 4 MiB.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use lamdis_connector::{auth_headers, load_auth_material, Operation};
use serde_json::{json, Value};
use std::time::Instant;

use crate::context::RequestContext;
use crate::state::AppState;
use crate::usage::record_usage;

/// Whether a concrete request path matches an operation path template.
///
/// Templates match segment-by-segment; a `{name}` segment matches any
/// non-empty concrete segment.
fn path_matches(template: &str, concrete: &str) -> bool {
    let template = template.trim_matches('/');
    let concrete = concrete.trim_matches('/');
    let mut t = template.split('/');
    let mut c = concrete.split('/');
    loop {
        match (t.next(), c.next()) {
            (None, None) => return true,
            (Some(ts), Some(cs)) => {
                let is_param = ts.starts_with('{') && ts.ends_with('}');
                if is_param {
                    if cs.is_empty() {
                        return false;
                    }
                } else if ts != cs {
                    return false;
                }
            }
            _ => return false,
        }
    }
}

/// Find the enabled operation matching this method and concrete path.
fn match_operation<'a>(
    operations: &'a [Operation],
    method: &Method,
    path: &str,
) -> Option<&'a Operation> {
    operations.iter().find(|op| {
        op.method.eq_ignore_ascii_case(method.as_str()) && path_matches(&op.path, path)
    })
}

/// Fallback handler serving the passthrough surface.
pub async fn dispatch(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    ctx: RequestContext,
    body: Bytes,
) -> Response {
    let started_at = chrono::Utc::now();
    let start = Instant::now();
    let path = uri.path().to_string();
    let tenant_id = ctx.tenant.id;

    let operations = match state.registry.load_operations(tenant_id).await {
        Ok(ops) => ops,
        Err(err) => {
            tracing::error!(error = %err, "failed to load operations");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "An internal error occurred"})),
            )
                .into_response();
        }
    };
    let Some(operation) = match_operation(&operations, &method, &path).cloned() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if !ctx.has_any_scope(&operation.scopes) {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"error": "insufficient_scope"})),
        )
            .into_response();
    }

    let response = match &operation.base_url {
        Some(base_url) if !base_url.is_empty() => {
            proxy_upstream(&state, tenant_id, &operation, base_url, &uri, &headers, &body, start)
                .await
        }
        // No upstream configured: echo, so dev operations stay exercisable.
        _ => {
            let received: Value = if body.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&body).unwrap_or(Value::Null)
            };
            Json(json!({
                "ok": true,
                "operation": {"method": operation.method, "path": operation.path},
                "received": received,
                "duration_ms": start.elapsed().as_millis() as u64,
            }))
            .into_response()
        }
    };

    record_usage(
        &state.pool,
        tenant_id,
        "",
        method.as_str(),
        &path,
        &ctx.request_id,
        response.status().as_u16() as i32,
        started_at,
    )
    .await;
    response
}

/// Relay the request to the operation's upstream.
#[allow(clippy::too_many_arguments)]
async fn proxy_upstream(
    state: &AppState,
    tenant_id: uuid::Uuid,
    operation: &Operation,
    base_url: &str,
    uri: &Uri,
    headers: &HeaderMap,
    body: &Bytes,
    start: Instant,
) -> Response {
    let mut full_url = format!("{}{}", base_url.trim_end_matches('/'), uri.path());
    if let Some(query) = uri.query() {
        full_url.push('?');
        full_url.push_str(query);
    }

    // Minimal header passthrough, plus tenant auth injection.
    let mut upstream_headers = Vec::new();
    for name in [header::CONTENT_TYPE, header::ACCEPT] {
        if let Some(value) = headers.get(&name).and_then(|v| v.to_str().ok()) {
            upstream_headers.push((name.as_str().to_string(), value.to_string()));
        }
    }
    if let (Some(pool), Some(auth_ref)) = (&state.pool, &operation.auth_ref) {
        match load_auth_material(pool, tenant_id, auth_ref).await {
            Ok(Some(material)) => {
                upstream_headers
                    .extend(auth_headers(&material, state.config.encryption_key.as_deref()));
            }
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "failed to load auth config"),
        }
    }

    let payload = if body.is_empty() { None } else { Some(&body[..]) };
    let outcome = state
        .upstream
        .forward(&operation.method, &full_url, &upstream_headers, payload)
        .await;

    let Some(status) = outcome.status else {
        tracing::warn!(
            url = %full_url,
            error = outcome.error.as_deref().unwrap_or(""),
            "passthrough upstream unreachable"
        );
        return (
            StatusCode::BAD_GATEWAY,
            Json(json!({"error": "upstream_unreachable"})),
        )
            .into_response();
    };

    (
        [("x-connector-upstream", full_url)],
        Json(json!({
            "passthrough": true,
            "upstream_status": status,
            "operation": {"method": operation.method, "path": operation.path},
            "upstream": outcome.upstream,
            "duration_ms": start.elapsed().as_millis() as u64,
        })),
    )
        .into_response()
}
