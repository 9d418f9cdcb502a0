//! # Per-Request Context
//!
//! The resolved tenant, request id, scopes, and grant type travel in a
//! per-request context object injected into request extensions — no
//! process-wide mutable state. OIDC/JWT and DPoP verification are external
//! collaborators: when the outer auth layer has run, its [`AuthClaims`]
//! extension feeds the context; otherwise the context carries an
//! unauthenticated machine default (dev mode).
//!
//! Tenants resolve by the request Host header with the port stripped.
//! Common local synonyms alias to `localhost`; an unknown host is a 404.

use axum::extract::{Request, State};
use axum::http::header;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use lamdis_core::Tenant;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Verified identity input produced by the external OIDC/DPoP layer.
#[derive(Debug, Clone, Default)]
pub struct AuthClaims {
    /// Token subject.
    pub subject: String,
    /// Granted scopes.
    pub scopes: Vec<String>,
    /// OAuth grant type (`client_credentials` for machine callers).
    pub grant_type: Option<String>,
}

/// Context assembled for every tenant-scoped request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// The tenant resolved from the Host header.
    pub tenant: Tenant,
    /// Per-request correlation id.
    pub request_id: String,
    /// Caller subject (empty when unauthenticated in dev).
    pub subject: String,
    /// Granted scopes.
    pub scopes: Vec<String>,
    /// OAuth grant type, when known.
    pub grant_type: Option<String>,
}

impl RequestContext {
    /// Whether the caller holds any of the listed scopes. An empty
    /// requirement list always passes.
    pub fn has_any_scope(&self, required: &[String]) -> bool {
        required.is_empty() || required.iter().any(|s| self.scopes.contains(s))
    }
}

#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or_else(|| ApiError::Internal("request context missing".into()))
    }
}

/// Strip the port from a Host header value.
fn bare_host(host: &str) -> &str {
    match host.find(':') {
        Some(i) if i > 0 => &host[..i],
        _ => host,
    }
}

/// Hosts that alias to `localhost` in local/docker setups.
fn localhost_synonym(host: &str) -> bool {
    matches!(
        host,
        "127.0.0.1" | "host.docker.internal" | "manifest" | "connector" | "policy" | "admin-api"
    )
}

/// Resolve the tenant for a request host, trying the synonym fallback.
async fn resolve_tenant(state: &AppState, host: &str) -> Option<Tenant> {
    if let Some(tenant) = state.tenants.resolve_by_host(host).await {
        return Some(tenant);
    }
    if localhost_synonym(host) {
        return state.tenants.resolve_by_host("localhost").await;
    }
    None
}

/// Middleware resolving the tenant and assembling the request context.
///
/// Health probes pass through without tenant context so they remain
/// reachable before any tenant is configured.
pub async fn tenant_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if request.uri().path() == "/healthz" {
        return next.run(request).await;
    }

    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(bare_host)
        .unwrap_or_default()
        .to_string();

    let Some(tenant) = resolve_tenant(&state, &host).await else {
        tracing::debug!(host, "no tenant for host");
        return ApiError::NotFound("unknown tenant".to_string()).into_response();
    };

    let claims = request
        .extensions()
        .get::<AuthClaims>()
        .cloned()
        .unwrap_or_default();
    let context = RequestContext {
        tenant,
        request_id: Uuid::new_v4().to_string(),
        subject: claims.subject,
        scopes: claims.scopes,
        grant_type: claims.grant_type,
    };
    request.extensions_mut().insert(context);
    next.run(request).await
}
