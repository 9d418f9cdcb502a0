//! # lamdis-api — HTTP Surface of the Lamdis Action Gateway
//!
//! Wires the engines into the public HTTP surface:
//!
//! | Route | Handler |
//! |---|---|
//! | `GET /healthz` | liveness probe (no tenant context) |
//! | `GET /.well-known/ai-actions` | per-tenant action manifest |
//! | `GET /.well-known/openapi.json` | per-tenant OpenAPI 3.1 |
//! | `POST /v1/actions/:key/preflight` | facts → policy → decision |
//! | `POST /v1/actions/:key/execute` | bind → orchestrate → record |
//! | anything else | passthrough over the tenant's enabled operations |
//!
//! ## Middleware stack (outermost → innermost)
//!
//! ```text
//! TraceLayer → tenant middleware → DefaultBodyLimit → Handler
//! ```
//!
//! Two body ceilings apply: the canonical action-protocol and discovery
//! routes cap at 1 MiB, the passthrough fallback at 2 MiB. Each limit is
//! the innermost `DefaultBodyLimit` on its route, so an oversized body is
//! rejected with the extractor's own status before any handler logic runs.

pub mod config;
pub mod context;
pub mod error;
pub mod manifest;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod tenants;
pub mod usage;

use axum::extract::DefaultBodyLimit;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Request body cap for canonical operations (1 MiB).
const CANONICAL_MAX_BODY_BYTES: usize = 1 << 20;

/// Request body cap for passthrough operations (2 MiB).
const PASSTHROUGH_MAX_BODY_BYTES: usize = 2 << 20;

/// Assemble the application router.
pub fn app(state: AppState) -> Router {
    // Unmatched requests fall through to the passthrough surface, which
    // serves the tenant's enabled connector operations directly (scope
    // check only, no decision binding) with its own body ceiling.
    let passthrough = Router::new()
        .fallback(routes::passthrough::dispatch)
        .layer(DefaultBodyLimit::max(PASSTHROUGH_MAX_BODY_BYTES))
        .with_state(state.clone());

    Router::new()
        .route("/healthz", get(routes::discovery::healthz))
        .route("/.well-known/ai-actions", get(routes::discovery::ai_actions))
        .route(
            "/.well-known/openapi.json",
            get(routes::discovery::openapi_json),
        )
        .route("/v1/actions/:key/preflight", post(routes::actions::preflight))
        .route("/v1/actions/:key/execute", post(routes::actions::execute))
        .layer(DefaultBodyLimit::max(CANONICAL_MAX_BODY_BYTES))
        .fallback_service(passthrough)
        .layer(from_fn_with_state(state.clone(), context::tenant_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
