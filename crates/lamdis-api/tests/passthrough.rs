//! Tests of the passthrough surface in dev mode: operation matching,
//! scope enforcement, the echo fallback, and the 2 MiB body ceiling that
//! distinguishes passthrough from canonical routes.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use lamdis_api::config::GatewayConfig;
use lamdis_api::context::AuthClaims;
use lamdis_api::state::AppState;
use serde_json::{json, Value};
use tower::ServiceExt;

fn dev_app() -> axum::Router {
    lamdis_api::app(AppState::dev(GatewayConfig::default()).unwrap())
}

fn claims(scopes: &[&str]) -> AuthClaims {
    AuthClaims {
        subject: "agent-1".to_string(),
        scopes: scopes.iter().map(|s| s.to_string()).collect(),
        grant_type: None,
    }
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

#[tokio::test]
async fn matched_operation_echoes_without_upstream() {
    let response = dev_app()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/v1/dev/ping")
                .header("Host", "localhost")
                .extension(claims(&["dev:read"]))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["ok"], true);
    assert_eq!(body["operation"]["path"], "/v1/dev/ping");
}

#[tokio::test]
async fn missing_scope_is_forbidden() {
    let response = dev_app()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/v1/dev/ping")
                .header("Host", "localhost")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = response_json(response).await;
    assert_eq!(body["error"], "insufficient_scope");
}

#[tokio::test]
async fn echo_operation_returns_received_payload() {
    let response = dev_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/dev/echo")
                .header("Host", "localhost")
                .header(header::CONTENT_TYPE, "application/json")
                .extension(claims(&["dev:write"]))
                .body(Body::from(json!({"note": "hello"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["received"]["note"], "hello");
}

#[tokio::test]
async fn param_segments_match_concrete_paths() {
    let response = dev_app()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/v1/dev/orders/o-123")
                .header("Host", "localhost")
                .extension(claims(&["order:read"]))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["operation"]["path"], "/v1/dev/orders/{id}");
}

#[tokio::test]
async fn unmatched_paths_are_404() {
    let response = dev_app()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/v1/nothing/here")
                .header("Host", "localhost")
                .extension(claims(&["dev:read"]))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn method_mismatch_is_404() {
    // /v1/dev/ping exists as GET only.
    let response = dev_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/dev/ping")
                .header("Host", "localhost")
                .extension(claims(&["dev:read"]))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn passthrough_accepts_bodies_above_the_canonical_cap() {
    // 1.5 MiB is over the 1 MiB canonical ceiling but within the 2 MiB
    // passthrough ceiling: the fallback must accept it.
    let body = "a".repeat(3 << 19);
    let response = dev_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/dev/echo")
                .header("Host", "localhost")
                .extension(claims(&["dev:write"]))
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn passthrough_body_over_two_mib_is_rejected() {
    let body = "a".repeat((2 << 20) + 1);
    let response = dev_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/dev/echo")
                .header("Host", "localhost")
                .extension(claims(&["dev:write"]))
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn passthrough_needs_a_known_tenant() {
    let response = dev_app()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/v1/dev/ping")
                .header("Host", "nobody.example")
                .extension(claims(&["dev:read"]))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
