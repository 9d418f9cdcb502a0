//! Upstream dispatch and orchestrator integration tests against a mock
//! upstream server.

use std::sync::Arc;

use lamdis_connector::{
    Operation, OperationRegistry, Orchestrator, ExecutionStatus, UpstreamClient,
};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn shop_operation(base_url: &str, op_method: &str, op_path: &str) -> Operation {
    Operation {
        method: op_method.to_string(),
        path: op_path.to_string(),
        summary: "Test operation".to_string(),
        scopes: vec!["orders:read".to_string()],
        params: vec![],
        request_template: json!({}),
        base_url: Some(base_url.to_string()),
        auth_ref: None,
        kind: Some("shop".to_string()),
        title: None,
    }
}

#[tokio::test]
async fn dispatch_parses_json_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"orders": [1, 2]})))
        .mount(&server)
        .await;

    let client = UpstreamClient::new().unwrap();
    let outcome = client
        .dispatch("GET", &format!("{}/v1/orders", server.uri()), &[], None)
        .await;

    assert_eq!(outcome.status, Some(200));
    assert_eq!(outcome.body.unwrap()["orders"], json!([1, 2]));
    assert!(outcome.error.is_none());
}

#[tokio::test]
async fn dispatch_surfaces_non_2xx_status_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "not found"})))
        .mount(&server)
        .await;

    let client = UpstreamClient::new().unwrap();
    let outcome = client
        .dispatch("GET", &format!("{}/v1/missing", server.uri()), &[], None)
        .await;

    assert_eq!(outcome.status, Some(404));
    assert_eq!(outcome.body.unwrap()["error"], "not found");
}

#[tokio::test]
async fn dispatch_sends_body_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/echo"))
        .and(header("x-api-key", "secret-key"))
        .and(body_json(json!({"note": "hello"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let client = UpstreamClient::new().unwrap();
    let outcome = client
        .dispatch(
            "POST",
            &format!("{}/v1/echo", server.uri()),
            &[("x-api-key".to_string(), "secret-key".to_string())],
            Some(&json!({"note": "hello"})),
        )
        .await;

    assert_eq!(outcome.status, Some(201));
    assert_eq!(outcome.body.unwrap()["ok"], true);
}

#[tokio::test]
async fn dispatch_transport_error_is_annotated() {
    // Nothing listens on this port.
    let client = UpstreamClient::new().unwrap();
    let outcome = client
        .dispatch("GET", "http://127.0.0.1:1/v1/ping", &[], None)
        .await;

    assert!(outcome.status.is_none());
    assert!(outcome.error.is_some());
}

#[tokio::test]
async fn dispatch_non_json_body_yields_no_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .mount(&server)
        .await;

    let client = UpstreamClient::new().unwrap();
    let outcome = client
        .dispatch("GET", &format!("{}/v1/html", server.uri()), &[], None)
        .await;

    assert_eq!(outcome.status, Some(200));
    assert!(outcome.body.is_none());
    assert!(outcome.error.is_none());
}

#[tokio::test]
async fn orchestrator_executes_resolved_operation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"orders": []})))
        .mount(&server)
        .await;

    let registry = Arc::new(OperationRegistry::fixed(vec![shop_operation(
        &server.uri(),
        "GET",
        "/v1/orders",
    )]));
    let orchestrator = Orchestrator::new(None, registry, None).unwrap();

    let result = orchestrator
        .execute(Uuid::new_v4(), "shop.orders", "decision-1", &json!({}))
        .await;

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert_eq!(result.steps.len(), 1);
    assert_eq!(result.steps[0].status, Some(200));
    assert_eq!(result.steps[0].method.as_deref(), Some("GET"));
    assert_eq!(result.result.unwrap()["orders"], json!([]));
    assert!(result.problems.is_empty());
}

#[tokio::test]
async fn orchestrator_renders_template_into_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/orders/o-7/refund"))
        .and(query_param("notify", "true"))
        .and(header("x-order", "o-7"))
        .and(body_json(json!({"reason": "damaged item"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"refunded": true})))
        .mount(&server)
        .await;

    let mut operation = shop_operation(&server.uri(), "POST", "/v1/orders/{id}/refund");
    operation.request_template = json!({
        "headers": {"x-order": "{{ order_id }}"},
        "query": {"notify": "true"},
        "body": {"reason": "{{ reason }}"},
        "path_params": {"id": "{{ order_id }}"}
    });
    let registry = Arc::new(OperationRegistry::fixed(vec![operation]));
    let orchestrator = Orchestrator::new(None, registry, None).unwrap();

    let result = orchestrator
        .execute(
            Uuid::new_v4(),
            "shop.refund",
            "decision-2",
            &json!({"order_id": "o-7", "reason": "damaged item"}),
        )
        .await;

    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert_eq!(result.result.unwrap()["refunded"], true);
}

#[tokio::test]
async fn orchestrator_reports_no_operation() {
    let registry = Arc::new(OperationRegistry::fixed(vec![]));
    let orchestrator = Orchestrator::new(None, registry, None).unwrap();

    let result = orchestrator
        .execute(Uuid::new_v4(), "ghost.action", "decision-3", &json!({}))
        .await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(result.problems[0].type_url.ends_with("/no-operation"));
}

#[tokio::test]
async fn orchestrator_reports_unresolved_path_params() {
    let operation = shop_operation("http://127.0.0.1:1", "GET", "/v1/orders/{id}");
    let registry = Arc::new(OperationRegistry::fixed(vec![operation]));
    let orchestrator = Orchestrator::new(None, registry, None).unwrap();

    // No path_params mapping for {id}.
    let result = orchestrator
        .execute(Uuid::new_v4(), "shop.orders", "decision-4", &json!({}))
        .await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(
        result.steps[0].error.as_deref(),
        Some("unresolved_path_params")
    );
    assert!(result.problems[0]
        .type_url
        .ends_with("/unresolved-path-params"));
}

#[tokio::test]
async fn orchestrator_transport_error_annotates_step() {
    let operation = shop_operation("http://127.0.0.1:1", "GET", "/v1/orders");
    let registry = Arc::new(OperationRegistry::fixed(vec![operation]));
    let orchestrator = Orchestrator::new(None, registry, None).unwrap();

    let result = orchestrator
        .execute(Uuid::new_v4(), "shop.orders", "decision-5", &json!({}))
        .await;

    // The call itself completed with a structured outcome; only the step
    // carries the transport error.
    assert_eq!(result.status, ExecutionStatus::Succeeded);
    assert!(result.steps[0].error.is_some());
    assert!(result.result.is_none());
}

#[tokio::test]
async fn forward_relays_raw_bytes_and_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/echo"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"note": "hi"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let client = UpstreamClient::new().unwrap();
    let payload = serde_json::to_vec(&json!({"note": "hi"})).unwrap();
    let outcome = client
        .forward(
            "POST",
            &format!("{}/v1/echo", server.uri()),
            &[("content-type".to_string(), "application/json".to_string())],
            Some(&payload),
        )
        .await;

    assert_eq!(outcome.status, Some(200));
    assert_eq!(outcome.upstream.unwrap()["ok"], true);
    assert!(outcome.error.is_none());
}

#[tokio::test]
async fn forward_preserves_non_json_bodies_as_text() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>hello</html>"))
        .mount(&server)
        .await;

    let client = UpstreamClient::new().unwrap();
    let outcome = client
        .forward("GET", &format!("{}/v1/page", server.uri()), &[], None)
        .await;

    assert_eq!(outcome.status, Some(200));
    assert_eq!(outcome.upstream, Some(json!("<html>hello</html>")));
}

#[tokio::test]
async fn forward_transport_error_is_annotated() {
    let client = UpstreamClient::new().unwrap();
    let outcome = client
        .forward("GET", "http://127.0.0.1:1/v1/ping", &[], None)
        .await;
    assert!(outcome.status.is_none());
    assert!(outcome.error.is_some());
}

#[tokio::test]
async fn upstream_auth_header_reaches_the_wire() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/orders"))
        .and(header("authorization", "Bearer static-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let mut operation = shop_operation(&server.uri(), "GET", "/v1/orders");
    operation.request_template = json!({
        "headers": {"authorization": "Bearer static-token"}
    });
    let registry = Arc::new(OperationRegistry::fixed(vec![operation]));
    let orchestrator = Orchestrator::new(None, registry, None).unwrap();

    let result = orchestrator
        .execute(Uuid::new_v4(), "shop.orders", "decision-6", &json!({}))
        .await;
    assert_eq!(result.steps[0].status, Some(200));
}
