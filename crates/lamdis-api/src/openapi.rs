//! # OpenAPI Assembly
//!
//! `.well-known/openapi.json` is an OpenAPI 3.1 document derived from the
//! requesting tenant's enabled operations plus the static action-protocol
//! paths. The per-tenant operation set is data, not code, so the document
//! is assembled by hand rather than derived from route annotations.

use lamdis_connector::Operation;
use serde_json::{json, Map, Value};

/// Build the per-tenant OpenAPI document.
pub fn build_openapi(operations: &[Operation]) -> Value {
    let mut paths = Map::new();

    // Static two-phase action protocol.
    insert_operation(
        &mut paths,
        "/v1/actions/{key}/preflight",
        "post",
        json!({
            "summary": "Evaluate policy for an action and mint a decision",
            "parameters": [key_parameter()],
            "responses": {"200": {"description": "Decision or needs"}},
        }),
    );
    insert_operation(
        &mut paths,
        "/v1/actions/{key}/execute",
        "post",
        json!({
            "summary": "Execute an action bound to a prior decision",
            "parameters": [key_parameter()],
            "responses": {
                "200": {"description": "Structured execution result"},
                "409": {"description": "Binding failure (problem document)"},
            },
        }),
    );

    // Dynamic connector operations.
    for op in operations {
        let mut doc = Map::new();
        doc.insert("summary".to_string(), json!(op.summary));
        doc.insert(
            "responses".to_string(),
            json!({"200": {"description": "OK"}}),
        );
        if !op.scopes.is_empty() {
            doc.insert("x-required-scopes".to_string(), json!(op.scopes));
        }
        insert_operation(
            &mut paths,
            &op.path,
            &op.method.to_ascii_lowercase(),
            Value::Object(doc),
        );
    }

    json!({
        "openapi": "3.1.0",
        "info": {"title": "lamdis-gateway", "version": "v1"},
        "paths": paths,
        "components": {
            "securitySchemes": {
                "oauth": {
                    "type": "oauth2",
                    "flows": {
                        "clientCredentials": {
                            "tokenUrl": "/oauth/token",
                            "scopes": {
                                "order:write": "Create orders / checkouts",
                                "refund:write": "Issue refunds",
                            },
                        },
                    },
                },
            },
        },
        "security": [{"oauth": []}],
    })
}

fn key_parameter() -> Value {
    json!({
        "name": "key",
        "in": "path",
        "required": true,
        "schema": {"type": "string"},
        "description": "Action key (<namespace>.<short>)",
    })
}

fn insert_operation(paths: &mut Map<String, Value>, path: &str, method: &str, doc: Value) {
    let entry = paths
        .entry(path.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(by_method) = entry {
        by_method.insert(method.to_string(), doc);
    }
}
