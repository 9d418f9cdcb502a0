//! # Manifest Assembly
//!
//! `.well-known/ai-actions` is a thin projection of the enabled operations:
//! each dynamic operation becomes a two-phase action whose key is
//! `<namespace>.<short>` (namespace from the connector kind, short from the
//! operation path tail).

use lamdis_connector::Operation;
use lamdis_core::{short_name, slugify, ProblemKind, Tenant};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use utoipa::ToSchema;

use crate::config::GatewayConfig;

/// Manifest schema version.
const MANIFEST_VERSION: &str = "1";

/// OAuth discovery block.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OAuthBlock {
    /// Authorization endpoint.
    pub authorization_url: String,
    /// Token endpoint.
    pub token_url: String,
    /// Scopes the gateway requests.
    pub scopes: Vec<String>,
}

/// One action advertised to agents.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ManifestAction {
    /// Upstream operation path.
    pub path: String,
    /// Upstream operation method.
    pub method: String,
    /// Primary scope (first of the operation's any-of list).
    pub scope: String,
    /// Operation summary.
    pub summary: String,
    /// Display title (mirrors the summary).
    pub title: String,
    /// Parameter schema fragments.
    #[schema(value_type = Vec<Object>)]
    pub params: Vec<Value>,
    /// Every dynamic operation requires the two-phase flow.
    pub requires_preflight: bool,
    /// Two-phase flow description.
    #[schema(value_type = Object)]
    pub flow: Value,
    /// Stable action key `<ns>.<short>`.
    pub key: String,
    /// Display name.
    pub display_name: String,
    /// Preflight endpoint template.
    pub preflight_endpoint: String,
    /// Execute endpoint template.
    pub execute_endpoint: String,
    /// Execution always requires a decision id.
    pub execution_requires_decision: bool,
    /// Inputs schema (empty object until connector schemas are imported).
    #[schema(value_type = Object)]
    pub inputs_schema: Value,
    /// The needs contract is always supported.
    pub needs_contract: bool,
    /// Alternatives the gateway can offer on BLOCKED.
    pub alternatives_supported: Vec<String>,
    /// Problem type URLs by logical name.
    pub problem_types: HashMap<String, String>,
}

/// The `.well-known/ai-actions` document.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Manifest {
    /// Manifest schema version (currently `"1"`).
    pub version: String,
    /// Public base URL actions are served under.
    pub base_url: String,
    /// OAuth discovery block.
    pub oauth: OAuthBlock,
    /// Tenant namespace (slug).
    pub namespace: String,
    /// Advertised actions.
    pub actions: Vec<ManifestAction>,
}

/// Build the per-tenant manifest from the enabled operations.
pub fn build_manifest(
    config: &GatewayConfig,
    tenant: &Tenant,
    operations: &[Operation],
) -> Manifest {
    let base_url = if tenant.base_public_url.is_empty() {
        config.base_public_url.clone()
    } else {
        tenant.base_public_url.clone()
    };
    let issuer = &tenant.oauth_issuer;
    let tenant_namespace = tenant.namespace();

    let actions = operations
        .iter()
        .map(|op| {
            let short = short_name(&op.path);
            // Prefer the connector kind as the namespace so actions from
            // different connectors stay distinguishable.
            let namespace = op
                .kind
                .as_deref()
                .map(slugify)
                .filter(|slug| !slug.is_empty())
                .unwrap_or_else(|| tenant_namespace.clone());
            let key = format!("{namespace}.{short}");
            ManifestAction {
                path: op.path.clone(),
                method: op.method.clone(),
                scope: op.scopes.first().cloned().unwrap_or_default(),
                summary: op.summary.clone(),
                title: op.summary.clone(),
                params: op.params.clone(),
                requires_preflight: true,
                flow: json!({
                    "preflight": {"method": "POST", "path": "/v1/actions/{key}/preflight"},
                    "execute": {
                        "method": "POST",
                        "path": "/v1/actions/{key}/execute",
                        "binds": ["decision_id"],
                    },
                    "needs_input": true,
                    "alternatives": true,
                    "consent": true,
                }),
                key,
                display_name: op.summary.clone(),
                preflight_endpoint: "/v1/actions/{key}/preflight".to_string(),
                execute_endpoint: "/v1/actions/{key}/execute".to_string(),
                execution_requires_decision: true,
                inputs_schema: json!({}),
                needs_contract: true,
                alternatives_supported: vec![
                    "create_checkout_link".to_string(),
                    "open_support_case".to_string(),
                ],
                problem_types: HashMap::from([
                    (
                        "preflight_required".to_string(),
                        ProblemKind::PreflightRequired.type_url(),
                    ),
                    (
                        "policy_violation".to_string(),
                        ProblemKind::PolicyViolation.type_url(),
                    ),
                ]),
            }
        })
        .collect();

    Manifest {
        version: MANIFEST_VERSION.to_string(),
        base_url,
        oauth: OAuthBlock {
            authorization_url: format!("{issuer}/authorize"),
            token_url: format!("{issuer}/token"),
            scopes: vec![
                "catalog:read".to_string(),
                "order:write".to_string(),
                "refund:write".to_string(),
            ],
        },
        namespace: tenant_namespace,
        actions,
    }
}
