//! # Tenant Model
//!
//! A tenant is the isolation boundary: every other row is scoped by tenant
//! id and the core refuses cross-tenant reads. Tenants are created and
//! updated by the admin surface; the core only reads them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// A logical customer / account space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    /// Stable identifier; scopes every other row.
    pub id: Uuid,
    /// Short name used as the default manifest namespace (e.g., `acme`).
    pub slug: String,
    /// Primary host this tenant is served on (e.g., `ai.acme.com`).
    pub host: String,
    /// OAuth issuer for this tenant's tokens.
    #[serde(default)]
    pub oauth_issuer: String,
    /// JWKS endpoint, when it differs from issuer discovery.
    #[serde(default)]
    pub jwks_url: String,
    /// Public base URL actions are served under (overrides the global default).
    #[serde(default)]
    pub base_public_url: String,
    /// Audiences accepted on inbound tokens (empty → global default).
    #[serde(default)]
    pub accepted_audiences: Vec<String>,
    /// Scopes permitted when the grant type is `client_credentials`.
    #[serde(default)]
    pub machine_allowed_scopes: Vec<String>,
    /// Required ACR value per scope (or action id).
    #[serde(default)]
    pub required_acr_by_scope: HashMap<String, String>,
    /// Whether DPoP proof-of-possession is required for this tenant.
    #[serde(default)]
    pub dpop_required: bool,
}

impl Tenant {
    /// The manifest namespace: the slug, falling back to the id for the
    /// rare tenant created without one.
    pub fn namespace(&self) -> String {
        if self.slug.is_empty() {
            self.id.to_string()
        } else {
            self.slug.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_prefers_slug() {
        let t = Tenant {
            id: Uuid::nil(),
            slug: "acme".to_string(),
            host: "ai.acme.com".to_string(),
            oauth_issuer: String::new(),
            jwks_url: String::new(),
            base_public_url: String::new(),
            accepted_audiences: vec![],
            machine_allowed_scopes: vec![],
            required_acr_by_scope: HashMap::new(),
            dpop_required: false,
        };
        assert_eq!(t.namespace(), "acme");
    }

    #[test]
    fn namespace_falls_back_to_id() {
        let t = Tenant {
            id: Uuid::nil(),
            slug: String::new(),
            host: "localhost".to_string(),
            oauth_issuer: String::new(),
            jwks_url: String::new(),
            base_public_url: String::new(),
            accepted_audiences: vec![],
            machine_allowed_scopes: vec![],
            required_acr_by_scope: HashMap::new(),
            dpop_required: false,
        };
        assert_eq!(t.namespace(), Uuid::nil().to_string());
    }

    #[test]
    fn tenant_deserializes_with_defaults() {
        let t: Tenant = serde_json::from_str(
            r#"{"id":"00000000-0000-0000-0000-000000000001","slug":"dev","host":"localhost"}"#,
        )
        .unwrap();
        assert_eq!(t.slug, "dev");
        assert!(t.accepted_audiences.is_empty());
        assert!(!t.dpop_required);
    }
}
