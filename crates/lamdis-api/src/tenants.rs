//! # Tenant Providers
//!
//! Host → tenant resolution. With a database, tenants come from the
//! `tenants` table; without one, an in-memory provider is seeded from
//! `TENANT_SEED_JSON` or falls back to a single `localhost` dev tenant.

use std::collections::HashMap;
use std::sync::Arc;

use lamdis_core::Tenant;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::GatewayConfig;

/// Fixed id for the implicit dev tenant.
const DEV_TENANT_ID: &str = "00000000-0000-0000-0000-000000000001";

/// One entry of `TENANT_SEED_JSON`.
#[derive(Debug, Deserialize)]
struct SeedEntry {
    id: Uuid,
    slug: String,
    host: String,
    #[serde(default)]
    oauth_issuer: String,
    #[serde(default)]
    jwks_url: String,
    #[serde(default)]
    base_public_url: String,
}

/// A tenant source: Postgres-backed or in-memory.
#[derive(Debug, Clone)]
pub enum TenantProvider {
    /// In-memory map keyed by bare host (port already stripped).
    Memory(Arc<HashMap<String, Tenant>>),
    /// `tenants` table lookups.
    Postgres(PgPool),
}

impl TenantProvider {
    /// Build the in-memory provider from configuration.
    ///
    /// With `TENANT_SEED_JSON` set, the seed entries are used verbatim.
    /// Otherwise a single dev tenant is registered under `localhost` (the
    /// middleware maps common local synonyms onto it).
    pub fn memory_from_config(config: &GatewayConfig) -> Self {
        let mut by_host = HashMap::new();
        if let Some(seed) = &config.tenant_seed_json {
            match serde_json::from_str::<Vec<SeedEntry>>(seed) {
                Ok(entries) => {
                    for entry in entries {
                        by_host.insert(
                            entry.host.clone(),
                            Tenant {
                                id: entry.id,
                                slug: entry.slug,
                                host: entry.host,
                                oauth_issuer: entry.oauth_issuer,
                                jwks_url: entry.jwks_url,
                                base_public_url: entry.base_public_url,
                                accepted_audiences: vec![],
                                machine_allowed_scopes: vec![],
                                required_acr_by_scope: HashMap::new(),
                                dpop_required: false,
                            },
                        );
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "TENANT_SEED_JSON did not parse; ignoring seed");
                }
            }
        }
        if by_host.is_empty() {
            let dev = Tenant {
                id: DEV_TENANT_ID.parse().unwrap_or_default(),
                slug: "dev".to_string(),
                host: "localhost".to_string(),
                oauth_issuer: config.oidc_issuer.clone(),
                jwks_url: config.jwks_url.clone(),
                base_public_url: config.base_public_url.clone(),
                accepted_audiences: vec![],
                machine_allowed_scopes: vec![],
                required_acr_by_scope: HashMap::new(),
                dpop_required: false,
            };
            by_host.insert("localhost".to_string(), dev);
        }
        Self::Memory(Arc::new(by_host))
    }

    /// Resolve a tenant by its bare host.
    pub async fn resolve_by_host(&self, host: &str) -> Option<Tenant> {
        match self {
            Self::Memory(by_host) => by_host.get(host).cloned(),
            Self::Postgres(pool) => match fetch_by_host(pool, host).await {
                Ok(tenant) => tenant,
                Err(err) => {
                    tracing::error!(host, error = %err, "tenant lookup failed");
                    None
                }
            },
        }
    }
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct TenantRow {
    id: Uuid,
    slug: String,
    host: String,
    oauth_issuer: String,
    jwks_url: String,
    base_public_url: String,
    accepted_audiences: Vec<String>,
    machine_allowed_scopes: Vec<String>,
    required_acr_by_action: serde_json::Value,
    dpop_required: bool,
}

async fn fetch_by_host(pool: &PgPool, host: &str) -> Result<Option<Tenant>, sqlx::Error> {
    let row = sqlx::query_as::<_, TenantRow>(
        "SELECT id,
                COALESCE(slug, '') AS slug,
                COALESCE(host, '') AS host,
                COALESCE(oauth_issuer, '') AS oauth_issuer,
                COALESCE(jwks_url, '') AS jwks_url,
                COALESCE(base_public_url, '') AS base_public_url,
                COALESCE(accepted_audiences, ARRAY[]::text[]) AS accepted_audiences,
                COALESCE(machine_allowed_scopes, ARRAY[]::text[]) AS machine_allowed_scopes,
                COALESCE(required_acr_by_action, '{}'::jsonb) AS required_acr_by_action,
                COALESCE(dpop_required, false) AS dpop_required
         FROM tenants WHERE host = $1",
    )
    .bind(host)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| Tenant {
        id: r.id,
        slug: r.slug,
        host: r.host,
        oauth_issuer: r.oauth_issuer,
        jwks_url: r.jwks_url,
        base_public_url: r.base_public_url,
        accepted_audiences: r.accepted_audiences,
        machine_allowed_scopes: r.machine_allowed_scopes,
        required_acr_by_scope: serde_json::from_value(r.required_acr_by_action)
            .unwrap_or_default(),
        dpop_required: r.dpop_required,
    }))
}
