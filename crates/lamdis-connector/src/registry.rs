//! # Operation Registry
//!
//! Per-tenant cache of enabled connector operations, joined across
//! `connector_operations`, `connector_definitions`, and enabled
//! `tenant_connectors` rows. Entries live for 30 seconds and are refreshed
//! only on expiry; an empty result is cached like any other (no negative
//! caching special case).
//!
//! The cache map is guarded by a `parking_lot::RwLock`. The lock is taken
//! only around map reads/writes and is never held across an `.await` —
//! a cache miss fetches with no lock held and then takes the write lock
//! just to store the fresh slice.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sqlx::PgPool;
use uuid::Uuid;

/// Cache TTL for per-tenant operation sets.
const CACHE_TTL: Duration = Duration::from_secs(30);

/// An enabled connector operation as the orchestrator and discovery
/// surfaces consume it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// HTTP method of the upstream operation.
    pub method: String,
    /// Upstream path; may contain `{name}` placeholders.
    pub path: String,
    /// Human-readable summary.
    pub summary: String,
    /// Any-of scope list required to invoke the operation.
    pub scopes: Vec<String>,
    /// Parameter schema fragments for agent-facing discovery.
    pub params: Vec<Value>,
    /// Request template (`headers` / `query` / `body` / `path_params`).
    pub request_template: Value,
    /// Upstream base URL from the owning connector definition.
    pub base_url: Option<String>,
    /// Reference into `tenant_auth_configs` for upstream auth injection.
    pub auth_ref: Option<String>,
    /// Connector kind (namespace source).
    pub kind: Option<String>,
    /// Connector title (secondary namespace source).
    pub title: Option<String>,
}

#[derive(Clone)]
struct CachedEntry {
    loaded_at: Instant,
    operations: Arc<Vec<Operation>>,
}

/// The per-tenant operation registry.
pub struct OperationRegistry {
    pool: Option<PgPool>,
    /// Fixed operation set overriding all lookups (embedding and tests).
    fixed: Option<Arc<Vec<Operation>>>,
    cache: RwLock<HashMap<Uuid, CachedEntry>>,
    ttl: Duration,
}

impl OperationRegistry {
    /// Create a registry over an optional pool. Without a pool the registry
    /// serves a fixed synthetic set so discovery and manifest assembly work
    /// end-to-end in dev.
    pub fn new(pool: Option<PgPool>) -> Self {
        Self {
            pool,
            fixed: None,
            cache: RwLock::new(HashMap::new()),
            ttl: CACHE_TTL,
        }
    }

    /// Create a registry serving a fixed operation set for every tenant.
    pub fn fixed(operations: Vec<Operation>) -> Self {
        Self {
            pool: None,
            fixed: Some(Arc::new(operations)),
            cache: RwLock::new(HashMap::new()),
            ttl: CACHE_TTL,
        }
    }

    /// Load the enabled operations for a tenant, serving from the cache
    /// when the entry is fresh.
    pub async fn load_operations(
        &self,
        tenant_id: Uuid,
    ) -> Result<Arc<Vec<Operation>>, sqlx::Error> {
        if let Some(fixed) = &self.fixed {
            return Ok(Arc::clone(fixed));
        }

        {
            let cache = self.cache.read();
            if let Some(entry) = cache.get(&tenant_id) {
                if entry.loaded_at.elapsed() < self.ttl {
                    return Ok(Arc::clone(&entry.operations));
                }
            }
        }

        // Fetch with no lock held; the write lock wraps only the map insert.
        let operations = Arc::new(match &self.pool {
            Some(pool) => fetch_operations(pool, tenant_id).await?,
            None => dev_operations(),
        });
        self.cache.write().insert(
            tenant_id,
            CachedEntry {
                loaded_at: Instant::now(),
                operations: Arc::clone(&operations),
            },
        );
        Ok(operations)
    }
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("db", &self.pool.is_some())
            .field("fixed", &self.fixed.as_ref().map(|ops| ops.len()))
            .field("cached_tenants", &self.cache.read().len())
            .finish()
    }
}

/// Synthetic operations served when no database is configured.
fn dev_operations() -> Vec<Operation> {
    let sample = |method: &str, path: &str, summary: &str, scope: &str| Operation {
        method: method.to_string(),
        path: path.to_string(),
        summary: summary.to_string(),
        scopes: vec![scope.to_string()],
        params: vec![],
        request_template: json!({}),
        base_url: None,
        auth_ref: None,
        kind: Some("sample".to_string()),
        title: None,
    };
    vec![
        sample("GET", "/v1/dev/ping", "Ping test endpoint", "dev:read"),
        sample("POST", "/v1/dev/echo", "Echo posted payload", "dev:write"),
        sample(
            "GET",
            "/v1/dev/orders/{id}",
            "Fetch mock order by id",
            "order:read",
        ),
    ]
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct OperationRow {
    method: String,
    path: String,
    summary: String,
    scopes: Vec<String>,
    params: Value,
    request_template: Value,
    base_url: Option<String>,
    auth_ref: Option<String>,
    kind: Option<String>,
    title: Option<String>,
}

async fn fetch_operations(pool: &PgPool, tenant_id: Uuid) -> Result<Vec<Operation>, sqlx::Error> {
    let rows = sqlx::query_as::<_, OperationRow>(
        "WITH s AS (
            SELECT set_config('app.tenant_id', $1, true)
        ) SELECT o.method, o.path,
                 COALESCE(o.summary, '') AS summary,
                 COALESCE(o.scopes, ARRAY[]::text[]) AS scopes,
                 COALESCE(o.params, '[]'::jsonb) AS params,
                 COALESCE(o.request_tmpl, '{}'::jsonb) AS request_template,
                 d.base_url,
                 d.auth_ref::text AS auth_ref,
                 d.kind,
                 d.title
          FROM connector_operations o
          JOIN connector_definitions d ON o.connector_id = d.id
          JOIN tenant_connectors tc
            ON tc.connector_id = d.id::text
           AND tc.tenant_id = $1::uuid
           AND COALESCE(tc.enabled, false) = true
          WHERE d.tenant_id = $1::uuid
            AND COALESCE(o.enabled, true) = true",
    )
    .bind(tenant_id.to_string())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| Operation {
            method: r.method,
            path: r.path,
            summary: r.summary,
            scopes: r.scopes,
            params: match r.params {
                Value::Array(items) => items,
                _ => Vec::new(),
            },
            request_template: r.request_template,
            base_url: r.base_url,
            auth_ref: r.auth_ref,
            kind: r.kind,
            title: r.title,
        })
        .collect())
}
