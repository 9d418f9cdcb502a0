//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers via
//! the `State` extractor. Everything is behind `Arc` (directly or inside
//! the engines) so cloning per-request is cheap.
//!
//! All engines take the same optional pool: when `DATABASE_URL` is absent
//! the whole pipeline runs in dev mode (in-memory tenants, synthetic
//! operations, inputs-as-facts, default-allow decisions, fixed decision
//! id) so the two-phase protocol is exercisable end-to-end.

use std::sync::Arc;

use lamdis_connector::{OperationRegistry, Orchestrator, UpstreamClient};
use lamdis_facts::FactsEngine;
use lamdis_policy::{DecisionStore, PolicyEngine};
use sqlx::PgPool;

use crate::config::GatewayConfig;
use crate::tenants::TenantProvider;

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Gateway configuration.
    pub config: Arc<GatewayConfig>,
    /// Host → tenant resolution.
    pub tenants: TenantProvider,
    /// Facts engine.
    pub facts: FactsEngine,
    /// Policy engine.
    pub policy: PolicyEngine,
    /// Decision store.
    pub decisions: DecisionStore,
    /// Per-tenant operation registry.
    pub registry: Arc<OperationRegistry>,
    /// Upstream orchestrator.
    pub orchestrator: Arc<Orchestrator>,
    /// Upstream client for the passthrough surface.
    pub upstream: UpstreamClient,
    /// Raw pool for auxiliary writes (usage events).
    pub pool: Option<PgPool>,
}

impl AppState {
    /// Assemble the application state from configuration and an optional
    /// database pool.
    ///
    /// # Errors
    ///
    /// Fails only when the upstream HTTP client cannot be constructed.
    pub fn new(config: GatewayConfig, pool: Option<PgPool>) -> Result<Self, reqwest::Error> {
        let tenants = match &pool {
            Some(db) => TenantProvider::Postgres(db.clone()),
            None => TenantProvider::memory_from_config(&config),
        };
        let registry = Arc::new(OperationRegistry::new(pool.clone()));
        let orchestrator = Arc::new(Orchestrator::new(
            pool.clone(),
            Arc::clone(&registry),
            config.encryption_key.clone(),
        )?);
        Ok(Self {
            tenants,
            facts: FactsEngine::new(pool.clone()),
            policy: PolicyEngine::new(pool.clone()),
            decisions: DecisionStore::new(pool.clone()),
            registry,
            orchestrator,
            upstream: UpstreamClient::new()?,
            pool,
            config: Arc::new(config),
        })
    }

    /// Dev-mode state used by tests and local runs without a database.
    pub fn dev(config: GatewayConfig) -> Result<Self, reqwest::Error> {
        Self::new(config, None)
    }
}
