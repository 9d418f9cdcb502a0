//! # Facts Engine
//!
//! Loads the enabled resolvers and all mappings for an action inside a
//! tenant-scoped transaction, composes the shared document, and applies the
//! mappings to produce the `facts` object. Resolvers and mappings are read
//! on every preflight/execute — there is no in-process caching, so admin
//! edits take effect immediately.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::path::{eval_path, PathError};
use crate::transforms::{apply_transform, TransformError};

/// A configured fact resolver: a named source of a stubbed upstream
/// response sample, plus the prompts to surface when the policy signals
/// `NEEDS_INPUT`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resolver {
    /// Resolver name; keys the response sample in the composed document.
    pub name: String,
    /// Connector this resolver nominally targets.
    pub connector_key: String,
    /// Request template (kept for admin round-trips; unused at resolve time).
    pub request_template: Value,
    /// The stubbed upstream response used as the mapping source document.
    pub response_sample: Value,
    /// Prompts surfaced on `NEEDS_INPUT`.
    pub needs: Vec<Value>,
}

/// A configured mapping: projects part of the composed document into
/// `facts[fact_key]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mapping {
    /// Mapping name; mappings are applied in alphabetical order by name.
    pub name: String,
    /// Path expression evaluated against the composed document.
    pub path: String,
    /// Destination key in the facts object.
    pub fact_key: String,
    /// Optional transform applied to the evaluated value.
    pub transform: Option<String>,
    /// Arguments for the transform.
    pub transform_args: Vec<Value>,
    /// Whether a path/transform failure fails the whole resolve.
    pub required: bool,
}

/// Errors raised by fact resolution.
#[derive(Debug, Error)]
pub enum FactsError {
    /// A required mapping's path expression failed to evaluate.
    #[error("required mapping {mapping:?} failed: {source}")]
    RequiredPath {
        /// The mapping name.
        mapping: String,
        /// The underlying path error.
        source: PathError,
    },
    /// A required mapping's transform failed.
    #[error("required mapping {mapping:?} transform failed: {source}")]
    RequiredTransform {
        /// The mapping name.
        mapping: String,
        /// The underlying transform error.
        source: TransformError,
    },
    /// Database failure loading resolvers or mappings.
    #[error("facts store error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Compose the shared document mappings evaluate against:
/// `{ inputs, resolvers: { name: response_sample } }`.
pub fn compose_document(inputs: &Value, resolvers: &[Resolver]) -> Value {
    let mut resolver_map = Map::new();
    for r in resolvers {
        resolver_map.insert(r.name.clone(), r.response_sample.clone());
    }
    let mut doc = Map::new();
    doc.insert("inputs".to_string(), inputs.clone());
    doc.insert("resolvers".to_string(), Value::Object(resolver_map));
    Value::Object(doc)
}

/// Apply mappings to the composed document, alphabetically by name.
///
/// Optional mappings that fail to evaluate or transform are skipped;
/// required ones fail the whole resolve with the original error. Among
/// mappings producing the same fact key, the last (alphabetically) wins.
pub fn apply_mappings(doc: &Value, mappings: &[Mapping]) -> Result<Map<String, Value>, FactsError> {
    let mut ordered: Vec<&Mapping> = mappings.iter().collect();
    ordered.sort_by(|a, b| a.name.cmp(&b.name));

    let mut facts = Map::new();
    for mapping in ordered {
        let mut value = match eval_path(&mapping.path, doc) {
            Ok(v) => v,
            Err(err) => {
                if mapping.required {
                    return Err(FactsError::RequiredPath {
                        mapping: mapping.name.clone(),
                        source: err,
                    });
                }
                tracing::debug!(mapping = %mapping.name, error = %err, "skipping optional mapping");
                continue;
            }
        };
        if let Some(transform) = &mapping.transform {
            value = match apply_transform(transform, value, &mapping.transform_args) {
                Ok(v) => v,
                Err(err) => {
                    if mapping.required {
                        return Err(FactsError::RequiredTransform {
                            mapping: mapping.name.clone(),
                            source: err,
                        });
                    }
                    tracing::debug!(mapping = %mapping.name, error = %err, "skipping optional mapping");
                    continue;
                }
            };
        }
        facts.insert(mapping.fact_key.clone(), value);
    }
    Ok(facts)
}

/// The facts engine: tenant-scoped resolver/mapping loading plus the pure
/// composition pipeline above.
#[derive(Debug, Clone)]
pub struct FactsEngine {
    pool: Option<PgPool>,
}

impl FactsEngine {
    /// Create an engine over an optional pool. Without a pool the engine
    /// runs in dev fallback mode: facts are the inputs, verbatim.
    pub fn new(pool: Option<PgPool>) -> Self {
        Self { pool }
    }

    /// Resolve facts for an action.
    ///
    /// # Errors
    ///
    /// Fails on database errors and on required-mapping failures; optional
    /// mapping failures are skipped.
    pub async fn resolve(
        &self,
        tenant_id: Uuid,
        action_key: &str,
        inputs: &Value,
    ) -> Result<Value, FactsError> {
        let Some(pool) = &self.pool else {
            // Dev fallback: surface the inputs as facts so the two-phase
            // protocol works end-to-end without a database.
            return Ok(inputs.clone());
        };

        let mut tx = pool.begin().await?;
        sqlx::query("SELECT set_config('app.tenant_id', $1, true)")
            .bind(tenant_id.to_string())
            .execute(&mut *tx)
            .await?;
        let resolvers = load_resolvers(&mut tx, action_key).await?;
        let mappings = load_mappings(&mut tx, action_key).await?;
        tx.commit().await?;

        let doc = compose_document(inputs, &resolvers);
        let facts = apply_mappings(&doc, &mappings)?;
        Ok(Value::Object(facts))
    }

    /// The union of `needs[]` across enabled resolvers for an action.
    ///
    /// Read only when the policy returns `NEEDS_INPUT`.
    pub async fn needs(
        &self,
        tenant_id: Uuid,
        action_key: &str,
    ) -> Result<Vec<Value>, FactsError> {
        let Some(pool) = &self.pool else {
            return Ok(Vec::new());
        };
        let rows: Vec<Value> = sqlx::query_scalar(
            "WITH s AS (
                SELECT set_config('app.tenant_id', $1, true)
            ) SELECT COALESCE(needs, '[]'::jsonb) FROM fact_resolvers
              WHERE action_key = $2 AND enabled = true",
        )
        .bind(tenant_id.to_string())
        .bind(action_key)
        .fetch_all(pool)
        .await?;

        let mut out = Vec::new();
        for row in rows {
            if let Value::Array(items) = row {
                out.extend(items);
            }
        }
        Ok(out)
    }
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct ResolverRow {
    name: String,
    connector_key: String,
    request_template: Value,
    response_sample: Value,
    needs: Value,
}

async fn load_resolvers(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    action_key: &str,
) -> Result<Vec<Resolver>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ResolverRow>(
        "SELECT name,
                COALESCE(connector_key, '') AS connector_key,
                COALESCE(request_template, '{}'::jsonb) AS request_template,
                COALESCE(response_sample, '{}'::jsonb) AS response_sample,
                COALESCE(needs, '[]'::jsonb) AS needs
         FROM fact_resolvers
         WHERE action_key = $1 AND enabled = true",
    )
    .bind(action_key)
    .fetch_all(&mut **tx)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| Resolver {
            name: r.name,
            connector_key: r.connector_key,
            request_template: r.request_template,
            response_sample: r.response_sample,
            needs: match r.needs {
                Value::Array(items) => items,
                _ => Vec::new(),
            },
        })
        .collect())
}

/// Internal row type for SQLx mapping.
#[derive(sqlx::FromRow)]
struct MappingRow {
    name: String,
    jmespath: String,
    fact_key: String,
    transform: String,
    transform_args: Value,
    required: bool,
}

async fn load_mappings(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    action_key: &str,
) -> Result<Vec<Mapping>, sqlx::Error> {
    let rows = sqlx::query_as::<_, MappingRow>(
        "SELECT name, jmespath, fact_key,
                COALESCE(transform, '') AS transform,
                COALESCE(transform_args, '[]'::jsonb) AS transform_args,
                required
         FROM fact_mappings
         WHERE action_key = $1",
    )
    .bind(action_key)
    .fetch_all(&mut **tx)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| Mapping {
            name: r.name,
            path: r.jmespath,
            fact_key: r.fact_key,
            transform: if r.transform.is_empty() {
                None
            } else {
                Some(r.transform)
            },
            transform_args: match r.transform_args {
                Value::Array(items) => items,
                _ => Vec::new(),
            },
            required: r.required,
        })
        .collect())
}
