//! # Upstream Dispatch & Auth Injection
//!
//! The HTTP client side of an execution: applies tenant auth material to
//! the rendered request and performs the call with a 15-second deadline and
//! a 4 MiB response ceiling. Transport failures never abort the execution —
//! they annotate the step and the orchestrator records the outcome.

use std::time::Duration;

use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::secrets::open_envelope;

/// Upstream call deadline.
const DISPATCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Upstream response size ceiling (4 MiB).
const MAX_RESPONSE_BYTES: usize = 4 << 20;

/// Outcome of one upstream dispatch.
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    /// HTTP status, when a response was received.
    pub status: Option<u16>,
    /// Parsed JSON response body, when the upstream returned JSON.
    pub body: Option<Value>,
    /// Transport-level error annotation.
    pub error: Option<String>,
}

/// Outcome of one raw passthrough forward.
///
/// Unlike [`DispatchOutcome`], non-JSON upstream bodies are preserved as a
/// string value so passthrough callers can inspect HTML/text responses.
#[derive(Debug, Clone, Default)]
pub struct ForwardOutcome {
    /// HTTP status, when a response was received.
    pub status: Option<u16>,
    /// Upstream body: parsed JSON when the content type is JSON and the
    /// payload parses, the raw text otherwise.
    pub upstream: Option<Value>,
    /// Transport-level error annotation.
    pub error: Option<String>,
}

/// Auth material loaded from `tenant_auth_configs`.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AuthMaterial {
    /// `api_key` | `bearer` | `oauth2_client`.
    pub auth_type: String,
    /// Plain configuration (may carry a cleartext key for dev tenants).
    pub config: Value,
    /// Encrypted secrets envelope, when stored.
    pub secrets_encrypted: Option<Vec<u8>>,
}

/// Load the auth config row an operation references.
pub async fn load_auth_material(
    pool: &PgPool,
    tenant_id: Uuid,
    auth_ref: &str,
) -> Result<Option<AuthMaterial>, sqlx::Error> {
    let Ok(auth_id) = auth_ref.parse::<Uuid>() else {
        return Ok(None);
    };
    sqlx::query_as::<_, AuthMaterial>(
        "WITH s AS (
            SELECT set_config('app.tenant_id', $1, true)
        ) SELECT type AS auth_type,
                 COALESCE(config, '{}'::jsonb) AS config,
                 secrets_encrypted
          FROM tenant_auth_configs WHERE id = $2",
    )
    .bind(tenant_id.to_string())
    .bind(auth_id)
    .fetch_optional(pool)
    .await
}

/// Derive the headers to inject for the given auth material.
///
/// `api_key`: the `api_key` (plain config first, then the decrypted
/// envelope) goes out as `x-api-key`. `bearer`: a static `token` goes out
/// as `Authorization: Bearer`. `oauth2_client` grants are negotiated out of
/// band and inject nothing here. Without an encryption key only plain
/// config values are honored.
pub fn auth_headers(material: &AuthMaterial, encryption_key: Option<&str>) -> Vec<(String, String)> {
    let secret_of = |field: &str| -> Option<String> {
        if let Some(value) = material.config.get(field).and_then(Value::as_str) {
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
        let key = encryption_key?;
        let blob = material.secrets_encrypted.as_deref()?;
        match open_envelope(blob, key) {
            Ok(secrets) => secrets
                .get(field)
                .and_then(Value::as_str)
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            Err(err) => {
                tracing::warn!(error = %err, "failed to open secrets envelope");
                None
            }
        }
    };

    match material.auth_type.to_ascii_lowercase().as_str() {
        "api_key" => secret_of("api_key")
            .map(|key| vec![("x-api-key".to_string(), key)])
            .unwrap_or_default(),
        "bearer" => secret_of("token")
            .map(|token| vec![("authorization".to_string(), format!("Bearer {token}"))])
            .unwrap_or_default(),
        other => {
            tracing::debug!(auth_type = other, "auth type injects no inline headers");
            Vec::new()
        }
    }
}

/// The upstream HTTP client.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
}

impl UpstreamClient {
    /// Build a client with the dispatch deadline applied.
    pub fn new() -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(DISPATCH_TIMEOUT)
                .build()?,
        })
    }

    /// Perform one upstream call.
    ///
    /// Never fails: transport errors and oversized responses land in the
    /// outcome's `error` field, and non-2xx statuses are surfaced verbatim.
    pub async fn dispatch(
        &self,
        method: &str,
        url: &str,
        headers: &[(String, String)],
        body: Option<&Value>,
    ) -> DispatchOutcome {
        let method = match reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes()) {
            Ok(m) => m,
            Err(_) => {
                return DispatchOutcome {
                    error: Some(format!("invalid method {method:?}")),
                    ..DispatchOutcome::default()
                }
            }
        };

        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }
        for (key, value) in headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = match request.send().await {
            Ok(resp) => resp,
            Err(err) => {
                return DispatchOutcome {
                    error: Some(err.to_string()),
                    ..DispatchOutcome::default()
                }
            }
        };

        let status = response.status().as_u16();
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => {
                return DispatchOutcome {
                    status: Some(status),
                    body: None,
                    error: Some(err.to_string()),
                }
            }
        };
        if bytes.len() > MAX_RESPONSE_BYTES {
            return DispatchOutcome {
                status: Some(status),
                body: None,
                error: Some(format!(
                    "upstream response exceeds {MAX_RESPONSE_BYTES} bytes"
                )),
            };
        }

        DispatchOutcome {
            status: Some(status),
            body: serde_json::from_slice(&bytes).ok(),
            error: None,
        }
    }

    /// Forward a raw request body to the upstream (passthrough operations).
    ///
    /// The body bytes are relayed verbatim with the caller's content-type
    /// and accept headers; the response is parsed as JSON when the upstream
    /// declares it, and preserved as text otherwise. The same deadline and
    /// response ceiling as [`UpstreamClient::dispatch`] apply.
    pub async fn forward(
        &self,
        method: &str,
        url: &str,
        headers: &[(String, String)],
        body: Option<&[u8]>,
    ) -> ForwardOutcome {
        let method = match reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes()) {
            Ok(m) => m,
            Err(_) => {
                return ForwardOutcome {
                    error: Some(format!("invalid method {method:?}")),
                    ..ForwardOutcome::default()
                }
            }
        };

        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.body(body.to_vec());
        }
        for (key, value) in headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = match request.send().await {
            Ok(resp) => resp,
            Err(err) => {
                return ForwardOutcome {
                    error: Some(err.to_string()),
                    ..ForwardOutcome::default()
                }
            }
        };

        let status = response.status().as_u16();
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));
        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(err) => {
                return ForwardOutcome {
                    status: Some(status),
                    upstream: None,
                    error: Some(err.to_string()),
                }
            }
        };
        if bytes.len() > MAX_RESPONSE_BYTES {
            return ForwardOutcome {
                status: Some(status),
                upstream: None,
                error: Some(format!(
                    "upstream response exceeds {MAX_RESPONSE_BYTES} bytes"
                )),
            };
        }

        let upstream = if is_json {
            serde_json::from_slice(&bytes)
                .ok()
                .or_else(|| Some(Value::String(String::from_utf8_lossy(&bytes).into_owned())))
        } else {
            Some(Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        ForwardOutcome {
            status: Some(status),
            upstream,
            error: None,
        }
    }
}
