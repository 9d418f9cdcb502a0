//! # Problem Documents
//!
//! RFC-7807-style problem documents returned on binding and protocol
//! failures. Problem kinds are a closed enum mapping to stable URL slugs;
//! the base URL is taken from `PROBLEM_BASE_URL`, falling back to
//! `BASE_PUBLIC_URL + "/problems"`, then to a documented default.

use serde::{Deserialize, Serialize};

/// Default problem base when neither environment variable is set.
const DEFAULT_PROBLEM_BASE: &str = "https://example.com/problems";

/// The closed set of problem kinds the gateway can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemKind {
    /// `execute` was called without a `decision_id`.
    PreflightRequired,
    /// The decision id is unknown for this tenant.
    InvalidDecision,
    /// The decision is bound to a different action, or the binding hash no
    /// longer matches the current inputs and facts.
    DecisionMismatch,
    /// The decision status is not an ALLOW variant.
    DecisionBlocked,
    /// The decision's TTL has elapsed.
    DecisionExpired,
    /// No enabled connector operation matches the action key.
    NoOperation,
    /// A `{name}` placeholder in the upstream path was left unbound.
    UnresolvedPathParams,
    /// Generic policy refusal (referenced from the manifest problem map).
    PolicyViolation,
}

impl ProblemKind {
    /// The URL slug for this problem kind.
    pub fn slug(&self) -> &'static str {
        match self {
            Self::PreflightRequired => "preflight-required",
            Self::InvalidDecision => "invalid-decision",
            Self::DecisionMismatch => "decision-mismatch",
            Self::DecisionBlocked => "decision-blocked",
            Self::DecisionExpired => "decision-expired",
            Self::NoOperation => "no-operation",
            Self::UnresolvedPathParams => "unresolved-path-params",
            Self::PolicyViolation => "policy-violation",
        }
    }

    /// Human-readable title for this problem kind.
    pub fn title(&self) -> &'static str {
        match self {
            Self::PreflightRequired => "Preflight required",
            Self::InvalidDecision => "Invalid decision id",
            Self::DecisionMismatch => "Decision mismatch",
            Self::DecisionBlocked => "Decision is blocked",
            Self::DecisionExpired => "Decision expired",
            Self::NoOperation => "No connector operation mapped to action",
            Self::UnresolvedPathParams => "Unresolved path parameters",
            Self::PolicyViolation => "Policy violation",
        }
    }

    /// Build the full problem type URL for this kind.
    pub fn type_url(&self) -> String {
        format!("{}/{}", problem_base(), self.slug())
    }

    /// Build a full problem document with the given detail.
    pub fn problem(&self, detail: impl Into<String>) -> Problem {
        Problem {
            type_url: self.type_url(),
            title: self.title().to_string(),
            detail: Some(detail.into()),
            step: None,
        }
    }
}

/// Base URL for problem type identifiers.
///
/// Precedence: `PROBLEM_BASE_URL` (exact base), then
/// `BASE_PUBLIC_URL + "/problems"`, then the documented fallback.
pub fn problem_base() -> String {
    if let Ok(base) = std::env::var("PROBLEM_BASE_URL") {
        if !base.is_empty() {
            return base.trim_end_matches('/').to_string();
        }
    }
    if let Ok(base) = std::env::var("BASE_PUBLIC_URL") {
        if !base.is_empty() {
            return format!("{}/problems", base.trim_end_matches('/'));
        }
    }
    DEFAULT_PROBLEM_BASE.to_string()
}

/// An RFC-7807 problem document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    /// Problem type URL.
    #[serde(rename = "type")]
    pub type_url: String,
    /// Short human-readable summary.
    pub title: String,
    /// Occurrence-specific detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// The execution step the problem occurred in, when applicable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
}
