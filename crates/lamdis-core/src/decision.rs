//! # Decision Model
//!
//! A decision is the immutable outcome of one policy evaluation: status,
//! structured reasons, a TTL, and the binding hash that ties it to the
//! inputs and facts it was evaluated against. Revocation is achieved by TTL
//! expiry or by issuing a new decision — there is no update path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status of a policy decision.
///
/// Closed enumeration: the status drives both the wire representation and
/// the executability check at bind time. Anything a policy module returns
/// outside this set is normalized to [`DecisionStatus::Blocked`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionStatus {
    /// Execution is allowed as-is.
    Allow,
    /// Execution is allowed subject to the returned conditions.
    AllowWithConditions,
    /// The policy needs more inputs before it can decide; nothing is persisted.
    NeedsInput,
    /// Execution is refused; alternatives may be offered.
    Blocked,
}

impl DecisionStatus {
    /// Return the wire representation of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "ALLOW",
            Self::AllowWithConditions => "ALLOW_WITH_CONDITIONS",
            Self::NeedsInput => "NEEDS_INPUT",
            Self::Blocked => "BLOCKED",
        }
    }

    /// Whether a decision with this status may be executed.
    pub fn is_executable(&self) -> bool {
        matches!(self, Self::Allow | Self::AllowWithConditions)
    }

    /// Parse a status string as returned by a policy module.
    ///
    /// The value is normalized to uppercase first; unknown values yield
    /// `None` so the caller can apply the blocked-with-`policy_error` rule.
    pub fn parse_policy_status(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "ALLOW" => Some(Self::Allow),
            "ALLOW_WITH_CONDITIONS" => Some(Self::AllowWithConditions),
            "NEEDS_INPUT" => Some(Self::NeedsInput),
            "BLOCKED" => Some(Self::Blocked),
            _ => None,
        }
    }
}

impl std::fmt::Display for DecisionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one policy evaluation, before or after persistence.
///
/// `id` is empty until the decision store assigns one. `NEEDS_INPUT`
/// decisions are never persisted and never receive an id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// Store-assigned identifier (absent until persisted).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The action this decision was evaluated for.
    pub action_key: String,
    /// Inputs snapshot at evaluation time.
    pub inputs: Value,
    /// Facts snapshot at evaluation time.
    pub facts: Value,
    /// The published policy version that produced this decision (0 when no
    /// policy is published).
    pub policy_version: i32,
    /// Evaluation outcome.
    pub status: DecisionStatus,
    /// Structured reasons from the policy module.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasons: Option<Value>,
    /// Input prompts requested by the policy (surfaced on NEEDS_INPUT, or as
    /// conditions on ALLOW_WITH_CONDITIONS).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs: Option<Value>,
    /// Alternative actions offered on BLOCKED.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternatives: Option<Value>,
    /// Executability deadline.
    pub expires_at: DateTime<Utc>,
}
