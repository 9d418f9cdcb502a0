//! # lamdis-policy — Policy Engine & Decision Store
//!
//! Evaluates the tenant- and action-scoped Rego policy against
//! `{inputs, facts}`, persists the resulting decision with a TTL and a
//! binding hash, and re-validates the binding at execute time.
//!
//! Policy evaluation failures never surface to the transport layer: they
//! collapse into a `BLOCKED` decision with reason `policy_error`.

pub mod engine;
pub mod store;

pub use engine::{evaluate_module, PolicyEngine};
pub use store::{check_executable, BindFailure, DecisionStore, StoredDecision, StoreError};
