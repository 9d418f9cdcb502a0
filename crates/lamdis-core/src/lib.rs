#![deny(missing_docs)]

//! # lamdis-core — Foundational Types for the Lamdis Action Gateway
//!
//! This crate defines the types every other crate in the workspace depends
//! on. It has no internal crate dependencies — only `serde`, `serde_json`,
//! `thiserror`, `chrono`, `uuid`, and `sha2` from the external ecosystem.
//!
//! ## Design Principles
//!
//! 1. **Canonical JSON is the sole path to the binding digest.** Every hash
//!    that binds a decision to its inputs and facts flows through
//!    [`canonical::canonical_json_string`], which sorts object keys and
//!    emits compact output so that two replicas hashing the same logical
//!    value always agree.
//!
//! 2. **Closed enumerations for wire-visible state.** [`DecisionStatus`]
//!    and [`ProblemKind`] are closed enums; the status field drives both
//!    the wire representation and validation, and problem kinds map to
//!    stable URL slugs.
//!
//! 3. **Structured errors with `thiserror`.** No `Box<dyn Error>`, no
//!    `.unwrap()` outside tests.

pub mod canonical;
pub mod decision;
pub mod digest;
pub mod problem;
pub mod slug;
pub mod tenant;

pub use canonical::canonical_json_string;
pub use decision::{Decision, DecisionStatus};
pub use digest::binding_hash;
pub use problem::{Problem, ProblemKind};
pub use slug::{short_name, slugify, split_action_key};
pub use tenant::Tenant;
