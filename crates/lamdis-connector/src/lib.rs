//! # lamdis-connector — Connector Runtime
//!
//! Everything between a validated decision and the upstream side effect:
//! the per-tenant operation registry (with its 30-second TTL cache), the
//! request-template renderer, upstream auth injection (encrypted secrets
//! envelope), and the orchestrator that resolves an action key to a
//! connector operation, dispatches it, and records the execution with
//! idempotency.

pub mod orchestrator;
pub mod registry;
pub mod secrets;
pub mod template;
pub mod upstream;

pub use orchestrator::{
    resolve_operation, ExecutionStatus, ExecutionResult, Orchestrator, Resolution, Step,
};
pub use registry::{Operation, OperationRegistry};
pub use secrets::{open_envelope, seal_envelope, SecretsError};
pub use template::{render_request, RenderError, RenderedRequest};
pub use upstream::{
    auth_headers, load_auth_material, AuthMaterial, DispatchOutcome, ForwardOutcome,
    UpstreamClient,
};
