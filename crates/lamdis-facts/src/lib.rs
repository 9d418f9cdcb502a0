//! # lamdis-facts — Facts Engine
//!
//! Produces the `facts` object that policy evaluation consumes. For each
//! action, enabled *resolvers* contribute stubbed upstream response samples
//! and *mappings* project parts of the composed document into fact keys via
//! path expressions and pure transforms.
//!
//! ## Composed document
//!
//! ```text
//! { "inputs": <request inputs>, "resolvers": { "<name>": <response_sample>, ... } }
//! ```
//!
//! Mappings are applied in alphabetical order by name so that two mappings
//! writing the same `fact_key` resolve deterministically (last writer wins).

pub mod engine;
pub mod path;
pub mod transforms;

pub use engine::{FactsEngine, FactsError, Mapping, Resolver};
pub use path::{eval_path, PathError};
pub use transforms::{apply_transform, TransformError};
