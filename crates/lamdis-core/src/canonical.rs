//! # Canonical JSON
//!
//! Deterministic JSON rendering used for binding-digest computation.
//! Object keys are sorted lexicographically (by Unicode code point), output
//! is compact (no whitespace between tokens), and numbers are rendered
//! without insignificant zeros via `serde_json`'s shortest-form formatter.
//!
//! ## Invariant
//!
//! The digest in [`crate::digest`] must agree across replicas regardless of
//! the key insertion order a particular request handler happened to produce.
//! Everything hashed therefore flows through [`canonical_json_string`].

use serde::Serialize;
use serde_json::Value;

/// Render any serializable value as canonical JSON.
///
/// # Errors
///
/// Returns the underlying `serde_json` error when the value cannot be
/// represented as JSON (e.g., a map with non-string keys).
pub fn canonical_json_string<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    let mut out = String::new();
    write_canonical(&value, &mut out)?;
    Ok(out)
}

/// Recursively write a value in canonical form.
fn write_canonical(value: &Value, out: &mut String) -> Result<(), serde_json::Error> {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                // Key came from the map; the lookup cannot miss.
                if let Some(child) = map.get(*key) {
                    write_canonical(child, out)?;
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out)?;
            }
            out.push(']');
        }
        // Scalars already render compactly and deterministically.
        scalar => out.push_str(&serde_json::to_string(scalar)?),
    }
    Ok(())
}
