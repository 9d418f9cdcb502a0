//! # Path Expressions
//!
//! JMESPath-style field access over a JSON document: dotted identifier
//! segments and bracket index segments (`resolvers.r1.orders`,
//! `items[0].id`). Traversal misses — a missing field, an out-of-range
//! index, or descending into a scalar — evaluate to `null`, matching
//! JMESPath semantics. Only a malformed expression is an error, which is
//! what trips a mapping's `required` rule.

use serde_json::Value;
use thiserror::Error;

/// Errors raised while parsing a path expression.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    /// The expression is empty.
    #[error("empty path expression")]
    Empty,
    /// A segment contains characters outside the supported grammar.
    #[error("invalid path segment {segment:?} in expression {expr:?}")]
    InvalidSegment {
        /// The offending segment.
        segment: String,
        /// The full expression, for diagnostics.
        expr: String,
    },
    /// A bracket index is malformed (`[abc]`, unbalanced bracket).
    #[error("invalid index in path segment {segment:?}")]
    InvalidIndex {
        /// The offending segment.
        segment: String,
    },
}

/// One parsed step of a path expression.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Field(String),
    Index(usize),
}

/// Evaluate a path expression against a document.
///
/// # Errors
///
/// Returns [`PathError`] only for malformed expressions; traversal misses
/// yield `Ok(Value::Null)`.
pub fn eval_path(expr: &str, doc: &Value) -> Result<Value, PathError> {
    let steps = parse(expr)?;
    let mut current = doc;
    for step in &steps {
        current = match (step, current) {
            (Step::Field(name), Value::Object(map)) => match map.get(name) {
                Some(v) => v,
                None => return Ok(Value::Null),
            },
            (Step::Index(i), Value::Array(items)) => match items.get(*i) {
                Some(v) => v,
                None => return Ok(Value::Null),
            },
            // Descending into a scalar or mismatched container is a miss.
            _ => return Ok(Value::Null),
        };
    }
    Ok(current.clone())
}

/// Parse an expression into steps.
fn parse(expr: &str) -> Result<Vec<Step>, PathError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(PathError::Empty);
    }
    let mut steps = Vec::new();
    for segment in expr.split('.') {
        if segment.is_empty() {
            return Err(PathError::InvalidSegment {
                segment: segment.to_string(),
                expr: expr.to_string(),
            });
        }
        let mut rest = segment;
        // Leading identifier part (may be absent when a segment is pure
        // indexing into the previous value, which we do not support).
        let ident_end = rest.find('[').unwrap_or(rest.len());
        let ident = &rest[..ident_end];
        if ident.is_empty() || !is_identifier(ident) {
            return Err(PathError::InvalidSegment {
                segment: segment.to_string(),
                expr: expr.to_string(),
            });
        }
        steps.push(Step::Field(ident.to_string()));
        rest = &rest[ident_end..];
        // Zero or more [n] suffixes.
        while !rest.is_empty() {
            if !rest.starts_with('[') {
                return Err(PathError::InvalidIndex {
                    segment: segment.to_string(),
                });
            }
            let close = rest.find(']').ok_or_else(|| PathError::InvalidIndex {
                segment: segment.to_string(),
            })?;
            let idx: usize =
                rest[1..close]
                    .parse()
                    .map_err(|_| PathError::InvalidIndex {
                        segment: segment.to_string(),
                    })?;
            steps.push(Step::Index(idx));
            rest = &rest[close + 1..];
        }
    }
    Ok(steps)
}

/// Identifiers: ASCII letters, digits, `_`, and `-` (not leading a digit is
/// not enforced — resolver names are free-form).
fn is_identifier(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
