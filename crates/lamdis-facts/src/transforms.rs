//! # Transform Library
//!
//! Pure functions applied to mapping values before they land in `facts`.
//! All transforms are total on their declared domain; undefined inputs
//! yield the documented default rather than an error. The only fallible
//! transform is `days_between`, whose timestamps must parse.
//!
//! Predicate support for `any`/`all` is deliberately limited to
//! `field=='literal'`.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::{json, Value};
use thiserror::Error;

/// Errors raised by transform application.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    /// `days_between` needs exactly two timestamps.
    #[error("days_between expects 2 arguments")]
    DaysBetweenArity,
    /// A timestamp did not parse as RFC 3339 or `YYYY-MM-DD`.
    #[error("invalid time value {0:?}")]
    InvalidTime(String),
}

/// Apply a named transform to a value.
///
/// Unknown transform names pass the value through unchanged.
pub fn apply_transform(
    name: &str,
    value: Value,
    args: &[Value],
) -> Result<Value, TransformError> {
    match name {
        "count" => Ok(match value {
            Value::Array(items) => json!(items.len()),
            _ => json!(0),
        }),
        "sum" => Ok(match value {
            Value::Array(items) => {
                let total: f64 = items.iter().map(number_of).sum();
                json!(total)
            }
            other => json!(to_number(&other)),
        }),
        "days_between" => days_between(value, args),
        "now" => Ok(json!(
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
        )),
        "any" => Ok(any_all(value, args, false)),
        "all" => Ok(any_all(value, args, true)),
        "exists" => Ok(json!(!value.is_null())),
        "first" => Ok(match value {
            Value::Array(items) => items.into_iter().next().unwrap_or(Value::Null),
            scalar => scalar,
        }),
        "to_number" => Ok(json!(to_number(&value))),
        "to_string" => Ok(json!(render_scalar(&value))),
        "coalesce" => Ok(coalesce(value, args)),
        _ => Ok(value),
    }
}

/// `days_between`: whole-day difference `args[1] - args[0]`, truncated
/// toward zero. Falls back to a two-element array value when no args are
/// configured.
fn days_between(value: Value, args: &[Value]) -> Result<Value, TransformError> {
    let (a, b) = match args {
        [a, b] => (a.clone(), b.clone()),
        [] => match value {
            Value::Array(items) if items.len() == 2 => {
                let mut it = items.into_iter();
                // Length was just checked.
                match (it.next(), it.next()) {
                    (Some(a), Some(b)) => (a, b),
                    _ => return Err(TransformError::DaysBetweenArity),
                }
            }
            _ => return Err(TransformError::DaysBetweenArity),
        },
        _ => return Err(TransformError::DaysBetweenArity),
    };
    let ta = parse_time(&a)?;
    let tb = parse_time(&b)?;
    Ok(json!((tb - ta).num_days()))
}

/// Parse RFC 3339, falling back to a date-only `YYYY-MM-DD` at midnight UTC.
fn parse_time(v: &Value) -> Result<DateTime<Utc>, TransformError> {
    let s = v
        .as_str()
        .ok_or_else(|| TransformError::InvalidTime(v.to_string()))?;
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map(|d| {
            DateTime::from_naive_utc_and_offset(
                d.and_hms_opt(0, 0, 0).unwrap_or_default(),
                Utc,
            )
        })
        .map_err(|_| TransformError::InvalidTime(s.to_string()))
}

/// Shared body of `any` / `all`.
///
/// With `(source, predicate)` arguments, evaluates `field=='literal'` over
/// each element of the source. With no arguments, an array is truthy when
/// non-empty and a scalar when non-null; `all` over an empty source is
/// false.
fn any_all(value: Value, args: &[Value], require_all: bool) -> Value {
    if args.len() == 2 {
        let source = to_array(&args[0]);
        let pred = args[1].as_str().unwrap_or_default();
        if require_all && source.is_empty() {
            return json!(false);
        }
        let mut matched_all = true;
        for item in &source {
            let hit = match_predicate(item, pred);
            if hit && !require_all {
                return json!(true);
            }
            if !hit {
                matched_all = false;
            }
        }
        return json!(if require_all { matched_all } else { false });
    }
    match value {
        Value::Array(items) => json!(!items.is_empty()),
        other => json!(!other.is_null()),
    }
}

/// `coalesce`: the first non-zero argument, else the mapped value.
///
/// Zero values: null, blank strings, numeric zero, empty collections.
fn coalesce(value: Value, args: &[Value]) -> Value {
    for arg in args {
        if !is_zero(arg) {
            return arg.clone();
        }
    }
    value
}

fn is_zero(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Number(n) => n.as_f64().is_some_and(|f| f == 0.0),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) => false,
    }
}

/// Numeric value of a JSON number, 0 otherwise.
fn number_of(v: &Value) -> f64 {
    v.as_f64().unwrap_or(0.0)
}

/// `to_number`: numbers pass through, strings parse as decimal (0 on
/// failure), everything else is 0.
fn to_number(v: &Value) -> f64 {
    match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Canonical scalar rendering used by `to_string` and predicate matching.
///
/// Strings render bare (no quotes); whole floats render without a fraction
/// so `10.0` compares equal to the literal `'10'`.
fn render_scalar(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(f) = n.as_f64() {
                if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                    format!("{}", f as i64)
                } else {
                    f.to_string()
                }
            } else {
                n.to_string()
            }
        }
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

/// Wrap a scalar into a single-element array; arrays pass through; null is
/// empty.
fn to_array(v: &Value) -> Vec<Value> {
    match v {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        other => vec![other.clone()],
    }
}

/// Very limited predicate support: `field=='literal'`.
fn match_predicate(item: &Value, pred: &str) -> bool {
    let Some((left, right)) = pred.split_once("==") else {
        return false;
    };
    let field = left.trim();
    let literal = right.trim().trim_matches(|c| c == '\'' || c == '"');
    match item {
        Value::Object(map) => map
            .get(field)
            .is_some_and(|v| render_scalar(v) == literal),
        _ => false,
    }
}
