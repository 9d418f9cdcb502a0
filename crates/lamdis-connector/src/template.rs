//! # Request-Template Renderer
//!
//! Renders a connector operation's `request_template` against the call's
//! inputs:
//!
//! - string values may contain `{{ dotted.path }}` references into the
//!   inputs; missing paths render as the empty string,
//! - query keys are emitted in lexicographic order so rendered URLs are
//!   stable,
//! - only top-level body string values are interpolated; nested values pass
//!   through unchanged,
//! - `{name}` path placeholders substitute `path_params` values with URL
//!   path escaping; an unbound or empty placeholder is left intact, and a
//!   `{` remaining in the final URL fails the render.

use std::collections::BTreeMap;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::{Map, Value};
use thiserror::Error;

/// Escape set for path segments: everything but unreserved characters.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Errors raised while rendering a request.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    /// One or more `{name}` placeholders were left unbound.
    #[error("unresolved path parameters in {url}")]
    UnresolvedPathParams {
        /// The URL as far as it was assembled.
        url: String,
    },
}

/// A fully rendered upstream request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedRequest {
    /// Absolute upstream URL, query included.
    pub url: String,
    /// Rendered headers, in template order.
    pub headers: Vec<(String, String)>,
    /// Rendered JSON body, when the template declares one.
    pub body: Option<Value>,
}

/// Render a request template.
pub fn render_request(
    template: &Value,
    path: &str,
    base_url: &str,
    inputs: &Value,
) -> Result<RenderedRequest, RenderError> {
    let empty = Map::new();
    let template = template.as_object().unwrap_or(&empty);

    let mut headers = Vec::new();
    if let Some(Value::Object(header_map)) = template.get("headers") {
        for (key, value) in header_map {
            headers.push((key.clone(), resolve_value(value, inputs)));
        }
    }

    // Lexicographic key order keeps rendered URLs stable for logging and
    // idempotent retries.
    let mut query = BTreeMap::new();
    if let Some(Value::Object(query_map)) = template.get("query") {
        for (key, value) in query_map {
            query.insert(key.clone(), resolve_value(value, inputs));
        }
    }

    let body = match template.get("body") {
        Some(Value::Object(body_map)) => {
            let mut rendered = Map::new();
            for (key, value) in body_map {
                match value {
                    Value::String(s) => {
                        rendered.insert(key.clone(), Value::String(substitute(s, inputs)));
                    }
                    other => {
                        rendered.insert(key.clone(), other.clone());
                    }
                }
            }
            Some(Value::Object(rendered))
        }
        _ => None,
    };

    let mut url = format!("{}{}", base_url.trim_end_matches('/'), path);
    if let Some(Value::Object(path_params)) = template.get("path_params") {
        url = substitute_path_params(&url, path_params, inputs);
    }
    if url.contains('{') {
        return Err(RenderError::UnresolvedPathParams { url });
    }

    if !query.is_empty() {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in &query {
            serializer.append_pair(key, value);
        }
        let encoded = serializer.finish();
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&encoded);
    }

    Ok(RenderedRequest { url, headers, body })
}

/// Resolve a template value to a string, interpolating placeholders in
/// strings and rendering scalars the way they would appear in JSON text.
fn resolve_value(value: &Value, inputs: &Value) -> String {
    match value {
        Value::String(s) => substitute(s, inputs),
        other => render_scalar(other),
    }
}

/// Replace every `{{ key.path }}` occurrence in `raw` with the value at
/// that dotted path in `inputs`; missing paths render as the empty string.
/// Malformed references (unbalanced braces, illegal characters) are left
/// untouched.
pub fn substitute(raw: &str, inputs: &Value) -> String {
    if !raw.contains("{{") {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        match after_open.find("}}") {
            Some(close) => {
                let key = after_open[..close].trim();
                if is_reference(key) {
                    if let Some(value) = lookup_dotted(inputs, key) {
                        out.push_str(&render_scalar(value));
                    }
                    // Missing path: empty string.
                } else {
                    // Not a valid reference; keep the literal text.
                    out.push_str(&rest[open..open + 2 + close + 2]);
                }
                rest = &after_open[close + 2..];
            }
            None => {
                // Unbalanced; emit the remainder verbatim.
                out.push_str(&rest[open..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

/// A reference is a non-empty dotted chain of `[A-Za-z0-9_]` segments.
fn is_reference(key: &str) -> bool {
    !key.is_empty()
        && key
            .split('.')
            .all(|seg| !seg.is_empty() && seg.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'))
}

/// Walk a dotted path through nested objects.
fn lookup_dotted<'a>(inputs: &'a Value, key: &str) -> Option<&'a Value> {
    let mut current = inputs;
    for segment in key.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Render a scalar for embedding in a string context.
fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Substitute `{name}` placeholders from `path_params`. Unmapped
/// placeholders and values rendering to the empty string are left intact so
/// the caller can surface `unresolved-path-params`.
fn substitute_path_params(url: &str, path_params: &Map<String, Value>, inputs: &Value) -> String {
    let mut out = String::with_capacity(url.len());
    let mut rest = url;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        match after_open.find('}') {
            Some(close) => {
                let name = &after_open[..close];
                let is_param = !name.is_empty()
                    && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
                let replacement = if is_param {
                    path_params.get(name).and_then(|raw| {
                        let resolved = resolve_value(raw, inputs);
                        if resolved.is_empty() {
                            None
                        } else {
                            Some(utf8_percent_encode(&resolved, PATH_SEGMENT).to_string())
                        }
                    })
                } else {
                    None
                };
                match replacement {
                    Some(value) => out.push_str(&value),
                    // Keep the braces so the error surfaces downstream.
                    None => out.push_str(&rest[open..open + 1 + close + 1]),
                }
                rest = &after_open[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitute_dotted_paths() {
        let inputs = json!({"order": {"id": "o-1"}, "amount": 10});
        assert_eq!(substitute("id={{ order.id }}", &inputs), "id=o-1");
        assert_eq!(substitute("amt={{amount}}", &inputs), "amt=10");
    }

    #[test]
    fn missing_paths_render_empty() {
        let inputs = json!({"a": {"x": 1}});
        assert_eq!(substitute("v={{a.b.c}}", &inputs), "v=");
        assert_eq!(substitute("v={{nothing}}", &inputs), "v=");
    }

    #[test]
    fn non_string_values_pass_through_unrendered() {
        let inputs = json!({});
        let template = json!({"headers": {"x-retries": 3}});
        let req = render_request(&template, "/v1/ping", "https://up.example", &inputs).unwrap();
        assert_eq!(req.headers, vec![("x-retries".to_string(), "3".to_string())]);
    }

    #[test]
    fn malformed_references_stay_literal() {
        let inputs = json!({"a": 1});
        assert_eq!(substitute("x={{not valid}}", &inputs), "x={{not valid}}");
        assert_eq!(substitute("x={{unclosed", &inputs), "x={{unclosed");
    }

    #[test]
    fn query_keys_are_lexicographically_ordered() {
        let template = json!({"query": {"zeta": "1", "alpha": "{{ a }}", "mid": "3"}});
        let inputs = json!({"a": "2"});
        let req = render_request(&template, "/v1/list", "https://up.example", &inputs).unwrap();
        assert_eq!(req.url, "https://up.example/v1/list?alpha=2&mid=3&zeta=1");
    }

    #[test]
    fn query_appends_with_ampersand_when_path_has_query() {
        let template = json!({"query": {"b": "2"}});
        let req =
            render_request(&template, "/v1/list?a=1", "https://up.example", &json!({})).unwrap();
        assert_eq!(req.url, "https://up.example/v1/list?a=1&b=2");
    }

    #[test]
    fn body_interpolates_top_level_strings_only() {
        let template = json!({"body": {
            "note": "order {{ order.id }}",
            "nested": {"keep": "{{ order.id }}"},
            "count": 2
        }});
        let inputs = json!({"order": {"id": "o-9"}});
        let req = render_request(&template, "/v1/x", "https://up.example", &inputs).unwrap();
        let body = req.body.unwrap();
        assert_eq!(body["note"], "order o-9");
        // Nested values are passed through unchanged.
        assert_eq!(body["nested"]["keep"], "{{ order.id }}");
        assert_eq!(body["count"], 2);
    }

    #[test]
    fn path_params_substitute_and_escape() {
        let template = json!({"path_params": {"id": "{{ order.id }}"}});
        let inputs = json!({"order": {"id": "o 1/x"}});
        let req =
            render_request(&template, "/v1/orders/{id}", "https://up.example/", &inputs).unwrap();
        assert_eq!(req.url, "https://up.example/v1/orders/o%201%2Fx");
    }

    #[test]
    fn empty_path_param_fails_render() {
        let template = json!({"path_params": {"id": "{{ missing }}"}});
        let err = render_request(&template, "/v1/orders/{id}", "https://up.example", &json!({}))
            .unwrap_err();
        assert!(matches!(err, RenderError::UnresolvedPathParams { .. }));
    }

    #[test]
    fn unmapped_path_param_fails_render() {
        let template = json!({"path_params": {}});
        let err = render_request(&template, "/v1/orders/{id}", "https://up.example", &json!({}))
            .unwrap_err();
        assert!(matches!(err, RenderError::UnresolvedPathParams { .. }));
    }

    #[test]
    fn missing_path_params_block_fails_when_placeholders_remain() {
        let err = render_request(&json!({}), "/v1/orders/{id}", "https://up.example", &json!({}))
            .unwrap_err();
        let RenderError::UnresolvedPathParams { url } = err;
        assert!(url.contains("{id}"));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let req = render_request(&json!({}), "/v1/ping", "https://up.example///", &json!({}))
            .unwrap();
        assert_eq!(req.url, "https://up.example/v1/ping");
    }

    #[test]
    fn headers_resolve_placeholders() {
        let template = json!({"headers": {"x-order": "{{ order.id }}", "accept": "application/json"}});
        let inputs = json!({"order": {"id": "o-3"}});
        let req = render_request(&template, "/v1/x", "https://up.example", &inputs).unwrap();
        assert!(req
            .headers
            .contains(&("x-order".to_string(), "o-3".to_string())));
        assert!(req
            .headers
            .contains(&("accept".to_string(), "application/json".to_string())));
    }
}
