//! # Action-Key Slugs
//!
//! An action key is `<namespace>.<short>`: the namespace comes from the
//! connector's kind or title, the short name from the last static segment
//! of the operation path. Both sides are normalized with the same slug
//! rules so that manifest emission and orchestrator resolution agree.

/// Slugify a connector kind or title.
///
/// Rules: insert a hyphen at lowercase/digit → uppercase boundaries
/// (`CatcherTest` → `catcher-test`), replace non-alphanumeric runs with a
/// hyphen, lowercase, collapse repeated hyphens, and trim leading/trailing
/// hyphens.
pub fn slugify(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let mut out = String::with_capacity(trimmed.len() + 4);
    let mut prev: Option<char> = None;
    for c in trimmed.chars() {
        if c.is_ascii_alphanumeric() {
            if c.is_ascii_uppercase() {
                if let Some(p) = prev {
                    if p.is_ascii_lowercase() || p.is_ascii_digit() {
                        out.push('-');
                    }
                }
                out.push(c.to_ascii_lowercase());
            } else {
                out.push(c);
            }
        } else {
            out.push('-');
        }
        prev = Some(c);
    }
    collapse_hyphens(&out)
}

/// Collapse repeated hyphens and trim them from both ends.
fn collapse_hyphens(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_hyphen = true; // suppress leading hyphens
    for c in s.chars() {
        if c == '-' {
            if !last_hyphen {
                out.push('-');
            }
            last_hyphen = true;
        } else {
            out.push(c);
            last_hyphen = false;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Derive the short action name from an operation path: the last path
/// segment that is neither `v1` nor a `{param}` placeholder, slugified.
///
/// `/v1/orders/{id}/refund` → `refund`; `/v1/orders` → `orders`;
/// an empty path → `root`; a path with no usable segment → `action`.
pub fn short_name(path: &str) -> String {
    let path = path.split('?').next().unwrap_or(path);
    let path = path.trim_matches('/');
    if path.is_empty() {
        return "root".to_string();
    }
    for segment in path.rsplit('/') {
        if segment.contains('{') || segment.contains('}') || segment == "v1" {
            continue;
        }
        let slug = slugify(segment);
        if !slug.is_empty() {
            return slug;
        }
    }
    "action".to_string()
}

/// Split an action key at the first `.` into `(namespace, short)`.
///
/// A key without a dot has an empty short name; the namespace is the
/// whole key.
pub fn split_action_key(key: &str) -> (&str, &str) {
    match key.find('.') {
        Some(i) => (&key[..i], &key[i + 1..]),
        None => (key, ""),
    }
}
