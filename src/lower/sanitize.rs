//! Identifier and display-name sanitization for generated steps.

use std::sync::LazyLock;

use regex::Regex;

const MAX_ID_BASE_LEN: usize = 58;
const ID_SUFFIX_LEN: usize = 6;
const MAX_NAME_LEN: usize = 128;
const EMPTY_FALLBACK: &str = "unamed";

static ID_UNSAFE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9.\-_]+").expect("id pattern is valid"));
static NAME_UNSAFE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w \-]+").expect("name pattern is valid"));

/// Build a step id from a span label plus the first 6 characters of its span
/// id. Spans whose ids share a 6-character prefix and whose labels sanitize
/// identically produce the same id.
pub fn sanitize_id(name: &str, span_id: &str) -> String {
    let replaced = ID_UNSAFE.replace_all(name, "_");
    let trimmed = replaced.trim_matches('_');
    let base = if trimmed.is_empty() { EMPTY_FALLBACK } else { trimmed };

    let mut id: String = base.chars().take(MAX_ID_BASE_LEN).collect();
    id.extend(span_id.chars().take(ID_SUFFIX_LEN));
    id
}

/// Build a display name. Names may collide; only ids are unique.
pub fn sanitize_name(name: &str) -> String {
    let replaced = NAME_UNSAFE.replace_all(name, "_");
    let trimmed = replaced.trim_matches(|c| c == '_' || c == ' ');
    if trimmed.is_empty() {
        return EMPTY_FALLBACK.to_string();
    }
    trimmed.chars().take(MAX_NAME_LEN).collect()
}
