//! Shared key rendering for blob store backends.

/// Render the backend key for `key`, namespaced by `prefix` when one is set.
pub fn render_key(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, key),
        _ => key.to_string(),
    }
}
