//! JSON-pointer helpers for walking the merged config document.

use serde_json::Value;

/// Every scalar (non-object, non-array) in `doc` with its RFC 6901 pointer,
/// in document order. A scalar root is reported as `"/"`.
pub(crate) fn leaves(doc: &Value) -> Vec<(String, &Value)> {
    let mut out = Vec::new();
    let mut stack: Vec<(String, &Value)> = vec![(String::new(), doc)];
    while let Some((path, node)) = stack.pop() {
        match node {
            Value::Object(map) => {
                // Reverse so the pop order follows the document.
                for (key, child) in map.iter().rev() {
                    stack.push((format!("{path}/{}", escape(key)), child));
                }
            }
            Value::Array(items) => {
                for (idx, child) in items.iter().enumerate().rev() {
                    stack.push((format!("{path}/{idx}"), child));
                }
            }
            scalar => {
                let path = if path.is_empty() { "/".to_string() } else { path };
                out.push((path, scalar));
            }
        }
    }
    out
}

/// `/a/b` covers `/a/b` and `/a/b/c`, not `/a/bc`. `/` covers everything.
pub(crate) fn covers(prefix: &str, leaf: &str) -> bool {
    match leaf.strip_prefix(prefix) {
        _ if prefix == "/" => true,
        Some("") => true,
        Some(rest) => rest.starts_with('/'),
        None => false,
    }
}

/// Leading `/`, no trailing `/` (except the root itself).
pub(crate) fn normalize(p: &str) -> String {
    let trimmed = p.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

fn escape(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}
