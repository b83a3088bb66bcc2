//! Python literal rendering and name slugging

use serde_json::Value;

/// Render a JSON value as a Python literal
///
/// JSON string escaping is valid Python string syntax, so strings go through
/// the JSON serializer; only the null/bool spellings differ.
pub fn py_literal(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => n.to_string(),
        // Display for a JSON string is its quoted, escaped form, which is
        // also valid Python.
        Value::String(_) => value.to_string(),
        Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(py_literal).collect();
            format!("[{}]", rendered.join(", "))
        }
        Value::Object(map) => {
            let rendered: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", Value::String(k.clone()), py_literal(v)))
                .collect();
            format!("{{{}}}", rendered.join(", "))
        }
    }
}

/// Slugify a rule name into an artifact file stem
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_was_sep = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            slug.push('_');
            last_was_sep = true;
        }
    }
    while slug.ends_with('_') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("rule");
    }
    slug
}
