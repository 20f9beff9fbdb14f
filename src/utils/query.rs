// src/utils/query.rs

use serde::{Deserialize, Deserializer};

/// Resolves an `?ordering=` parameter against a whitelist.
///
/// `allowed` maps the public field name to the SQL expression. A leading `-`
/// sorts descending. Unknown fields fall back to `default`, which is itself
/// written in the same `field` / `-field` notation.
pub fn order_by(requested: Option<&str>, allowed: &[(&str, &str)], default: &str) -> String {
    let resolve = |raw: &str| -> Option<String> {
        let (field, direction) = match raw.strip_prefix('-') {
            Some(field) => (field, "DESC"),
            None => (raw, "ASC"),
        };
        allowed
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, column)| format!("{} {}", column, direction))
    };

    requested
        .and_then(|raw| resolve(raw.trim()))
        .or_else(|| resolve(default))
        .unwrap_or_else(|| "id ASC".to_string())
}

/// Builds a `LIKE` pattern for a case-insensitive "contains" match.
/// `%`, `_` and `\` in the needle are escaped; pair with `ESCAPE '\'`.
pub fn contains_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for c in needle.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Deserializes a field that distinguishes "absent" from "explicitly null".
///
/// Use together with `#[serde(default)]`: absent → `None`, `null` → `Some(None)`,
/// a value → `Some(Some(v))`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
