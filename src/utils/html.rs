use std::collections::HashSet;

/// Strips every HTML tag from user-supplied free text (descriptions, teacher comments).
///
/// Text content survives; markup and script bodies do not. Plain text without
/// markup passes through unchanged apart from entity escaping of `<`, `>` and `&`.
pub fn clean_text(input: &str) -> String {
    let mut builder = ammonia::Builder::empty();
    builder.clean_content_tags(HashSet::from(["script", "style"]));
    builder.clean(input).to_string()
}
