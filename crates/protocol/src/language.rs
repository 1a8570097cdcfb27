/// Fold dialects onto the language they share context with.
pub fn base_language_id(language_id: &str) -> &str {
    match language_id {
        "typescriptreact" => "typescript",
        "javascriptreact" => "javascript",
        other => other,
    }
}

/// Whether a document in `language_id` is useful context for a document in `current`.
pub fn should_be_used_as_context(current: &str, language_id: &str) -> bool {
    base_language_id(current) == base_language_id(language_id)
}
