/// First `max_chars` characters (not bytes) of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Basename of `filename` with anything outside `[A-Za-z0-9._-]` replaced by `_`,
/// safe to embed in archive entry names.
pub fn sanitize_filename(filename: &str) -> String {
    let base = crate::documents::basename(filename);
    let cleaned: String = base
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
            _ => '_',
        })
        .collect();
    if cleaned.trim_matches('.').is_empty() {
        "unnamed".to_string()
    } else {
        cleaned
    }
}
