use uuid::Uuid;

const TITLE_SNIPPET_CHARS: usize = 40;

/// Lowercase alphanumeric runs joined by single hyphens.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_hyphen = false;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    slug
}

/// Prefix of at most `max_chars` characters, cut on a char boundary.
pub fn truncate(input: &str, max_chars: usize) -> &str {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => &input[..idx],
        None => input,
    }
}

/// Display title for a stored highlight: truncated book title plus a
/// truncated snippet of the highlighted text.
pub fn highlight_title(book_title: &str, body: &str) -> String {
    format!(
        "{} - {}",
        truncate(book_title.trim(), TITLE_SNIPPET_CHARS),
        truncate(body.trim(), TITLE_SNIPPET_CHARS)
    )
}

/// Store path for a highlight. The random token keeps paths globally unique
/// even when two highlights derive the same slug.
pub fn highlight_path(title: &str) -> String {
    let token = Uuid::new_v4().simple().to_string();
    format!("{}-{}", slugify(title), &token[..8])
}
