/// Derive a URL-safe slug from a title: lowercase ASCII alphanumerics joined by single hyphens.
///
/// Titles with nothing usable ("!!!", non-Latin scripts) fall back to `article`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else if c == '\'' || c == '’' {
            // "What's new" -> "whats-new"
            continue;
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        "article".to_string()
    } else {
        slug
    }
}

/// `base`, `base-1`, `base-2`, ... : the n-th candidate tried when resolving collisions.
pub fn with_suffix(base: &str, n: u32) -> String {
    if n == 0 {
        base.to_string()
    } else {
        format!("{}-{}", base, n)
    }
}
