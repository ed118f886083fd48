//! URL-style slugs for tag and correspondent names.

/// Lowercases `name` and collapses every run of non-alphanumeric characters
/// into a single `-`, trimming leading and trailing dashes.
///
/// ```
/// use papertray::filename::slugify;
///
/// assert_eq!(slugify("ACME Corp."), "acme-corp");
/// assert_eq!(slugify("  tax -- 2019 "), "tax-2019");
/// ```
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}
