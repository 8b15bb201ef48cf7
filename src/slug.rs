//! Slug derivation for blog posts.
//!
//! Titles map to URL-safe identifiers: lowercase, spaces become hyphens,
//! everything outside `[a-z0-9_-]` is stripped. Pure and deterministic;
//! a title with no eligible characters yields an empty string, which the
//! post handlers reject before touching the database.

use regex::Regex;

lazy_static::lazy_static! {
    static ref NON_SLUG: Regex = Regex::new(r"[^a-z0-9_-]").unwrap();
}

/// Derive a slug from a post title.
pub fn slugify(title: &str) -> String {
    let hyphenated = title.to_lowercase().replace(' ', "-");
    NON_SLUG.replace_all(&hyphenated, "").into_owned()
}
