//! Short type name to media type lookup.
//!
//! Accepts bare extensions (`json`), dotted extensions (`.json`) and file
//! names (`report.json`). Names `mime_guess` does not know resolve to
//! [`DEFAULT_MEDIA_TYPE`].

/// Media type assumed when nothing more specific is known (RFC 2616 §7.2.1).
pub const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

/// Resolve a short name or file name to its media type.
pub fn lookup(name: &str) -> &'static str {
    let extension = name
        .rsplit(['.', '/', '\\'])
        .next()
        .unwrap_or(name)
        .trim()
        .to_ascii_lowercase();

    mime_guess::from_ext(&extension)
        .first_raw()
        .unwrap_or(DEFAULT_MEDIA_TYPE)
}

/// Expand `name` through [`lookup`] unless it already is a `type/subtype` pair.
pub fn normalize(name: &str) -> &str {
    if name.contains('/') {
        name
    } else {
        lookup(name)
    }
}
