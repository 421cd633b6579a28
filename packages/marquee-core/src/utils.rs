//! General utilities shared across the application.

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current Unix timestamp in milliseconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen in practice).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Generates a fresh opaque entity id.
#[must_use]
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Validates a tenant slug: lowercase alphanumerics and hyphens, non-empty.
///
/// Slugs appear in URLs and settings keys, so the charset is deliberately narrow.
pub fn validate_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Validates a filename for static content serving.
///
/// Rejects path separators and dot-prefixed names so a request can never
/// escape the content directory.
pub fn safe_filename(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains("..")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_millis_is_recent() {
        // Anything after 2020-01-01 counts as a sane clock.
        assert!(now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn slug_accepts_kebab_case() {
        assert!(validate_slug("parkwise"));
        assert!(validate_slug("acme-north-2"));
    }

    #[test]
    fn slug_rejects_bad_charsets() {
        assert!(!validate_slug(""));
        assert!(!validate_slug("Acme"));
        assert!(!validate_slug("a b"));
        assert!(!validate_slug("a_b"));
    }

    #[test]
    fn filename_traversal_rejected() {
        assert!(safe_filename("promo.mp4"));
        assert!(!safe_filename("../etc/passwd"));
        assert!(!safe_filename("a/b.mp4"));
        assert!(!safe_filename(".hidden"));
        assert!(!safe_filename(""));
    }
}
