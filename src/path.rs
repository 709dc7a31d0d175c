//! Path grammars
//!
//! Two grammars govern dotted paths. The strict grammar covers canonical
//! procedure paths: lowercase identifiers, dot separated, ASCII only. The
//! relaxed grammar additionally permits uppercase letters inside segments
//! and exists solely for legacy alias names (camelCase survivors). Every
//! strict path is also a relaxed path.

use regex::Regex;
use std::sync::LazyLock;

static STRICT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9_]*(\.[a-z][a-z0-9_]*)*$").expect("strict path grammar")
});

static RELAXED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_]*(\.[A-Za-z][A-Za-z0-9_]*)*$").expect("relaxed path grammar")
});

/// Whether `path` is a canonical procedure path (strict grammar).
pub fn is_strict(path: &str) -> bool {
    path.is_ascii() && STRICT.is_match(path)
}

/// Whether `path` matches the relaxed grammar used for alias names.
pub fn is_relaxed(path: &str) -> bool {
    path.is_ascii() && RELAXED.is_match(path)
}

/// Whether `segment` is a single strict-grammar identifier.
pub fn is_strict_segment(segment: &str) -> bool {
    is_strict(segment) && !segment.contains('.')
}

/// Whether `path` is acceptable at a call site: either grammar.
pub fn is_callable(path: &str) -> bool {
    is_strict(path) || is_relaxed(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_accepts_canonical_paths() {
        assert!(is_strict("users.get"));
        assert!(is_strict("health"));
        assert!(is_strict("admin.audit_log.list_v2"));
    }

    #[test]
    fn strict_rejects_malformed_paths() {
        assert!(!is_strict(""));
        assert!(!is_strict("Invalid..Path"));
        assert!(!is_strict(".users"));
        assert!(!is_strict("users."));
        assert!(!is_strict("users..get"));
        assert!(!is_strict("users.Get"));
        assert!(!is_strict("2users.get"));
        assert!(!is_strict("users-get"));
        assert!(!is_strict("usérs.get"));
    }

    #[test]
    fn relaxed_permits_camel_case() {
        assert!(is_relaxed("getUsers"));
        assert!(is_relaxed("Users.getById"));
        assert!(!is_relaxed("get-users"));
        assert!(!is_relaxed("..x"));
    }

    #[test]
    fn segments_are_single_identifiers() {
        assert!(is_strict_segment("users"));
        assert!(!is_strict_segment("users.get"));
        assert!(!is_strict_segment("Users"));
    }
}
