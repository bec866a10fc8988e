//! Hierarchical registration strings.
//!
//! Modules and connector types are named with slash separated paths such as
//! `org/chromaflow/color/matrix`. A pattern selects a registration when its
//! segments appear in the registration in the same order. Segments may be
//! skipped, so `color/matrix` selects `org/chromaflow/color/matrix`. A pattern
//! segment ending in `*` matches any registration segment with that prefix.

/// Split a registration into its non-empty segments.
pub fn segments(registration: &str) -> impl Iterator<Item = &str> {
    registration.split('/').filter(|s| !s.is_empty())
}

/// Whether `pattern` selects `registration`. The empty pattern selects everything.
pub fn matches(pattern: &str, registration: &str) -> bool {
    let mut remaining = segments(registration);
    'pattern: for wanted in segments(pattern) {
        for candidate in remaining.by_ref() {
            if segment_matches(wanted, candidate) {
                continue 'pattern;
            }
        }
        return false;
    }
    true
}

fn segment_matches(wanted: &str, candidate: &str) -> bool {
    match wanted.strip_suffix('*') {
        Some(prefix) => candidate.starts_with(prefix),
        None => wanted == candidate,
    }
}

/// A registration must have at least one segment and no whitespace.
pub fn is_valid(registration: &str) -> bool {
    segments(registration).next().is_some() && !registration.chars().any(char::is_whitespace)
}

/// Last segment, used as a short display name.
pub fn leaf(registration: &str) -> &str {
    segments(registration).last().unwrap_or(registration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ordered_subsequence_match() {
        assert!(matches("color/matrix", "org/chromaflow/color/matrix"));
        assert!(matches("org/matrix", "org/chromaflow/color/matrix"));
        assert!(!matches("matrix/color", "org/chromaflow/color/matrix"));
        assert!(!matches("color/gamma", "org/chromaflow/color/matrix"));
    }

    #[test]
    fn test_wildcard_segment() {
        assert!(matches("image/pix*", "org/chromaflow/image/pixel"));
        assert!(!matches("image/pix*", "org/chromaflow/image/root"));
    }

    #[test]
    fn test_empty_pattern_matches_everything() {
        assert!(matches("", "org/chromaflow/image/root"));
        assert!(matches("//", "anything"));
    }

    #[test]
    fn test_validity_and_leaf() {
        assert!(is_valid("org/chromaflow/color/matrix"));
        assert!(!is_valid(""));
        assert!(!is_valid("org/chroma flow"));
        assert_eq!(leaf("org/chromaflow/color/matrix"), "matrix");
    }

    proptest! {
        #[test]
        fn test_registration_matches_itself(
            segs in prop::collection::vec("[a-z][a-z0-9_]{0,6}", 1..6)
        ) {
            let reg = segs.join("/");
            prop_assert!(matches(&reg, &reg));
        }

        #[test]
        fn test_any_ordered_subset_matches(
            segs in prop::collection::vec("[a-z][a-z0-9_]{0,6}", 1..6),
            mask in prop::collection::vec(any::<bool>(), 6)
        ) {
            let reg = segs.join("/");
            let pattern: Vec<&str> = segs
                .iter()
                .zip(mask.iter())
                .filter(|(_, keep)| **keep)
                .map(|(s, _)| s.as_str())
                .collect();
            prop_assert!(matches(&pattern.join("/"), &reg));
        }
    }
}
