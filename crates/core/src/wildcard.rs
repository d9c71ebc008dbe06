//! Shell-style wildcard matching for keys and groups.
//!
//! Patterns support `*`, `?`, bracket classes (`[a-z]`, `[!0-9]`) and
//! `{a,b}` alternation. `*` crosses `/` and `.` so that a key such as
//! `P.3` or `std/vector` is matched by `p*`.

use globset::{GlobBuilder, GlobMatcher};

use crate::{FactoidError, Result};

/// A compiled wildcard pattern.
#[derive(Debug, Clone)]
pub struct WildPattern {
    matcher: GlobMatcher,
}

impl WildPattern {
    /// Compile `pattern`, optionally ignoring ASCII/Unicode case.
    pub fn new(pattern: &str, case_insensitive: bool) -> Result<Self> {
        let glob = GlobBuilder::new(pattern)
            .case_insensitive(case_insensitive)
            .literal_separator(false)
            .backslash_escape(true)
            .build()
            .map_err(|e| FactoidError::InvalidPattern(format!("{pattern}: {e}")))?;
        Ok(Self {
            matcher: glob.compile_matcher(),
        })
    }

    pub fn is_match(&self, candidate: &str) -> bool {
        self.matcher.is_match(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, candidate: &str, ci: bool) -> bool {
        WildPattern::new(pattern, ci).unwrap().is_match(candidate)
    }

    #[test]
    fn star_and_question_mark() {
        assert!(matches("foo*", "foobar", false));
        assert!(matches("f?o", "foo", false));
        assert!(!matches("f?o", "fooo", false));
    }

    #[test]
    fn star_crosses_dots_and_slashes() {
        assert!(matches("p*", "p.3", false));
        assert!(matches("std*vector", "std/vector", false));
    }

    #[test]
    fn bracket_classes_and_alternation() {
        assert!(matches("p.[0-9]", "p.7", false));
        assert!(!matches("p.[!0-9]", "p.7", false));
        assert!(matches("{enum,con}.*", "con.2", false));
        assert!(!matches("{enum,con}.*", "per.2", false));
    }

    #[test]
    fn case_folding_is_opt_in() {
        assert!(matches("foo.*", "Foo.1", true));
        assert!(!matches("foo.*", "Foo.1", false));
    }

    #[test]
    fn malformed_pattern_is_rejected() {
        let err = WildPattern::new("[abc", false).unwrap_err();
        assert!(matches!(err, FactoidError::InvalidPattern(_)));
    }
}
