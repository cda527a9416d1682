//! # Path Patterns
//!
//! A pattern selects artefacts by `namespace[/name]`:
//!
//! | Pattern | Matches |
//! |---|---|
//! | `*` | everything |
//! | `team-a` | every artefact in namespace `team-a` |
//! | `team-a/*` | same as `team-a` |
//! | `team-a/lib` | every version of `team-a/lib` |
//! | `team-*/lib-*` | names starting `lib-` in namespaces starting `team-` |
//!
//! Versions are never part of a pattern.

use std::fmt;
use std::str::FromStr;

use sar_core::validate_segment;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Any,
    Exact(String),
    Prefix(String),
}

impl Segment {
    fn parse(component: &'static str, raw: &str) -> Result<Self, String> {
        if raw == "*" {
            return Ok(Self::Any);
        }
        let (literal, prefix) = match raw.strip_suffix('*') {
            Some(stem) => (stem, true),
            None => (raw, false),
        };
        if literal.contains('*') {
            return Err(format!("{component} segment \"{raw}\": '*' is only allowed at the end"));
        }
        if prefix {
            // A prefix may end in '.', so only the character set is checked.
            if literal.is_empty() || !literal.bytes().all(is_identity_byte) {
                return Err(format!("{component} segment \"{raw}\" has an invalid prefix"));
            }
            return Ok(Self::Prefix(literal.to_string()));
        }
        validate_segment(component, literal).map_err(|e| e.to_string())?;
        Ok(Self::Exact(literal.to_string()))
    }

    fn matches(&self, value: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(s) => value == s,
            Self::Prefix(p) => value.starts_with(p.as_str()),
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Exact(s) => f.write_str(s),
            Self::Prefix(p) => write!(f, "{p}*"),
        }
    }
}

fn is_identity_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-')
}

/// A parsed `namespace[/name]` pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    namespace: Segment,
    name: Segment,
}

impl PathPattern {
    /// Whether the pattern selects artefacts under `namespace/name`.
    pub fn matches(&self, namespace: &str, name: &str) -> bool {
        self.namespace.matches(namespace) && self.name.matches(name)
    }
}

impl FromStr for PathPattern {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let mut parts = raw.split('/');
        let namespace = match parts.next() {
            Some(s) if !s.is_empty() => Segment::parse("namespace", s)?,
            _ => return Err("pattern is empty".to_string()),
        };
        let name = match parts.next() {
            None => Segment::Any,
            Some("") => return Err("empty name segment".to_string()),
            Some(s) => Segment::parse("name", s)?,
        };
        if parts.next().is_some() {
            return Err("patterns select namespace[/name]; versions cannot be matched".to_string());
        }
        Ok(Self { namespace, name })
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(raw: &str) -> PathPattern {
        raw.parse().unwrap()
    }

    #[test]
    fn wildcard_matches_everything() {
        assert!(p("*").matches("any", "thing"));
        assert!(p("*/*").matches("any", "thing"));
    }

    #[test]
    fn namespace_only_pattern() {
        let pat = p("team-a");
        assert!(pat.matches("team-a", "lib"));
        assert!(!pat.matches("team-ab", "lib"));
        assert_eq!(pat, p("team-a/*"));
    }

    #[test]
    fn exact_name() {
        let pat = p("team-a/lib");
        assert!(pat.matches("team-a", "lib"));
        assert!(!pat.matches("team-a", "lib2"));
    }

    #[test]
    fn prefix_segments() {
        let pat = p("team-*/lib-*");
        assert!(pat.matches("team-a", "lib-core"));
        assert!(pat.matches("team-", "lib-"));
        assert!(!pat.matches("squad-a", "lib-core"));
        assert!(!pat.matches("team-a", "core"));
    }

    #[test]
    fn display_is_normalized() {
        assert_eq!(p("team-a").to_string(), "team-a/*");
        assert_eq!(p("t*/lib").to_string(), "t*/lib");
    }

    #[test]
    fn rejects_malformed_patterns() {
        for bad in ["", "/lib", "a/", "a/b/c", "a*b", "*a", "a/**", "../x", "a b", "**"] {
            assert!(bad.parse::<PathPattern>().is_err(), "{bad:?} should be rejected");
        }
    }
}
