//! Callers and the predicates rules use to select them.

use std::collections::BTreeMap;
use std::fmt;

/// Id carried by the anonymous principal. Reserved; no credential may use it.
pub const ANONYMOUS_ID: &str = "anonymous";

/// Whether the caller presented valid credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrincipalKind {
    Anonymous,
    Authenticated,
}

/// The actor making a request.
///
/// Attributes are a fixed claim → value map taken from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    id: String,
    attributes: BTreeMap<String, String>,
    kind: PrincipalKind,
}

impl Principal {
    /// The caller who presented no credentials.
    pub fn anonymous() -> Self {
        Self {
            id: ANONYMOUS_ID.to_string(),
            attributes: BTreeMap::new(),
            kind: PrincipalKind::Anonymous,
        }
    }

    /// A caller identified by `id` with the given claims.
    pub fn authenticated(id: impl Into<String>, attributes: BTreeMap<String, String>) -> Self {
        Self {
            id: id.into(),
            attributes,
            kind: PrincipalKind::Authenticated,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> PrincipalKind {
        self.kind
    }

    pub fn is_anonymous(&self) -> bool {
        self.kind == PrincipalKind::Anonymous
    }

    /// Value of claim `name`, if present.
    pub fn claim(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Predicate over [`Principal`] used by a rule.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PrincipalMatch {
    /// Every caller.
    #[default]
    Any,
    /// Only callers without credentials.
    Anonymous,
    /// Any caller with valid credentials.
    Authenticated,
    /// Authenticated callers with this id (if set) holding every listed claim.
    Where {
        id: Option<String>,
        claims: BTreeMap<String, String>,
    },
}

impl PrincipalMatch {
    pub fn matches(&self, principal: &Principal) -> bool {
        match self {
            Self::Any => true,
            Self::Anonymous => principal.is_anonymous(),
            Self::Authenticated => !principal.is_anonymous(),
            Self::Where { id, claims } => {
                !principal.is_anonymous()
                    && id.as_deref().map_or(true, |id| id == principal.id())
                    && claims
                        .iter()
                        .all(|(k, v)| principal.claim(k) == Some(v.as_str()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Principal {
        Principal::authenticated(
            "alice",
            BTreeMap::from([("team".to_string(), "a".to_string())]),
        )
    }

    #[test]
    fn anonymous_principal_shape() {
        let anon = Principal::anonymous();
        assert_eq!(anon.id(), ANONYMOUS_ID);
        assert!(anon.attributes().is_empty());
        assert_eq!(anon.kind(), PrincipalKind::Anonymous);
    }

    #[test]
    fn keyword_matches() {
        let anon = Principal::anonymous();
        assert!(PrincipalMatch::Any.matches(&anon));
        assert!(PrincipalMatch::Anonymous.matches(&anon));
        assert!(!PrincipalMatch::Authenticated.matches(&anon));
        assert!(PrincipalMatch::Authenticated.matches(&alice()));
        assert!(!PrincipalMatch::Anonymous.matches(&alice()));
    }

    #[test]
    fn where_match_checks_id_and_claims() {
        let by_id = PrincipalMatch::Where {
            id: Some("alice".into()),
            claims: BTreeMap::new(),
        };
        assert!(by_id.matches(&alice()));
        assert!(!by_id.matches(&Principal::authenticated("bob", BTreeMap::new())));

        let by_claim = PrincipalMatch::Where {
            id: None,
            claims: BTreeMap::from([("team".to_string(), "a".to_string())]),
        };
        assert!(by_claim.matches(&alice()));
        assert!(!by_claim.matches(&Principal::authenticated("carol", BTreeMap::new())));
    }

    #[test]
    fn where_match_never_selects_anonymous() {
        let m = PrincipalMatch::Where {
            id: Some(ANONYMOUS_ID.into()),
            claims: BTreeMap::new(),
        };
        assert!(!m.matches(&Principal::anonymous()));
    }
}
