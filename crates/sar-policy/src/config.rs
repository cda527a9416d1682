//! # Authorization Configuration
//!
//! The `authorization:` section of the registry configuration, as parsed
//! from YAML, and its validation into a [`PolicySet`] plus the credential
//! table the request layer authenticates against.
//!
//! ```yaml
//! enabled: true
//! principals:
//!   - id: alice
//!     token: alice-secret
//!     claims: {team: a}
//! rules:
//!   - pattern: "team-a/*"
//!     operation: write
//!     principal: {id: alice}
//!     effect: allow
//!   - pattern: "internal"
//!     operation: read
//!     principal: anonymous
//!     effect: deny
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Deserialize;

use crate::error::PolicyConfigurationError;
use crate::pattern::PathPattern;
use crate::principal::{Principal, PrincipalMatch, ANONYMOUS_ID};
use crate::rule::{Effect, Operation, PolicyRule, PolicySet};

/// Raw `authorization:` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthorizationConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub principals: Vec<PrincipalConfig>,
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// A configured caller and the bearer token that identifies them.
#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrincipalConfig {
    pub id: String,
    pub token: String,
    #[serde(default)]
    pub claims: BTreeMap<String, String>,
}

impl std::fmt::Debug for PrincipalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrincipalConfig")
            .field("id", &self.id)
            .field("token", &"[REDACTED]")
            .field("claims", &self.claims)
            .finish()
    }
}

/// One raw rule. Operation and effect stay strings until validation so a
/// typo is reported with the rule's position.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleConfig {
    pub pattern: String,
    pub operation: String,
    #[serde(default)]
    pub principal: Option<PrincipalSelector>,
    pub effect: String,
}

/// `principal:` of a rule: a keyword or an `{id, claims}` mapping.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PrincipalSelector {
    Keyword(String),
    Spec(PrincipalSpec),
}

/// The mapping form of a rule's `principal:`. At least one of `id` and
/// `claims` must be given.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrincipalSpec {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub claims: BTreeMap<String, String>,
}

/// A validated credential. `Debug` never prints the token.
#[derive(Clone)]
pub struct Credential {
    pub principal: Principal,
    pub token: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("principal", &self.principal.id())
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// The result of loading an [`AuthorizationConfig`].
#[derive(Debug, Clone)]
pub struct LoadedAuthorization {
    pub policy: PolicySet,
    pub credentials: Vec<Credential>,
}

impl AuthorizationConfig {
    /// Parse the section from YAML text.
    pub fn from_yaml(text: &str) -> Result<Self, PolicyConfigurationError> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Validate every rule and credential.
    pub fn load(&self) -> Result<LoadedAuthorization, PolicyConfigurationError> {
        let credentials = self.credentials()?;
        let declared: HashSet<&str> = credentials.iter().map(|c| c.principal.id()).collect();
        let rules = self
            .rules
            .iter()
            .enumerate()
            .map(|(index, raw)| raw.validate(index, &declared))
            .collect::<Result<Vec<_>, _>>()?;

        let policy = if self.enabled {
            PolicySet::enabled(rules)
        } else {
            if !rules.is_empty() {
                tracing::warn!(rules = rules.len(), "authorization disabled; configured rules are ignored");
            }
            PolicySet::disabled()
        };
        Ok(LoadedAuthorization {
            policy,
            credentials,
        })
    }

    fn credentials(&self) -> Result<Vec<Credential>, PolicyConfigurationError> {
        let mut ids: HashMap<&str, usize> = HashMap::new();
        let mut tokens: HashMap<&str, &str> = HashMap::new();
        let mut out = Vec::with_capacity(self.principals.len());

        for (index, p) in self.principals.iter().enumerate() {
            let invalid = |reason: &str| PolicyConfigurationError::InvalidCredential {
                index,
                reason: reason.to_string(),
            };
            if p.id.trim().is_empty() {
                return Err(invalid("empty id"));
            }
            if p.id == ANONYMOUS_ID {
                return Err(invalid("the id \"anonymous\" is reserved"));
            }
            if p.token.trim().is_empty() {
                return Err(invalid("empty token"));
            }
            if ids.insert(&p.id, index).is_some() {
                return Err(PolicyConfigurationError::DuplicatePrincipal(p.id.clone()));
            }
            if let Some(first) = tokens.insert(&p.token, &p.id) {
                return Err(PolicyConfigurationError::DuplicateToken {
                    first: first.to_string(),
                    second: p.id.clone(),
                });
            }
            out.push(Credential {
                principal: Principal::authenticated(p.id.clone(), p.claims.clone()),
                token: p.token.clone(),
            });
        }
        Ok(out)
    }
}

impl RuleConfig {
    fn validate(&self, rule: usize, declared: &HashSet<&str>) -> Result<PolicyRule, PolicyConfigurationError> {
        let pattern: PathPattern =
            self.pattern
                .parse()
                .map_err(|reason| PolicyConfigurationError::InvalidPattern {
                    rule,
                    pattern: self.pattern.clone(),
                    reason,
                })?;
        let operation: Operation = self
            .operation
            .parse()
            .map_err(|value| PolicyConfigurationError::UnknownOperation { rule, value })?;
        let effect: Effect = self
            .effect
            .parse()
            .map_err(|value| PolicyConfigurationError::UnknownEffect { rule, value })?;
        let principal = match &self.principal {
            None => PrincipalMatch::Any,
            Some(PrincipalSelector::Keyword(k)) => match k.as_str() {
                "any" => PrincipalMatch::Any,
                "anonymous" => PrincipalMatch::Anonymous,
                "authenticated" => PrincipalMatch::Authenticated,
                other => {
                    return Err(PolicyConfigurationError::UnknownPrincipal {
                        rule,
                        value: other.to_string(),
                    })
                }
            },
            Some(PrincipalSelector::Spec(spec)) => spec.validate(rule, declared)?,
        };
        Ok(PolicyRule {
            pattern,
            operation,
            principal,
            effect,
        })
    }
}

impl PrincipalSpec {
    fn validate(&self, rule: usize, declared: &HashSet<&str>) -> Result<PrincipalMatch, PolicyConfigurationError> {
        let invalid = |reason: String| PolicyConfigurationError::InvalidPrincipal { rule, reason };
        if self.id.is_none() && self.claims.is_empty() {
            return Err(invalid("an empty mapping matches nobody in particular; use \"authenticated\"".into()));
        }
        if let Some(id) = &self.id {
            if !declared.contains(id.as_str()) {
                return Err(invalid(format!("no principal with id \"{id}\" is declared")));
            }
        }
        Ok(PrincipalMatch::Where {
            id: self.id.clone(),
            claims: self.claims.clone(),
        })
    }
}
