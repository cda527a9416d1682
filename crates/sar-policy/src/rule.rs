//! # Rules and Evaluation
//!
//! [`PolicySet::authorize()`] is the request-time entry point. It is pure:
//! the same principal, operation, coordinate and rule set always produce the
//! same [`Decision`].

use std::fmt;
use std::str::FromStr;

use sar_core::ArtefactIdentity;
use tracing::debug;

use crate::pattern::PathPattern;
use crate::principal::{Principal, PrincipalMatch};

/// What the caller wants to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    Write,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            other => Err(other.to_string()),
        }
    }
}

/// What a matching rule does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

impl FromStr for Effect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            other => Err(other.to_string()),
        }
    }
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

impl From<Effect> for Decision {
    fn from(effect: Effect) -> Self {
        match effect {
            Effect::Allow => Self::Allow,
            Effect::Deny => Self::Deny,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
        })
    }
}

/// One entry of the ordered rule table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyRule {
    pub pattern: PathPattern,
    pub operation: Operation,
    pub principal: PrincipalMatch,
    pub effect: Effect,
}

impl PolicyRule {
    fn applies(&self, principal: &Principal, operation: Operation, namespace: &str, name: &str) -> bool {
        self.operation == operation
            && self.pattern.matches(namespace, name)
            && self.principal.matches(principal)
    }
}

/// The loaded, immutable rule table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicySet {
    enabled: bool,
    rules: Vec<PolicyRule>,
}

impl PolicySet {
    /// An enabled policy evaluating `rules` in order.
    pub fn enabled(rules: Vec<PolicyRule>) -> Self {
        Self {
            enabled: true,
            rules,
        }
    }

    /// A policy that allows everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn rules(&self) -> &[PolicyRule] {
        &self.rules
    }

    /// Decide whether `principal` may perform `operation` on `identity`.
    pub fn authorize(
        &self,
        principal: &Principal,
        operation: Operation,
        identity: &ArtefactIdentity,
    ) -> Decision {
        self.authorize_coordinates(principal, operation, identity.namespace(), identity.name())
    }

    /// [`authorize`](Self::authorize) for requests that carry no version,
    /// such as listings.
    pub fn authorize_coordinates(
        &self,
        principal: &Principal,
        operation: Operation,
        namespace: &str,
        name: &str,
    ) -> Decision {
        if !self.enabled {
            return Decision::Allow;
        }

        let matched = self
            .rules
            .iter()
            .enumerate()
            .find(|(_, rule)| rule.applies(principal, operation, namespace, name));

        match matched {
            Some((index, rule)) => {
                debug!(
                    principal = %principal,
                    %operation,
                    namespace,
                    name,
                    rule = index,
                    effect = ?rule.effect,
                    "policy rule matched"
                );
                rule.effect.into()
            }
            None => {
                let fallback = match operation {
                    Operation::Read => Decision::Allow,
                    Operation::Write => Decision::Deny,
                };
                debug!(
                    principal = %principal,
                    %operation,
                    namespace,
                    name,
                    decision = %fallback,
                    "no policy rule matched; using default"
                );
                fallback
            }
        }
    }
}
