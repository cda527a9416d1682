//! # sar-policy: Authorization Policy Evaluator
//!
//! Decides whether a [`Principal`] may read or write an artefact before the
//! storage engine is touched.
//!
//! A [`PolicySet`] is an ordered list of [`PolicyRule`]s plus an enabled
//! flag, loaded once at startup from configuration and never mutated. Each
//! rule pairs a `namespace[/name]` [`PathPattern`], an [`Operation`], and a
//! [`PrincipalMatch`] with an [`Effect`]. Evaluation walks the rules
//! top-down and returns the first match's effect.
//!
//! ## Defaults
//!
//! | Authorization | No rule matches |
//! |---|---|
//! | disabled | every request is allowed, rules are ignored |
//! | enabled, read | [`Decision::Allow`] |
//! | enabled, write | [`Decision::Deny`] |
//!
//! Malformed configuration fails at load with a
//! [`PolicyConfigurationError`]; request-time evaluation cannot fail.

pub mod config;
pub mod error;
pub mod pattern;
pub mod principal;
pub mod rule;

pub use config::{AuthorizationConfig, Credential, LoadedAuthorization};
pub use error::PolicyConfigurationError;
pub use pattern::PathPattern;
pub use principal::{Principal, PrincipalKind, PrincipalMatch, ANONYMOUS_ID};
pub use rule::{Decision, Effect, Operation, PolicyRule, PolicySet};
