//! Load-time policy errors.

use thiserror::Error;

/// A malformed authorization configuration.
///
/// Raised only while loading; a loaded [`PolicySet`](crate::PolicySet)
/// never errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyConfigurationError {
    /// The configuration text is not valid YAML for the expected shape.
    #[error("invalid authorization configuration: {0}")]
    Parse(String),

    /// A rule names an operation other than `read` or `write`.
    #[error("rule {rule}: unknown operation \"{value}\" (expected read or write)")]
    UnknownOperation { rule: usize, value: String },

    /// A rule names an effect other than `allow` or `deny`.
    #[error("rule {rule}: unknown effect \"{value}\" (expected allow or deny)")]
    UnknownEffect { rule: usize, value: String },

    /// A rule's path pattern could not be parsed.
    #[error("rule {rule}: invalid pattern \"{pattern}\": {reason}")]
    InvalidPattern {
        rule: usize,
        pattern: String,
        reason: String,
    },

    /// A rule's principal keyword is not `any`, `anonymous` or `authenticated`.
    #[error("rule {rule}: unknown principal \"{value}\" (expected any, anonymous, authenticated or {{id, claims}})")]
    UnknownPrincipal { rule: usize, value: String },

    /// A rule's `{id, claims}` selector is empty or names an undeclared id.
    #[error("rule {rule}: invalid principal selector: {reason}")]
    InvalidPrincipal { rule: usize, reason: String },

    /// Two principals share an id.
    #[error("principal \"{0}\" is declared more than once")]
    DuplicatePrincipal(String),

    /// Two principals share a token.
    #[error("principals \"{first}\" and \"{second}\" share a token")]
    DuplicateToken { first: String, second: String },

    /// A principal has an empty id or token, or uses the reserved anonymous id.
    #[error("principal {index}: {reason}")]
    InvalidCredential { index: usize, reason: String },
}

impl From<serde_yaml::Error> for PolicyConfigurationError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Parse(err.to_string())
    }
}
