//! # Authentication Middleware
//!
//! Resolves the `Authorization` header to a [`Principal`] and injects it
//! into request extensions as a [`Caller`]:
//!
//! | Header | Result |
//! |---|---|
//! | absent | anonymous principal |
//! | `Bearer <known token>` (scheme in any case) | that principal |
//! | `Bearer <unknown token>` | 401 |
//! | any other scheme | 401 |
//!
//! Whether the resolved principal may perform the operation is decided per
//! route by the policy; see [`authorize`].

use std::sync::Arc;

use axum::extract::Request;
use axum::http::header;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sar_core::ArtefactIdentity;
use sar_policy::{Credential, Operation, PolicySet, Principal};
use subtle::ConstantTimeEq;

use crate::error::AppError;

/// Known bearer tokens. Shared read-only across requests.
#[derive(Clone, Default)]
pub struct Credentials {
    entries: Arc<Vec<Credential>>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("principals", &self.entries.len())
            .finish()
    }
}

impl Credentials {
    pub fn new(entries: Vec<Credential>) -> Self {
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Find the principal owning `token`.
    ///
    /// Every entry is compared so the time taken does not depend on which
    /// one matched.
    pub fn authenticate(&self, token: &str) -> Option<Principal> {
        let mut found = None;
        for entry in self.entries.iter() {
            if constant_time_token_eq(token, &entry.token) && found.is_none() {
                found = Some(entry.principal.clone());
            }
        }
        found
    }
}

fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// The authenticated (or anonymous) caller of the current request.
#[derive(Debug, Clone)]
pub struct Caller(pub Principal);

impl<S: Send + Sync> axum::extract::FromRequestParts<S> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Caller>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no caller in request context".into()))
    }
}

/// Split `Bearer <token>`, accepting the scheme in any case.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Resolve credentials and attach a [`Caller`] to the request.
///
/// Requires a [`Credentials`] extension layered outside this middleware.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let credentials = request
        .extensions()
        .get::<Credentials>()
        .cloned()
        .unwrap_or_default();

    let header_value = request.headers().get(header::AUTHORIZATION);
    let principal = match header_value {
        None => Principal::anonymous(),
        Some(value) => {
            let token = value.to_str().ok().and_then(bearer_token);
            match token.and_then(|t| credentials.authenticate(t)) {
                Some(principal) => principal,
                None if token.is_none() => {
                    tracing::warn!("authentication failed: authorization header is not a bearer token");
                    return AppError::Unauthorized("authorization header must use the Bearer scheme".into())
                        .into_response();
                }
                None => {
                    tracing::warn!("authentication failed: unknown bearer token");
                    return AppError::Unauthorized("invalid bearer token".into()).into_response();
                }
            }
        }
    };

    request.extensions_mut().insert(Caller(principal));
    next.run(request).await
}

/// Check `caller` against `policy` for an artefact operation.
///
/// Denials are 401 for anonymous callers, who may retry with credentials,
/// and 403 for authenticated ones.
pub fn authorize(
    policy: &PolicySet,
    caller: &Principal,
    operation: Operation,
    identity: &ArtefactIdentity,
) -> Result<(), AppError> {
    authorize_coordinates(policy, caller, operation, identity.namespace(), identity.name())
}

/// [`authorize`] for requests without a version.
pub fn authorize_coordinates(
    policy: &PolicySet,
    caller: &Principal,
    operation: Operation,
    namespace: &str,
    name: &str,
) -> Result<(), AppError> {
    if policy
        .authorize_coordinates(caller, operation, namespace, name)
        .is_allowed()
    {
        return Ok(());
    }
    tracing::warn!(principal = %caller, %operation, namespace, name, "request denied by policy");
    if caller.is_anonymous() {
        Err(AppError::Unauthorized(format!(
            "{operation} access to {namespace}/{name} requires credentials"
        )))
    } else {
        Err(AppError::Forbidden(format!(
            "{caller} may not {operation} {namespace}/{name}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::middleware::from_fn;
    use axum::routing::get;
    use axum::Router;
    use http_body_util::BodyExt;
    use std::collections::BTreeMap;
    use tower::ServiceExt;

    fn credentials() -> Credentials {
        Credentials::new(vec![
            Credential {
                principal: Principal::authenticated("alice", BTreeMap::new()),
                token: "alice-token".into(),
            },
            Credential {
                principal: Principal::authenticated("bob", BTreeMap::new()),
                token: "bob-token".into(),
            },
        ])
    }

    fn test_app() -> Router {
        Router::new()
            .route("/whoami", get(|Caller(p): Caller| async move { p.id().to_string() }))
            .layer(from_fn(auth_middleware))
            .layer(axum::Extension(credentials()))
    }

    async fn call(auth: Option<&str>) -> (StatusCode, String) {
        let mut builder = Request::builder().uri("/whoami");
        if let Some(value) = auth {
            builder = builder.header("Authorization", value);
        }
        let response = test_app()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn no_header_is_anonymous() {
        assert_eq!(call(None).await, (StatusCode::OK, "anonymous".into()));
    }

    #[tokio::test]
    async fn known_token_resolves_principal() {
        assert_eq!(
            call(Some("Bearer bob-token")).await,
            (StatusCode::OK, "bob".into())
        );
    }

    #[tokio::test]
    async fn scheme_is_case_insensitive() {
        assert_eq!(
            call(Some("bearer alice-token")).await,
            (StatusCode::OK, "alice".into())
        );
    }

    #[tokio::test]
    async fn unknown_token_rejected() {
        let (status, _) = call(Some("Bearer nope")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn other_scheme_rejected() {
        let (status, _) = call(Some("Basic YWxpY2U6cHc=")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let (status, _) = call(Some("Bearer")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn bearer_token_parsing() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("BEARER  abc "), Some("abc"));
        assert_eq!(bearer_token("Token abc"), None);
        assert_eq!(bearer_token("Bearer "), None);
    }

    #[test]
    fn constant_time_eq_behaviour() {
        assert!(constant_time_token_eq("secret", "secret"));
        assert!(!constant_time_token_eq("secret", "secreT"));
        assert!(!constant_time_token_eq("short", "longer-secret"));
    }

    #[test]
    fn denial_status_depends_on_principal() {
        let policy = PolicySet::enabled(Vec::new());
        let id = sar_core::resolve("ns/lib/1.0").unwrap();
        let anon = authorize(&policy, &Principal::anonymous(), Operation::Write, &id);
        assert!(matches!(anon, Err(AppError::Unauthorized(_))));

        let bob = Principal::authenticated("bob", BTreeMap::new());
        let denied = authorize(&policy, &bob, Operation::Write, &id);
        assert!(matches!(denied, Err(AppError::Forbidden(_))));
        assert!(authorize(&policy, &bob, Operation::Read, &id).is_ok());
    }

    #[test]
    fn debug_hides_tokens() {
        assert!(!format!("{:?}", credentials()).contains("alice-token"));
    }
}
