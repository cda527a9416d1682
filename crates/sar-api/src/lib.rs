//! # sar-api: Request Dispatcher for the Simple Artefact Registry
//!
//! Terminates HTTP, resolves bearer credentials to a principal, checks the
//! authorization policy, and streams artefact bytes to and from the storage
//! engine.
//!
//! ## API Surface
//!
//! | Route | Module |
//! |---|---|
//! | `/health/liveness`, `/health/readiness` | this module (no auth) |
//! | `/artefacts/*` | [`routes::artefacts`] |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → AuthMiddleware → Handler (policy check → store)
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use axum::middleware::from_fn;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Assemble the application router.
///
/// Health probes are mounted outside the auth middleware so they answer
/// without credentials.
pub fn app(state: AppState) -> Router {
    let credentials = state.credentials.clone();

    let api = Router::new()
        .merge(routes::artefacts::router())
        .layer(from_fn(auth::auth_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(axum::Extension(credentials))
        .with_state(state);

    let health = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness));

    Router::new().merge(health).merge(api)
}

/// Liveness probe: 200 while the process runs.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe: the store is opened before the router is built, so a
/// serving process is ready.
async fn readiness() -> &'static str {
    "ready"
}
