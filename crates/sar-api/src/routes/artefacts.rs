//! # Artefact Routes
//!
//! - `GET    /artefacts/{namespace}/{name}/{version}`: download (HEAD for metadata only)
//! - `PUT    /artefacts/{namespace}/{name}/{version}`: upload, replacing any previous content
//! - `DELETE /artefacts/{namespace}/{name}/{version}`: remove
//! - `GET    /artefacts/{namespace}/{name}`: list versions
//!
//! Bodies stream in both directions; no artefact is buffered in memory.

use std::io;

use axum::body::Body;
use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use sar_core::{validate_segment, ArtefactIdentity};
use sar_policy::Operation;
use sar_store::ArtefactRecord;
use serde::{Deserialize, Serialize};

use crate::auth::{authorize, authorize_coordinates, Caller};
use crate::error::AppError;
use crate::state::AppState;

/// Header carrying `sha256:<hex>` on downloads.
pub const CHECKSUM_HEADER: &str = "x-artefact-checksum";
/// Header carrying the RFC 3339 commit time on downloads.
pub const CREATED_AT_HEADER: &str = "x-artefact-created-at";

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/artefacts/{namespace}/{name}/{version}",
            get(download).put(upload).delete(remove),
        )
        .route("/artefacts/{namespace}/{name}", get(list_versions))
}

/// Public view of a committed artefact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtefactResponse {
    pub namespace: String,
    pub name: String,
    pub version: String,
    pub size_bytes: u64,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
}

impl From<&ArtefactRecord> for ArtefactResponse {
    fn from(record: &ArtefactRecord) -> Self {
        Self {
            namespace: record.identity.namespace().to_string(),
            name: record.identity.name().to_string(),
            version: record.identity.version().to_string(),
            size_bytes: record.size_bytes,
            checksum: record.checksum.to_string(),
            created_at: record.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionListResponse {
    pub namespace: String,
    pub name: String,
    pub versions: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DownloadParams {
    /// Re-hash the stored bytes before sending them.
    #[serde(default)]
    pub verify: bool,
}

async fn download(
    State(state): State<AppState>,
    Caller(caller): Caller,
    path: Result<Path<(String, String, String)>, PathRejection>,
    query: Result<Query<DownloadParams>, QueryRejection>,
) -> Result<Response, AppError> {
    let Path((namespace, name, version)) = path?;
    let Query(params) = query?;
    let identity = ArtefactIdentity::new(namespace, name, version)?;
    authorize(&state.policy, &caller, Operation::Read, &identity)?;

    let (record, reader) = if params.verify {
        state.store.get_verified(&identity).await?
    } else {
        state.store.get(&identity).await?
    };

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(record.size_bytes));
    if let Ok(etag) = HeaderValue::from_str(&format!("\"{}\"", record.checksum.to_hex())) {
        headers.insert(header::ETAG, etag);
    }
    if let Ok(checksum) = HeaderValue::from_str(&record.checksum.to_string()) {
        headers.insert(CHECKSUM_HEADER, checksum);
    }
    if let Ok(created) = HeaderValue::from_str(&record.created_at.to_rfc3339()) {
        headers.insert(CREATED_AT_HEADER, created);
    }

    tracing::debug!(identity = %identity, size = record.size_bytes, verified = params.verify, "serving artefact");
    Ok((headers, Body::from_stream(reader.into_stream())).into_response())
}

async fn upload(
    State(state): State<AppState>,
    Caller(caller): Caller,
    path: Result<Path<(String, String, String)>, PathRejection>,
    headers: HeaderMap,
    body: Body,
) -> Result<(StatusCode, Json<ArtefactResponse>), AppError> {
    let Path((namespace, name, version)) = path?;
    let identity = ArtefactIdentity::new(namespace, name, version)?;
    authorize(&state.policy, &caller, Operation::Write, &identity)?;

    let declared_size = match headers.get(header::CONTENT_LENGTH) {
        None => None,
        Some(value) => Some(
            value
                .to_str()
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .ok_or_else(|| AppError::BadRequest("invalid Content-Length header".into()))?,
        ),
    };

    let content = body.into_data_stream().map_err(io::Error::other);
    let record = state.store.put(&identity, content, declared_size).await?;
    tracing::info!(identity = %identity, principal = %caller, size = record.size_bytes, "artefact uploaded");
    Ok((StatusCode::CREATED, Json(ArtefactResponse::from(&record))))
}

async fn remove(
    State(state): State<AppState>,
    Caller(caller): Caller,
    path: Result<Path<(String, String, String)>, PathRejection>,
) -> Result<StatusCode, AppError> {
    let Path((namespace, name, version)) = path?;
    let identity = ArtefactIdentity::new(namespace, name, version)?;
    authorize(&state.policy, &caller, Operation::Write, &identity)?;
    state.store.delete(&identity).await?;
    tracing::info!(identity = %identity, principal = %caller, "artefact deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn list_versions(
    State(state): State<AppState>,
    Caller(caller): Caller,
    path: Result<Path<(String, String)>, PathRejection>,
) -> Result<Json<VersionListResponse>, AppError> {
    let Path((namespace, name)) = path?;
    validate_segment("namespace", &namespace)?;
    validate_segment("name", &name)?;
    authorize_coordinates(&state.policy, &caller, Operation::Read, &namespace, &name)?;

    let versions = state.store.list(&namespace, &name)?.iter().collect();
    Ok(Json(VersionListResponse {
        namespace,
        name,
        versions,
    }))
}
