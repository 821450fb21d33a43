//! HTTP gateway for the sanitization pipeline
//! Author: kartik4091
//!
//! Routes:
//! - `GET /` and `GET /health` for liveness
//! - `POST /v1/security/scan-upload` taking a multipart `file` field and the
//!   shared secret in `x-secret` (header) or `x_secret` (query)

use std::sync::Arc;

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use subtle::ConstantTimeEq;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument, warn};

use crate::config::GateConfig;
use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use crate::types::SanitizationReport;

/// Build identifier reported by the liveness routes
pub const BUILD_TAG: &str = concat!("pdfgate-", env!("CARGO_PKG_VERSION"));

const SECRET_HEADER: &str = "x-secret";
const UPLOAD_FIELD: &str = "file";
/// Room for multipart framing on top of the file ceiling
const FRAMING_ALLOWANCE: usize = 64 * 1024;

/// State shared by every request handler
#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<Pipeline>,
    secret: Arc<str>,
    max_bytes: u64,
}

impl AppState {
    pub fn new(pipeline: Pipeline, secret: &str) -> Self {
        let max_bytes = pipeline.max_bytes();
        Self {
            pipeline: Arc::new(pipeline),
            secret: Arc::from(secret),
            max_bytes,
        }
    }

    fn authorized(&self, token: Option<&str>) -> bool {
        match token {
            Some(token) => token.as_bytes().ct_eq(self.secret.as_bytes()).into(),
            None => false,
        }
    }
}

/// Error response carrying only the public message
#[derive(Debug)]
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status =
            StatusCode::from_u16(kind.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(json!({ "detail": kind.public_message() }))).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SecretQuery {
    x_secret: Option<String>,
}

/// The gateway router with its middleware stack.
pub fn router(state: AppState) -> Router {
    let body_limit = usize::try_from(state.max_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(FRAMING_ALLOWANCE);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/v1/security/scan-upload", post(scan_upload))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until ctrl-c.
pub async fn serve(config: &GateConfig) -> Result<()> {
    let pipeline = Pipeline::new(config)?;
    let state = AppState::new(pipeline, &config.service_secret);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    info!(addr = %config.bind_addr, build = BUILD_TAG, "Security gate listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Security gate stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
}

async fn root() -> Json<Value> {
    Json(json!({ "service": "security-gate", "ok": true, "build": BUILD_TAG }))
}

async fn health() -> Json<Value> {
    Json(json!({ "ok": true, "build": BUILD_TAG }))
}

#[instrument(skip_all)]
async fn scan_upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SecretQuery>,
    multipart: Multipart,
) -> std::result::Result<Json<SanitizationReport>, ApiError> {
    let data = read_upload(multipart, state.max_bytes).await?;
    if data.is_empty() {
        return Err(Error::EmptyInput.into());
    }

    let token = headers
        .get(SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .or(query.x_secret.as_deref());
    if !state.authorized(token) {
        warn!("Upload rejected: bad or missing secret");
        return Err(Error::AuthenticationFailure.into());
    }

    let size = data.len() as u64;
    if size > state.max_bytes {
        return Err(Error::OversizedInput {
            size,
            limit: state.max_bytes,
        }
        .into());
    }

    let pipeline = Arc::clone(&state.pipeline);
    let report = tokio::task::spawn_blocking(move || pipeline.process(&data, size))
        .await
        .map_err(Error::internal)??;
    Ok(Json(report))
}

/// Read the `file` field, stopping one byte past the ceiling.
async fn read_upload(mut multipart: Multipart, max_bytes: u64) -> Result<Vec<u8>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        if field.name() == Some(UPLOAD_FIELD) {
            return read_capped(field, max_bytes).await;
        }
    }
    Ok(Vec::new())
}

async fn read_capped(mut field: Field<'_>, max_bytes: u64) -> Result<Vec<u8>> {
    let cap = usize::try_from(max_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(1);
    let mut data = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        let room = cap - data.len();
        if chunk.len() >= room {
            data.extend_from_slice(&chunk[..room]);
            break;
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

fn multipart_error(err: MultipartError, max_bytes: u64) -> Error {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::OversizedInput {
            size: max_bytes.saturating_add(1),
            limit: max_bytes,
        }
    } else {
        warn!(error = %err, "Unreadable multipart body");
        Error::EmptyInput
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_api_error_uses_public_message() {
        let response = ApiError(Error::PasswordProtected).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = ApiError(Error::EngineUnavailable("x".into())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_every_kind_maps_to_a_valid_status() {
        for kind in [
            ErrorKind::AuthenticationFailure,
            ErrorKind::EmptyInput,
            ErrorKind::OversizedInput,
            ErrorKind::UnsupportedFormat,
            ErrorKind::PasswordProtected,
            ErrorKind::MalformedStructure,
            ErrorKind::SerializationFailure,
            ErrorKind::EngineUnavailable,
        ] {
            assert!(StatusCode::from_u16(kind.status_code()).is_ok());
        }
    }
}
