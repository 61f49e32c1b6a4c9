//! HTTP router and handlers

use std::sync::Arc;
use std::time::Duration;

use agropest_core::PestProfile;
use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::{
    catch_panic::CatchPanicLayer, compression::CompressionLayer, cors::CorsLayer,
    trace::TraceLayer,
};
use tracing::{debug, error, info, warn};

use crate::engine::{Identification, PestEngine, Verdict};
use crate::scorer::MatchResult;
use crate::Error;

/// Shared application state
pub struct AppState {
    /// Identification engine
    pub engine: Arc<PestEngine>,
    /// Upper bound on one identification request
    pub request_timeout: Duration,
}

/// `POST /identify-pest` body
#[derive(Debug, Deserialize)]
pub struct IdentifyRequest {
    /// Free-text symptom description
    pub description: String,
}

/// `POST /identify-pest` response
#[derive(Debug, Serialize)]
pub struct IdentifyResponse {
    /// Request id, also present in logs
    pub request_id: String,
    /// Outcome
    pub verdict: Verdict,
    /// Top candidate or `Unknown`
    pub pest: String,
    /// Top candidate's confidence
    pub confidence: f64,
    /// Ranked candidates
    pub candidates: Vec<MatchResult>,
    /// Hints for the user
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub guidance: Vec<String>,
    /// Generative explanation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    /// Text report
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
}

impl From<Identification> for IdentifyResponse {
    fn from(id: Identification) -> Self {
        Self {
            request_id: id.analysis.request_id,
            verdict: id.analysis.verdict,
            pest: id.analysis.pest,
            confidence: id.analysis.confidence,
            candidates: id.analysis.candidates,
            guidance: id.analysis.guidance,
            explanation: id.explanation,
            report: id.report.map(|r| r.text),
        }
    }
}

/// Create the router
pub fn create_router(state: Arc<AppState>, max_body_size: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/identify-pest", post(identify_handler))
        .route("/pests", get(list_handler))
        .route("/pests/{name}", get(show_handler).put(update_handler))
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(CatchPanicLayer::new())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// JSON error body with the status derived from the error kind
fn error_response(err: &Error) -> Response {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(error = %err, "Request failed");
    } else {
        debug!(error = %err, "Request rejected");
    }
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

/// Malformed or mistyped JSON bodies are invalid input, reported like any
/// other error
fn rejection_response(rejection: &JsonRejection) -> Response {
    error_response(&Error::invalid_input(rejection.body_text()))
}

/// GET /health
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "mode": state.engine.mode(),
        "profiles": state.engine.knowledge_base().len(),
    }))
}

/// POST /identify-pest
///
/// The request timeout bounds analysis; annotation only gets the remainder
/// and falls back rather than failing the request.
async fn identify_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<IdentifyRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(&rejection),
    };
    match state
        .engine
        .identify_within(&request.description, state.request_timeout)
        .await
    {
        Ok(identification) => Json(IdentifyResponse::from(identification)).into_response(),
        Err(e) => {
            if matches!(e, Error::Timeout(_)) {
                warn!(timeout_ms = state.request_timeout.as_millis(), "Identification timed out");
            }
            error_response(&e)
        }
    }
}

/// GET /pests
async fn list_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "pests": state.engine.knowledge_base().names() }))
}

/// GET /pests/{name}
async fn show_handler(State(state): State<Arc<AppState>>, Path(name): Path<String>) -> Response {
    match state.engine.search(&name) {
        Some(profile) => Json(profile).into_response(),
        None => error_response(&Error::ProfileNotFound(name)),
    }
}

/// PUT /pests/{name}
async fn update_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    body: Result<Json<PestProfile>, JsonRejection>,
) -> Response {
    let Json(profile) = match body {
        Ok(body) => body,
        Err(rejection) => return rejection_response(&rejection),
    };
    match state.engine.update_profile(&name, profile).await {
        Ok(stored) => {
            info!(pest = %name, version = stored.version, "Profile updated via API");
            Json(stored).into_response()
        }
        Err(e) => error_response(&e),
    }
}
