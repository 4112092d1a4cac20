//! Restage API Module
//! Local HTTP surface the host application polls: staging status, health,
//! download trigger, and clear. Field names and routes are a compatibility
//! contract with client applications.

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::engine::stager::Stager;

/// Service name reported by the health endpoint.
pub const SERVICE_NAME: &str = env!("CARGO_PKG_NAME");

#[derive(Clone)]
pub struct ApiState {
    pub stager: Arc<Stager>,
    /// Serializes download/clear against each other. The listener is
    /// concurrent, and interleaved writers to the staging directory would
    /// corrupt it. Status and health never take this lock.
    stage_lock: Arc<Mutex<()>>,
}

impl ApiState {
    pub fn new(stager: Arc<Stager>) -> Self {
        Self {
            stager,
            stage_lock: Arc::new(Mutex::new(())),
        }
    }
}

pub fn create_router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/update/status", get(update_status))
        .route("/update/download", post(download_update))
        .route("/update/clear", post(clear_update))
        .route("/health", get(health_check))
        .fallback(not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub ready: bool,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
}

async fn update_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        ready: state.stager.is_ready(),
    })
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        service: SERVICE_NAME.to_string(),
    })
}

async fn download_update(State(state): State<ApiState>) -> (StatusCode, Json<Value>) {
    let _guard = state.stage_lock.lock().await;
    match state.stager.stage().await {
        Ok(message) => (StatusCode::OK, Json(json!({ "ok": true, "message": message }))),
        Err(e) => {
            tracing::error!(error = %e, "update download failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": e.to_string() })),
            )
        }
    }
}

async fn clear_update(State(state): State<ApiState>) -> (StatusCode, Json<Value>) {
    let _guard = state.stage_lock.lock().await;
    match state.stager.clear() {
        Ok(message) => (StatusCode::OK, Json(json!({ "ok": true, "message": message }))),
        Err(e) => {
            tracing::error!(error = %e, "clearing staged update failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "ok": false, "error": e.to_string() })),
            )
        }
    }
}

async fn not_found(method: Method) -> Response {
    // Non-preflight OPTIONS still gets an empty 200 so permissive clients
    // can probe any path.
    if method == Method::OPTIONS {
        StatusCode::OK.into_response()
    } else {
        (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" }))).into_response()
    }
}
