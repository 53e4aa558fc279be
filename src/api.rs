//! REST API for the budget Q&A engine
//!
//! Exposes the session flow and the question history to the form frontend.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;
use uuid::Uuid;

use crate::error::SessionError;
use crate::session::SessionEngine;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub amount: String,
    pub procedure: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub positive: bool,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

fn error_status(error: &SessionError) -> StatusCode {
    match error {
        SessionError::Validation(_) => StatusCode::BAD_REQUEST,
        SessionError::InvalidStep(_) => StatusCode::CONFLICT,
        SessionError::EntryNotFound(_) => StatusCode::NOT_FOUND,
        SessionError::Gateway(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn fail(error: SessionError) -> (StatusCode, Json<ApiResponse>) {
    (error_status(&error), Json(ApiResponse::error(error.to_string())))
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<SessionEngine>,
}

/// =============================
/// Helpers — Client Ids
/// =============================

fn stable_uuid_from_string(input: &str) -> Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    Uuid::from_bytes(bytes)
}

fn parse_user_id(value: Option<&str>) -> Option<Uuid> {
    let value = value?.trim();
    if value.is_empty() {
        return None;
    }
    Some(Uuid::parse_str(value).unwrap_or_else(|_| stable_uuid_from_string(value)))
}

/// =============================
/// Health Endpoint
/// =============================

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// =============================
/// Session Endpoints
/// =============================

async fn session_view(State(state): State<ApiState>) -> Json<ApiResponse> {
    Json(ApiResponse::success(state.engine.view().await))
}

async fn submit_question(
    State(state): State<ApiState>,
    Json(req): Json<QuestionRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    info!("Received question submission");

    match state.engine.submit_question(&req.question).await {
        Ok(classification) => {
            let confidence_percent = classification.confidence_percent();
            (
                StatusCode::OK,
                Json(ApiResponse::success(serde_json::json!({
                    "classification": classification,
                    "confidence_percent": confidence_percent,
                }))),
            )
        }
        Err(e) => fail(e),
    }
}

async fn confirm_selection(
    State(state): State<ApiState>,
    Json(req): Json<ConfirmRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let user_id = parse_user_id(req.user_id.as_deref());

    match state
        .engine
        .confirm_selection(&req.amount, &req.procedure, user_id)
        .await
    {
        Ok(session) => (StatusCode::OK, Json(ApiResponse::success(session))),
        Err(e) => fail(e),
    }
}

async fn go_back(State(state): State<ApiState>) -> (StatusCode, Json<ApiResponse>) {
    match state.engine.back().await {
        Ok(step) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({ "step": step }))),
        ),
        Err(e) => fail(e),
    }
}

async fn reset(State(state): State<ApiState>) -> Json<ApiResponse> {
    state.engine.reset().await;
    Json(ApiResponse::success(serde_json::json!({ "step": "question" })))
}

async fn feedback(
    State(state): State<ApiState>,
    Json(req): Json<FeedbackRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.engine.feedback(req.positive).await {
        Ok(message) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({ "message": message }))),
        ),
        Err(e) => fail(e),
    }
}

/// =============================
/// History Endpoints
/// =============================

async fn list_history(State(state): State<ApiState>) -> Json<ApiResponse> {
    let feed = state.engine.history();
    Json(ApiResponse::success(serde_json::json!({
        "entries": feed.entries().await,
        "error": feed.last_error().await,
    })))
}

async fn open_history(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.engine.open_history(id).await {
        Ok(session) => (StatusCode::OK, Json(ApiResponse::success(session))),
        Err(e) => fail(e),
    }
}

async fn delete_history(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> (StatusCode, Json<ApiResponse>) {
    match state.engine.history().delete(id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({ "deleted": id }))),
        ),
        Err(e) => fail(e),
    }
}

async fn clear_history(State(state): State<ApiState>) -> (StatusCode, Json<ApiResponse>) {
    match state.engine.history().clear().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ApiResponse::success(serde_json::json!({ "cleared": true }))),
        ),
        Err(e) => fail(e),
    }
}

/// =============================
/// Router
/// =============================

pub fn create_router(engine: Arc<SessionEngine>) -> Router {
    let state = ApiState { engine };

    Router::new()
        .route("/health", get(health))
        .route("/api/session", get(session_view))
        .route("/api/session/question", post(submit_question))
        .route("/api/session/confirm", post(confirm_selection))
        .route("/api/session/back", post(go_back))
        .route("/api/session/reset", post(reset))
        .route("/api/session/feedback", post(feedback))
        .route("/api/history", get(list_history).delete(clear_history))
        .route("/api/history/:id/open", post(open_history))
        .route("/api/history/:id", delete(delete_history))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    engine: Arc<SessionEngine>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(engine);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_uuid_is_deterministic() {
        let a = stable_uuid_from_string("team-budget");
        let b = stable_uuid_from_string("team-budget");
        assert_eq!(a, b);
        assert_ne!(a, stable_uuid_from_string("other-team"));
    }

    #[test]
    fn test_parse_user_id_accepts_uuid_and_free_text() {
        let id = Uuid::new_v4();
        assert_eq!(parse_user_id(Some(&id.to_string())), Some(id));
        assert!(parse_user_id(Some("예산팀")).is_some());
        assert_eq!(parse_user_id(Some("  ")), None);
        assert_eq!(parse_user_id(None), None);
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            error_status(&SessionError::Validation("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            error_status(&SessionError::Gateway("x".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            error_status(&SessionError::EntryNotFound("x".into())),
            StatusCode::NOT_FOUND
        );
    }
}
