// src/server/handlers/sessions.rs
//! Session lifecycle handlers

use super::{blocking, parse_optional_json};
use crate::server::{ApiResult, SharedState};
use crate::workspace::{Session, SessionFiles};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Request body for session creation (optional)
#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    /// Repository namespace; defaults to the configured one
    #[serde(default)]
    pub namespace: Option<String>,
}

/// Session as reported to clients
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_id: String,
    pub namespace: String,
    pub root: PathBuf,
    pub created_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe_count: Option<usize>,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            session_id: session.id,
            namespace: session.namespace,
            root: session.root,
            created_at: session.created_at,
            last_used_at: session.last_used_at,
            expires_at: session.expires_at,
            recipe_count: None,
        }
    }
}

/// POST /v1/sessions
pub async fn create_session(
    State(state): State<SharedState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<SessionResponse>)> {
    let request: CreateSessionRequest = parse_optional_json(&body)?;
    let session = blocking(&state, move |wb| wb.create_session(request.namespace.as_deref())).await?;
    info!(session_id = %session.id, "Session created via API");
    Ok((StatusCode::CREATED, Json(session.into())))
}

/// GET /v1/sessions
pub async fn list_sessions(State(state): State<SharedState>) -> Json<Vec<SessionResponse>> {
    let sessions = state
        .workbench
        .list_sessions()
        .into_iter()
        .map(SessionResponse::from)
        .collect();
    Json(sessions)
}

/// GET /v1/sessions/:id
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionResponse>> {
    let info = blocking(&state, move |wb| wb.session_info(&id)).await?;
    let mut response = SessionResponse::from(info.session);
    response.recipe_count = Some(info.recipe_count);
    Ok(Json(response))
}

/// DELETE /v1/sessions/:id
///
/// Returns 204 whether or not the session existed; 409 while it is busy.
pub async fn delete_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    blocking(&state, move |wb| wb.delete_session(&id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/sessions/:id/files
pub async fn session_files(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionFiles>> {
    Ok(Json(blocking(&state, move |wb| wb.session_files(&id)).await?))
}
