// src/server/handlers/stream.rs
//! Streamed build and validation endpoints
//!
//! Each response is an SSE stream of `start`, `output`/`error` and exactly
//! one `complete` event. Requests that cannot start (unknown session, busy
//! session, bad package name) fail with a problem document instead.
//! Dropping the connection terminates the underlying process.

use super::parse_json;
use crate::executor::StreamEvent;
use crate::facade::EventStream;
use crate::server::{ApiResult, SharedState};
use axum::{
    body::Bytes,
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::time::Duration;
use tracing::info;

/// Request body for install streams
#[derive(Debug, Deserialize)]
pub struct InstallStreamRequest {
    pub session_id: String,
    pub package_name: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Request body for validation streams
#[derive(Debug, Deserialize)]
pub struct ValidateStreamRequest {
    pub session_id: String,
    pub package_name: String,
    #[serde(default)]
    pub install_digest: Option<String>,
    #[serde(default)]
    pub custom_script: Option<String>,
}

/// POST /v1/spack/install/stream
pub async fn install_stream(
    State(state): State<SharedState>,
    body: Bytes,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let request: InstallStreamRequest = parse_json(&body)?;
    let events = state.workbench.install_stream(
        &request.session_id,
        &request.package_name,
        request.version.as_deref(),
    )?;
    info!(
        session_id = %request.session_id,
        package = %request.package_name,
        "Install stream opened"
    );
    Ok(to_sse(events))
}

/// POST /v1/spack/validate/stream
pub async fn validate_stream(
    State(state): State<SharedState>,
    body: Bytes,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let request: ValidateStreamRequest = parse_json(&body)?;
    let events = state.workbench.validate_stream(
        &request.session_id,
        &request.package_name,
        request.install_digest.as_deref(),
        request.custom_script.as_deref(),
    )?;
    info!(
        session_id = %request.session_id,
        package = %request.package_name,
        "Validate stream opened"
    );
    Ok(to_sse(events))
}

fn to_sse(events: EventStream) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = events.map(|event: StreamEvent| {
        Ok(Event::default()
            .event(event.kind.as_str())
            .data(event.to_json()))
    });

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("keepalive"),
    )
}
