// src/server/handlers/mod.rs
//! HTTP request handlers

pub mod catalog;
pub mod recipes;
pub mod sessions;
pub mod stream;

use crate::facade::Workbench;
use crate::server::{ApiError, ApiResult, Problem, SharedState};
use axum::body::Bytes;
use serde::de::DeserializeOwned;

/// Run a filesystem-bound workbench call off the async runtime
pub(crate) async fn blocking<T, F>(state: &SharedState, f: F) -> ApiResult<T>
where
    F: FnOnce(&Workbench) -> crate::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.workbench))
        .await
        .map_err(|e| ApiError(Problem::internal(&format!("Task join error: {}", e))))?
        .map_err(ApiError::from)
}

/// Decode a JSON request body, reporting failures as problem documents
pub(crate) fn parse_json<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body)
        .map_err(|e| ApiError(Problem::bad_request(&format!("Invalid JSON body: {}", e))))
}

/// Like [`parse_json`], with an empty body meaning all defaults
pub(crate) fn parse_optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> ApiResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    parse_json(body)
}
