// src/server/handlers/catalog.rs
//! Build tool catalog handlers

use crate::catalog::{PackageInfo, SearchResult, UninstallResult};
use crate::server::{ApiError, ApiResult, Problem, SharedState};
use axum::{
    Json,
    extract::{Path, Query, State, rejection::QueryRejection},
};
use serde::Deserialize;

const DEFAULT_LIMIT: usize = 50;

/// Query string for package searches
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

/// Query string for package info
#[derive(Debug, Deserialize)]
pub struct InfoParams {
    pub version: Option<String>,
}

/// Query string for uninstalls
#[derive(Debug, Deserialize)]
pub struct UninstallParams {
    pub version: Option<String>,
    #[serde(default)]
    pub force: bool,
}

fn query<T>(params: Result<Query<T>, QueryRejection>) -> ApiResult<T> {
    params
        .map(|Query(params)| params)
        .map_err(|e| ApiError(Problem::bad_request(&e.body_text())))
}

/// GET /v1/sessions/:id/packages?query=&limit=
pub async fn search_packages(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> ApiResult<Json<SearchResult>> {
    let params = query(params)?;
    let result = state
        .workbench
        .search_packages(&id, &params.query, params.limit)
        .await?;
    Ok(Json(result))
}

/// GET /v1/sessions/:id/packages/:pkg?version=
pub async fn package_info(
    State(state): State<SharedState>,
    Path((id, package)): Path<(String, String)>,
    params: Result<Query<InfoParams>, QueryRejection>,
) -> ApiResult<Json<PackageInfo>> {
    let params = query(params)?;
    let info = state
        .workbench
        .package_info(&id, &package, params.version.as_deref())
        .await?;
    Ok(Json(info))
}

/// DELETE /v1/sessions/:id/packages/:pkg?version=&force=
///
/// A refusal by the build tool is a 200 with `success: false`.
pub async fn uninstall_package(
    State(state): State<SharedState>,
    Path((id, package)): Path<(String, String)>,
    params: Result<Query<UninstallParams>, QueryRejection>,
) -> ApiResult<Json<UninstallResult>> {
    let params = query(params)?;
    let result = state
        .workbench
        .uninstall_package(&id, &package, params.version.as_deref(), params.force)
        .await?;
    Ok(Json(result))
}
