// src/server/handlers/recipes.rs
//! Recipe handlers

use super::{blocking, parse_json, parse_optional_json};
use crate::facade::{CreateAction, CreateOutcome};
use crate::recipe::{CopyResult, GitUpdate, Recipe, RecipeInfo, ValidationReport};
use crate::server::{ApiError, ApiResult, Problem, SharedState};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::info;

/// Request body for recipe writes
#[derive(Debug, Deserialize)]
pub struct WriteRecipeRequest {
    pub content: String,
}

/// Request body for local validation (optional)
#[derive(Debug, Default, Deserialize)]
pub struct ValidateRecipeRequest {
    /// Content to check instead of the stored recipe
    #[serde(default)]
    pub content: Option<String>,
}

/// Request body for upstream copies
#[derive(Debug, Deserialize)]
pub struct CopyPackageRequest {
    pub session_id: String,
    pub package_name: String,
}

/// Request body for URL-based creation
#[derive(Debug, Deserialize)]
pub struct CreateFromUrlRequest {
    pub session_id: String,
    pub url: String,
}

/// Request body for git source updates
#[derive(Debug, Deserialize)]
pub struct UpdateFromGitRequest {
    pub session_id: String,
    pub package_name: String,
    pub repository_url: String,
}

/// GET /v1/sessions/:id/recipes
pub async fn list_recipes(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<RecipeInfo>>> {
    Ok(Json(blocking(&state, move |wb| wb.list_recipes(&id)).await?))
}

/// GET /v1/sessions/:id/recipes/:pkg
pub async fn read_recipe(
    State(state): State<SharedState>,
    Path((id, package)): Path<(String, String)>,
) -> ApiResult<Json<Recipe>> {
    Ok(Json(blocking(&state, move |wb| wb.read_recipe(&id, &package)).await?))
}

/// PUT /v1/sessions/:id/recipes/:pkg
pub async fn write_recipe(
    State(state): State<SharedState>,
    Path((id, package)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<Json<Recipe>> {
    let request: WriteRecipeRequest = parse_json(&body)?;
    let recipe =
        blocking(&state, move |wb| wb.write_recipe(&id, &package, &request.content)).await?;
    Ok(Json(recipe))
}

/// DELETE /v1/sessions/:id/recipes/:pkg
pub async fn delete_recipe(
    State(state): State<SharedState>,
    Path((id, package)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    blocking(&state, move |wb| wb.delete_recipe(&id, &package)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/sessions/:id/recipes/:pkg/info
pub async fn recipe_info(
    State(state): State<SharedState>,
    Path((id, package)): Path<(String, String)>,
) -> ApiResult<Json<RecipeInfo>> {
    Ok(Json(blocking(&state, move |wb| wb.recipe_info(&id, &package)).await?))
}

/// POST /v1/sessions/:id/recipes/:pkg/validate
pub async fn validate_recipe(
    State(state): State<SharedState>,
    Path((id, package)): Path<(String, String)>,
    body: Bytes,
) -> ApiResult<Json<ValidationReport>> {
    let request: ValidateRecipeRequest = parse_optional_json(&body)?;
    let report = blocking(&state, move |wb| {
        wb.validate_recipe(&id, &package, request.content.as_deref())
    })
    .await?;
    Ok(Json(report))
}

/// POST /v1/sessions/:id/recipes/:pkg/create
///
/// 200 when the recipe already existed, 201 when it was copied or generated.
pub async fn create_recipe(
    State(state): State<SharedState>,
    Path((id, package)): Path<(String, String)>,
) -> ApiResult<(StatusCode, Json<CreateOutcome>)> {
    let outcome = state.workbench.create_recipe(&id, &package).await?;
    let status = match outcome.action {
        CreateAction::Exists => StatusCode::OK,
        CreateAction::Copied | CreateAction::Created => StatusCode::CREATED,
    };
    Ok((status, Json(outcome)))
}

/// POST /v1/recipes/copy-package
///
/// A partial copy is a failure whose problem extensions list what landed.
pub async fn copy_package(
    State(state): State<SharedState>,
    body: Bytes,
) -> ApiResult<Json<CopyResult>> {
    let request: CopyPackageRequest = parse_json(&body)?;
    let result = state
        .workbench
        .copy_package(&request.session_id, &request.package_name)
        .await?;

    if !result.success {
        let extensions = serde_json::to_value(&result).unwrap_or(serde_json::Value::Null);
        return Err(ApiError(
            Problem::new("copy_incomplete", "Copy Incomplete", 500, &result.message)
                .with_instance("/v1/recipes/copy-package")
                .with_extensions(extensions),
        ));
    }

    info!(
        session_id = %request.session_id,
        package = %request.package_name,
        files = result.copied_files.len(),
        "Package copied from upstream"
    );
    Ok(Json(result))
}

/// POST /v1/recipes/create-from-url
pub async fn create_from_url(
    State(state): State<SharedState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Recipe>)> {
    let request: CreateFromUrlRequest = parse_json(&body)?;
    let recipe =
        blocking(&state, move |wb| wb.create_from_url(&request.session_id, &request.url)).await?;
    Ok((StatusCode::CREATED, Json(recipe)))
}

/// POST /v1/recipes/update-from-git
pub async fn update_from_git(
    State(state): State<SharedState>,
    body: Bytes,
) -> ApiResult<Json<GitUpdate>> {
    let request: UpdateFromGitRequest = parse_json(&body)?;
    let update = state
        .workbench
        .update_from_git(
            &request.session_id,
            &request.package_name,
            &request.repository_url,
        )
        .await?;
    Ok(Json(update))
}
