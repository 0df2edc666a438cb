// src/server/routes.rs
//! Axum router configuration
//!
//! - `/health` - Liveness
//! - `/v1/sessions` - Session lifecycle and per-session recipes
//! - `/v1/sessions/:id/packages` - Build tool catalog in the session scope
//! - `/v1/recipes` - Upstream copies, URL templates, git sources
//! - `/v1/spack` - SSE build and validation streams (not compressed)

use crate::server::SharedState;
use crate::server::handlers::{catalog, recipes, sessions, stream};
use axum::{
    Json, Router,
    extract::State,
    http::HeaderValue,
    routing::{get, post},
};
use serde::Serialize;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub sessions: usize,
}

/// Create the application router
///
/// An empty `cors_origins` allows any origin.
pub fn build_router(state: SharedState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", build_v1_router())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

fn build_v1_router() -> Router<SharedState> {
    // Compression would buffer SSE frames
    let stream_routes = Router::new()
        .route("/spack/install/stream", post(stream::install_stream))
        .route("/spack/validate/stream", post(stream::validate_stream));

    let api_routes = Router::new()
        // Sessions
        .route(
            "/sessions",
            get(sessions::list_sessions).post(sessions::create_session),
        )
        .route(
            "/sessions/:id",
            get(sessions::get_session).delete(sessions::delete_session),
        )
        .route("/sessions/:id/files", get(sessions::session_files))
        // Build tool catalog
        .route("/sessions/:id/packages", get(catalog::search_packages))
        .route(
            "/sessions/:id/packages/:pkg",
            get(catalog::package_info).delete(catalog::uninstall_package),
        )
        // Recipes inside a session
        .route("/sessions/:id/recipes", get(recipes::list_recipes))
        .route(
            "/sessions/:id/recipes/:pkg",
            get(recipes::read_recipe)
                .put(recipes::write_recipe)
                .delete(recipes::delete_recipe),
        )
        .route("/sessions/:id/recipes/:pkg/info", get(recipes::recipe_info))
        .route(
            "/sessions/:id/recipes/:pkg/validate",
            post(recipes::validate_recipe),
        )
        .route("/sessions/:id/recipes/:pkg/create", post(recipes::create_recipe))
        // Recipe sources
        .route("/recipes/copy-package", post(recipes::copy_package))
        .route("/recipes/create-from-url", post(recipes::create_from_url))
        .route("/recipes/update-from-git", post(recipes::update_from_git))
        .layer(CompressionLayer::new());

    stream_routes.merge(api_routes)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    cors.allow_origin(allowed)
}

async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        sessions: state.workbench.list_sessions().len(),
    })
}
