use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use super::handlers::{challenges, games, imports, library, recommendations};
use super::AppState;
use crate::middleware::{make_span_with_request_id, request_id_middleware, user_id_middleware};

/// Creates the application router with all routes.
///
/// The request id is assigned before the trace span opens, so every span
/// carries it.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes(state))
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
        .layer(middleware::from_fn(request_id_middleware))
}

/// API routes under /api/v1. Every route is scoped to the `x-user-id` caller.
fn api_routes(state: AppState) -> Router {
    Router::new()
        // Library
        .route("/library", get(library::snapshot))
        .route("/library/stream", get(library::changes))
        .route("/genres", get(library::genres).post(library::add_genre))
        .route(
            "/preferences",
            get(library::preferences).put(library::set_preferences),
        )
        .route("/deals", get(library::deals))
        .route("/compatibility/refresh", post(library::refresh_compatibility))
        // Games
        .route("/games", post(games::add))
        .route("/games/batch", post(games::batch_add))
        .route(
            "/games/:id",
            get(games::get).put(games::edit).delete(games::delete),
        )
        .route("/games/:id/move", post(games::move_to_list))
        // Challenges
        .route("/challenges", get(challenges::list).post(challenges::create))
        // Import
        .route("/imports", post(imports::start))
        .route("/imports/status", get(imports::status))
        .route("/imports/acknowledge", post(imports::acknowledge))
        // Recommendations
        .route("/recommendations/mood", post(recommendations::by_mood))
        .route("/recommendations/up-next", get(recommendations::up_next))
        .route("/recommendations/discover", get(recommendations::discover))
        .route(
            "/recommendations/challenge-ideas",
            get(recommendations::challenge_ideas),
        )
        .route_layer(middleware::from_fn(user_id_middleware))
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}
