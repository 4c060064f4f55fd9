use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::{StatusCode, Uri},
    routing::get,
};
use tower_http::services::ServeDir;

use crate::{
    response::{ApiResponse, Meta},
    state::AppState,
};

pub mod auth;
pub mod doc;
pub mod health;
pub mod ingredients;
pub mod params;
pub mod recipes;
pub mod short_link;
pub mod users;

// Build the API router without binding state; it will be provided at the top level.
pub fn create_api_router() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .nest("/recipes", recipes::router())
        .nest("/ingredients", ingredients::router())
}

/// Every route the service exposes, with state bound. Tracing, request-id and CORS layers are added by the binary.
pub fn create_app(state: AppState) -> Router {
    let media = ServeDir::new(&state.config.media_root);
    // Extractors default to 2 MB, too small for base64 images.
    let body_limit = DefaultBodyLimit::max(state.config.body_limit_bytes);
    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", create_api_router())
        .merge(short_link::router())
        .merge(doc::scalar_docs())
        .nest_service("/media", media)
        .fallback(not_found)
        .layer(body_limit)
        .with_state(state)
}

async fn not_found(uri: Uri) -> (StatusCode, Json<ApiResponse<serde_json::Value>>) {
    let body = ApiResponse::success(
        "Not Found",
        serde_json::json!({ "path": uri.path() }),
        Some(Meta::empty()),
    );
    (StatusCode::NOT_FOUND, Json(body))
}
