pub mod health;
pub mod markers;
pub mod stats;

use std::any::Any;

use axum::{
    extract::DefaultBodyLimit,
    http::{header::CONTENT_TYPE, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::json;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer};

use crate::state::AppState;

/// JSON request bodies up to 10 MiB.
const BODY_LIMIT: usize = 10 * 1024 * 1024;

const AVAILABLE_ROUTES: [&str; 7] = [
    "GET /health",
    "GET /markers",
    "GET /markers/:id",
    "POST /markers",
    "PUT /markers/:id",
    "DELETE /markers/:id",
    "GET /stats",
];

pub fn create_router(state: AppState) -> Router {
    let development = state.development;

    let routes = Router::new()
        .merge(health::routes())
        .merge(markers::routes())
        .merge(stats::routes());

    with_middleware(routes, development).with_state(state)
}

/// JSON 404 fallback, body limit and panic-to-500 conversion.
fn with_middleware(routes: Router<AppState>, development: bool) -> Router<AppState> {
    routes
        .fallback(not_found)
        .method_not_allowed_fallback(not_found)
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(CatchPanicLayer::custom(
            move |err: Box<dyn Any + Send + 'static>| internal_error(err, development),
        ))
}

/// CORS policy: only `origin` when given, any origin otherwise.
pub fn cors_layer(origin: Option<HeaderValue>) -> CorsLayer {
    match origin {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([
                Method::GET,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([CONTENT_TYPE]),
        None => CorsLayer::permissive(),
    }
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "Route not found",
            "availableRoutes": AVAILABLE_ROUTES,
        })),
    )
        .into_response()
}

fn internal_error(err: Box<dyn Any + Send + 'static>, development: bool) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown panic".to_string()
    };
    tracing::error!("Unhandled error: {}", detail);

    let message = if development {
        detail
    } else {
        "Something went wrong".to_string()
    };
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error", "message": message })),
    )
        .into_response()
}
