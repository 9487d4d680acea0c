use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;

use crate::models::{DeleteResponse, ListQuery, MarkerInput, MarkerResponse};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/markers", get(list_markers).post(create_marker))
        .route(
            "/markers/{id}",
            get(get_marker).put(update_marker).delete(delete_marker),
        )
}

fn bad_request(error: &str, detail: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": error, "details": [detail] })),
    )
        .into_response()
}

/// GET /markers?type=&user=&limit= - List markers, most recent first.
async fn list_markers(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(e) => return bad_request("Invalid query", e.body_text()),
    };

    Json(state.markers.list(&query)).into_response()
}

/// GET /markers/:id - Fetch a single marker.
async fn get_marker(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.markers.get(&id) {
        Ok(marker) => Json(marker).into_response(),
        Err(e) => e.into_response(),
    }
}

/// POST /markers - Create a new marker.
async fn create_marker(
    State(state): State<AppState>,
    body: Result<Json<MarkerInput>, JsonRejection>,
) -> Response {
    let Json(input) = match body {
        Ok(b) => b,
        Err(e) => return bad_request("Invalid request body", e.body_text()),
    };

    match state.markers.create(&input) {
        Ok(marker) => (
            StatusCode::CREATED,
            Json(MarkerResponse {
                success: true,
                marker,
                message: "Marker created successfully",
            }),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// PUT /markers/:id - Update an existing marker.
async fn update_marker(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<MarkerInput>, JsonRejection>,
) -> Response {
    let Json(input) = match body {
        Ok(b) => b,
        Err(e) => return bad_request("Invalid request body", e.body_text()),
    };

    match state.markers.update(&id, &input) {
        Ok(marker) => Json(MarkerResponse {
            success: true,
            marker,
            message: "Marker updated successfully",
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}

/// DELETE /markers/:id - Delete a marker.
async fn delete_marker(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.markers.delete(&id) {
        Ok(()) => Json(DeleteResponse {
            success: true,
            message: "Marker deleted successfully",
        })
        .into_response(),
        Err(e) => e.into_response(),
    }
}
