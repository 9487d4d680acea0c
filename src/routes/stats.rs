use axum::{extract::State, routing::get, Json, Router};

use crate::models::Stats;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/stats", get(get_stats))
}

/// GET /stats - Aggregate counts per type and per user.
async fn get_stats(State(state): State<AppState>) -> Json<Stats> {
    Json(state.markers.stats())
}
