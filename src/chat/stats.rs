use axum::{Json, debug_handler, extract::State};

use crate::{AppState, coordinator::Coordinator, engine::Stats};

#[debug_handler(state = AppState)]
pub(crate) async fn stats(State(coordinator): State<Coordinator>) -> Json<Stats> {
    Json(coordinator.stats())
}
