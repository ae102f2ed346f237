use axum::{extract::State, response::Json};
use serde_json::{json, Value};

use crate::server::app::AppState;

pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let stats = state.coordinator.stats().await;
    Json(json!({
        "status": "healthy",
        "service": "scenehub",
        "version": env!("CARGO_PKG_VERSION"),
        "hub": stats,
    }))
}
