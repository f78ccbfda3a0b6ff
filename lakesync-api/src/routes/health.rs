use axum::{routing::get, Json, Router};
use serde_json::json;

use crate::app_state::AppState;

/// Public liveness endpoints; everything else requires authentication.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/actuator/health", get(health))
        .route("/actuator/info", get(info))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "UP" }))
}

async fn info() -> Json<serde_json::Value> {
    Json(json!({
        "app": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
        }
    }))
}
