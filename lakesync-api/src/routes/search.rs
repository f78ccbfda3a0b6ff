use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::instrument;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::domain::search::{SemanticSearchRequest, SemanticSearchResponse};
use crate::routes::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/semantic", post(semantic_search))
        .route("/semantic/health", get(health))
}

#[instrument(name = "POST /api/search/semantic", skip(state, request), fields(query = %request.query))]
async fn semantic_search(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<SemanticSearchRequest>,
) -> Response {
    if request.query.trim().is_empty() {
        let empty = SemanticSearchResponse::empty(&request.query, state.embedding_model_name(), 0, 0);
        return (StatusCode::BAD_REQUEST, Json(empty)).into_response();
    }

    match state.search.search(&request, &user.username).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => ApiError::from(e).into_response(),
    }
}

#[instrument(name = "GET /api/search/semantic/health", skip(state))]
async fn health(State(state): State<AppState>, user: AuthUser) -> Json<serde_json::Value> {
    let probe = SemanticSearchRequest {
        query: "health check".to_string(),
        top_k: Some(1),
        embedding_type: None,
        filter: None,
        min_score: None,
    };

    match state.search.search(&probe, &user.username).await {
        Ok(result) => Json(json!({
            "status": "UP",
            "embedding": {
                "status": "UP",
                "model": result.model,
                "vectorDimension": result.vector_dimension,
            },
            "lake": {
                "status": "UP",
                "searchTimeMs": result.search_time_ms,
            },
        })),
        Err(e) => Json(json!({
            "status": "DEGRADED",
            "embedding": { "status": "DOWN", "error": e.to_string() },
            "lake": { "status": "DOWN" },
        })),
    }
}
