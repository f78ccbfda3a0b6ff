use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::instrument;

use crate::app_state::AppState;
use crate::auth::AuthUser;
use crate::domain::rag::{RagPromptRequest, RagPromptResponse};
use crate::domain::search::SemanticSearchRequest;
use crate::routes::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/prompt", post(prompt))
        .route("/health", get(health))
}

#[instrument(name = "POST /api/rag/prompt", skip(state, request), fields(question = %request.question))]
async fn prompt(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<RagPromptRequest>,
) -> Result<Json<RagPromptResponse>, ApiError> {
    if request.question.trim().is_empty() {
        return Err(ApiError::bad_request("Question is required"));
    }

    let response = state.rag.prompt(&request, &user.username).await?;
    Ok(Json(response))
}

/// Composite health: a one-hit search exercises the embedding model and the
/// lake's vector index; the chat model reports its configured identity.
#[instrument(name = "GET /api/rag/health", skip(state))]
async fn health(State(state): State<AppState>, user: AuthUser) -> Json<serde_json::Value> {
    let probe = SemanticSearchRequest {
        query: "health check".to_string(),
        top_k: Some(1),
        embedding_type: None,
        filter: None,
        min_score: None,
    };

    let (embedding, lake, retrieval_up) = match state.search.search(&probe, &user.username).await {
        Ok(result) => (
            json!({
                "status": "UP",
                "model": result.model,
                "vectorDimension": result.vector_dimension,
            }),
            json!({ "status": "UP", "searchTimeMs": result.search_time_ms }),
            true,
        ),
        Err(e) => (
            json!({ "status": "DOWN", "error": e.to_string() }),
            json!({ "status": "DOWN" }),
            false,
        ),
    };

    let llm = json!({ "status": "UP", "model": state.chat_model_name });

    Json(json!({
        "status": if retrieval_up { "UP" } else { "DEGRADED" },
        "embedding": embedding,
        "lake": lake,
        "llm": llm,
    }))
}
