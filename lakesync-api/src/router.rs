use axum::Router;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

use crate::app_state::AppState;
use crate::routes;

pub fn create(state: AppState) -> Router {
    Router::new()
        .nest("/api/sync", routes::sync::router())
        .nest("/api/search", routes::search::router())
        .nest("/api/rag", routes::rag::router())
        .merge(routes::health::router())
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
}
