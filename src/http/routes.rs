use axum::{routing::get, routing::post, Router};

use crate::http::handlers;
use crate::AppState;

pub fn health() -> Router<AppState> {
    Router::new().route("/health", get(handlers::health))
}

pub fn moderation() -> Router<AppState> {
    Router::new()
        .route("/moderation/analyze", post(handlers::enqueue_analysis))
        .route("/moderation/queue", get(handlers::list_queue))
        .route("/moderation/queue/stats", get(handlers::queue_stats))
        .route("/moderation/queue/:id", get(handlers::get_queue_entry))
        .route("/moderation/queue/:id/claim", post(handlers::claim_queue_entry))
        .route(
            "/moderation/queue/:id/decision",
            post(handlers::submit_review_decision),
        )
        .route("/moderation/audit", get(handlers::list_moderation_audit))
}
