//! Star ratings for generated answers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use tracing::info;

use super::error_response;
use crate::metrics::model_id;
use crate::state::AppState;
use hatbot_chat::{FeedbackRequest, FeedbackResponse};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/feedback", post(submit_feedback))
}

/// POST /api/feedback
async fn submit_feedback(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FeedbackRequest>,
) -> Response {
    if !(1..=5).contains(&req.stars) {
        return error_response(StatusCode::BAD_REQUEST, "stars must be between 1 and 5");
    }
    if req.provider_model.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "providerModel is required");
    }

    state
        .metrics
        .record_feedback(model_id(&req.provider_model), req.stars);
    info!("Feedback: {} stars for {}", req.stars, req.provider_model);

    Json(FeedbackResponse {
        message: format!("Received {} star feedback. Thank you!", req.stars),
    })
    .into_response()
}
