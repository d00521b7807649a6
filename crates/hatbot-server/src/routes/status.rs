//! Application status for the UI.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};

use crate::state::AppState;
use hatbot_chat::{StatusResponse, PRODUCTS};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/status", get(get_status))
}

/// GET /api/status
async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let llm = state.llm();
    let retriever = state.retrievers.retriever_or_fallback(&state.config.db_type);

    Json(StatusResponse {
        title: state.config.app_title.clone(),
        mode: llm.config.selection.to_string(),
        provider_visible: llm.config.is_provider_visible(),
        products: PRODUCTS.iter().map(|p| p.to_string()).collect(),
        retriever: retriever.kind().to_string(),
    })
}
