//! Provider listing, selection and configuration reload.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};

use super::error_response;
use crate::state::AppState;
use hatbot_chat::{ProvidersResponse, ReloadResponse, SelectedProviderResponse};
use hatbot_core::split_provider_model;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/providers", get(list_providers))
        .route("/providers/selected", get(selected_provider))
        .route("/config/reload", post(reload_config))
}

/// GET /api/providers
async fn list_providers(State(state): State<Arc<AppState>>) -> Json<ProvidersResponse> {
    let llm = state.llm();
    Json(ProvidersResponse {
        providers: llm.config.provider_model_list(),
        provider_visible: llm.config.is_provider_visible(),
        mode: llm.config.selection.to_string(),
    })
}

/// GET /api/providers/selected. Advances the scheduler in round-robin mode.
async fn selected_provider(State(state): State<Arc<AppState>>) -> Response {
    let label = match state.llm().selected_provider() {
        Ok(label) => label,
        Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    };
    let (provider, model) = split_provider_model(&label).unwrap_or((label.as_str(), ""));

    Json(SelectedProviderResponse {
        provider: provider.to_string(),
        model: model.to_string(),
        provider_model: label.clone(),
    })
    .into_response()
}

/// POST /api/config/reload
async fn reload_config(State(state): State<Arc<AppState>>) -> Response {
    match state.reload_llm() {
        Ok(llm) => Json(ReloadResponse {
            mode: llm.config.selection.to_string(),
            models: llm.factory.len(),
            candidates: llm.scheduler.candidates().len(),
        })
        .into_response(),
        Err(e) => error_response(StatusCode::BAD_REQUEST, e.to_string()),
    }
}
