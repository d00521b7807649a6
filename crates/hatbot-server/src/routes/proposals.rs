//! Streamed proposal generation and exported document downloads.

use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error_response;
use crate::export::ExportFormat;
use crate::metrics::model_id;
use crate::state::AppState;
use hatbot_chat::{ModelEndpoint, ProposalRequest, QueryRequest, RetrievalQa, StreamEvent};
use hatbot_core::Error;
use hatbot_runtime::{ChannelSink, TokenSink};

type SseStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/proposals", post(create_proposal))
        .route("/query", post(query))
        .route("/proposals/{session_id}/document", get(get_document))
}

// ---------------------------------------------------------------
// Streaming generation (SSE)
// ---------------------------------------------------------------

/// POST /api/proposals
async fn create_proposal(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ProposalRequest>,
) -> Response {
    if req.customer.trim().is_empty() || req.product.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "customer and product are required");
    }
    let question = req.question();
    stream_answer(state, req.provider_model, question)
}

/// POST /api/query
async fn query(State(state): State<Arc<AppState>>, Json(req): Json<QueryRequest>) -> Response {
    if req.query.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "query is required");
    }
    stream_answer(state, req.provider_model, req.query)
}

fn stream_answer(
    state: Arc<AppState>,
    provider_model: Option<String>,
    question: String,
) -> Response {
    let llm = state.llm();
    let label = match provider_model.filter(|l| !l.trim().is_empty()) {
        Some(label) => label,
        None => match llm.selected_provider() {
            Ok(label) => label,
            Err(e) => return error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
        },
    };
    let endpoint = match llm.factory.get_by_label(&label) {
        Ok(endpoint) => endpoint.clone(),
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let session_id = Uuid::new_v4().to_string();
    info!("Session {}: answering with {}", session_id, label);
    state.metrics.record_usage(model_id(&label));
    state.metrics.initialize_feedback(model_id(&label));

    let sequence = {
        let work_state = state.clone();
        let label = label.clone();
        let session_id = session_id.clone();
        state.bridge.start(move |sink| {
            generate(work_state, label, endpoint, question, session_id, sink)
        })
    };

    let download_url = format!("/api/proposals/{}/document?format=html", session_id);
    let sse_stream: SseStream = Box::pin(async_stream::stream! {
        let mut sequence = sequence;
        while let Some((content, accumulated)) = sequence.next_fragment().await {
            yield Ok::<_, Infallible>(sse_event(&StreamEvent::Token { content, accumulated }));
        }
        debug!("Session {}: stream finished", session_id);
        yield Ok(sse_event(&StreamEvent::Done {
            session_id,
            model: label,
            download_url,
        }));
    });

    Sse::new(sse_stream).into_response()
}

fn sse_event(event: &StreamEvent) -> Event {
    Event::default()
        .event(event.event_name())
        .json_data(event)
        .unwrap_or_else(|e| {
            warn!("Failed to encode stream event: {}", e);
            Event::default().event("error").data(e.to_string())
        })
}

/// One unit of bridged work: retrieve, generate, export, list sources.
async fn generate(
    state: Arc<AppState>,
    label: String,
    endpoint: ModelEndpoint,
    question: String,
    session_id: String,
    sink: ChannelSink,
) -> hatbot_core::Result<()> {
    let started = Instant::now();
    let retriever = state.retrievers.retriever_or_fallback(&state.config.db_type);
    let qa = RetrievalQa::new(retriever);
    let response = qa.run(&state.http, &endpoint, &question, &sink).await?;

    state
        .metrics
        .record_duration(model_id(&label), started.elapsed().as_secs_f64());
    state.exporter.export(&response.result, &session_id);

    let sources = response.sources();
    if !sources.is_empty() {
        sink.on_token("\n*Sources:* \n");
        for source in sources {
            sink.on_token(&format!("* {}\n", source));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------
// Document download
// ---------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct DocumentQuery {
    #[serde(default)]
    format: Option<String>,
}

/// GET /api/proposals/{session_id}/document?format=html|md
async fn get_document(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(query): Query<DocumentQuery>,
) -> Response {
    let format = match query.format.as_deref() {
        None => ExportFormat::Html,
        Some(name) => match ExportFormat::parse(name) {
            Some(format) => format,
            None => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    format!("unsupported format '{}'", name),
                )
            }
        },
    };

    match state.exporter.read(&session_id, format) {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, format.content_type().to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!(
                        "attachment; filename=\"proposal-{}.{}\"",
                        session_id,
                        format.extension()
                    ),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(Error::NotFound(msg)) => error_response(StatusCode::NOT_FOUND, msg),
        Err(Error::InvalidConfig(msg)) => error_response(StatusCode::BAD_REQUEST, msg),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}
