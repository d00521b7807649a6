//! Streaming clients for each provider family.
//!
//! All four protocols stream server-sent events. They differ only in the
//! request path, the request body and where the token sits in each `data:`
//! payload, so one SSE loop serves every kind with a per-kind extractor.

use std::pin::Pin;

use futures::Stream;
use reqwest::Client;
use serde_json::{json, Map, Value};
use tokio_stream::StreamExt;
use tracing::{debug, error, warn};

use crate::registry::{ModelEndpoint, ProviderKind};
use hatbot_core::{Error, Result};
use hatbot_runtime::TokenSink;

/// Boxed stream type for returning different stream implementations.
pub type BoxedStream = Pin<Box<dyn Stream<Item = StreamChunk> + Send>>;

/// A single streamed token or error.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Token(String),
    Done { tokens_used: usize },
    Error(String),
}

/// Pulls the token text out of one decoded `data:` payload.
type TokenExtractor = fn(&Value) -> Option<&str>;

/// OpenAI-style chat completion delta.
pub fn parse_chat_delta(payload: &Value) -> Option<&str> {
    payload["choices"][0]["delta"]["content"].as_str()
}

/// OpenAI-style text completion.
pub fn parse_completion_delta(payload: &Value) -> Option<&str> {
    payload["choices"][0]["text"].as_str()
}

/// text-generation-inference token event. Special tokens are not text.
pub fn parse_tgi_token(payload: &Value) -> Option<&str> {
    let token = &payload["token"];
    if token["special"].as_bool().unwrap_or(false) {
        return None;
    }
    token["text"].as_str()
}

/// Error message carried in a payload, in either the OpenAI or TGI shape.
fn payload_error(payload: &Value) -> Option<String> {
    match &payload["error"] {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(
            other["message"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| other.to_string()),
        ),
    }
}

fn request_for(endpoint: &ModelEndpoint, prompt: &str) -> (String, Value, TokenExtractor) {
    let mut body = Map::new();
    let extractor: TokenExtractor;
    let path = match endpoint.kind {
        ProviderKind::OpenAi | ProviderKind::Nvidia => {
            body.insert("model".into(), json!(endpoint.model));
            body.insert(
                "messages".into(),
                json!([{ "role": "user", "content": prompt }]),
            );
            body.insert("stream".into(), json!(true));
            body.extend(endpoint.params.clone());
            extractor = parse_chat_delta;
            "/chat/completions"
        }
        ProviderKind::OpenShiftVllm => {
            body.insert("model".into(), json!(endpoint.model));
            body.insert("prompt".into(), json!(prompt));
            body.insert("stream".into(), json!(true));
            body.extend(endpoint.params.clone());
            extractor = parse_completion_delta;
            "/completions"
        }
        ProviderKind::HuggingFace => {
            // TGI serves one model per instance; the name is not sent
            body.insert("inputs".into(), json!(prompt));
            body.insert("parameters".into(), Value::Object(endpoint.params.clone()));
            extractor = parse_tgi_token;
            "/generate_stream"
        }
    };
    (format!("{}{}", endpoint.url, path), Value::Object(body), extractor)
}

/// Stream tokens for `prompt` from the endpoint's provider.
pub fn stream_completion(client: &Client, endpoint: &ModelEndpoint, prompt: &str) -> BoxedStream {
    if endpoint.url.is_empty() {
        let message = format!(
            "No URL configured for {} model {}",
            endpoint.provider, endpoint.model
        );
        return Box::pin(async_stream::stream! {
            yield StreamChunk::Error(message);
        });
    }

    let (url, body, extractor) = request_for(endpoint, prompt);
    Box::pin(stream_sse(
        client.clone(),
        url,
        endpoint.api_key.clone(),
        body,
        extractor,
    ))
}

/// POST `body` and decode the SSE response.
fn stream_sse(
    client: Client,
    url: String,
    api_key: Option<String>,
    body: Value,
    extract: TokenExtractor,
) -> impl Stream<Item = StreamChunk> + Send + 'static {
    async_stream::stream! {
        debug!("Streaming from {}", url);

        let mut request = client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body);
        if let Some(key) = &api_key {
            request = request.bearer_auth(key);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                yield StreamChunk::Error(format!("Request failed: {}", e));
                return;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            yield StreamChunk::Error(format!("API error {}: {}", status, body));
            return;
        }

        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut token_count = 0usize;

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(b) => b,
                Err(e) => {
                    yield StreamChunk::Error(format!("Stream read error: {}", e));
                    return;
                }
            };

            buffer.extend_from_slice(&bytes);

            // Decode complete lines only; a read may end inside a character
            while let Some(line_end) = buffer.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = buffer.drain(..=line_end).collect();
                let line = match String::from_utf8(raw) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("Skipping non-UTF-8 line from {}: {}", url, e);
                        continue;
                    }
                };
                let line = line.trim();

                if line.is_empty() || line.starts_with(':') {
                    continue;
                }

                let Some(data) = line.strip_prefix("data:") else {
                    continue;
                };
                let data = data.trim_start();
                if data == "[DONE]" {
                    yield StreamChunk::Done { tokens_used: token_count };
                    return;
                }

                let parsed = match serde_json::from_str::<Value>(data) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                if let Some(message) = payload_error(&parsed) {
                    error!("Provider error from {}: {}", url, message);
                    yield StreamChunk::Error(message);
                    return;
                }
                if let Some(content) = extract(&parsed) {
                    if !content.is_empty() {
                        token_count += 1;
                        yield StreamChunk::Token(content.to_string());
                    }
                }
            }
        }

        yield StreamChunk::Done { tokens_used: token_count };
    }
}

/// Forward every token of `stream` to `sink` and return the full text.
///
/// Stops with `Error::Cancelled` once the sink reports cancellation.
pub async fn drive_stream(mut stream: BoxedStream, sink: &dyn TokenSink) -> Result<String> {
    let mut text = String::new();
    while let Some(chunk) = stream.next().await {
        if sink.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match chunk {
            StreamChunk::Token(token) => {
                sink.on_token(&token);
                text.push_str(&token);
            }
            StreamChunk::Done { tokens_used } => {
                debug!("Stream finished after {} tokens", tokens_used);
                break;
            }
            StreamChunk::Error(e) => return Err(Error::WorkFailure(e)),
        }
    }
    Ok(text)
}

/// Run `prompt` against `endpoint`, streaming tokens into `sink`.
pub async fn invoke(
    client: &Client,
    endpoint: &ModelEndpoint,
    prompt: &str,
    sink: &dyn TokenSink,
) -> Result<String> {
    drive_stream(stream_completion(client, endpoint, prompt), sink).await
}
