//! Request and response types of the HTTP API.

use serde::{Deserialize, Serialize};

/// Products the proposal form offers.
pub const PRODUCTS: &[&str] = &[
    "Red Hat OpenShift",
    "Red Hat OpenShift Data Science",
    "Red Hat AMQ Streams",
];

/// Incoming proposal request.
#[derive(Debug, Clone, Deserialize)]
pub struct ProposalRequest {
    /// `"Provider: model"`; the selected default is used when absent.
    #[serde(default, rename = "providerModel")]
    pub provider_model: Option<String>,
    pub customer: String,
    pub product: String,
}

impl ProposalRequest {
    /// Question handed to the QA chain.
    pub fn question(&self) -> String {
        format!(
            "Generate a Sales Proposal for the product '{}' to sell to company '{}' that includes overview, features, benefits, and support options",
            self.product, self.customer
        )
    }
}

/// Free-form question against the documentation.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    #[serde(default, rename = "providerModel")]
    pub provider_model: Option<String>,
    pub query: String,
}

/// Star rating for the model that produced an answer.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackRequest {
    #[serde(rename = "providerModel")]
    pub provider_model: String,
    pub stars: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedbackResponse {
    pub message: String,
}

/// SSE stream event types.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    #[serde(rename = "token")]
    Token { content: String, accumulated: String },
    #[serde(rename = "done")]
    Done {
        #[serde(rename = "sessionId")]
        session_id: String,
        model: String,
        #[serde(rename = "downloadUrl")]
        download_url: String,
    },
}

impl StreamEvent {
    /// SSE `event:` field.
    pub fn event_name(&self) -> &'static str {
        match self {
            StreamEvent::Token { .. } => "token",
            StreamEvent::Done { .. } => "done",
        }
    }
}

/// `GET /api/status` response.
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub title: String,
    pub mode: String,
    #[serde(rename = "providerVisible")]
    pub provider_visible: bool,
    pub products: Vec<String>,
    pub retriever: String,
}

/// `GET /api/providers` response.
#[derive(Debug, Clone, Serialize)]
pub struct ProvidersResponse {
    pub providers: Vec<String>,
    #[serde(rename = "providerVisible")]
    pub provider_visible: bool,
    pub mode: String,
}

/// `GET /api/providers/selected` response.
#[derive(Debug, Clone, Serialize)]
pub struct SelectedProviderResponse {
    #[serde(rename = "providerModel")]
    pub provider_model: String,
    pub provider: String,
    pub model: String,
}

/// `POST /api/config/reload` response.
#[derive(Debug, Clone, Serialize)]
pub struct ReloadResponse {
    pub mode: String,
    pub models: usize,
    pub candidates: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proposal_question() {
        let req: ProposalRequest = serde_json::from_str(
            r#"{"customer": "Acme", "product": "Red Hat AMQ Streams"}"#,
        )
        .unwrap();
        assert!(req.provider_model.is_none());
        assert_eq!(
            req.question(),
            "Generate a Sales Proposal for the product 'Red Hat AMQ Streams' to sell to company 'Acme' that includes overview, features, benefits, and support options"
        );
    }

    #[test]
    fn test_stream_event_json() {
        let event = StreamEvent::Done {
            session_id: "s".into(),
            model: "m".into(),
            download_url: "/d".into(),
        };
        assert_eq!(event.event_name(), "done");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "done");
        assert_eq!(json["sessionId"], "s");
        assert_eq!(json["downloadUrl"], "/d");
    }
}
