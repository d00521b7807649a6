//! Retrieval-augmented question answering.
//!
//! Retrieved passages are "stuffed" into a single prompt together with the
//! question and sent to the selected model in one streamed request.

use std::sync::Arc;

use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use crate::providers;
use crate::registry::ModelEndpoint;
use hatbot_core::{Error, Result};
use hatbot_runtime::TokenSink;
use hatbot_store::{Retriever, SourceDocument, DEFAULT_DISTANCE_THRESHOLD, DEFAULT_K};

/// Prompt used to write sales proposals.
pub const PROPOSAL_PROMPT: &str = r#"
### [INST]
Instructions:
- You are a helpful assistant in writing a project proposal for products owned by Red Hat for the company name provided in the question below.
- Your job is to look at the  question and create the project proposal addressed to the company mentioned in question.
- Base your answer on the provided context and question and not on prior knowledge.
- The proposal should contain headings and sub-headings and each heading and sub-heading should be in bold.
- Generate the project proposal in markdown language.
- Each section in the proposal should contain only three items.
- Proposal should be minimum of 500 lines.

Here is context to help:
{context}

### QUESTION:
Question: {question}

[/INST]
"#;

/// A prompt with `{context}` and `{question}` placeholders.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        for var in ["{context}", "{question}"] {
            if !template.contains(var) {
                return Err(Error::InvalidConfig(format!(
                    "prompt template is missing {}",
                    var
                )));
            }
        }
        Ok(Self { template })
    }

    pub fn proposal() -> Self {
        Self {
            template: PROPOSAL_PROMPT.to_string(),
        }
    }

    pub fn render(&self, context: &str, question: &str) -> String {
        self.template
            .replace("{context}", context)
            .replace("{question}", question)
    }
}

/// Answer text and the passages it was grounded on.
#[derive(Debug, Clone, Serialize)]
pub struct QaResponse {
    pub result: String,
    pub source_documents: Vec<SourceDocument>,
}

impl QaResponse {
    pub fn sources(&self) -> Vec<String> {
        unique_sources(&self.source_documents)
    }
}

/// Retrieve, prompt, generate.
pub struct RetrievalQa {
    retriever: Arc<dyn Retriever>,
    prompt: PromptTemplate,
    k: usize,
    distance_threshold: f64,
}

impl RetrievalQa {
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self {
            retriever,
            prompt: PromptTemplate::proposal(),
            k: DEFAULT_K,
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
        }
    }

    pub fn with_prompt(mut self, prompt: PromptTemplate) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_search(mut self, k: usize, distance_threshold: f64) -> Self {
        self.k = k;
        self.distance_threshold = distance_threshold;
        self
    }

    /// Passages for `question`. A failing retriever yields no context.
    pub fn retrieve(&self, question: &str) -> Vec<SourceDocument> {
        match self
            .retriever
            .similarity_search(question, self.k, self.distance_threshold)
        {
            Ok(docs) => docs,
            Err(e) => {
                warn!(
                    "{} retriever failed ({}). Answering without RAG content.",
                    self.retriever.kind(),
                    e
                );
                Vec::new()
            }
        }
    }

    pub fn build_prompt(&self, question: &str, docs: &[SourceDocument]) -> String {
        let context = docs
            .iter()
            .map(|d| d.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        self.prompt.render(&context, question)
    }

    /// Answer `question` with `endpoint`, streaming generated tokens into `sink`.
    pub async fn run(
        &self,
        client: &Client,
        endpoint: &ModelEndpoint,
        question: &str,
        sink: &dyn TokenSink,
    ) -> Result<QaResponse> {
        let source_documents = self.retrieve(question);
        debug!(
            "QA: {} passages for {}:{}",
            source_documents.len(),
            endpoint.provider,
            endpoint.model
        );
        let prompt = self.build_prompt(question, &source_documents);
        let result = providers::invoke(client, endpoint, &prompt, sink).await?;
        Ok(QaResponse {
            result,
            source_documents,
        })
    }
}

/// Distinct sources in first-seen order.
pub fn unique_sources(docs: &[SourceDocument]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::new();
    for doc in docs {
        if !unique.contains(&doc.source) {
            unique.push(doc.source.clone());
        }
    }
    unique
}
