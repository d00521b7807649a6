//! Data types for documents, chunks, and retrieval results.

use serde::{Deserialize, Serialize};

/// A document row from the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    /// Where the document came from (file path or caller-supplied label).
    pub source: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    pub created_at: i64,
}

/// A chunk row from the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: i64,
    pub doc_id: i64,
    pub text: String,
    pub chunk_index: i32,
    pub created_at: i64,
}

/// Raw full-text hit, before distance conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: i64,
    pub doc_id: i64,
    pub source: String,
    pub text: String,
    /// Positive BM25 relevance; larger is better.
    pub score: f64,
    pub chunk_index: i32,
}

/// A retrieved passage handed to the prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub content: String,
    pub source: String,
    /// Smaller is more similar. Always in `[0, 1]`.
    pub distance: f64,
}

impl SourceDocument {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
            distance: 0.0,
        }
    }
}

/// Store-level statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_documents: i64,
    pub total_chunks: i64,
    pub db_path: String,
    pub db_size_mb: f64,
}

/// Options for adding a document.
#[derive(Debug, Clone, Default)]
pub struct AddDocumentOptions {
    pub source: Option<String>,
    pub content_hash: Option<String>,
    pub created_at: Option<i64>,
}
