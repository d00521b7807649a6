//! The `Retriever` seam and the in-memory implementation.

use std::collections::HashSet;

use tracing::debug;

use crate::types::SourceDocument;
use hatbot_core::Result;

/// Number of passages retrieved per question.
pub const DEFAULT_K: usize = 4;

/// Passages farther than this are not handed to the prompt.
pub const DEFAULT_DISTANCE_THRESHOLD: f64 = 0.5;

/// A similarity search over some document collection.
pub trait Retriever: Send + Sync {
    /// Short name reported by `/api/status`.
    fn kind(&self) -> &str;

    /// Up to `k` passages with `distance <= distance_threshold`, closest first.
    fn similarity_search(
        &self,
        query: &str,
        k: usize,
        distance_threshold: f64,
    ) -> Result<Vec<SourceDocument>>;
}

/// Term-overlap retriever over a fixed list of passages.
///
/// Distance is the fraction of query terms missing from the passage. The
/// empty instance always returns nothing and serves as the no-context
/// fallback.
#[derive(Debug, Default, Clone)]
pub struct MemoryRetriever {
    documents: Vec<SourceDocument>,
}

impl MemoryRetriever {
    pub fn new(documents: Vec<SourceDocument>) -> Self {
        Self { documents }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

pub(crate) fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

impl Retriever for MemoryRetriever {
    fn kind(&self) -> &str {
        "MEMORY"
    }

    fn similarity_search(
        &self,
        query: &str,
        k: usize,
        distance_threshold: f64,
    ) -> Result<Vec<SourceDocument>> {
        let query_terms = terms(query);
        if query_terms.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<SourceDocument> = self
            .documents
            .iter()
            .filter_map(|doc| {
                let doc_terms = terms(&doc.content);
                let overlap = query_terms.intersection(&doc_terms).count();
                if overlap == 0 {
                    return None;
                }
                let distance = 1.0 - overlap as f64 / query_terms.len() as f64;
                (distance <= distance_threshold).then(|| SourceDocument {
                    distance,
                    ..doc.clone()
                })
            })
            .collect();

        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        scored.truncate(k);
        debug!("Memory search '{}' -> {} passages", query, scored.len());
        Ok(scored)
    }
}
