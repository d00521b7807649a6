//! Maps a `DB_TYPE` name onto a retriever instance.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::retriever::{MemoryRetriever, Retriever};
use crate::sqlite::SqliteStore;
use hatbot_core::{Error, Result};

pub const SQLITE: &str = "SQLITE";
pub const MEMORY: &str = "MEMORY";

/// Creates retrievers on first use and caches the ones that opened.
pub struct RetrieverFactory {
    vectordb_dir: PathBuf,
    retrievers: Mutex<HashMap<String, Arc<dyn Retriever>>>,
}

impl RetrieverFactory {
    pub fn new(vectordb_dir: impl Into<PathBuf>) -> Self {
        Self {
            vectordb_dir: vectordb_dir.into(),
            retrievers: Mutex::new(HashMap::new()),
        }
    }

    pub fn supported_types() -> &'static [&'static str] {
        &[SQLITE, MEMORY]
    }

    fn create(&self, db_type: &str) -> Result<Arc<dyn Retriever>> {
        match db_type {
            SQLITE => Ok(Arc::new(SqliteStore::open_existing(&self.vectordb_dir)?)),
            MEMORY => Ok(Arc::new(MemoryRetriever::empty())),
            other => Err(Error::RetrieverUnavailable(format!(
                "unsupported DB_TYPE '{}'",
                other
            ))),
        }
    }

    /// Retriever for `db_type` (case-insensitive). Failed opens are retried next call.
    pub fn get_retriever(&self, db_type: &str) -> Result<Arc<dyn Retriever>> {
        let key = db_type.trim().to_ascii_uppercase();
        if let Some(existing) = self.retrievers.lock().get(&key) {
            return Ok(existing.clone());
        }

        let retriever = self.create(&key)?;
        info!("Opened {} retriever", key);
        Ok(self
            .retrievers
            .lock()
            .entry(key)
            .or_insert(retriever)
            .clone())
    }

    /// Like `get_retriever`, but an unavailable store becomes the empty
    /// in-memory retriever.
    pub fn retriever_or_fallback(&self, db_type: &str) -> Arc<dyn Retriever> {
        match self.get_retriever(db_type) {
            Ok(retriever) => retriever,
            Err(e) => {
                warn!(
                    "{} retriever unavailable ({}). Responses will be generated without RAG content.",
                    db_type, e
                );
                Arc::new(MemoryRetriever::empty())
            }
        }
    }
}
