//! HatBot Store: document retrieval for the QA chain.
//!
//! `SqliteStore` is the persistent FTS5 index written by ingestion.
//! `MemoryRetriever` is the in-process fallback used when no index is
//! available, and `RetrieverFactory` chooses between them from `DB_TYPE`.

pub mod factory;
pub mod retriever;
pub mod schema;
pub mod sqlite;
pub mod types;

pub use factory::RetrieverFactory;
pub use retriever::{MemoryRetriever, Retriever, DEFAULT_DISTANCE_THRESHOLD, DEFAULT_K};
pub use sqlite::SqliteStore;
pub use types::*;
