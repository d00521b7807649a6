//! HatBot Ingest: text chunking and file ingestion into the document index.

pub mod chunking;
pub mod file;
pub mod ingest;

pub use chunking::{RecursiveChunker, TextChunk};
pub use ingest::{content_hash, IngestReport, Ingester};
