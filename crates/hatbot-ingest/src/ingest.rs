//! Document ingestion pipeline: file → text → chunk → store.

use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::chunking::{should_chunk, RecursiveChunker};
use crate::file;
use hatbot_core::{Error, Result};
use hatbot_store::{AddDocumentOptions, SqliteStore};

/// Totals for one `ingest_path` run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct IngestReport {
    pub ingested: usize,
    pub chunks: usize,
    pub duplicates: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Handles document ingestion: text extraction, chunking, and storage.
pub struct Ingester<'a> {
    store: &'a SqliteStore,
    chunker: RecursiveChunker,
}

impl<'a> Ingester<'a> {
    pub fn new(store: &'a SqliteStore) -> Self {
        Self {
            store,
            chunker: RecursiveChunker::default(),
        }
    }

    pub fn with_chunker(store: &'a SqliteStore, chunker: RecursiveChunker) -> Self {
        Self { store, chunker }
    }

    /// Ingest a single file. Returns `(doc_id, chunk_count)`, or `None` when
    /// the file has no usable text.
    pub fn ingest_file(&self, path: &Path) -> Result<Option<(i64, usize)>> {
        let text = match file::extract_text(path)? {
            Some(t) => t,
            None => {
                debug!("No text extracted from {}", path.display());
                return Ok(None);
            }
        };
        let source = path.to_string_lossy().to_string();
        self.ingest_text(&text, &source).map(Some)
    }

    /// Ingest raw text recorded under `source`.
    ///
    /// Identical content is rejected with `DuplicateContent`. New content for
    /// a source that was ingested before replaces the old version.
    pub fn ingest_text(&self, text: &str, source: &str) -> Result<(i64, usize)> {
        let content_hash = content_hash(text);
        if self.store.find_document_by_hash(&content_hash)?.is_some() {
            debug!("Duplicate content, skipping: {}", source);
            return Err(Error::DuplicateContent(content_hash));
        }
        self.store.delete_documents_by_source(source)?;

        let doc_id = self.store.add_document(
            text,
            AddDocumentOptions {
                source: Some(source.to_string()),
                content_hash: Some(content_hash),
                ..Default::default()
            },
        )?;

        let pieces: Vec<String> = if should_chunk(text) {
            self.chunker.chunk(text).into_iter().map(|c| c.text).collect()
        } else {
            vec![text.trim().to_string()]
        };
        for (i, piece) in pieces.iter().enumerate() {
            self.store.add_chunk(doc_id, piece, i as i32)?;
        }

        info!(
            "Ingested document {} from {} with {} chunks",
            doc_id,
            source,
            pieces.len()
        );
        Ok((doc_id, pieces.len()))
    }

    /// Ingest a file, or every supported file below a directory.
    pub fn ingest_path(&self, path: &Path) -> Result<IngestReport> {
        let mut files = Vec::new();
        collect_files(path, &mut files)?;
        files.sort();

        let mut report = IngestReport::default();
        for file in &files {
            match self.ingest_file(file) {
                Ok(Some((_, chunks))) => {
                    report.ingested += 1;
                    report.chunks += chunks;
                }
                Ok(None) => report.skipped += 1,
                Err(Error::DuplicateContent(_)) => report.duplicates += 1,
                Err(e) => {
                    warn!("Failed to ingest {}: {}", file.display(), e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Ingested {} of {} files from {} ({} chunks, {} duplicates, {} skipped, {} failed)",
            report.ingested,
            files.len(),
            path.display(),
            report.chunks,
            report.duplicates,
            report.skipped,
            report.failed
        );
        Ok(report)
    }
}

fn collect_files(path: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let meta = std::fs::metadata(path)
        .map_err(|e| Error::NotFound(format!("{}: {}", path.display(), e)))?;
    if meta.is_file() {
        out.push(path.to_path_buf());
        return Ok(());
    }

    for entry in std::fs::read_dir(path)? {
        let entry_path = entry?.path();
        let hidden = entry_path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with('.'));
        if hidden {
            continue;
        }
        if entry_path.is_dir() {
            collect_files(&entry_path, out)?;
        } else {
            out.push(entry_path);
        }
    }
    Ok(())
}

/// Compute SHA-256 content hash.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
