//! SQLite document index with FTS5 BM25 search.
//!
//! Documents are split into chunks at ingest time; each chunk row is mirrored
//! into an external-content FTS5 table by triggers. Retrieval ranks chunks by
//! BM25 and reports `distance = 1 / (1 + bm25)`.

use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::retriever::Retriever;
use crate::schema::{FTS_SCHEMA_SQL, FTS_TRIGGERS_SQL, SCHEMA_SQL};
use crate::types::*;
use hatbot_core::{Error, Result};

/// File name of the index inside the vectordb directory.
pub const DB_FILE_NAME: &str = "hatbot.db";

/// SQLite store with FTS5 full-text search.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl SqliteStore {
    /// Open or create the store.
    ///
    /// `db_dir` is the directory (e.g., `data/vectordb/`). The file will be `db_dir/hatbot.db`.
    pub fn open(db_dir: impl AsRef<Path>) -> Result<Self> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir).map_err(|e| Error::Storage(e.to_string()))?;
        Self::open_path(db_dir.join(DB_FILE_NAME))
    }

    /// Open an index that ingestion has already created.
    pub fn open_existing(db_dir: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_dir.as_ref().join(DB_FILE_NAME);
        if !db_path.is_file() {
            return Err(Error::RetrieverUnavailable(format!(
                "no document index at {}",
                db_path.display()
            )));
        }
        Self::open_path(db_path)
    }

    fn open_path(db_path: PathBuf) -> Result<Self> {
        let conn = Self::create_connection(&db_path)?;
        Self::init_schema(&conn)?;

        let store = Self {
            conn: Mutex::new(conn),
            db_path,
        };

        info!(
            "SqliteStore initialized: {} documents, {} chunks, path={}",
            store.count_documents()?,
            store.count_chunks()?,
            store.db_path.display()
        );
        Ok(store)
    }

    fn create_connection(db_path: &Path) -> Result<Connection> {
        let conn = Connection::open(db_path).map_err(|e| Error::Database(e.to_string()))?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(|e| Error::Database(e.to_string()))?;
        Ok(conn)
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        let full_schema = format!("{}\n{}\n{}", SCHEMA_SQL, FTS_SCHEMA_SQL, FTS_TRIGGERS_SQL);
        conn.execute_batch(&full_schema)
            .map_err(|e| Error::Database(format!("Schema init failed: {}", e)))?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    // ---------------------------------------------------------------
    // Documents
    // ---------------------------------------------------------------

    /// Insert a document. Returns the new document ID.
    pub fn add_document(&self, text: &str, opts: AddDocumentOptions) -> Result<i64> {
        let now = opts.created_at.unwrap_or_else(now_millis);
        let source = opts.source.unwrap_or_default();

        let conn = self.conn.lock();
        let id = conn
            .prepare_cached(
                "INSERT INTO documents (source, text, content_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .insert(params![source, text, opts.content_hash, now])
            .map_err(|e| {
                if e.to_string().contains("UNIQUE constraint") {
                    Error::DuplicateContent(opts.content_hash.clone().unwrap_or_default())
                } else {
                    Error::Database(e.to_string())
                }
            })?;
        debug!("Added document {} from '{}'", id, source);
        Ok(id)
    }

    /// Find a document by content hash.
    pub fn find_document_by_hash(&self, content_hash: &str) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        let row = conn
            .prepare_cached("SELECT * FROM documents WHERE content_hash = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![content_hash], |row| Ok(Self::row_to_document(row)))
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row)
    }

    /// Get a document by ID.
    pub fn get_document(&self, doc_id: i64) -> Result<Option<Document>> {
        let conn = self.conn.lock();
        let row = conn
            .prepare_cached("SELECT * FROM documents WHERE id = ?1")
            .map_err(|e| Error::Database(e.to_string()))?
            .query_row(params![doc_id], |row| Ok(Self::row_to_document(row)))
            .optional()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(row)
    }

    /// Delete every document recorded under `source`, with its chunks.
    pub fn delete_documents_by_source(&self, source: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let count = conn
            .execute("DELETE FROM documents WHERE source = ?1", params![source])
            .map_err(|e| Error::Database(e.to_string()))?;
        if count > 0 {
            info!("Removed {} stale documents for '{}'", count, source);
        }
        Ok(count)
    }

    /// Count total documents.
    pub fn count_documents(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(count)
    }

    // ---------------------------------------------------------------
    // Chunks
    // ---------------------------------------------------------------

    /// Insert a chunk. Returns the new chunk ID.
    pub fn add_chunk(&self, doc_id: i64, text: &str, chunk_index: i32) -> Result<i64> {
        let conn = self.conn.lock();
        let id = conn
            .prepare_cached(
                "INSERT INTO chunks (doc_id, text, chunk_index, created_at) VALUES (?1, ?2, ?3, ?4)",
            )
            .map_err(|e| Error::Database(e.to_string()))?
            .insert(params![doc_id, text, chunk_index, now_millis()])
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(id)
    }

    /// Get all chunks for a document.
    pub fn get_chunks_for_document(&self, doc_id: i64) -> Result<Vec<Chunk>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare_cached("SELECT * FROM chunks WHERE doc_id = ?1 ORDER BY chunk_index")
            .map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![doc_id], |row| Ok(Self::row_to_chunk(row)))
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Count total chunks.
    pub fn count_chunks(&self) -> Result<i64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(count)
    }

    // ---------------------------------------------------------------
    // BM25 Search (FTS5)
    // ---------------------------------------------------------------

    /// Full-text search using FTS5 BM25 ranking.
    pub fn bm25_search(&self, query: &str, top_k: usize) -> Result<Vec<SearchHit>> {
        let fts_query = Self::sanitize_fts_query(query);
        if fts_query.is_empty() {
            return Ok(Vec::new());
        }

        let conn = self.conn.lock();
        let sql = "SELECT c.id, c.doc_id, c.text, c.chunk_index, d.source, \
                          chunks_fts.rank AS bm25_score \
                   FROM chunks_fts \
                   JOIN chunks c ON c.id = chunks_fts.rowid \
                   JOIN documents d ON d.id = c.doc_id \
                   WHERE chunks_fts MATCH ?1 \
                   ORDER BY chunks_fts.rank \
                   LIMIT ?2";

        let mut stmt = conn.prepare_cached(sql).map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params![fts_query, top_k as i64], |row| {
                let bm25_score: f64 = row.get("bm25_score").unwrap_or(0.0);
                Ok(SearchHit {
                    chunk_id: row.get("id")?,
                    doc_id: row.get("doc_id")?,
                    source: row.get("source")?,
                    text: row.get("text")?,
                    score: -bm25_score, // FTS5 rank is negative; negate for positive
                    chunk_index: row.get("chunk_index")?,
                })
            })
            .map_err(|e| Error::Database(e.to_string()))?;

        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Sanitize a user query for FTS5 MATCH syntax.
    /// Wraps each token in double quotes and joins with OR.
    fn sanitize_fts_query(query: &str) -> String {
        let tokens: Vec<String> = query
            .split_whitespace()
            .map(|t| t.replace('"', ""))
            .filter(|t| t.chars().any(|c| c.is_alphanumeric()))
            .map(|t| format!("\"{}\"", t))
            .collect();
        tokens.join(" OR ")
    }

    /// Map a BM25 relevance onto `[0, 1]`, smaller meaning closer.
    pub fn bm25_distance(score: f64) -> f64 {
        1.0 / (1.0 + score.max(0.0))
    }

    // ---------------------------------------------------------------
    // Stats
    // ---------------------------------------------------------------

    /// Get store statistics.
    pub fn get_stats(&self) -> Result<StoreStats> {
        let db_size = std::fs::metadata(&self.db_path)
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(StoreStats {
            total_documents: self.count_documents()?,
            total_chunks: self.count_chunks()?,
            db_path: self.db_path.to_string_lossy().to_string(),
            db_size_mb: db_size as f64 / (1024.0 * 1024.0),
        })
    }

    // ---------------------------------------------------------------
    // Row Mapping Helpers
    // ---------------------------------------------------------------

    fn row_to_document(row: &rusqlite::Row<'_>) -> Document {
        Document {
            id: row.get("id").unwrap_or(0),
            source: row.get("source").unwrap_or_default(),
            text: row.get("text").unwrap_or_default(),
            content_hash: row.get("content_hash").ok().flatten(),
            created_at: row.get("created_at").unwrap_or(0),
        }
    }

    fn row_to_chunk(row: &rusqlite::Row<'_>) -> Chunk {
        Chunk {
            id: row.get("id").unwrap_or(0),
            doc_id: row.get("doc_id").unwrap_or(0),
            text: row.get("text").unwrap_or_default(),
            chunk_index: row.get("chunk_index").unwrap_or(0),
            created_at: row.get("created_at").unwrap_or(0),
        }
    }
}

impl Retriever for SqliteStore {
    fn kind(&self) -> &str {
        "SQLITE"
    }

    fn similarity_search(
        &self,
        query: &str,
        k: usize,
        distance_threshold: f64,
    ) -> Result<Vec<SourceDocument>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let docs: Vec<SourceDocument> = self
            .bm25_search(query, k)?
            .into_iter()
            .map(|hit| SourceDocument {
                distance: Self::bm25_distance(hit.score),
                content: hit.text,
                source: hit.source,
            })
            .filter(|doc| doc.distance <= distance_threshold)
            .collect();
        debug!("BM25 search '{}' -> {} passages", query, docs.len());
        Ok(docs)
    }
}
