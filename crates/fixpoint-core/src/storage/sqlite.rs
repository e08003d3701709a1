//! SQLite Storage Implementation
//!
//! Core memory store with optional integrated embeddings and vector search.
//! Falls back to case-insensitive substring search whenever the vector path
//! is unavailable; an embedding failure never fails a write.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

#[cfg(all(feature = "embeddings", feature = "vector-search"))]
use std::num::NonZeroUsize;

#[cfg(all(feature = "embeddings", feature = "vector-search"))]
use lru::LruCache;

use crate::memory::{HealthState, MemoryHealth, MemoryRecord, StoreInput};
use crate::search::escape_like_pattern;

#[cfg(feature = "embeddings")]
use crate::embeddings::EmbeddingService;

#[cfg(all(feature = "embeddings", feature = "vector-search"))]
use crate::search::VectorIndex;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Storage error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(i64),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Metadata was not valid JSON
    #[error("Invalid metadata for record {0}: {1}")]
    InvalidMetadata(i64, String),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

// ============================================================================
// PRUNE PLAN
// ============================================================================

/// A set of mutations the pruner wants applied atomically to one namespace
///
/// Either every deletion and every consolidated insert succeeds, or the
/// namespace is left untouched.
#[derive(Debug, Default, Clone)]
pub struct PrunePlan {
    /// Record ids to delete
    pub remove_ids: Vec<i64>,
    /// Synthetic summary records to insert
    pub consolidations: Vec<StoreInput>,
}

impl PrunePlan {
    pub fn is_empty(&self) -> bool {
        self.remove_ids.is_empty() && self.consolidations.is_empty()
    }
}

// ============================================================================
// STORE
// ============================================================================

/// Persistent memory store over a single SQLite database
///
/// Separate reader/writer connections behind mutexes give interior
/// mutability: all methods take `&self`, so the store is `Send + Sync` and
/// callers share it behind an `Arc` without an outer lock. Writes are
/// serialized on the writer mutex, which also provides the per-namespace
/// linearizability the rest of the system assumes.
pub struct MemoryStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    /// Keeps an ephemeral store's backing directory alive
    _temp_dir: Option<tempfile::TempDir>,
    #[cfg(feature = "embeddings")]
    embedder: EmbeddingService,
    #[cfg(all(feature = "embeddings", feature = "vector-search"))]
    vector_index: Mutex<VectorIndex>,
    #[cfg(all(feature = "embeddings", feature = "vector-search"))]
    index_rebuilt: std::sync::atomic::AtomicBool,
    /// LRU cache for query embeddings to avoid re-embedding repeated queries
    #[cfg(all(feature = "embeddings", feature = "vector-search"))]
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl MemoryStore {
    /// Apply PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (or create) a store at the given path, or the platform default
    ///
    /// The default location is the platform data directory, overridable with
    /// the `FIXPOINT_DB` environment variable (see [`crate::config`]).
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => Self::default_db_path()?,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let writer_conn = Connection::open(&path)?;
        Self::configure_connection(&writer_conn)?;
        super::migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self::from_connections(writer_conn, reader_conn))
    }

    /// Ephemeral store for tests and throwaway runs
    ///
    /// Backed by a temp file that disappears with the store, so the full
    /// WAL/concurrency path is exercised. Ephemeral stores are text-only:
    /// pulling an embedding model for a throwaway database is never
    /// worth it.
    pub fn in_memory() -> Result<Self> {
        let temp_dir = tempfile::TempDir::with_prefix("fixpoint_store_")?;
        let mut store = Self::new(Some(temp_dir.path().join("fixpoint.db")))?;
        store._temp_dir = Some(temp_dir);
        #[cfg(feature = "embeddings")]
        {
            store.embedder = EmbeddingService::disabled();
        }
        Ok(store)
    }

    fn from_connections(writer: Connection, reader: Connection) -> Self {
        Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            _temp_dir: None,
            #[cfg(feature = "embeddings")]
            embedder: EmbeddingService::new(),
            #[cfg(all(feature = "embeddings", feature = "vector-search"))]
            vector_index: Mutex::new(VectorIndex::new()),
            #[cfg(all(feature = "embeddings", feature = "vector-search"))]
            index_rebuilt: std::sync::atomic::AtomicBool::new(false),
            #[cfg(all(feature = "embeddings", feature = "vector-search"))]
            query_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(100).expect("cache capacity is non-zero"),
            )),
        }
    }

    fn default_db_path() -> Result<PathBuf> {
        if let Some(path) = crate::config::database_path_override() {
            return Ok(path);
        }
        let proj_dirs = ProjectDirs::from("dev", "fixpoint", "fixpoint")
            .ok_or_else(|| StorageError::Init("could not determine project directories".into()))?;
        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;
        Ok(data_dir.join("fixpoint.db"))
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Append a record, returning its new id
    ///
    /// Embedding and vector indexing are best-effort: a failure there is
    /// logged and the record stays text-searchable.
    pub fn store(&self, input: StoreInput) -> Result<i64> {
        let metadata = input.metadata.unwrap_or_else(|| Value::Object(Default::default()));
        let metadata_json = serde_json::to_string(&metadata)
            .map_err(|e| StorageError::InvalidMetadata(0, e.to_string()))?;
        let timestamp = Utc::now().timestamp_micros() as f64 / 1_000_000.0;

        let id = {
            let conn = self.writer.lock().expect("writer lock poisoned");
            conn.execute(
                "INSERT INTO memories (namespace, content, metadata, timestamp)
                 VALUES (?1, ?2, ?3, ?4)",
                params![input.namespace, input.content, metadata_json, timestamp],
            )?;
            conn.last_insert_rowid()
        };

        self.index_record(id, &input.content);

        Ok(id)
    }

    /// Embed and index a record's content; assigns `vector_id` on success
    #[cfg(all(feature = "embeddings", feature = "vector-search"))]
    fn index_record(&self, id: i64, content: &str) {
        if !self.embedder.is_enabled() {
            return;
        }
        let vector = match self.embedder.embed(content) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(record_id = id, error = %e, "embedding failed, record stays text-only");
                return;
            }
        };

        let mut index = self.vector_index.lock().expect("vector index lock poisoned");
        if let Err(e) = index.add(id as u64, &vector) {
            tracing::warn!(record_id = id, error = %e, "vector index add failed");
            return;
        }
        drop(index);

        let conn = self.writer.lock().expect("writer lock poisoned");
        if let Err(e) = conn.execute(
            "UPDATE memories SET vector_id = ?1 WHERE id = ?1",
            params![id],
        ) {
            tracing::warn!(record_id = id, error = %e, "failed to persist vector id");
        }
    }

    #[cfg(not(all(feature = "embeddings", feature = "vector-search")))]
    fn index_record(&self, _id: i64, _content: &str) {}

    /// Delete a record by id; returns whether a row was removed
    pub fn delete(&self, id: i64) -> Result<bool> {
        let removed = {
            let conn = self.writer.lock().expect("writer lock poisoned");
            conn.execute("DELETE FROM memories WHERE id = ?1", params![id])?
        };
        #[cfg(all(feature = "embeddings", feature = "vector-search"))]
        if removed > 0 {
            let mut index = self.vector_index.lock().expect("vector index lock poisoned");
            index.remove(id as u64);
        }
        Ok(removed > 0)
    }

    /// Remove every record in a namespace; returns the number removed
    pub fn clear_namespace(&self, namespace: &str) -> Result<usize> {
        #[cfg(all(feature = "embeddings", feature = "vector-search"))]
        let ids: Vec<i64> = {
            let conn = self.reader.lock().expect("reader lock poisoned");
            let mut stmt = conn.prepare(
                "SELECT id FROM memories WHERE namespace = ?1 AND vector_id IS NOT NULL",
            )?;
            let rows = stmt.query_map(params![namespace], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<Vec<i64>>>()?
        };

        let removed = {
            let conn = self.writer.lock().expect("writer lock poisoned");
            conn.execute("DELETE FROM memories WHERE namespace = ?1", params![namespace])?
        };

        #[cfg(all(feature = "embeddings", feature = "vector-search"))]
        {
            let mut index = self.vector_index.lock().expect("vector index lock poisoned");
            for id in ids {
                index.remove(id as u64);
            }
        }

        Ok(removed)
    }

    /// Apply a prune plan atomically: all deletions and consolidated inserts
    /// for the namespace commit together or not at all
    pub fn apply_prune_plan(&self, namespace: &str, plan: &PrunePlan) -> Result<(usize, usize)> {
        if plan.is_empty() {
            return Ok((0, 0));
        }

        let mut inserted_ids = Vec::with_capacity(plan.consolidations.len());
        let removed;
        {
            let mut conn = self.writer.lock().expect("writer lock poisoned");
            let tx = conn.transaction()?;

            let mut removed_count = 0usize;
            for id in &plan.remove_ids {
                removed_count += tx.execute(
                    "DELETE FROM memories WHERE id = ?1 AND namespace = ?2",
                    params![id, namespace],
                )?;
            }

            for input in &plan.consolidations {
                let metadata = input.metadata.clone().unwrap_or_else(|| Value::Object(Default::default()));
                let metadata_json = serde_json::to_string(&metadata)
                    .map_err(|e| StorageError::InvalidMetadata(0, e.to_string()))?;
                let timestamp = Utc::now().timestamp_micros() as f64 / 1_000_000.0;
                tx.execute(
                    "INSERT INTO memories (namespace, content, metadata, timestamp)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![namespace, input.content, metadata_json, timestamp],
                )?;
                inserted_ids.push((tx.last_insert_rowid(), input.content.clone()));
            }

            tx.commit()?;
            removed = removed_count;
        }

        // Vector maintenance happens outside the transaction: the index is
        // advisory and reconstructible, the rows are ground truth.
        #[cfg(all(feature = "embeddings", feature = "vector-search"))]
        {
            let mut index = self.vector_index.lock().expect("vector index lock poisoned");
            for id in &plan.remove_ids {
                index.remove(*id as u64);
            }
        }
        for (id, content) in &inserted_ids {
            self.index_record(*id, content);
        }

        Ok((removed, inserted_ids.len()))
    }

    // ========================================================================
    // READS
    // ========================================================================

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryRecord> {
        let id: i64 = row.get(0)?;
        let metadata_raw: String = row.get(3)?;
        let metadata =
            serde_json::from_str(&metadata_raw).unwrap_or_else(|_| Value::Object(Default::default()));
        Ok(MemoryRecord {
            id,
            namespace: row.get(1)?,
            content: row.get(2)?,
            metadata,
            timestamp: row.get(4)?,
            vector_id: row.get(5)?,
            created_at: row
                .get::<_, Option<DateTime<Utc>>>(6)?
                .unwrap_or_else(Utc::now),
        })
    }

    const RECORD_COLUMNS: &'static str =
        "id, namespace, content, metadata, timestamp, vector_id, created_at";

    /// Fetch a single record by id
    pub fn get(&self, id: i64) -> Result<Option<MemoryRecord>> {
        let conn = self.reader.lock().expect("reader lock poisoned");
        let record = conn
            .query_row(
                &format!("SELECT {} FROM memories WHERE id = ?1", Self::RECORD_COLUMNS),
                params![id],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// All records in a namespace, newest first (pruner's working set)
    pub fn records(&self, namespace: &str) -> Result<Vec<MemoryRecord>> {
        let conn = self.reader.lock().expect("reader lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM memories WHERE namespace = ?1 ORDER BY timestamp DESC",
            Self::RECORD_COLUMNS
        ))?;
        let rows = stmt.query_map(params![namespace], Self::row_to_record)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Count records in one namespace
    pub fn count(&self, namespace: &str) -> Result<usize> {
        let conn = self.reader.lock().expect("reader lock poisoned");
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memories WHERE namespace = ?1",
            params![namespace],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Count records across all namespaces
    pub fn total_count(&self) -> Result<usize> {
        let conn = self.reader.lock().expect("reader lock poisoned");
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Distinct namespaces, alphabetical
    pub fn list_namespaces(&self) -> Result<Vec<String>> {
        let conn = self.reader.lock().expect("reader lock poisoned");
        let mut stmt =
            conn.prepare("SELECT DISTINCT namespace FROM memories ORDER BY namespace")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Search a namespace
    ///
    /// When the vector index is populated and the query is non-empty,
    /// returns records with cosine similarity >= `threshold`, ordered by
    /// (similarity desc, timestamp desc). Otherwise falls back to a
    /// case-insensitive substring match ordered by timestamp desc. Both
    /// branches escape LIKE metacharacters before touching SQL.
    pub fn search(
        &self,
        namespace: &str,
        query: &str,
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<MemoryRecord>> {
        #[cfg(all(feature = "embeddings", feature = "vector-search"))]
        if !query.is_empty() && self.embedder.is_enabled() {
            self.ensure_index_rebuilt();
            match self.vector_search(namespace, query, limit, threshold) {
                Ok(Some(records)) => return Ok(records),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "vector search failed, falling back to text");
                }
            }
        }
        let _ = threshold;
        self.text_search(namespace, query, limit)
    }

    /// Vector branch; `Ok(None)` means the index had nothing to offer and
    /// the caller should fall back to text search
    #[cfg(all(feature = "embeddings", feature = "vector-search"))]
    fn vector_search(
        &self,
        namespace: &str,
        query: &str,
        limit: usize,
        threshold: f32,
    ) -> Result<Option<Vec<MemoryRecord>>> {
        {
            let index = self.vector_index.lock().expect("vector index lock poisoned");
            if index.is_empty() {
                return Ok(None);
            }
        }

        let query_vector = {
            let mut cache = self.query_cache.lock().expect("query cache lock poisoned");
            if let Some(v) = cache.get(query) {
                v.clone()
            } else {
                match self.embedder.embed(query) {
                    Ok(v) => {
                        cache.put(query.to_string(), v.clone());
                        v
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "query embedding failed");
                        return Ok(None);
                    }
                }
            }
        };

        let hits = {
            let index = self.vector_index.lock().expect("vector index lock poisoned");
            index
                .search(&query_vector, limit * 2)
                .map_err(|e| StorageError::Init(e.to_string()))?
        };

        let mut scored: Vec<(i64, f32)> = hits
            .into_iter()
            .filter(|(_, similarity)| *similarity >= threshold)
            .map(|(key, similarity)| (key as i64, similarity))
            .collect();

        if scored.is_empty() {
            return Ok(None);
        }

        // Fetch the candidate rows, then order by (similarity desc, timestamp desc)
        let mut records = Vec::with_capacity(scored.len());
        {
            let conn = self.reader.lock().expect("reader lock poisoned");
            for (id, similarity) in &scored {
                let record = conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM memories WHERE id = ?1 AND namespace = ?2",
                            Self::RECORD_COLUMNS
                        ),
                        params![id, namespace],
                        Self::row_to_record,
                    )
                    .optional()?;
                if let Some(record) = record {
                    records.push((record, *similarity));
                }
            }
        }
        scored.clear();

        if records.is_empty() {
            return Ok(None);
        }

        records.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.0.timestamp
                        .partial_cmp(&a.0.timestamp)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        });
        records.truncate(limit);

        Ok(Some(records.into_iter().map(|(r, _)| r).collect()))
    }

    /// Substring fallback, newest first
    ///
    /// `LIKE` is ASCII case-insensitive by default, which is exactly the
    /// contract the callers expect.
    fn text_search(&self, namespace: &str, query: &str, limit: usize) -> Result<Vec<MemoryRecord>> {
        let conn = self.reader.lock().expect("reader lock poisoned");
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM memories
             WHERE namespace = ?1 AND content LIKE ?2 ESCAPE '\\'
             ORDER BY timestamp DESC
             LIMIT ?3",
            Self::RECORD_COLUMNS
        ))?;
        let pattern = format!("%{}%", escape_like_pattern(query));
        let rows = stmt.query_map(params![namespace, pattern, limit as i64], Self::row_to_record)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Rebuild the vector index from stored rows on first use
    ///
    /// In-memory vector state is discarded on shutdown; rows whose
    /// `vector_id` is set are re-embedded here. Attempted once per process.
    #[cfg(all(feature = "embeddings", feature = "vector-search"))]
    fn ensure_index_rebuilt(&self) {
        use std::sync::atomic::Ordering;
        if self.index_rebuilt.swap(true, Ordering::SeqCst) {
            return;
        }
        {
            let index = self.vector_index.lock().expect("vector index lock poisoned");
            if !index.is_empty() {
                return;
            }
        }

        let rows: Vec<(i64, String)> = {
            let conn = self.reader.lock().expect("reader lock poisoned");
            let mut stmt = match conn
                .prepare("SELECT id, content FROM memories WHERE vector_id IS NOT NULL")
            {
                Ok(s) => s,
                Err(e) => {
                    tracing::warn!(error = %e, "vector index rebuild query failed");
                    return;
                }
            };
            match stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
                .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "vector index rebuild scan failed");
                    return;
                }
            }
        };

        if rows.is_empty() {
            return;
        }

        tracing::info!(count = rows.len(), "rebuilding vector index from stored records");
        for (id, content) in rows {
            if let Ok(vector) = self.embedder.embed(&content) {
                let mut index = self.vector_index.lock().expect("vector index lock poisoned");
                if let Err(e) = index.add(id as u64, &vector) {
                    tracing::warn!(record_id = id, error = %e, "index rebuild add failed");
                }
            }
        }
    }

    /// Health report: totals, vector coverage, embedder liveness
    pub fn health(&self) -> MemoryHealth {
        let (memory_count, vector_count, reachable) = {
            let conn = self.reader.lock().expect("reader lock poisoned");
            let totals: rusqlite::Result<(i64, i64)> = conn.query_row(
                "SELECT COUNT(*), COUNT(vector_id) FROM memories",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            );
            match totals {
                Ok((m, v)) => (m as usize, v as usize, true),
                Err(_) => (0, 0, false),
            }
        };

        #[cfg(feature = "embeddings")]
        let embedder_available = self.embedder.is_enabled() && self.embedder.is_ready();
        #[cfg(not(feature = "embeddings"))]
        let embedder_available = false;

        let state = if !reachable {
            HealthState::Down
        } else if embedder_available {
            HealthState::Ok
        } else {
            HealthState::Degraded
        };

        MemoryHealth {
            state,
            memory_count,
            vector_count,
            embedder_available,
        }
    }
}
