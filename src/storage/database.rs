//! Embedded vector store on SQLite
//!
//! Points are scored exactly: cosine (or dot) similarity on the dense
//! channel, IDF-weighted term overlap on the sparse channel, reciprocal rank
//! fusion for hybrid queries. Payload filters run in SQL against
//! `json_extract` expression indexes.

use super::{
    CollectionInfo, CollectionSchema, Distance, FieldCondition, Filter, Payload, PointRecord,
    QueryRequest, QueryVectors, ScoredPoint, SparseModifier, StoreError, VectorStore,
};
use crate::embedding::SparseVector;
use crate::retrieval::reciprocal_rank_fusion;
use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use regex::Regex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use uuid::Uuid;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Dotted identifier path into the payload, e.g. `metadata.header_2`
const FIELD_KEY_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$";

/// Vector store persisted in a single SQLite file
pub struct SqliteStore {
    pool: DbPool,
    field_key: Regex,
}

/// A point as loaded for scoring
struct Candidate {
    id: Uuid,
    dense: Vec<f32>,
    sparse: SparseVector,
    payload: Payload,
}

impl SqliteStore {
    /// Open (or create) the store at `db_path` with up to `pool_size` connections
    pub fn open(db_path: &Path, pool_size: u32) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                    source: e,
                    context: format!("Failed to create store directory: {:?}", parent),
                })?;
            }
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch(
                "
                PRAGMA foreign_keys = ON;
                PRAGMA busy_timeout = 5000;
                ",
            )
        });

        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(|e| StoreError::Pool(format!("Failed to create connection pool: {}", e)))?;

        let field_key = Regex::new(FIELD_KEY_PATTERN)
            .map_err(|e| StoreError::InvalidSchema(format!("Bad field key pattern: {}", e)))?;

        let store = Self { pool, field_key };

        {
            let conn = store.conn()?;
            // WAL persists in the database file
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                ",
            )?;
        }

        store.migrate()?;

        tracing::info!("Opened vector store at {}", db_path.display());

        Ok(store)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StoreError> {
        self.pool
            .get()
            .map_err(|e| StoreError::Pool(format!("Failed to get connection: {}", e)))
    }

    /// Run database migrations
    fn migrate(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying store migration {}", version);

                conn.execute_batch(migration)?;

                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    fn validate_field_key(&self, key: &str) -> Result<(), StoreError> {
        if self.field_key.is_match(key) {
            Ok(())
        } else {
            Err(StoreError::InvalidFilterKey(key.to_string()))
        }
    }

    fn load_schema(conn: &Connection, name: &str) -> Result<Option<CollectionSchema>, StoreError> {
        let raw: Option<String> = conn
            .query_row(
                "SELECT schema FROM collections WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        let mut schema: CollectionSchema = serde_json::from_str(&raw)?;

        let mut stmt = conn.prepare(
            "SELECT field FROM payload_indexes WHERE collection = ?1 ORDER BY rowid",
        )?;
        schema.payload_indexes = stmt
            .query_map(params![name], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(Some(schema))
    }

    fn require_schema(conn: &Connection, name: &str) -> Result<CollectionSchema, StoreError> {
        Self::load_schema(conn, name)?
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))
    }

    fn register_payload_index(
        &self,
        conn: &Connection,
        name: &str,
        field: &str,
    ) -> Result<(), StoreError> {
        self.validate_field_key(field)?;

        // One expression index per field, shared by every collection
        let index_name = format!(
            "idx_points_payload_{}",
            &blake3::hash(field.as_bytes()).to_hex()[..16]
        );
        conn.execute_batch(&format!(
            "CREATE INDEX IF NOT EXISTS {} ON points(collection, json_extract(payload, '$.{}'))",
            index_name, field
        ))?;

        conn.execute(
            "INSERT OR IGNORE INTO payload_indexes (collection, field, index_name)
             VALUES (?1, ?2, ?3)",
            params![name, field, index_name],
        )?;

        Ok(())
    }

    fn check_dimension(
        name: &str,
        schema: &CollectionSchema,
        dense: &[f32],
    ) -> Result<(), StoreError> {
        if dense.len() != schema.dense.size {
            return Err(StoreError::DimensionMismatch {
                collection: name.to_string(),
                expected: schema.dense.size,
                actual: dense.len(),
            });
        }
        Ok(())
    }

    fn check_filter(
        &self,
        name: &str,
        schema: &CollectionSchema,
        filter: &Filter,
    ) -> Result<(), StoreError> {
        for condition in &filter.must {
            self.validate_field_key(&condition.key)?;
            if !schema.payload_indexes.contains(&condition.key) {
                return Err(StoreError::UnindexedField {
                    collection: name.to_string(),
                    field: condition.key.clone(),
                });
            }
        }
        Ok(())
    }

    /// Load the points of `name` matching `conditions`, in insertion order
    fn load_candidates(
        conn: &Connection,
        name: &str,
        conditions: &[FieldCondition],
    ) -> Result<Vec<Candidate>, StoreError> {
        let mut sql =
            String::from("SELECT id, dense, sparse, payload FROM points WHERE collection = ?1");
        let mut values: Vec<&str> = vec![name];

        // Keys are validated dotted identifiers; the path must be a literal to hit the index
        for condition in conditions {
            values.push(&condition.value);
            sql.push_str(&format!(
                " AND json_extract(payload, '$.{}') = ?{}",
                condition.key,
                values.len()
            ));
        }
        sql.push_str(" ORDER BY seq");

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut candidates = Vec::new();
        for row in rows {
            let (id, dense, sparse, payload) = row?;
            let id = Uuid::parse_str(&id).map_err(|e| StoreError::Corrupt {
                collection: name.to_string(),
                message: format!("bad point id {}: {}", id, e),
            })?;
            candidates.push(Candidate {
                id,
                dense: decode_dense(&dense),
                sparse: serde_json::from_str(&sparse)?,
                payload: serde_json::from_str(&payload)?,
            });
        }

        Ok(candidates)
    }

    /// Scale query term weights by collection-wide inverse document frequency
    fn idf_weighted(
        conn: &Connection,
        name: &str,
        query: &SparseVector,
    ) -> Result<SparseVector, StoreError> {
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM points WHERE collection = ?1",
            params![name],
            |row| row.get(0),
        )?;
        let total = total as f32;

        let mut stmt =
            conn.prepare("SELECT df FROM sparse_df WHERE collection = ?1 AND term = ?2")?;
        let mut values = Vec::with_capacity(query.len());
        for (term, weight) in query.iter() {
            let df: i64 = stmt
                .query_row(params![name, term as i64], |row| row.get(0))
                .optional()?
                .unwrap_or(0);
            let df = df as f32;
            let idf = (1.0 + (total - df + 0.5) / (df + 0.5)).ln();
            values.push(weight * idf);
        }

        Ok(SparseVector {
            indices: query.indices.clone(),
            values,
        })
    }

    fn rank_dense(distance: Distance, query: &[f32], candidates: &[Candidate]) -> Vec<(usize, f32)> {
        let mut ranked: Vec<(usize, f32)> = candidates
            .iter()
            .enumerate()
            .map(|(i, candidate)| {
                let score = match distance {
                    Distance::Cosine => cosine_similarity(query, &candidate.dense),
                    Distance::Dot => dot(query, &candidate.dense),
                };
                (i, score)
            })
            .collect();
        // Stable: equal scores keep insertion order
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    fn rank_sparse(query: &SparseVector, candidates: &[Candidate]) -> Vec<(usize, f32)> {
        let mut ranked: Vec<(usize, f32)> = candidates
            .iter()
            .enumerate()
            .filter_map(|(i, candidate)| sparse_overlap(query, &candidate.sparse).map(|s| (i, s)))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    fn adjust_document_frequency(
        conn: &Connection,
        name: &str,
        sparse: &SparseVector,
        delta: i64,
    ) -> Result<(), StoreError> {
        let mut upsert = conn.prepare_cached(
            "INSERT INTO sparse_df (collection, term, df) VALUES (?1, ?2, ?3)
             ON CONFLICT(collection, term) DO UPDATE SET df = df + excluded.df",
        )?;
        for term in &sparse.indices {
            upsert.execute(params![name, *term as i64, delta])?;
        }
        if delta < 0 {
            conn.execute(
                "DELETE FROM sparse_df WHERE collection = ?1 AND df <= 0",
                params![name],
            )?;
        }
        Ok(())
    }
}

impl VectorStore for SqliteStore {
    fn collection_exists(&self, name: &str) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM collections WHERE name = ?1)",
            params![name],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT name FROM collections ORDER BY name")?;
        let names = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(names)
    }

    fn create_collection(&self, name: &str, schema: &CollectionSchema) -> Result<(), StoreError> {
        schema.validate()?;

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if Self::load_schema(&tx, name)?.is_some() {
            return Err(StoreError::CollectionExists(name.to_string()));
        }

        let stored = CollectionSchema {
            payload_indexes: Vec::new(),
            ..schema.clone()
        };
        tx.execute(
            "INSERT INTO collections (name, schema, created_at) VALUES (?1, ?2, ?3)",
            params![name, serde_json::to_string(&stored)?, Utc::now().to_rfc3339()],
        )?;

        for field in &schema.payload_indexes {
            self.register_payload_index(&tx, name, field)?;
        }

        tx.commit()?;

        tracing::info!(
            "Created collection {} ({} {}D {:?}, {} sparse)",
            name,
            schema.dense.name,
            schema.dense.size,
            schema.dense.distance,
            schema.sparse.name
        );

        Ok(())
    }

    fn delete_collection(&self, name: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute("DELETE FROM points WHERE collection = ?1", params![name])?;
        tx.execute("DELETE FROM sparse_df WHERE collection = ?1", params![name])?;
        tx.execute(
            "DELETE FROM payload_indexes WHERE collection = ?1",
            params![name],
        )?;
        let removed = tx.execute("DELETE FROM collections WHERE name = ?1", params![name])?;

        tx.commit()?;

        if removed > 0 {
            tracing::info!("Deleted collection {}", name);
        }

        Ok(removed > 0)
    }

    fn create_payload_index(&self, name: &str, field: &str) -> Result<(), StoreError> {
        let conn = self.conn()?;
        Self::require_schema(&conn, name)?;
        self.register_payload_index(&conn, name, field)?;
        tracing::debug!("Indexed payload field {} in {}", field, name);
        Ok(())
    }

    fn upsert(&self, name: &str, points: Vec<PointRecord>, wait: bool) -> Result<usize, StoreError> {
        let mut conn = self.conn()?;
        let schema = Self::require_schema(&conn, name)?;

        for point in &points {
            Self::check_dimension(name, &schema, &point.vectors.dense)?;
            point
                .vectors
                .sparse
                .validate()
                .map_err(StoreError::InvalidSparseVector)?;
        }

        if points.is_empty() {
            return Ok(0);
        }

        conn.execute_batch(if wait {
            "PRAGMA synchronous = FULL;"
        } else {
            "PRAGMA synchronous = NORMAL;"
        })?;

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        for point in &points {
            let id = point.id.to_string();

            let previous: Option<String> = tx
                .query_row(
                    "SELECT sparse FROM points WHERE collection = ?1 AND id = ?2",
                    params![name, id],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(previous) = previous {
                let previous: SparseVector = serde_json::from_str(&previous)?;
                Self::adjust_document_frequency(&tx, name, &previous, -1)?;
            }

            tx.execute(
                "INSERT INTO points (collection, id, dense, sparse, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(collection, id) DO UPDATE SET
                    dense = excluded.dense,
                    sparse = excluded.sparse,
                    payload = excluded.payload",
                params![
                    name,
                    id,
                    encode_dense(&point.vectors.dense),
                    serde_json::to_string(&point.vectors.sparse)?,
                    serde_json::to_string(&point.payload)?,
                ],
            )?;

            Self::adjust_document_frequency(&tx, name, &point.vectors.sparse, 1)?;
        }

        tx.commit()?;

        tracing::debug!("Upserted {} point(s) into {} (wait={})", points.len(), name, wait);

        Ok(points.len())
    }

    fn query(&self, name: &str, request: &QueryRequest) -> Result<Vec<ScoredPoint>, StoreError> {
        let conn = self.conn()?;
        let schema = Self::require_schema(&conn, name)?;

        match &request.vectors {
            QueryVectors::Hybrid { dense, sparse } => {
                Self::check_dimension(name, &schema, dense)?;
                sparse.validate().map_err(StoreError::InvalidSparseVector)?;
            }
            QueryVectors::Dense(dense) => Self::check_dimension(name, &schema, dense)?,
            QueryVectors::Sparse(sparse) => {
                sparse.validate().map_err(StoreError::InvalidSparseVector)?
            }
        }

        let conditions: &[FieldCondition] = match &request.filter {
            Some(filter) => {
                self.check_filter(name, &schema, filter)?;
                &filter.must
            }
            None => &[],
        };

        if request.limit == 0 {
            return Ok(Vec::new());
        }

        let candidates = Self::load_candidates(&conn, name, conditions)?;

        let sparse_query = |query: &SparseVector| -> Result<SparseVector, StoreError> {
            match schema.sparse.modifier {
                SparseModifier::Idf => Self::idf_weighted(&conn, name, query),
                SparseModifier::None => Ok(query.clone()),
            }
        };

        let ranked: Vec<(usize, f32)> = match &request.vectors {
            QueryVectors::Dense(dense) => {
                Self::rank_dense(schema.dense.distance, dense, &candidates)
            }
            QueryVectors::Sparse(sparse) => Self::rank_sparse(&sparse_query(sparse)?, &candidates),
            QueryVectors::Hybrid { dense, sparse } => {
                let prefetch = request.prefetch_limit.max(request.limit);

                let dense_keys: Vec<usize> =
                    Self::rank_dense(schema.dense.distance, dense, &candidates)
                        .into_iter()
                        .take(prefetch)
                        .map(|(i, _)| i)
                        .collect();
                let sparse_keys: Vec<usize> =
                    Self::rank_sparse(&sparse_query(sparse)?, &candidates)
                        .into_iter()
                        .take(prefetch)
                        .map(|(i, _)| i)
                        .collect();

                tracing::debug!(
                    "Hybrid query on {}: {} dense, {} sparse candidate(s)",
                    name,
                    dense_keys.len(),
                    sparse_keys.len()
                );

                reciprocal_rank_fusion(&dense_keys, &sparse_keys, &request.fusion)
            }
        };

        Ok(ranked
            .into_iter()
            .take(request.limit)
            .map(|(i, score)| ScoredPoint {
                id: candidates[i].id,
                score,
                payload: candidates[i].payload.clone(),
            })
            .collect())
    }

    fn count(&self, name: &str) -> Result<usize, StoreError> {
        let conn = self.conn()?;
        Self::require_schema(&conn, name)?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM points WHERE collection = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>, StoreError> {
        let conn = self.conn()?;
        let Some(schema) = Self::load_schema(&conn, name)? else {
            return Ok(None);
        };

        let created_at: String = conn.query_row(
            "SELECT created_at FROM collections WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| StoreError::Corrupt {
                collection: name.to_string(),
                message: format!("bad created_at {}: {}", created_at, e),
            })?
            .with_timezone(&Utc);

        let points_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM points WHERE collection = ?1",
            params![name],
            |row| row.get(0),
        )?;

        Ok(Some(CollectionInfo {
            name: name.to_string(),
            schema,
            points_count: points_count as usize,
            created_at,
        }))
    }
}

fn encode_dense(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|x| x.to_le_bytes()).collect()
}

fn decode_dense(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = dot(a, a).sqrt();
    let norm_b = dot(b, b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}

/// Weighted overlap of two sorted sparse vectors; `None` when no term is shared
fn sparse_overlap(query: &SparseVector, doc: &SparseVector) -> Option<f32> {
    let (mut i, mut j) = (0, 0);
    let mut score = 0.0;
    let mut shared = false;
    while i < query.indices.len() && j < doc.indices.len() {
        match query.indices[i].cmp(&doc.indices[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                score += query.values[i] * doc.values[j];
                shared = true;
                i += 1;
                j += 1;
            }
        }
    }
    shared.then_some(score)
}

/// Store migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: collections, points and sparse statistics
    r#"
    CREATE TABLE collections (
        name TEXT PRIMARY KEY,
        schema TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE payload_indexes (
        collection TEXT NOT NULL,
        field TEXT NOT NULL,
        index_name TEXT NOT NULL,
        PRIMARY KEY (collection, field),
        FOREIGN KEY (collection) REFERENCES collections(name) ON DELETE CASCADE
    );

    CREATE TABLE points (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        collection TEXT NOT NULL,
        id TEXT NOT NULL,
        dense BLOB NOT NULL,
        sparse TEXT NOT NULL,
        payload TEXT NOT NULL,
        UNIQUE (collection, id),
        FOREIGN KEY (collection) REFERENCES collections(name) ON DELETE CASCADE
    );

    CREATE TABLE sparse_df (
        collection TEXT NOT NULL,
        term INTEGER NOT NULL,
        df INTEGER NOT NULL,
        PRIMARY KEY (collection, term),
        FOREIGN KEY (collection) REFERENCES collections(name) ON DELETE CASCADE
    );
    "#,
];
