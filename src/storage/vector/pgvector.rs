//! pgvector-based vector store.
//!
//! Provides vector storage and similarity search using PostgreSQL with the
//! pgvector extension. One physical table per collection; an approximate
//! HNSW index is built lazily once a collection crosses a record-count
//! threshold, and never dropped afterwards.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use deadpool_postgres::{Config, Pool, Runtime};
use tokio::sync::Mutex;
use tokio_postgres::NoTls;
use tokio_postgres::error::SqlState;

use super::{VectorStore, ensure_record_identity, validate_collection_name};
use crate::models::{
    COLLECTION_PREFIX, CollectionInfo, DistanceMetric, IndexState, SearchResult, VectorRecord,
};
use crate::{Error, Result};

/// SQL fragments for one metric.
///
/// Index construction and the search query must agree on the operator
/// family, so both read from this one table.
struct MetricSql {
    /// Operator class for `CREATE INDEX ... USING hnsw`.
    index_ops: &'static str,
    /// Distance expression; ascending order = most similar first.
    order_expr: &'static str,
    /// Similarity expression derived from the distance operator.
    ///
    /// `<=>` returns cosine distance (0 = identical), converted via
    /// `1 - distance`; `<#>` returns negated inner product, converted by
    /// negating again.
    score_expr: &'static str,
}

const fn metric_sql(metric: DistanceMetric) -> MetricSql {
    match metric {
        DistanceMetric::Cosine => MetricSql {
            index_ops: "vector_cosine_ops",
            order_expr: "embedding <=> $1::vector",
            score_expr: "1 - (embedding <=> $1::vector)",
        },
        DistanceMetric::Dot => MetricSql {
            index_ops: "vector_ip_ops",
            order_expr: "embedding <#> $1::vector",
            score_expr: "-(embedding <#> $1::vector)",
        },
    }
}

/// Formats an embedding as a pgvector literal: `[1.0,2.0,3.0]`.
#[must_use]
pub fn encode_vector(embedding: &[f32]) -> String {
    let values: Vec<String> = embedding
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    format!("[{}]", values.join(","))
}

/// Parses a pgvector literal back into a float sequence.
///
/// The inverse of [`encode_vector`]: component order and count round-trip
/// exactly.
///
/// # Errors
///
/// Returns `InvalidInput` if the literal is malformed.
pub fn parse_vector(literal: &str) -> Result<Vec<f32>> {
    let inner = literal
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| Error::InvalidInput(format!("malformed vector literal: {literal}")))?;

    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }

    inner
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|_| Error::InvalidInput(format!("malformed vector component: {part}")))
        })
        .collect()
}

/// Helper to map query errors.
fn query_error(op: &str, e: impl std::fmt::Display) -> Error {
    Error::OperationFailed {
        operation: op.to_string(),
        cause: e.to_string(),
    }
}

/// True for "already there" races that are success, not failure: a
/// concurrent session installed the extension or built the index first.
fn is_already_exists(e: &tokio_postgres::Error) -> bool {
    e.code().is_some_and(|code| {
        *code == SqlState::DUPLICATE_OBJECT
            || *code == SqlState::DUPLICATE_TABLE
            || *code == SqlState::UNIQUE_VIOLATION
    })
}

/// pgvector-based vector store.
pub struct PgvectorStore {
    /// Connection pool. One client is acquired per operation and released
    /// with it; nothing holds a session across calls.
    pool: Pool,
    /// Metric for new collections and their indexes.
    distance: DistanceMetric,
    /// Record count at which a collection's index is built.
    index_threshold: u64,
    /// Per-collection-name creation locks. Two concurrent
    /// `create_collection` calls for the same new name would otherwise race
    /// the existence check and both attempt DDL.
    creation_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl PgvectorStore {
    /// Creates a new pgvector store from a connection URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be parsed or the pool cannot be
    /// initialized. No connection is attempted until
    /// [`connect`](VectorStore::connect).
    pub fn new(
        connection_url: &str,
        distance: DistanceMetric,
        index_threshold: u64,
    ) -> Result<Self> {
        let config = Self::parse_connection_url(connection_url)?;
        let cfg = Self::build_pool_config(&config);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| Error::BackendUnavailable(e.to_string()))?;

        Ok(Self {
            pool,
            distance,
            index_threshold,
            creation_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Parses the connection URL into a tokio-postgres config.
    fn parse_connection_url(url: &str) -> Result<tokio_postgres::Config> {
        url.parse::<tokio_postgres::Config>()
            .map_err(|e| Error::OperationFailed {
                operation: "parse_connection_url".to_string(),
                cause: e.to_string(),
            })
    }

    /// Extracts host string from tokio-postgres Host.
    #[cfg(unix)]
    fn host_to_string(h: &tokio_postgres::config::Host) -> String {
        match h {
            tokio_postgres::config::Host::Tcp(s) => s.clone(),
            tokio_postgres::config::Host::Unix(p) => p.to_string_lossy().to_string(),
        }
    }

    /// Extracts host string from tokio-postgres Host (Windows: Tcp only).
    #[cfg(not(unix))]
    fn host_to_string(h: &tokio_postgres::config::Host) -> String {
        let tokio_postgres::config::Host::Tcp(s) = h;
        s.clone()
    }

    /// Builds a deadpool config from tokio-postgres config.
    fn build_pool_config(config: &tokio_postgres::Config) -> Config {
        let mut cfg = Config::new();
        cfg.host = config.get_hosts().first().map(Self::host_to_string);
        cfg.port = config.get_ports().first().copied();
        cfg.user = config.get_user().map(String::from);
        cfg.password = config
            .get_password()
            .map(|p| String::from_utf8_lossy(p).to_string());
        cfg.dbname = config.get_dbname().map(String::from);
        cfg
    }

    /// Acquires one pooled client for the duration of a single operation.
    async fn client(&self) -> Result<deadpool_postgres::Client> {
        self.pool
            .get()
            .await
            .map_err(|e| Error::BackendUnavailable(e.to_string()))
    }

    /// Returns the creation lock for a collection name.
    async fn name_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.creation_locks.lock().await;
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// The index name for a collection.
    #[must_use]
    pub fn index_name(collection: &str) -> String {
        format!("{collection}_vector_idx")
    }

    async fn table_exists(client: &tokio_postgres::Client, name: &str) -> Result<bool> {
        let row = client
            .query_opt("SELECT 1 FROM pg_tables WHERE tablename = $1", &[&name])
            .await
            .map_err(|e| query_error("collection_exists", e))?;
        Ok(row.is_some())
    }

    async fn ensure_collection(client: &tokio_postgres::Client, name: &str) -> Result<()> {
        if Self::table_exists(client, name).await? {
            Ok(())
        } else {
            Err(Error::CollectionNotFound(name.to_string()))
        }
    }

    async fn index_exists(client: &tokio_postgres::Client, collection: &str) -> Result<bool> {
        let row = client
            .query_opt(
                "SELECT 1 FROM pg_indexes WHERE tablename = $1 AND indexname = $2",
                &[&collection, &Self::index_name(collection)],
            )
            .await
            .map_err(|e| query_error("index_exists", e))?;
        Ok(row.is_some())
    }

    #[allow(clippy::cast_sign_loss)]
    async fn record_count(client: &tokio_postgres::Client, collection: &str) -> Result<u64> {
        let row = client
            .query_one(&format!("SELECT COUNT(*) FROM {collection}"), &[])
            .await
            .map_err(|e| query_error("record_count", e))?;
        let count: i64 = row.get(0);
        Ok(count as u64)
    }

    /// Reads the collection's vector dimension from the catalog.
    ///
    /// pgvector stores the dimension as the column's type modifier, so the
    /// configured dimension is recoverable without any table scan.
    #[allow(clippy::cast_sign_loss)]
    async fn collection_dimension(
        client: &tokio_postgres::Client,
        collection: &str,
    ) -> Result<usize> {
        let row = client
            .query_opt(
                "SELECT a.atttypmod FROM pg_attribute a \
                 JOIN pg_class c ON a.attrelid = c.oid \
                 WHERE c.relname = $1 AND a.attname = 'embedding'",
                &[&collection],
            )
            .await
            .map_err(|e| query_error("collection_dimension", e))?
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;
        let typmod: i32 = row.get(0);
        Ok(typmod as usize)
    }

    fn check_dimensions(expected: usize, actual: usize) -> Result<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(Error::DimensionMismatch { expected, actual })
        }
    }

    /// Builds the collection's index once the record count crosses the
    /// threshold.
    ///
    /// Idempotent: existence-checked first, and a concurrent builder winning
    /// the race is success. Promotion is one-way; nothing here ever drops an
    /// index.
    async fn maybe_create_index(
        &self,
        client: &tokio_postgres::Client,
        collection: &str,
    ) -> Result<()> {
        if Self::index_exists(client, collection).await? {
            return Ok(());
        }

        let count = Self::record_count(client, collection).await?;
        if count < self.index_threshold {
            tracing::debug!(
                collection,
                count,
                threshold = self.index_threshold,
                "below index threshold, search stays on exact scan"
            );
            return Ok(());
        }

        let sql = metric_sql(self.distance);
        let index = Self::index_name(collection);
        tracing::info!(collection, index = %index, count, "creating vector index");
        let started = Instant::now();

        let create = format!(
            "CREATE INDEX {index} ON {collection} USING hnsw (embedding {})",
            sql.index_ops
        );
        match client.execute(&create, &[]).await {
            Ok(_) => {},
            Err(e) if is_already_exists(&e) => {},
            Err(e) => return Err(query_error("create_index", e)),
        }

        tracing::info!(
            collection,
            index = %index,
            duration_ms = started.elapsed().as_millis() as u64,
            "vector index created"
        );
        Ok(())
    }

    /// Drops a collection's table. DDL commits immediately.
    async fn drop_table(client: &tokio_postgres::Client, collection: &str) -> Result<()> {
        client
            .execute(&format!("DROP TABLE IF EXISTS {collection}"), &[])
            .await
            .map_err(|e| query_error("delete_collection", e))?;
        Ok(())
    }

    fn insert_sql(collection: &str) -> String {
        format!(
            "INSERT INTO {collection} (text, embedding, chunk_id, metadata) \
             VALUES ($1, $2::vector, $3, $4)"
        )
    }

    fn metadata_value(record: &VectorRecord) -> serde_json::Value {
        record
            .metadata
            .clone()
            .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()))
    }
}

#[async_trait]
impl VectorStore for PgvectorStore {
    fn distance_metric(&self) -> DistanceMetric {
        self.distance
    }

    async fn connect(&self) -> Result<()> {
        let client = self.client().await?;
        match client
            .execute("CREATE EXTENSION IF NOT EXISTS vector", &[])
            .await
        {
            Ok(_) => Ok(()),
            // Another session finished installing it first.
            Err(e) if is_already_exists(&e) => Ok(()),
            Err(e) => Err(Error::BackendUnavailable(e.to_string())),
        }
    }

    async fn disconnect(&self) -> Result<()> {
        self.pool.close();
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        validate_collection_name(name)?;
        let client = self.client().await?;
        Self::table_exists(&client, name).await
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let client = self.client().await?;
        // LIKE treats the prefix's underscore as a wildcard; escape it.
        let pattern = format!("{}%", COLLECTION_PREFIX.replace('_', "\\_"));
        let rows = client
            .query(
                "SELECT tablename FROM pg_tables WHERE tablename LIKE $1 ORDER BY tablename",
                &[&pattern],
            )
            .await
            .map_err(|e| query_error("list_collections", e))?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    async fn create_collection(&self, name: &str, dimensions: usize, reset: bool) -> Result<bool> {
        validate_collection_name(name)?;

        // Serialize same-name creation; different names proceed in parallel.
        let lock = self.name_lock(name).await;
        let _guard = lock.lock().await;

        let client = self.client().await?;

        if reset {
            tracing::info!(collection = name, "resetting collection");
            Self::drop_table(&client, name).await?;
        }

        if Self::table_exists(&client, name).await? {
            return Ok(false);
        }

        tracing::info!(collection = name, dimensions, "creating collection");
        let create = format!(
            "CREATE TABLE {name} (\
             id bigserial PRIMARY KEY, \
             text text NOT NULL, \
             embedding vector({dimensions}), \
             chunk_id text NOT NULL, \
             metadata jsonb NOT NULL DEFAULT '{{}}')"
        );
        client
            .execute(&create, &[])
            .await
            .map_err(|e| query_error("create_collection", e))?;
        Ok(true)
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        validate_collection_name(name)?;

        let lock = self.name_lock(name).await;
        let _guard = lock.lock().await;

        tracing::info!(collection = name, "deleting collection");
        let client = self.client().await?;
        Self::drop_table(&client, name).await?;
        Ok(true)
    }

    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        validate_collection_name(name)?;
        let client = self.client().await?;

        if !Self::table_exists(&client, name).await? {
            return Ok(None);
        }

        let dimensions = Self::collection_dimension(&client, name).await?;
        let record_count = Self::record_count(&client, name).await?;
        let index_state = if Self::index_exists(&client, name).await? {
            IndexState::Active
        } else if record_count < self.index_threshold {
            IndexState::Pending
        } else {
            IndexState::Absent
        };

        Ok(Some(CollectionInfo {
            name: name.to_string(),
            dimensions,
            record_count,
            index_state,
        }))
    }

    async fn insert_one(&self, collection: &str, record: VectorRecord) -> Result<()> {
        validate_collection_name(collection)?;
        ensure_record_identity(&record)?;

        let client = self.client().await?;
        Self::ensure_collection(&client, collection).await?;

        let dimensions = Self::collection_dimension(&client, collection).await?;
        Self::check_dimensions(dimensions, record.vector.len())?;

        let metadata = Self::metadata_value(&record);
        client
            .execute(
                &Self::insert_sql(collection),
                &[
                    &record.text,
                    &encode_vector(&record.vector),
                    &record.record_id.as_str(),
                    &metadata,
                ],
            )
            .await
            .map_err(|e| query_error("insert_one", e))?;

        self.maybe_create_index(&client, collection).await
    }

    async fn insert_many(
        &self,
        collection: &str,
        records: Vec<VectorRecord>,
        batch_size: usize,
    ) -> Result<()> {
        validate_collection_name(collection)?;
        if batch_size == 0 {
            return Err(Error::InvalidInput("batch_size must be positive".to_string()));
        }
        if records.is_empty() {
            return Ok(());
        }

        let mut client = self.client().await?;
        Self::ensure_collection(&client, collection).await?;

        // Validate the whole call before the first batch is written.
        let dimensions = Self::collection_dimension(&client, collection).await?;
        for record in &records {
            ensure_record_identity(record)?;
            Self::check_dimensions(dimensions, record.vector.len())?;
        }

        let total = records.len();
        let statement = Self::insert_sql(collection);
        let mut inserted = 0;

        for batch in records.chunks(batch_size) {
            // One transaction per batch: a failing batch rolls back alone,
            // while batches committed before it stay committed.
            let result = async {
                let tx = client
                    .transaction()
                    .await
                    .map_err(|e| query_error("begin_batch", e))?;
                for record in batch {
                    let metadata = Self::metadata_value(record);
                    tx.execute(
                        &statement,
                        &[
                            &record.text,
                            &encode_vector(&record.vector),
                            &record.record_id.as_str(),
                            &metadata,
                        ],
                    )
                    .await
                    .map_err(|e| query_error("insert_batch", e))?;
                }
                tx.commit().await.map_err(|e| query_error("commit_batch", e))
            }
            .await;

            if let Err(e) = result {
                return Err(Error::PartialBatchFailure {
                    inserted,
                    failed: total - inserted,
                    cause: e.to_string(),
                });
            }
            inserted += batch.len();
        }

        tracing::debug!(collection, inserted, "bulk insert complete");
        self.maybe_create_index(&client, collection).await
    }

    async fn search_by_vector(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        validate_collection_name(collection)?;

        let client = self.client().await?;
        Self::ensure_collection(&client, collection).await?;

        let dimensions = Self::collection_dimension(&client, collection).await?;
        Self::check_dimensions(dimensions, query.len())?;

        let sql = metric_sql(self.distance);
        let search = format!(
            "SELECT text, {} AS score FROM {collection} ORDER BY {} LIMIT {limit}",
            sql.score_expr, sql.order_expr
        );

        let rows = client
            .query(&search, &[&encode_vector(query)])
            .await
            .map_err(|e| query_error("search_by_vector", e))?;

        Ok(rows
            .iter()
            .map(|row| {
                let score: f64 = row.get(1);
                #[allow(clippy::cast_possible_truncation)]
                let score = score as f32;
                SearchResult {
                    text: row.get(0),
                    score,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_vector_format() {
        assert_eq!(encode_vector(&[1.0, 2.5, -0.125]), "[1,2.5,-0.125]");
        assert_eq!(encode_vector(&[]), "[]");
    }

    #[test]
    fn test_parse_vector_rejects_garbage() {
        assert!(parse_vector("1,2,3").is_err());
        assert!(parse_vector("[1,oops,3]").is_err());
        assert_eq!(parse_vector("[]").map_err(|e| e.to_string()), Ok(vec![]));
    }

    #[test]
    fn test_metric_translation_is_consistent() {
        // The operator in the score expression must be the operator the
        // index operator class serves, for both metrics.
        let cosine = metric_sql(DistanceMetric::Cosine);
        assert_eq!(cosine.index_ops, "vector_cosine_ops");
        assert!(cosine.score_expr.contains("<=>"));
        assert!(cosine.order_expr.contains("<=>"));

        let dot = metric_sql(DistanceMetric::Dot);
        assert_eq!(dot.index_ops, "vector_ip_ops");
        assert!(dot.score_expr.contains("<#>"));
        assert!(dot.order_expr.contains("<#>"));
    }

    #[test]
    fn test_index_name() {
        assert_eq!(PgvectorStore::index_name("rag_p1"), "rag_p1_vector_idx");
    }

    #[test]
    fn test_new_rejects_malformed_url() {
        let result = PgvectorStore::new("not a url", DistanceMetric::Cosine, 100);
        assert!(result.is_err());
    }

    proptest! {
        #[test]
        fn prop_vector_literal_round_trips(vector in proptest::collection::vec(-1000.0f32..1000.0, 0..64)) {
            let encoded = encode_vector(&vector);
            let decoded = parse_vector(&encoded).expect("round trip should parse");
            prop_assert_eq!(decoded, vector);
        }
    }
}
