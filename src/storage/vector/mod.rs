//! Vector store backends.
//!
//! Provides the abstraction layer for vector similarity storage and search.
//!
//! # Available Implementations
//!
//! | Backend | Use Case | Index lifecycle |
//! |---------|----------|-----------------|
//! | [`EmbeddedStore`] | Local file-backed index, no external deps | Immediate: every insert searchable |
//! | [`PgvectorStore`] | PostgreSQL with pgvector extension | Lazy: HNSW built at a record-count threshold |
//!
//! # Usage Example
//!
//! ```rust,ignore
//! use ragstore::{VectorStore, VectorRecord, EmbeddedStore, DistanceMetric};
//!
//! let store = EmbeddedStore::new("/var/lib/ragstore", DistanceMetric::Cosine);
//! store.connect().await?;
//! store.create_collection("rag_p1", 768, false).await?;
//! store.insert_one("rag_p1", record).await?;
//!
//! let results = store.search_by_vector("rag_p1", &query, 5).await?;
//! for hit in results {
//!     println!("{:.3}  {}", hit.score, hit.text);
//! }
//! ```

mod embedded;
mod factory;
mod pgvector;

pub use embedded::EmbeddedStore;
pub use factory::{AnyVectorStore, VectorStoreFactory};
pub use pgvector::PgvectorStore;

use async_trait::async_trait;

use crate::models::{CollectionInfo, DistanceMetric, SearchResult, VectorRecord};
use crate::{Error, Result};

/// Trait for vector store backends.
///
/// Implementations are `Send + Sync` and use interior mutability, so a store
/// can be shared via `Arc` across the ingestion and retrieval pipelines.
/// All operations suspend on I/O rather than blocking.
///
/// # Contract notes
///
/// - Collections are created explicitly; no operation creates one as a side
///   effect.
/// - Every record carries a chunk identity; inserts without one are rejected
///   with [`Error::RecordIdentityMissing`].
/// - Scores returned by [`search_by_vector`](VectorStore::search_by_vector)
///   are similarities (higher = more relevant) under every backend and
///   metric.
/// - Concurrent operations on different collections are independent.
///   Same-name `create_collection` calls are serialized per name inside each
///   adapter; other same-collection races are left to the backend's own
///   isolation.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// The similarity metric this store applies to new collections.
    fn distance_metric(&self) -> DistanceMetric;

    /// Acquires backend resources. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BackendUnavailable`] if the backend cannot be
    /// reached or initialized.
    async fn connect(&self) -> Result<()>;

    /// Releases backend resources. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if release fails.
    async fn disconnect(&self) -> Result<()>;

    /// Returns true if the collection exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the existence check fails.
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// Lists collections owned by this system.
    ///
    /// Returns an empty list (not an error) when none exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing query fails.
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Creates a collection with a fixed vector dimension.
    ///
    /// Returns `true` if the collection was newly created, `false` if it
    /// already existed and `reset` was false. With `reset`, any existing
    /// collection is dropped first within the same logical operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the name violates identifier rules or creation
    /// fails.
    async fn create_collection(&self, name: &str, dimensions: usize, reset: bool) -> Result<bool>;

    /// Drops a collection. Idempotent: `true` whether or not it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the drop fails.
    async fn delete_collection(&self, name: &str) -> Result<bool>;

    /// Returns backend metadata and record count, or `None` if the
    /// collection does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata queries fail.
    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>>;

    /// Inserts a single record, then runs one index-creation check.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CollectionNotFound`], [`Error::RecordIdentityMissing`],
    /// or [`Error::DimensionMismatch`]; these are checked before any write.
    async fn insert_one(&self, collection: &str, record: VectorRecord) -> Result<()>;

    /// Inserts records in batches of `batch_size`, then runs one
    /// index-creation check.
    ///
    /// Each batch is one transactional unit on the relational backend. A
    /// failing batch aborts the call but leaves previously committed batches
    /// in place, reported via [`Error::PartialBatchFailure`].
    ///
    /// # Errors
    ///
    /// Validation errors are returned before any batch is written.
    async fn insert_many(
        &self,
        collection: &str,
        records: Vec<VectorRecord>,
        batch_size: usize,
    ) -> Result<()>;

    /// Returns at most `limit` results ordered by descending similarity.
    ///
    /// An empty collection yields an empty vec, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CollectionNotFound`] if the collection does not
    /// exist, or [`Error::DimensionMismatch`] for a wrong-sized query vector.
    async fn search_by_vector(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>>;
}

/// Rejects records with an empty chunk identity.
pub(crate) fn ensure_record_identity(record: &VectorRecord) -> Result<()> {
    if record.record_id.is_empty() {
        return Err(Error::RecordIdentityMissing);
    }
    Ok(())
}

/// Validates a collection name against relational identifier rules.
///
/// Both backends apply the same rules so a collection name is portable
/// between them: lowercase start letter or underscore, `[a-z0-9_]` body,
/// at most 63 bytes.
pub(crate) fn validate_collection_name(name: &str) -> Result<()> {
    let valid_start = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c == '_');
    let valid_body = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');

    if !valid_start || !valid_body || name.len() > crate::models::MAX_COLLECTION_NAME_LEN {
        return Err(Error::InvalidInput(format!(
            "invalid collection name: {name}"
        )));
    }
    Ok(())
}
