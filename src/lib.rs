//! # Ragstore
//!
//! A retrieval-augmented generation backend with pluggable vector stores.
//!
//! Ragstore ingests document chunks, embeds them, and stores the vectors in a
//! per-project collection. Queries are embedded and answered from the nearest
//! chunks. One [`VectorStore`] contract covers two structurally different
//! engines:
//!
//! - **Embedded**: a local, file-backed point index (every insert is
//!   immediately searchable)
//! - **Pgvector**: PostgreSQL with the pgvector extension (approximate index
//!   built lazily once a collection crosses a record-count threshold)
//!
//! ## Example
//!
//! ```rust,ignore
//! use ragstore::{RagConfig, VectorStoreFactory, IngestionService};
//!
//! let config = RagConfig::load()?;
//! let store = Arc::new(VectorStoreFactory::build(&config.vector)?);
//! store.connect().await?;
//!
//! let ingestion = IngestionService::new(store, embedder, chunks, config.ingestion);
//! let report = ingestion.ingest_project(&project, false).await?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

use thiserror::Error as ThisError;

// Module declarations
pub mod config;
pub mod embedding;
pub mod llm;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use config::{IngestionConfig, RagConfig, VectorBackendKind, VectorStoreConfig};
pub use embedding::{EmbedMode, Embedder, HashEmbedder};
pub use llm::GenerationProvider;
pub use models::{
    ChunkId, CollectionInfo, DistanceMetric, DocumentChunk, IndexState, ProjectId, SearchResult,
    VectorRecord,
};
pub use services::{ChunkStore, IngestReport, IngestionService, RetrievalService};
pub use storage::{AnyVectorStore, EmbeddedStore, PgvectorStore, VectorStore, VectorStoreFactory};

/// Error type for ragstore operations.
///
/// Uses `thiserror` for automatic `Display` and `Error` trait implementations.
/// Backend-native errors never cross this boundary: the storage adapters
/// translate them into one of these variants.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `BackendUnavailable` | Connection pool creation or `connect` fails |
/// | `CollectionNotFound` | Insert/search against a collection that does not exist |
/// | `DimensionMismatch` | Vector length differs from the collection's configured dimension |
/// | `RecordIdentityMissing` | Insert without a chunk identity |
/// | `PartialBatchFailure` | A batch within `insert_many` failed after earlier batches committed |
/// | `UnknownBackend` | Configured backend name is not recognized |
/// | `InvalidInput` | Malformed collection names, empty queries, bad config values |
/// | `OperationFailed` | I/O errors, database queries fail, serialization fails |
#[derive(Debug, ThisError)]
pub enum Error {
    /// The storage backend could not be reached or initialized.
    ///
    /// Fatal to the current request; not retried automatically.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// An operation targeted a collection that does not exist.
    ///
    /// Operations never create a collection implicitly.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    /// A vector's length did not match the collection's configured dimension.
    ///
    /// Rejected before any write reaches the backend.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// The collection's configured dimension.
        expected: usize,
        /// The offending vector's length.
        actual: usize,
    },

    /// An insert was attempted without a chunk identity.
    ///
    /// The chunk identity is the sole linkage between a vector row and its
    /// source chunk, so a record without one is rejected outright.
    #[error("record is missing its chunk identity")]
    RecordIdentityMissing,

    /// One or more batches in a bulk insert failed.
    ///
    /// Batches committed before the failure remain committed.
    #[error("bulk insert partially failed: {inserted} inserted, {failed} not written ({cause})")]
    PartialBatchFailure {
        /// Records committed before the failing batch.
        inserted: usize,
        /// Records in and after the failing batch.
        failed: usize,
        /// The underlying cause from the failing batch.
        cause: String,
    },

    /// The configured vector backend name is not recognized.
    #[error("unknown vector backend: {0}")]
    UnknownBackend(String),

    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - A collection name violates backend identifier rules
    /// - Required configuration values are missing for the selected backend
    /// - An empty text is submitted for embedding
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - Database queries or transactions fail
    /// - Filesystem I/O errors occur
    /// - Persisted index files cannot be parsed
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Result type alias for ragstore operations.
pub type Result<T> = std::result::Result<T, Error>;
