//! Shared vocabulary: identities, records, results, and metrics.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Error, Result};

/// Prefix for every collection owned by this system.
///
/// The relational backend filters `list_collections` on this prefix, so it
/// must be a valid identifier start.
pub const COLLECTION_PREFIX: &str = "rag_";

/// Maximum collection name length, matching PostgreSQL's identifier limit.
pub const MAX_COLLECTION_NAME_LEN: usize = 63;

/// Unique identifier for a document chunk.
///
/// This is the sole linkage between a chunk record and its vector row: the
/// vector layer never enforces it against the chunk store, it only carries it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    /// Creates a new chunk ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if the identity carries no value.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ChunkId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ChunkId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Unique identifier for a project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
    /// Creates a new project ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a random project ID.
    #[must_use]
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derives the vector collection name for this project.
    ///
    /// Deterministic: the same project always maps to the same collection.
    /// The name is sanitized to the relational backend's identifier rules
    /// (lowercase, `[a-z0-9_]`, at most 63 bytes) so both backends accept it.
    #[must_use]
    pub fn vector_collection(&self) -> String {
        let budget = MAX_COLLECTION_NAME_LEN - COLLECTION_PREFIX.len();
        let sanitized: String = self
            .0
            .chars()
            .map(|c| {
                let c = c.to_ascii_lowercase();
                if c.is_ascii_alphanumeric() { c } else { '_' }
            })
            .take(budget)
            .collect();
        format!("{COLLECTION_PREFIX}{sanitized}")
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ProjectId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ProjectId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A text chunk as supplied by the chunk-store collaborator.
///
/// The chunk store owns durable storage of these; the vector layer only
/// consumes their identity, text, and metadata.
#[derive(Debug, Clone)]
pub struct DocumentChunk {
    /// Chunk identity, carried into the vector row as `record_id`.
    pub id: ChunkId,
    /// Owning project.
    pub project: ProjectId,
    /// The chunk text.
    pub text: String,
    /// Optional chunk metadata (source file, page, offsets).
    pub metadata: Option<serde_json::Value>,
}

/// A vector row to be written through the [`crate::VectorStore`] contract.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    /// Identity of the originating chunk. Mandatory at the contract level.
    pub record_id: ChunkId,
    /// The chunk text, stored alongside the vector for retrieval.
    pub text: String,
    /// The embedding vector. Must match the collection's dimension.
    pub vector: Vec<f32>,
    /// Optional metadata, persisted as semi-structured data.
    pub metadata: Option<serde_json::Value>,
}

impl VectorRecord {
    /// Creates a record without metadata.
    #[must_use]
    pub fn new(record_id: impl Into<ChunkId>, text: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            record_id: record_id.into(),
            text: text.into(),
            vector,
            metadata: None,
        }
    }
}

/// A ranked retrieval hit.
///
/// `score` is a similarity: higher is more relevant, regardless of the
/// backend's native distance convention.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    /// The retrieved chunk text.
    pub text: String,
    /// Normalized similarity score.
    pub score: f32,
}

/// Per-collection index lifecycle state.
///
/// Promotion is one-way: once `Active`, an index is never dropped because the
/// record count later falls below the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexState {
    /// No index exists and the collection is above the creation threshold.
    Absent,
    /// No index exists; the collection is below the creation threshold and
    /// searches fall back to an exact scan.
    Pending,
    /// An index exists; every insert is (approximately) searchable through it.
    Active,
}

impl IndexState {
    /// Returns the state as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Pending => "pending",
            Self::Active => "active",
        }
    }
}

impl fmt::Display for IndexState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend metadata for a collection.
#[derive(Debug, Clone)]
pub struct CollectionInfo {
    /// Collection name.
    pub name: String,
    /// Configured vector dimension.
    pub dimensions: usize,
    /// Current record count.
    pub record_count: u64,
    /// Current index lifecycle state.
    pub index_state: IndexState,
}

/// Supported similarity metrics.
///
/// Both backends translate these to their native operator at construction or
/// index-creation time; nothing resolves metric names per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Cosine similarity (default).
    #[default]
    Cosine,
    /// Dot product (inner product).
    Dot,
}

impl DistanceMetric {
    /// Returns the metric as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::Dot => "dot",
        }
    }

    /// Parses a metric name.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for unrecognized names; there is no silent
    /// default because the metric must match what any existing index was
    /// built with.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "dot" => Ok(Self::Dot),
            other => Err(Error::InvalidInput(format!(
                "unsupported distance metric: {other}"
            ))),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
