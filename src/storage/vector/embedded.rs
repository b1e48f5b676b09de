//! Embedded file-backed vector store.
//!
//! A local, single-process point index: one JSON file per collection under a
//! data directory. There is no lazy index lifecycle here; the collection is
//! its own index, and every insert is immediately searchable with an exact
//! scan.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{VectorStore, ensure_record_identity, validate_collection_name};
use crate::models::{CollectionInfo, DistanceMetric, IndexState, SearchResult, VectorRecord};
use crate::{Error, Result};

/// A stored point: the persisted form of a [`VectorRecord`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPoint {
    record_id: String,
    text: String,
    vector: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<serde_json::Value>,
}

/// On-disk representation of one collection.
#[derive(Debug, Serialize, Deserialize)]
struct CollectionFile {
    dimensions: usize,
    metric: DistanceMetric,
    records: Vec<StoredPoint>,
}

/// In-memory state of one collection.
///
/// Records are keyed by chunk identity: re-inserting an identity replaces
/// its point, matching the point-index engine's upsert semantics.
#[derive(Debug)]
struct Collection {
    dimensions: usize,
    metric: DistanceMetric,
    records: HashMap<String, StoredPoint>,
}

impl Collection {
    fn to_file(&self) -> CollectionFile {
        CollectionFile {
            dimensions: self.dimensions,
            metric: self.metric,
            records: self.records.values().cloned().collect(),
        }
    }

    fn from_file(file: CollectionFile) -> Self {
        Self {
            dimensions: file.dimensions,
            metric: file.metric,
            records: file
                .records
                .into_iter()
                .map(|p| (p.record_id.clone(), p))
                .collect(),
        }
    }
}

/// Embedded file-backed vector store.
pub struct EmbeddedStore {
    /// Directory holding one `<collection>.json` file per collection.
    data_dir: PathBuf,
    /// Metric applied to collections created through this store.
    distance: DistanceMetric,
    /// Loaded collections. The write lock serializes collection lifecycle
    /// operations, which makes same-name creation races impossible here.
    collections: RwLock<HashMap<String, Collection>>,
}

impl EmbeddedStore {
    /// Creates a store rooted at `data_dir`. No I/O happens until
    /// [`connect`](VectorStore::connect).
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>, distance: DistanceMetric) -> Self {
        Self {
            data_dir: data_dir.into(),
            distance,
            collections: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the data directory.
    #[must_use]
    pub const fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    fn collection_path(&self, name: &str) -> PathBuf {
        self.data_dir.join(format!("{name}.json"))
    }

    /// Persists one collection, atomically: write to a temp file, then
    /// rename over the old one so a cancelled call never leaves a partially
    /// written index visible.
    async fn persist(&self, name: &str, collection: &Collection) -> Result<()> {
        let content =
            serde_json::to_vec(&collection.to_file()).map_err(|e| Error::OperationFailed {
                operation: "serialize_collection".to_string(),
                cause: e.to_string(),
            })?;

        let path = self.collection_path(name);
        let tmp = self.data_dir.join(format!("{name}.json.tmp"));

        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| Error::OperationFailed {
                operation: "write_collection".to_string(),
                cause: e.to_string(),
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| Error::OperationFailed {
                operation: "rename_collection".to_string(),
                cause: e.to_string(),
            })
    }

    async fn load_collection(path: &Path) -> Result<CollectionFile> {
        let content = tokio::fs::read(path)
            .await
            .map_err(|e| Error::BackendUnavailable(format!("{}: {e}", path.display())))?;
        serde_json::from_slice(&content)
            .map_err(|e| Error::BackendUnavailable(format!("{}: {e}", path.display())))
    }

    fn check_dimensions(collection: &Collection, len: usize) -> Result<()> {
        if len != collection.dimensions {
            return Err(Error::DimensionMismatch {
                expected: collection.dimensions,
                actual: len,
            });
        }
        Ok(())
    }

    /// Scores a candidate against the query under the given metric.
    ///
    /// Both metrics are natively oriented higher-is-better, so scores are
    /// returned untransformed.
    fn score(metric: DistanceMetric, query: &[f32], candidate: &[f32]) -> f32 {
        match metric {
            DistanceMetric::Cosine => Self::cosine_similarity(query, candidate),
            DistanceMetric::Dot => Self::dot_product(query, candidate),
        }
    }

    fn dot_product(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        let dot = Self::dot_product(a, b);
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStore for EmbeddedStore {
    fn distance_metric(&self) -> DistanceMetric {
        self.distance
    }

    async fn connect(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| Error::BackendUnavailable(format!("{}: {e}", self.data_dir.display())))?;

        let mut loaded = HashMap::new();
        let mut entries = tokio::fs::read_dir(&self.data_dir)
            .await
            .map_err(|e| Error::BackendUnavailable(e.to_string()))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| Error::BackendUnavailable(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let file = Self::load_collection(&path).await?;
            loaded.insert(name.to_string(), Collection::from_file(file));
        }

        let count = loaded.len();
        *self.collections.write().await = loaded;
        tracing::debug!(
            data_dir = %self.data_dir.display(),
            collections = count,
            "embedded vector store connected"
        );
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        // Mutations persist eagerly, so releasing is just dropping state.
        self.collections.write().await.clear();
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn create_collection(&self, name: &str, dimensions: usize, reset: bool) -> Result<bool> {
        validate_collection_name(name)?;

        let mut collections = self.collections.write().await;

        if reset && collections.remove(name).is_some() {
            tracing::info!(collection = name, "resetting collection");
            let path = self.collection_path(name);
            if let Err(e) = tokio::fs::remove_file(&path).await
                && e.kind() != std::io::ErrorKind::NotFound
            {
                return Err(Error::OperationFailed {
                    operation: "remove_collection".to_string(),
                    cause: e.to_string(),
                });
            }
        }

        if collections.contains_key(name) {
            return Ok(false);
        }

        tracing::info!(collection = name, dimensions, "creating collection");
        let collection = Collection {
            dimensions,
            metric: self.distance,
            records: HashMap::new(),
        };
        tokio::fs::create_dir_all(&self.data_dir)
            .await
            .map_err(|e| Error::OperationFailed {
                operation: "create_data_dir".to_string(),
                cause: e.to_string(),
            })?;
        self.persist(name, &collection).await?;
        collections.insert(name.to_string(), collection);
        Ok(true)
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        // Validated before touching the filesystem; the name becomes a path.
        validate_collection_name(name)?;

        let mut collections = self.collections.write().await;
        if collections.remove(name).is_some() {
            tracing::info!(collection = name, "deleting collection");
        }

        let path = self.collection_path(name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {},
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => {
                return Err(Error::OperationFailed {
                    operation: "remove_collection".to_string(),
                    cause: e.to_string(),
                });
            },
        }
        Ok(true)
    }

    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        Ok(self.collections.read().await.get(name).map(|c| {
            CollectionInfo {
                name: name.to_string(),
                dimensions: c.dimensions,
                record_count: c.records.len() as u64,
                // The collection is its own index: searchable from creation.
                index_state: IndexState::Active,
            }
        }))
    }

    async fn insert_one(&self, collection: &str, record: VectorRecord) -> Result<()> {
        ensure_record_identity(&record)?;

        let mut collections = self.collections.write().await;
        let entry = collections
            .get_mut(collection)
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;
        Self::check_dimensions(entry, record.vector.len())?;

        entry.records.insert(
            record.record_id.as_str().to_string(),
            StoredPoint {
                record_id: record.record_id.as_str().to_string(),
                text: record.text,
                vector: record.vector,
                metadata: record.metadata,
            },
        );
        let snapshot = collections
            .get(collection)
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;
        self.persist(collection, snapshot).await
    }

    async fn insert_many(
        &self,
        collection: &str,
        records: Vec<VectorRecord>,
        batch_size: usize,
    ) -> Result<()> {
        if batch_size == 0 {
            return Err(Error::InvalidInput("batch_size must be positive".to_string()));
        }
        if records.is_empty() {
            return Ok(());
        }

        let mut collections = self.collections.write().await;
        let entry = collections
            .get_mut(collection)
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;

        // Validate the whole call before writing anything.
        for record in &records {
            ensure_record_identity(record)?;
            Self::check_dimensions(entry, record.vector.len())?;
        }

        let total = records.len();
        let mut inserted = 0;
        for batch in records.chunks(batch_size) {
            let entry = collections
                .get_mut(collection)
                .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;
            for record in batch.iter().cloned() {
                entry.records.insert(
                    record.record_id.as_str().to_string(),
                    StoredPoint {
                        record_id: record.record_id.as_str().to_string(),
                        text: record.text,
                        vector: record.vector,
                        metadata: record.metadata,
                    },
                );
            }
            // Persist per batch: a later failure leaves earlier batches durable.
            let snapshot = collections
                .get(collection)
                .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;
            if let Err(e) = self.persist(collection, snapshot).await {
                return Err(Error::PartialBatchFailure {
                    inserted,
                    failed: total - inserted,
                    cause: e.to_string(),
                });
            }
            inserted += batch.len();
        }

        tracing::debug!(collection, inserted, "bulk insert complete");
        Ok(())
    }

    async fn search_by_vector(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let collections = self.collections.read().await;
        let entry = collections
            .get(collection)
            .ok_or_else(|| Error::CollectionNotFound(collection.to_string()))?;
        Self::check_dimensions(entry, query.len())?;

        let mut scored: Vec<(f32, &StoredPoint)> = entry
            .records
            .values()
            .map(|point| (Self::score(entry.metric, query, &point.vector), point))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(score, point)| SearchResult {
                text: point.text.clone(),
                score,
            })
            .collect())
    }
}
