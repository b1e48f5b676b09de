//! Vector store construction and closed backend dispatch.

use async_trait::async_trait;

use super::{EmbeddedStore, PgvectorStore, VectorStore};
use crate::config::{VectorBackendKind, VectorStoreConfig};
use crate::models::{CollectionInfo, DistanceMetric, SearchResult, VectorRecord};
use crate::{Error, Result};

/// The closed set of vector store backends.
///
/// Backend selection happens exactly once, in
/// [`VectorStoreFactory::build`]; everything downstream dispatches through
/// this enum instead of inspecting types at runtime.
pub enum AnyVectorStore {
    /// Local file-backed point index.
    Embedded(EmbeddedStore),
    /// PostgreSQL with pgvector.
    Pgvector(PgvectorStore),
}

impl std::fmt::Debug for AnyVectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Embedded(_) => f.write_str("AnyVectorStore::Embedded"),
            Self::Pgvector(_) => f.write_str("AnyVectorStore::Pgvector"),
        }
    }
}

macro_rules! delegate {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            Self::Embedded($store) => $call,
            Self::Pgvector($store) => $call,
        }
    };
}

#[async_trait]
impl VectorStore for AnyVectorStore {
    fn distance_metric(&self) -> DistanceMetric {
        delegate!(self, store => store.distance_metric())
    }

    async fn connect(&self) -> Result<()> {
        delegate!(self, store => store.connect().await)
    }

    async fn disconnect(&self) -> Result<()> {
        delegate!(self, store => store.disconnect().await)
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        delegate!(self, store => store.collection_exists(name).await)
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        delegate!(self, store => store.list_collections().await)
    }

    async fn create_collection(&self, name: &str, dimensions: usize, reset: bool) -> Result<bool> {
        delegate!(self, store => store.create_collection(name, dimensions, reset).await)
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        delegate!(self, store => store.delete_collection(name).await)
    }

    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        delegate!(self, store => store.collection_info(name).await)
    }

    async fn insert_one(&self, collection: &str, record: VectorRecord) -> Result<()> {
        delegate!(self, store => store.insert_one(collection, record).await)
    }

    async fn insert_many(
        &self,
        collection: &str,
        records: Vec<VectorRecord>,
        batch_size: usize,
    ) -> Result<()> {
        delegate!(self, store => store.insert_many(collection, records, batch_size).await)
    }

    async fn search_by_vector(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        delegate!(self, store => store.search_by_vector(collection, query, limit).await)
    }
}

/// Factory for constructing the configured vector store backend.
///
/// Pure construction: the returned adapter is not connected yet, and no
/// fallback backend is substituted on error.
pub struct VectorStoreFactory;

impl VectorStoreFactory {
    /// Builds the backend named by the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when the selected backend is missing
    /// required settings (a connection URL for pgvector), or the underlying
    /// constructor's error.
    pub fn build(config: &VectorStoreConfig) -> Result<AnyVectorStore> {
        match config.backend {
            VectorBackendKind::Embedded => {
                tracing::debug!(
                    data_dir = %config.data_dir.display(),
                    metric = %config.distance_metric,
                    "building embedded vector store"
                );
                Ok(AnyVectorStore::Embedded(EmbeddedStore::new(
                    &config.data_dir,
                    config.distance_metric,
                )))
            },
            VectorBackendKind::Pgvector => {
                let url = config.postgres_url.as_deref().ok_or_else(|| {
                    Error::InvalidInput(
                        "postgres_url is required for the pgvector backend".to_string(),
                    )
                })?;
                tracing::debug!(
                    metric = %config.distance_metric,
                    index_threshold = config.index_threshold,
                    "building pgvector store"
                );
                Ok(AnyVectorStore::Pgvector(PgvectorStore::new(
                    url,
                    config.distance_metric,
                    config.index_threshold,
                )?))
            },
        }
    }
}
