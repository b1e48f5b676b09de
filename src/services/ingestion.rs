//! Ingestion pipeline: chunks in, vectors stored.

use std::sync::Arc;

use super::ChunkStore;
use crate::config::IngestionConfig;
use crate::embedding::{EmbedMode, Embedder};
use crate::models::{ProjectId, VectorRecord};
use crate::storage::VectorStore;
use crate::Result;

/// Outcome of one project ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IngestReport {
    /// Records written to the vector store.
    pub inserted: usize,
    /// Chunks skipped because their embedding failed.
    pub skipped: usize,
}

/// Service that ingests a project's chunks into its vector collection.
pub struct IngestionService<S: VectorStore> {
    store: Arc<S>,
    embedder: Arc<dyn Embedder>,
    chunks: Arc<dyn ChunkStore>,
    config: IngestionConfig,
}

impl<S: VectorStore> IngestionService<S> {
    /// Creates the pipeline with its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        embedder: Arc<dyn Embedder>,
        chunks: Arc<dyn ChunkStore>,
        config: IngestionConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            chunks,
            config,
        }
    }

    /// Ingests a project: ensures its collection, embeds chunk pages, and
    /// bulk-writes the vectors.
    ///
    /// The collection dimension is the active embedder's. Re-ingestion
    /// passes `reset_existing` to drop any prior collection first, so no
    /// duplicate or orphaned vectors survive it.
    ///
    /// A chunk whose embedding fails is skipped and logged, not fatal: the
    /// rest of the batch proceeds and the skip is reported in the returned
    /// [`IngestReport`].
    ///
    /// # Errors
    ///
    /// Returns an error if collection creation, a chunk page fetch, or a
    /// vector write fails.
    pub async fn ingest_project(
        &self,
        project: &ProjectId,
        reset_existing: bool,
    ) -> Result<IngestReport> {
        let collection = project.vector_collection();
        self.store
            .create_collection(&collection, self.embedder.dimensions(), reset_existing)
            .await?;

        let mut report = IngestReport::default();
        let mut offset = 0;

        loop {
            let page = self
                .chunks
                .project_chunks(project, offset, self.config.page_size)
                .await?;
            if page.is_empty() {
                break;
            }
            offset += page.len();

            let mut records = Vec::with_capacity(page.len());
            for chunk in page {
                match self.embedder.embed(&chunk.text, EmbedMode::Document).await {
                    Ok(vector) => records.push(VectorRecord {
                        record_id: chunk.id,
                        text: chunk.text,
                        vector,
                        metadata: chunk.metadata,
                    }),
                    Err(e) => {
                        tracing::warn!(
                            project = %project,
                            chunk = %chunk.id,
                            error = %e,
                            "embedding failed, skipping chunk"
                        );
                        report.skipped += 1;
                    },
                }
            }

            let written = records.len();
            self.store
                .insert_many(&collection, records, self.config.batch_size)
                .await?;
            report.inserted += written;
        }

        tracing::info!(
            project = %project,
            inserted = report.inserted,
            skipped = report.skipped,
            "project ingestion complete"
        );
        Ok(report)
    }

    /// Drops a project's vector collection.
    ///
    /// Called when the project itself is deleted; the chunk store's own
    /// cascade handles the chunk side.
    ///
    /// # Errors
    ///
    /// Returns an error if the drop fails.
    pub async fn delete_project_vectors(&self, project: &ProjectId) -> Result<bool> {
        self.store
            .delete_collection(&project.vector_collection())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::embedding::HashEmbedder;
    use crate::models::{ChunkId, DistanceMetric, DocumentChunk};
    use crate::storage::EmbeddedStore;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Chunk store serving a fixed set of chunks.
    struct FixedChunks {
        chunks: Vec<DocumentChunk>,
    }

    #[async_trait]
    impl ChunkStore for FixedChunks {
        async fn project_chunks(
            &self,
            _project: &ProjectId,
            offset: usize,
            limit: usize,
        ) -> Result<Vec<DocumentChunk>> {
            Ok(self
                .chunks
                .iter()
                .skip(offset)
                .take(limit)
                .cloned()
                .collect())
        }
    }

    /// Embedder that fails on texts containing a marker.
    struct FlakyEmbedder {
        inner: HashEmbedder,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }

        async fn embed(&self, text: &str, mode: EmbedMode) -> Result<Vec<f32>> {
            if text.contains("poison") {
                return Err(Error::OperationFailed {
                    operation: "embed".to_string(),
                    cause: "provider rejected text".to_string(),
                });
            }
            self.inner.embed(text, mode).await
        }
    }

    fn chunk(project: &ProjectId, id: &str, text: &str) -> DocumentChunk {
        DocumentChunk {
            id: ChunkId::new(id),
            project: project.clone(),
            text: text.to_string(),
            metadata: None,
        }
    }

    async fn connected_store() -> (TempDir, Arc<EmbeddedStore>) {
        let dir = TempDir::new().expect("tempdir failed");
        let store = Arc::new(EmbeddedStore::new(dir.path(), DistanceMetric::Cosine));
        store.connect().await.expect("connect failed");
        (dir, store)
    }

    fn service(
        store: Arc<EmbeddedStore>,
        chunks: Vec<DocumentChunk>,
    ) -> IngestionService<EmbeddedStore> {
        IngestionService::new(
            store,
            Arc::new(HashEmbedder::new(64)),
            Arc::new(FixedChunks { chunks }),
            IngestionConfig {
                batch_size: 10,
                page_size: 7,
            },
        )
    }

    #[tokio::test]
    async fn test_ingest_creates_collection_and_inserts() {
        let (_dir, store) = connected_store().await;
        let project = ProjectId::new("p1");
        let chunks: Vec<DocumentChunk> = (0..20)
            .map(|i| chunk(&project, &format!("c{i}"), &format!("chunk body {i}")))
            .collect();

        let report = service(Arc::clone(&store), chunks)
            .ingest_project(&project, false)
            .await
            .expect("ingest failed");

        assert_eq!(report.inserted, 20);
        assert_eq!(report.skipped, 0);

        let info = store
            .collection_info(&project.vector_collection())
            .await
            .expect("info failed")
            .expect("collection should exist");
        assert_eq!(info.record_count, 20);
        assert_eq!(info.dimensions, 64);
    }

    #[tokio::test]
    async fn test_ingest_skips_failed_embeddings() {
        let (_dir, store) = connected_store().await;
        let project = ProjectId::new("p1");
        let chunks = vec![
            chunk(&project, "c1", "fine text"),
            chunk(&project, "c2", "poison text"),
            chunk(&project, "c3", "also fine"),
        ];

        let ingestion = IngestionService::new(
            Arc::clone(&store),
            Arc::new(FlakyEmbedder {
                inner: HashEmbedder::new(64),
            }),
            Arc::new(FixedChunks { chunks }),
            IngestionConfig::default(),
        );

        let report = ingestion
            .ingest_project(&project, false)
            .await
            .expect("ingest failed");
        assert_eq!(report.inserted, 2);
        assert_eq!(report.skipped, 1);
    }

    #[tokio::test]
    async fn test_reingest_with_reset_replaces_vectors() {
        let (_dir, store) = connected_store().await;
        let project = ProjectId::new("p1");

        let first = vec![chunk(&project, "c1", "one"), chunk(&project, "c2", "two")];
        service(Arc::clone(&store), first)
            .ingest_project(&project, false)
            .await
            .expect("ingest failed");

        let second = vec![chunk(&project, "c9", "nine")];
        let report = service(Arc::clone(&store), second)
            .ingest_project(&project, true)
            .await
            .expect("re-ingest failed");
        assert_eq!(report.inserted, 1);

        let info = store
            .collection_info(&project.vector_collection())
            .await
            .expect("info failed")
            .expect("collection should exist");
        assert_eq!(info.record_count, 1, "reset must drop prior vectors");
    }

    #[tokio::test]
    async fn test_delete_project_vectors() {
        let (_dir, store) = connected_store().await;
        let project = ProjectId::new("p1");
        let ingestion = service(Arc::clone(&store), vec![chunk(&project, "c1", "text")]);

        ingestion
            .ingest_project(&project, false)
            .await
            .expect("ingest failed");
        assert!(ingestion
            .delete_project_vectors(&project)
            .await
            .expect("delete failed"));
        assert!(!store
            .collection_exists(&project.vector_collection())
            .await
            .expect("exists failed"));
    }
}
