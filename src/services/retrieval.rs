//! Retrieval pipeline: query in, ranked context (and optionally an answer)
//! out.

use std::sync::Arc;

use crate::Result;
use crate::embedding::{EmbedMode, Embedder};
use crate::llm::GenerationProvider;
use crate::models::{ProjectId, SearchResult};
use crate::storage::VectorStore;

/// Service that answers queries from a project's vector collection.
pub struct RetrievalService<S: VectorStore> {
    store: Arc<S>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn GenerationProvider>,
}

impl<S: VectorStore> RetrievalService<S> {
    /// Creates the pipeline with its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Self {
        Self {
            store,
            embedder,
            generator,
        }
    }

    /// Retrieves the chunks most similar to `query`.
    ///
    /// An empty result means "no relevant context" and is not an error;
    /// storage failures surface as errors.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding fails or the vector search fails
    /// (including a missing collection).
    pub async fn search(
        &self,
        project: &ProjectId,
        query: &str,
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let vector = self.embedder.embed(query, EmbedMode::Query).await?;
        let results = self
            .store
            .search_by_vector(&project.vector_collection(), &vector, limit)
            .await?;
        tracing::debug!(
            project = %project,
            hits = results.len(),
            "vector search complete"
        );
        Ok(results)
    }

    /// Answers a question from the project's retrieved context.
    ///
    /// Returns `None` when retrieval finds no context at all, so callers
    /// can distinguish "nothing relevant" from a generation failure.
    ///
    /// # Errors
    ///
    /// Returns an error if retrieval or generation fails.
    pub async fn answer(
        &self,
        project: &ProjectId,
        question: &str,
        limit: usize,
    ) -> Result<Option<String>> {
        let results = self.search(project, question, limit).await?;
        if results.is_empty() {
            return Ok(None);
        }

        let context: Vec<String> = results.into_iter().map(|r| r.text).collect();
        let answer = self.generator.generate(question, &context).await?;
        Ok(Some(answer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::embedding::HashEmbedder;
    use crate::models::{DistanceMetric, VectorRecord};
    use crate::storage::EmbeddedStore;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Generator that echoes the context it was handed.
    struct EchoGenerator;

    #[async_trait]
    impl GenerationProvider for EchoGenerator {
        async fn generate(&self, _prompt: &str, context: &[String]) -> Result<String> {
            Ok(format!("answer from {} passages", context.len()))
        }
    }

    async fn service_with_collection(
        project: &ProjectId,
    ) -> (TempDir, RetrievalService<EmbeddedStore>, Arc<EmbeddedStore>) {
        let dir = TempDir::new().expect("tempdir failed");
        let store = Arc::new(EmbeddedStore::new(dir.path(), DistanceMetric::Cosine));
        store.connect().await.expect("connect failed");
        store
            .create_collection(&project.vector_collection(), 64, false)
            .await
            .expect("create failed");

        let service = RetrievalService::new(
            Arc::clone(&store),
            Arc::new(HashEmbedder::new(64)),
            Arc::new(EchoGenerator),
        );
        (dir, service, store)
    }

    async fn insert_text(store: &EmbeddedStore, collection: &str, id: &str, text: &str) {
        let embedder = HashEmbedder::new(64);
        let vector = embedder
            .embed(text, EmbedMode::Document)
            .await
            .expect("embed failed");
        store
            .insert_one(collection, VectorRecord::new(id, text, vector))
            .await
            .expect("insert failed");
    }

    #[tokio::test]
    async fn test_search_finds_matching_chunk() {
        let project = ProjectId::new("p1");
        let (_dir, service, store) = service_with_collection(&project).await;
        let collection = project.vector_collection();

        insert_text(&store, &collection, "c1", "rust borrow checker").await;
        insert_text(&store, &collection, "c2", "postgres storage engine").await;

        let results = service
            .search(&project, "rust borrow checker", 1)
            .await
            .expect("search failed");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "rust borrow checker");
    }

    #[tokio::test]
    async fn test_search_empty_collection_is_not_an_error() {
        let project = ProjectId::new("p1");
        let (_dir, service, _store) = service_with_collection(&project).await;

        let results = service
            .search(&project, "anything", 5)
            .await
            .expect("search failed");
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_search_missing_collection_is_an_error() {
        let project = ProjectId::new("p1");
        let (_dir, service, _store) = service_with_collection(&project).await;

        let other = ProjectId::new("p2");
        let result = service.search(&other, "anything", 5).await;
        assert!(matches!(result, Err(Error::CollectionNotFound(_))));
    }

    #[tokio::test]
    async fn test_answer_returns_none_without_context() {
        let project = ProjectId::new("p1");
        let (_dir, service, _store) = service_with_collection(&project).await;

        let answer = service
            .answer(&project, "anything?", 5)
            .await
            .expect("answer failed");
        assert_eq!(answer, None);
    }

    #[tokio::test]
    async fn test_answer_uses_retrieved_context() {
        let project = ProjectId::new("p1");
        let (_dir, service, store) = service_with_collection(&project).await;
        let collection = project.vector_collection();

        insert_text(&store, &collection, "c1", "alpha").await;
        insert_text(&store, &collection, "c2", "beta").await;

        let answer = service
            .answer(&project, "alpha", 2)
            .await
            .expect("answer failed");
        assert_eq!(answer.as_deref(), Some("answer from 2 passages"));
    }
}
