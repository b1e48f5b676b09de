//! End-to-end pipeline tests over the embedded vector store.
//!
//! Exercises the full ingest → retrieve path with the deterministic
//! hash embedder, so a chunk's own text is always its own nearest query.

// Integration tests use expect/unwrap for simplicity - panics are acceptable in tests
#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use std::sync::Arc;

use async_trait::async_trait;
use ragstore::{
    AnyVectorStore, ChunkId, ChunkStore, DocumentChunk, EmbedMode, Embedder, GenerationProvider,
    HashEmbedder, IngestionConfig, IngestionService, ProjectId, RagConfig, Result,
    RetrievalService, VectorRecord, VectorStore, VectorStoreFactory,
};
use tempfile::TempDir;

/// Chunk store backed by a fixed in-memory list.
struct FixedChunks {
    chunks: Vec<DocumentChunk>,
}

#[async_trait]
impl ChunkStore for FixedChunks {
    async fn project_chunks(
        &self,
        project: &ProjectId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<DocumentChunk>> {
        Ok(self
            .chunks
            .iter()
            .filter(|c| &c.project == project)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Generator that lists the passages it was grounded in.
struct JoiningGenerator;

#[async_trait]
impl GenerationProvider for JoiningGenerator {
    async fn generate(&self, prompt: &str, context: &[String]) -> Result<String> {
        Ok(format!("{prompt} -> [{}]", context.join(" | ")))
    }
}

fn chunk(project: &ProjectId, id: &str, text: &str) -> DocumentChunk {
    DocumentChunk {
        id: ChunkId::new(id),
        project: project.clone(),
        text: text.to_string(),
        metadata: Some(serde_json::json!({ "source": "test" })),
    }
}

async fn embedded_store(dir: &TempDir) -> Arc<AnyVectorStore> {
    let mut config = RagConfig::default();
    config.vector.data_dir = dir.path().to_path_buf();

    let store = Arc::new(VectorStoreFactory::build(&config.vector).expect("factory failed"));
    store.connect().await.expect("connect failed");
    store
}

#[tokio::test]
async fn test_ingest_then_retrieve_specific_chunk() {
    let dir = TempDir::new().expect("tempdir failed");
    let store = embedded_store(&dir).await;
    let project = ProjectId::new("p1");

    let chunks = vec![
        chunk(&project, "chunk-1", "the embedded engine persists one file per collection"),
        chunk(&project, "chunk-2", "the relational engine builds its index lazily"),
        chunk(&project, "chunk-3", "queries are embedded before searching"),
    ];

    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(768));
    let ingestion = IngestionService::new(
        Arc::clone(&store),
        Arc::clone(&embedder),
        Arc::new(FixedChunks { chunks }),
        IngestionConfig::default(),
    );

    let report = ingestion
        .ingest_project(&project, false)
        .await
        .expect("ingest failed");
    assert_eq!(report.inserted, 3);
    assert_eq!(report.skipped, 0);

    let retrieval = RetrievalService::new(store, embedder, Arc::new(JoiningGenerator));
    let results = retrieval
        .search(&project, "the relational engine builds its index lazily", 1)
        .await
        .expect("search failed");

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].text, "the relational engine builds its index lazily");
}

#[tokio::test]
async fn test_batch_boundaries_are_transparent_through_the_pipeline() {
    let dir = TempDir::new().expect("tempdir failed");
    let store = embedded_store(&dir).await;
    let project = ProjectId::new("bulk");

    // 130 chunks with a batch size of 50 crosses two batch boundaries.
    let chunks: Vec<DocumentChunk> = (0..130)
        .map(|i| chunk(&project, &format!("c{i}"), &format!("distinct chunk number {i}")))
        .collect();

    let ingestion = IngestionService::new(
        Arc::clone(&store),
        Arc::new(HashEmbedder::new(64)),
        Arc::new(FixedChunks { chunks }),
        IngestionConfig {
            batch_size: 50,
            page_size: 100,
        },
    );

    let report = ingestion
        .ingest_project(&project, false)
        .await
        .expect("ingest failed");
    assert_eq!(report.inserted, 130);

    let info = store
        .collection_info(&project.vector_collection())
        .await
        .expect("info failed")
        .expect("collection should exist");
    assert_eq!(info.record_count, 130);
}

#[tokio::test]
async fn test_reingest_resets_and_projects_are_isolated() {
    let dir = TempDir::new().expect("tempdir failed");
    let store = embedded_store(&dir).await;
    let p1 = ProjectId::new("p1");
    let p2 = ProjectId::new("p2");

    let chunks = vec![
        chunk(&p1, "a", "first project text"),
        chunk(&p1, "b", "more first project text"),
        chunk(&p2, "c", "second project text"),
    ];
    let chunks = Arc::new(FixedChunks { chunks });
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(64));

    let ingestion = IngestionService::new(
        Arc::clone(&store),
        Arc::clone(&embedder),
        Arc::clone(&chunks) as Arc<dyn ChunkStore>,
        IngestionConfig::default(),
    );

    ingestion.ingest_project(&p1, false).await.expect("ingest p1 failed");
    ingestion.ingest_project(&p2, false).await.expect("ingest p2 failed");

    let collections = store.list_collections().await.expect("list failed");
    assert_eq!(collections, vec!["rag_p1".to_string(), "rag_p2".to_string()]);

    // Re-ingesting p1 with reset leaves p2 untouched.
    let report = ingestion.ingest_project(&p1, true).await.expect("re-ingest failed");
    assert_eq!(report.inserted, 2);

    let p2_info = store
        .collection_info(&p2.vector_collection())
        .await
        .expect("info failed")
        .expect("p2 should exist");
    assert_eq!(p2_info.record_count, 1);
}

#[tokio::test]
async fn test_answer_flow_grounds_generation_in_retrieved_context() {
    let dir = TempDir::new().expect("tempdir failed");
    let store = embedded_store(&dir).await;
    let project = ProjectId::new("docs");

    let chunks = vec![
        chunk(&project, "c1", "collections are created lazily on first ingestion"),
        chunk(&project, "c2", "vectors are dropped with their project"),
    ];

    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(128));
    IngestionService::new(
        Arc::clone(&store),
        Arc::clone(&embedder),
        Arc::new(FixedChunks { chunks }),
        IngestionConfig::default(),
    )
    .ingest_project(&project, false)
    .await
    .expect("ingest failed");

    let retrieval = RetrievalService::new(
        Arc::clone(&store),
        embedder,
        Arc::new(JoiningGenerator),
    );

    let answer = retrieval
        .answer(&project, "collections are created lazily on first ingestion", 1)
        .await
        .expect("answer failed")
        .expect("context should exist");
    assert!(answer.contains("collections are created lazily"));

    // No collection for this project yet: the miss is an error, not an
    // empty answer.
    let missing = ProjectId::new("unknown");
    assert!(retrieval.answer(&missing, "anything", 1).await.is_err());
}

#[tokio::test]
async fn test_vectors_survive_reconnect() {
    let dir = TempDir::new().expect("tempdir failed");
    let project = ProjectId::new("durable");

    {
        let store = embedded_store(&dir).await;
        store
            .create_collection(&project.vector_collection(), 32, false)
            .await
            .expect("create failed");
        let embedder = HashEmbedder::new(32);
        let vector = embedder
            .embed("persisted text", EmbedMode::Document)
            .await
            .expect("embed failed");
        store
            .insert_one(
                &project.vector_collection(),
                VectorRecord::new("c1", "persisted text", vector),
            )
            .await
            .expect("insert failed");
        store.disconnect().await.expect("disconnect failed");
    }

    let store = embedded_store(&dir).await;
    let embedder = HashEmbedder::new(32);
    let query = embedder
        .embed("persisted text", EmbedMode::Query)
        .await
        .expect("embed failed");
    let results = store
        .search_by_vector(&project.vector_collection(), &query, 1)
        .await
        .expect("search failed");
    assert_eq!(results[0].text, "persisted text");
}

#[test]
fn test_distinct_projects_map_to_distinct_collections() {
    assert_ne!(
        ProjectId::new("alpha").vector_collection(),
        ProjectId::new("beta").vector_collection()
    );
    assert_eq!(
        ProjectId::new("Alpha").vector_collection(),
        ProjectId::new("alpha").vector_collection(),
        "sanitization folds case, so project ids should differ by more than case"
    );
}
