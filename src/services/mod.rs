//! Ingestion and retrieval pipelines.
//!
//! The pipelines are constructed explicitly with their collaborators (vector
//! store, embedder, chunk store, generation provider) injected at build
//! time; nothing reaches for global state.

mod ingestion;
mod retrieval;

pub use ingestion::{IngestReport, IngestionService};
pub use retrieval::RetrievalService;

use async_trait::async_trait;

use crate::Result;
use crate::models::{DocumentChunk, ProjectId};

/// Trait for the chunk-store collaborator.
///
/// The chunk store owns durable chunk storage; this layer only reads pages
/// of chunks during ingestion and never writes back.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Returns one page of a project's chunks.
    ///
    /// An empty page signals the end of the project's chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if the page cannot be fetched.
    async fn project_chunks(
        &self,
        project: &ProjectId,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<DocumentChunk>>;
}
