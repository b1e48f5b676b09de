//! Language-model generation seam.
//!
//! Only the generation contract is consumed here; concrete providers live
//! outside this crate and are injected into the retrieval pipeline.

use async_trait::async_trait;

use crate::Result;

/// Trait for text generation providers.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Generates an answer for `prompt`, grounded in the given context
    /// passages.
    ///
    /// # Errors
    ///
    /// Returns an error if generation fails.
    async fn generate(&self, prompt: &str, context: &[String]) -> Result<String>;
}
