// Embeddings module
// Defines the embedding capability consumed by the retrieval service and the
// content chunking used to prepare documents for it.

pub mod chunking;
pub mod ollama;

pub use chunking::{ChunkingConfig, split_text};
pub use ollama::OllamaClient;

use crate::Result;

/// Capability interface for turning text into fixed-dimension float vectors.
///
/// Implementations must be deterministic (the same text always produces the
/// same vector) and must produce vectors whose length matches `dimension()`.
pub trait EmbeddingProvider: Send + Sync {
    /// Dimensionality of the vectors produced by this provider.
    fn dimension(&self) -> usize;

    /// Embed a single query text.
    fn embed_one(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of chunk texts, preserving input order.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}
