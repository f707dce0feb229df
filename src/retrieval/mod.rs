#[cfg(test)]
mod tests;

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::database::documents::{DocumentStore, DocumentSummary};
use crate::database::snapshot::{self, LoadOutcome};
use crate::database::vector::FlatIndex;
use crate::embeddings::chunking::{ChunkingConfig, split_text};
use crate::embeddings::EmbeddingProvider;
use crate::storage::BlobStore;
use crate::{KbError, Result};

/// Default number of results returned by [`RetrievalService::search`].
pub const DEFAULT_SEARCH_LIMIT: usize = 3;

/// One search result, resolved back to its source document.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub content: String,
    pub filename: String,
    pub distance: f32,
}

struct KbState {
    index: FlatIndex,
    documents: DocumentStore,
}

/// Facade over the knowledge base: chunking, embedding, indexing, search,
/// and snapshot persistence.
///
/// One instance owns the in-memory index/store pair for the process
/// lifetime. Mutating operations (`ingest`, `delete_document`) take the
/// write lock and persist a snapshot before returning; read operations
/// share the read lock and never observe a half-applied mutation.
pub struct RetrievalService<E> {
    embedder: E,
    storage: Arc<dyn BlobStore>,
    chunking: ChunkingConfig,
    state: RwLock<KbState>,
}

impl<E: EmbeddingProvider> RetrievalService<E> {
    /// Initialize the service, restoring persisted state when present.
    ///
    /// A missing snapshot bootstraps a fresh empty index and store; a
    /// corrupt snapshot is logged and replaced with fresh state. A snapshot
    /// whose dimensionality disagrees with the embedder is a fatal
    /// configuration error.
    #[inline]
    pub async fn new(
        embedder: E,
        storage: Arc<dyn BlobStore>,
        chunking: ChunkingConfig,
    ) -> Result<Self> {
        let dimension = embedder.dimension();

        let state = match snapshot::load(storage.as_ref()).await? {
            LoadOutcome::Loaded { index, documents } => {
                if index.dimension() != dimension {
                    return Err(KbError::DimensionMismatch {
                        expected: dimension,
                        actual: index.dimension(),
                    });
                }
                info!(
                    "Restored knowledge base: {} documents, {} vectors",
                    documents.len(),
                    index.len()
                );
                KbState { index, documents }
            }
            outcome => {
                if outcome == LoadOutcome::Corrupt {
                    warn!("Persisted snapshot is corrupt, starting with an empty knowledge base");
                } else {
                    info!("No persisted snapshot found, starting with an empty knowledge base");
                }
                let state = KbState {
                    index: FlatIndex::new(dimension)?,
                    documents: DocumentStore::new(),
                };
                snapshot::save(storage.as_ref(), &state.index, &state.documents).await?;
                state
            }
        };

        Ok(Self {
            embedder,
            storage,
            chunking,
            state: RwLock::new(state),
        })
    }

    /// Ingest a document: chunk, embed, index, and persist.
    ///
    /// Returns the assigned document id. Nothing is mutated unless the whole
    /// pipeline up to the index/store update succeeds, so a failed ingest is
    /// safe to retry.
    #[inline]
    pub async fn ingest(&self, content: &str, filename: &str) -> Result<u64> {
        let chunks = split_text(content, &self.chunking);
        if chunks.is_empty() {
            return Err(KbError::EmptyDocument);
        }

        debug!("Ingesting {} as {} chunks", filename, chunks.len());

        // Embed before taking the write lock: an embedding failure must
        // leave the index and store untouched.
        let vectors = self.embedder.embed_batch(&chunks)?;
        if vectors.len() != chunks.len() {
            return Err(KbError::Embedding(format!(
                "Embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let mut state = self.state.write().await;
        state.index.add(&vectors)?;
        let id = state.documents.append(filename, chunks, Utc::now());
        snapshot::save(self.storage.as_ref(), &state.index, &state.documents).await?;

        info!("Ingested document {} ({})", id, filename);
        Ok(id)
    }

    /// Find the `k` chunks nearest to `query`, in ascending distance order.
    ///
    /// Rows that no longer resolve to a live document (left behind by
    /// deletions) are skipped; the index is over-fetched by the number of
    /// dead rows so they never eat into the `k` result budget.
    #[inline]
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        if k == 0 {
            return Err(KbError::InvalidArgument(
                "search limit must be positive".to_string(),
            ));
        }

        let query_vector = self.embedder.embed_one(query)?;

        let state = self.state.read().await;
        if state.index.is_empty() {
            return Ok(Vec::new());
        }

        let fetch = k.saturating_add(state.documents.dead_row_count());
        let mut hits = Vec::new();
        for (row, distance) in state.index.search(&query_vector, fetch)? {
            if hits.len() == k {
                break;
            }
            if !distance.is_finite() {
                continue;
            }
            match state.documents.resolve(row) {
                Some((document, chunk_index)) => hits.push(SearchHit {
                    content: document.chunks[chunk_index].clone(),
                    filename: document.filename.clone(),
                    distance,
                }),
                None => {
                    debug!("Skipping row {} with no live document", row);
                }
            }
        }

        Ok(hits)
    }

    /// Summaries of all ingested documents, in ingestion order.
    #[inline]
    pub async fn list_documents(&self) -> Vec<DocumentSummary> {
        self.state.read().await.documents.list()
    }

    /// Delete a document's metadata and persist the change.
    ///
    /// The vectors the document contributed stay in the index (it is
    /// append-only); they stop resolving and are skipped by `search`.
    #[inline]
    pub async fn delete_document(&self, id: u64) -> Result<()> {
        let mut state = self.state.write().await;
        state.documents.remove(id)?;
        snapshot::save(self.storage.as_ref(), &state.index, &state.documents).await?;

        info!("Deleted document {}", id);
        Ok(())
    }

    /// Number of vectors currently in the index.
    #[inline]
    pub async fn vector_count(&self) -> usize {
        self.state.read().await.index.len()
    }
}
