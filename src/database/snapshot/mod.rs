
use tracing::{debug, warn};

use crate::database::documents::DocumentStore;
use crate::database::vector::FlatIndex;
use crate::storage::BlobStore;
use crate::{KbError, Result};

/// Blob key for the serialized vector index.
pub const INDEX_KEY: &str = "vector_index.bin";
/// Blob key for the serialized document metadata.
pub const DOCUMENTS_KEY: &str = "docs_metadata.json";

/// Outcome of attempting to load a persisted snapshot pair.
#[derive(Debug, PartialEq)]
pub enum LoadOutcome {
    /// Both blobs were present and parsed; state is ready to use.
    Loaded {
        index: FlatIndex,
        documents: DocumentStore,
    },
    /// One or both blobs are missing: first-run bootstrap.
    Absent,
    /// A blob was present but failed to parse. The caller may start fresh,
    /// but the previous corpus is gone and needs re-ingestion.
    Corrupt,
}

/// Persist the index and document store as a snapshot pair.
///
/// The index blob is written first, then the metadata blob, always under the
/// same two keys. Called after every mutation so that a crash loses at most
/// the in-flight request.
pub async fn save(
    store: &dyn BlobStore,
    index: &FlatIndex,
    documents: &DocumentStore,
) -> Result<()> {
    let index_bytes = index.to_bytes()?;
    let documents_json = serde_json::to_string(documents)
        .map_err(|e| KbError::Persistence(format!("Failed to encode document metadata: {e}")))?;

    store.upload(INDEX_KEY, &index_bytes).await?;
    store.upload_text(DOCUMENTS_KEY, &documents_json).await?;

    debug!(
        "Saved snapshot: {} index rows, {} documents",
        index.len(),
        documents.len()
    );
    Ok(())
}

/// Load the snapshot pair written by [`save`].
///
/// Missing blobs mean no prior state and map to [`LoadOutcome::Absent`];
/// unparseable blobs map to [`LoadOutcome::Corrupt`]. A pair that parses but
/// disagrees on row counts is a torn write, which is surfaced as an error
/// rather than silently discarded.
pub async fn load(store: &dyn BlobStore) -> Result<LoadOutcome> {
    let index_bytes = match store.download(INDEX_KEY).await? {
        Some(bytes) => bytes,
        None => {
            debug!("No vector index blob found, starting fresh");
            return Ok(LoadOutcome::Absent);
        }
    };
    // Downloaded as raw bytes so that invalid UTF-8 lands in the parse-failure
    // triage below instead of surfacing as a storage error.
    let documents_bytes = match store.download(DOCUMENTS_KEY).await? {
        Some(bytes) => bytes,
        None => {
            warn!("Vector index blob exists but document metadata is missing");
            return Ok(LoadOutcome::Absent);
        }
    };

    let index = match FlatIndex::from_bytes(&index_bytes) {
        Ok(index) => index,
        Err(e) => {
            warn!("Vector index blob failed to parse: {}", e);
            return Ok(LoadOutcome::Corrupt);
        }
    };
    let documents: DocumentStore = match serde_json::from_slice(&documents_bytes) {
        Ok(documents) => documents,
        Err(e) => {
            warn!("Document metadata blob failed to parse: {}", e);
            return Ok(LoadOutcome::Corrupt);
        }
    };

    if index.len() != documents.row_count() {
        return Err(KbError::Persistence(format!(
            "Snapshot pair is torn: index has {} rows but metadata describes {}",
            index.len(),
            documents.row_count()
        )));
    }

    debug!(
        "Loaded snapshot: {} index rows, {} documents",
        index.len(),
        documents.len()
    );
    Ok(LoadOutcome::Loaded { index, documents })
}
