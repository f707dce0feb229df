
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{KbError, Result};

/// Metadata for one ingested document.
///
/// `chunks` keeps the chunk texts in the order they were embedded; that order
/// matches the order of the rows the document contributed to the vector
/// index. Records are never edited after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentRecord {
    pub id: u64,
    pub filename: String,
    pub chunks: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Summary view of a document, with chunk texts omitted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentSummary {
    pub id: u64,
    pub filename: String,
    pub created_at: DateTime<Utc>,
}

/// Back-reference from a vector-index row to its source chunk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RowRef {
    pub document_id: u64,
    pub chunk_index: usize,
}

/// Ordered collection of document records plus the row-to-document map.
///
/// The `rows` vector is parallel to the vector index: entry `r` names the
/// document and chunk that produced index row `r`. Storing the back-reference
/// explicitly (rather than deriving it from cumulative chunk counts) keeps
/// row resolution correct even after documents are deleted, at the cost of
/// one small entry per row. Rows belonging to a deleted document stay behind
/// and simply no longer resolve.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentStore {
    documents: Vec<DocumentRecord>,
    rows: Vec<RowRef>,
    next_id: u64,
}

impl DocumentStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live document records.
    #[inline]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Total number of vector-index rows this store describes, including
    /// rows left behind by deleted documents.
    #[inline]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Number of rows whose document has been deleted and which therefore no
    /// longer resolve.
    #[inline]
    pub fn dead_row_count(&self) -> usize {
        let live: usize = self.documents.iter().map(|doc| doc.chunks.len()).sum();
        self.rows.len() - live
    }

    /// Append a new document record and register one row per chunk.
    ///
    /// Ids are assigned from a monotonic counter and never reused, so a
    /// deleted document's id stays dead.
    #[inline]
    pub fn append(
        &mut self,
        filename: &str,
        chunks: Vec<String>,
        created_at: DateTime<Utc>,
    ) -> u64 {
        let id = self.next_id;
        self.next_id += 1;

        for chunk_index in 0..chunks.len() {
            self.rows.push(RowRef {
                document_id: id,
                chunk_index,
            });
        }

        self.documents.push(DocumentRecord {
            id,
            filename: filename.to_string(),
            chunks,
            created_at,
        });

        debug!("Appended document {} ({})", id, filename);
        id
    }

    #[inline]
    pub fn get(&self, id: u64) -> Option<&DocumentRecord> {
        self.documents.iter().find(|doc| doc.id == id)
    }

    /// Summaries of all documents in insertion order.
    #[inline]
    pub fn list(&self) -> Vec<DocumentSummary> {
        self.documents
            .iter()
            .map(|doc| DocumentSummary {
                id: doc.id,
                filename: doc.filename.clone(),
                created_at: doc.created_at,
            })
            .collect()
    }

    /// Remove a document's metadata record.
    ///
    /// The rows it contributed to the vector index are not reclaimed; their
    /// back-references now point at a missing document and are skipped during
    /// resolution.
    #[inline]
    pub fn remove(&mut self, id: u64) -> Result<()> {
        let position = self
            .documents
            .iter()
            .position(|doc| doc.id == id)
            .ok_or(KbError::NotFound(id))?;

        self.documents.remove(position);
        debug!("Removed document {}", id);
        Ok(())
    }

    /// Resolve a vector-index row to its source document and chunk text.
    ///
    /// Returns `None` for rows that are out of range, rows whose document has
    /// been deleted, and rows whose chunk offset no longer fits the record
    /// (the latter indicating snapshot corruption).
    #[inline]
    pub fn resolve(&self, row: usize) -> Option<(&DocumentRecord, usize)> {
        let row_ref = self.rows.get(row)?;
        let document = self.get(row_ref.document_id)?;
        if row_ref.chunk_index < document.chunks.len() {
            Some((document, row_ref.chunk_index))
        } else {
            None
        }
    }
}
