// Database module
// In-memory state structures for the knowledge base: the flat vector index,
// the document metadata store, and the snapshot layer that persists both.

pub mod documents;
pub mod snapshot;
pub mod vector;

pub use documents::{DocumentRecord, DocumentStore, DocumentSummary, RowRef};
pub use snapshot::{DOCUMENTS_KEY, INDEX_KEY, LoadOutcome};
pub use vector::FlatIndex;
