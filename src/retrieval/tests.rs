use super::*;
use crate::database::snapshot::{DOCUMENTS_KEY, INDEX_KEY};
use crate::storage::MemoryBlobStore;

/// Deterministic embedder for tests: the vector is a weighted byte fold of
/// the text, so identical text always maps to an identical vector.
struct StubEmbedder {
    dimension: usize,
}

impl StubEmbedder {
    fn new() -> Self {
        Self { dimension: 4 }
    }
}

impl EmbeddingProvider for StubEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_one(&self, text: &str) -> crate::Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % self.dimension] += f32::from(byte) * (i + 1) as f32 / 100.0;
        }
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed_one(text)).collect()
    }
}

/// Embedder that always fails, for partial-mutation tests.
struct FailingEmbedder;

impl EmbeddingProvider for FailingEmbedder {
    fn dimension(&self) -> usize {
        4
    }

    fn embed_one(&self, _text: &str) -> crate::Result<Vec<f32>> {
        Err(KbError::Embedding("embedder offline".to_string()))
    }

    fn embed_batch(&self, _texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        Err(KbError::Embedding("embedder offline".to_string()))
    }
}

fn test_chunking() -> ChunkingConfig {
    // Small sizes so short test documents split into multiple chunks.
    ChunkingConfig {
        chunk_size: 10,
        chunk_overlap: 0,
    }
}

// Splits into ["aaaa bbbb ", "cccc"] under the test chunking config.
const TWO_CHUNK_DOC: &str = "aaaa bbbb cccc";
// Splits into ["dddd eeee ", "ffff gggg ", "hhhh"].
const THREE_CHUNK_DOC: &str = "dddd eeee ffff gggg hhhh";

async fn test_service(
    storage: Arc<dyn BlobStore>,
) -> RetrievalService<StubEmbedder> {
    RetrievalService::new(StubEmbedder::new(), storage, test_chunking())
        .await
        .expect("can create service")
}

#[tokio::test]
async fn ingest_assigns_ids_and_indexes_chunks() {
    let service = test_service(Arc::new(MemoryBlobStore::new())).await;

    let first = service
        .ingest(TWO_CHUNK_DOC, "doc0.txt")
        .await
        .expect("can ingest");
    assert_eq!(first, 0);
    assert_eq!(service.vector_count().await, 2);

    let second = service
        .ingest(THREE_CHUNK_DOC, "doc1.txt")
        .await
        .expect("can ingest");
    assert_eq!(second, 1);
    assert_eq!(service.vector_count().await, 5);

    let summaries = service.list_documents().await;
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].id, 0);
    assert_eq!(summaries[0].filename, "doc0.txt");
    assert_eq!(summaries[1].id, 1);
    assert_eq!(summaries[1].filename, "doc1.txt");
}

#[tokio::test]
async fn search_resolves_to_source_chunk() {
    let service = test_service(Arc::new(MemoryBlobStore::new())).await;
    service
        .ingest(TWO_CHUNK_DOC, "doc0.txt")
        .await
        .expect("can ingest");
    service
        .ingest(THREE_CHUNK_DOC, "doc1.txt")
        .await
        .expect("can ingest");

    // Query identical to doc1's second chunk embeds to the same vector, so
    // it must come back as the single nearest hit with distance zero.
    let hits = service.search("ffff gggg ", 1).await.expect("can search");

    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].filename, "doc1.txt");
    assert_eq!(hits[0].content, "ffff gggg ");
    assert_eq!(hits[0].distance, 0.0);
}

#[tokio::test]
async fn search_returns_ascending_distances() {
    let service = test_service(Arc::new(MemoryBlobStore::new())).await;
    service
        .ingest(THREE_CHUNK_DOC, "doc.txt")
        .await
        .expect("can ingest");

    let hits = service.search("ffff", 3).await.expect("can search");

    assert_eq!(hits.len(), 3);
    for pair in hits.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
        assert!(pair[0].distance.is_finite());
    }
}

#[tokio::test]
async fn search_rejects_zero_limit() {
    let service = test_service(Arc::new(MemoryBlobStore::new())).await;

    let result = service.search("anything", 0).await;

    assert!(matches!(result, Err(KbError::InvalidArgument(_))));
}

#[tokio::test]
async fn search_on_empty_knowledge_base_is_empty() {
    let service = test_service(Arc::new(MemoryBlobStore::new())).await;

    let hits = service
        .search("anything", DEFAULT_SEARCH_LIMIT)
        .await
        .expect("can search");

    assert!(hits.is_empty());
}

#[tokio::test]
async fn ingest_empty_content_is_rejected_without_mutation() {
    let service = test_service(Arc::new(MemoryBlobStore::new())).await;

    let result = service.ingest("", "empty.txt").await;

    assert!(matches!(result, Err(KbError::EmptyDocument)));
    assert_eq!(service.vector_count().await, 0);
    assert!(service.list_documents().await.is_empty());
}

#[tokio::test]
async fn embedding_failure_leaves_state_unchanged() {
    let storage: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
    let service = RetrievalService::new(FailingEmbedder, Arc::clone(&storage), test_chunking())
        .await
        .expect("can create service");

    let result = service.ingest(TWO_CHUNK_DOC, "doc.txt").await;

    assert!(matches!(result, Err(KbError::Embedding(_))));
    assert_eq!(service.vector_count().await, 0);
    assert!(service.list_documents().await.is_empty());
}

#[tokio::test]
async fn delete_on_empty_store_is_not_found() {
    let service = test_service(Arc::new(MemoryBlobStore::new())).await;

    let result = service.delete_document(0).await;

    assert!(matches!(result, Err(KbError::NotFound(0))));
}

#[tokio::test]
async fn deleted_documents_are_skipped_in_search() {
    let service = test_service(Arc::new(MemoryBlobStore::new())).await;
    service
        .ingest(TWO_CHUNK_DOC, "doc0.txt")
        .await
        .expect("can ingest");
    service
        .ingest(THREE_CHUNK_DOC, "doc1.txt")
        .await
        .expect("can ingest");

    service.delete_document(0).await.expect("can delete");

    // Even asking for every row must not surface the deleted document.
    let hits = service.search("aaaa bbbb ", 5).await.expect("can search");

    assert!(!hits.is_empty());
    for hit in &hits {
        assert_eq!(hit.filename, "doc1.txt");
    }
    // The stale vectors stay behind in the append-only index.
    assert_eq!(service.vector_count().await, 5);
}

#[tokio::test]
async fn deleted_rows_do_not_consume_the_result_budget() {
    let service = test_service(Arc::new(MemoryBlobStore::new())).await;
    service
        .ingest(TWO_CHUNK_DOC, "doc0.txt")
        .await
        .expect("can ingest");
    service
        .ingest(THREE_CHUNK_DOC, "doc1.txt")
        .await
        .expect("can ingest");

    service.delete_document(0).await.expect("can delete");

    // doc0's two stale rows rank closest to this query; the three live rows
    // must still fill the requested limit.
    let hits = service.search("aaaa bbbb ", 3).await.expect("can search");

    assert_eq!(hits.len(), 3);
    for hit in &hits {
        assert_eq!(hit.filename, "doc1.txt");
    }
}

#[tokio::test]
async fn restart_restores_documents_and_vectors() {
    let storage: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());

    {
        let service = test_service(Arc::clone(&storage)).await;
        service
            .ingest(TWO_CHUNK_DOC, "doc0.txt")
            .await
            .expect("can ingest");
        service
            .ingest(THREE_CHUNK_DOC, "doc1.txt")
            .await
            .expect("can ingest");
    }

    let restarted = test_service(Arc::clone(&storage)).await;

    let summaries = restarted.list_documents().await;
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].id, 0);
    assert_eq!(summaries[0].filename, "doc0.txt");
    assert_eq!(summaries[1].id, 1);
    assert_eq!(summaries[1].filename, "doc1.txt");
    assert_eq!(restarted.vector_count().await, 5);

    // Search still resolves against the restored state.
    let hits = restarted.search("cccc", 1).await.expect("can search");
    assert_eq!(hits[0].filename, "doc0.txt");
    assert_eq!(hits[0].content, "cccc");
}

#[tokio::test]
async fn snapshot_dimension_mismatch_is_fatal() {
    let storage: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());

    {
        let service = test_service(Arc::clone(&storage)).await;
        service
            .ingest(TWO_CHUNK_DOC, "doc.txt")
            .await
            .expect("can ingest");
    }

    struct WideEmbedder;
    impl EmbeddingProvider for WideEmbedder {
        fn dimension(&self) -> usize {
            8
        }
        fn embed_one(&self, _text: &str) -> crate::Result<Vec<f32>> {
            Ok(vec![0.0; 8])
        }
        fn embed_batch(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
            Ok(vec![vec![0.0; 8]; texts.len()])
        }
    }

    let result = RetrievalService::new(WideEmbedder, storage, test_chunking()).await;

    assert!(matches!(
        result,
        Err(KbError::DimensionMismatch {
            expected: 8,
            actual: 4
        })
    ));
}

#[tokio::test]
async fn corrupt_snapshot_bootstraps_fresh_state() {
    let storage: Arc<dyn BlobStore> = Arc::new(MemoryBlobStore::new());
    storage
        .upload(INDEX_KEY, b"garbage")
        .await
        .expect("can upload");
    storage
        .upload_text(DOCUMENTS_KEY, "{broken")
        .await
        .expect("can upload");

    let service = test_service(Arc::clone(&storage)).await;

    assert!(service.list_documents().await.is_empty());
    assert_eq!(service.vector_count().await, 0);
}
