#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end tests for the retrieval pipeline against on-disk storage:
// ingest -> search -> delete, plus restart recovery from persisted snapshots.

use std::sync::Arc;
use tempfile::TempDir;

use chat_kb::embeddings::EmbeddingProvider;
use chat_kb::embeddings::chunking::ChunkingConfig;
use chat_kb::retrieval::{DEFAULT_SEARCH_LIMIT, RetrievalService};
use chat_kb::storage::{BlobStore, FsBlobStore};

const DIMENSION: usize = 16;

/// Deterministic embedder so tests run without an embedding server.
struct ByteFoldEmbedder;

impl EmbeddingProvider for ByteFoldEmbedder {
    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn embed_one(&self, text: &str) -> chat_kb::Result<Vec<f32>> {
        let mut vector = vec![0.0f32; DIMENSION];
        for (i, byte) in text.bytes().enumerate() {
            vector[i % DIMENSION] += f32::from(byte) * (i + 1) as f32 / 1000.0;
        }
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[String]) -> chat_kb::Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed_one(text)).collect()
    }
}

async fn open_service(dir: &TempDir) -> RetrievalService<ByteFoldEmbedder> {
    let storage: Arc<dyn BlobStore> =
        Arc::new(FsBlobStore::new(dir.path()).expect("can open blob store"));
    RetrievalService::new(ByteFoldEmbedder, storage, ChunkingConfig::default())
        .await
        .expect("can create service")
}

#[tokio::test]
async fn ingest_search_delete_lifecycle() {
    let temp_dir = TempDir::new().expect("can create temp dir");
    let service = open_service(&temp_dir).await;

    let rust_doc = "Rust is a systems programming language focused on safety and speed. \
                    It guarantees memory safety without a garbage collector.";
    let cooking_doc = "Slice the onions thinly and caramelize them over low heat. \
                       Season the soup with thyme and a bay leaf.";

    let rust_id = service
        .ingest(rust_doc, "rust.txt")
        .await
        .expect("can ingest");
    let cooking_id = service
        .ingest(cooking_doc, "cooking.txt")
        .await
        .expect("can ingest");
    assert_eq!(rust_id, 0);
    assert_eq!(cooking_id, 1);

    // A query identical to one document embeds to the same vector and must
    // surface that document first, at distance zero.
    let hits = service
        .search(rust_doc, DEFAULT_SEARCH_LIMIT)
        .await
        .expect("can search");
    assert!(!hits.is_empty());
    assert_eq!(hits[0].filename, "rust.txt");
    assert_eq!(hits[0].distance, 0.0);
    for pair in hits.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }

    service
        .delete_document(rust_id)
        .await
        .expect("can delete");

    let summaries = service.list_documents().await;
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].filename, "cooking.txt");

    // The deleted document no longer appears in results.
    let hits = service
        .search("memory safety without a garbage collector", 5)
        .await
        .expect("can search");
    for hit in &hits {
        assert_eq!(hit.filename, "cooking.txt");
    }
}

#[tokio::test]
async fn restart_preserves_knowledge_base() {
    let temp_dir = TempDir::new().expect("can create temp dir");

    {
        let service = open_service(&temp_dir).await;
        service
            .ingest("A document about storage engines and snapshots.", "a.txt")
            .await
            .expect("can ingest");
        service
            .ingest("Another document about network protocols.", "b.txt")
            .await
            .expect("can ingest");
    }

    // A new service over the same directory must restore everything.
    let restarted = open_service(&temp_dir).await;

    let summaries = restarted.list_documents().await;
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].id, 0);
    assert_eq!(summaries[0].filename, "a.txt");
    assert_eq!(summaries[1].id, 1);
    assert_eq!(summaries[1].filename, "b.txt");

    let hits = restarted
        .search("A document about storage engines and snapshots.", 1)
        .await
        .expect("can search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].filename, "a.txt");
    assert_eq!(hits[0].distance, 0.0);
}

#[tokio::test]
async fn restart_after_delete_keeps_ids_stable() {
    let temp_dir = TempDir::new().expect("can create temp dir");

    {
        let service = open_service(&temp_dir).await;
        service
            .ingest("First document.", "first.txt")
            .await
            .expect("can ingest");
        service
            .ingest("Second document.", "second.txt")
            .await
            .expect("can ingest");
        service.delete_document(0).await.expect("can delete");
    }

    let restarted = open_service(&temp_dir).await;

    let summaries = restarted.list_documents().await;
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].id, 1);

    // New ingests continue the id sequence instead of reusing 0 or 1.
    let id = restarted
        .ingest("Third document.", "third.txt")
        .await
        .expect("can ingest");
    assert_eq!(id, 2);
}

#[tokio::test]
async fn concurrent_searches_share_the_read_lock() {
    let temp_dir = TempDir::new().expect("can create temp dir");
    let service = Arc::new(open_service(&temp_dir).await);
    service
        .ingest("Shared state under concurrent readers.", "doc.txt")
        .await
        .expect("can ingest");

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = Arc::clone(&service);
        handles.push(tokio::spawn(async move {
            service
                .search("concurrent readers", DEFAULT_SEARCH_LIMIT)
                .await
                .expect("can search")
        }));
    }

    for handle in handles {
        let hits = handle.await.expect("task completes");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].filename, "doc.txt");
    }
}
