use anyhow::Context;
use console::style;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::Result;
use crate::config::Config;
use crate::embeddings::OllamaClient;
use crate::retrieval::RetrievalService;
use crate::storage::FsBlobStore;

async fn open_service(config: &Config) -> Result<RetrievalService<OllamaClient>> {
    let embedder = OllamaClient::new(&config.ollama)?;
    let storage = Arc::new(FsBlobStore::new(config.storage_path())?);
    RetrievalService::new(embedder, storage, config.chunking.clone()).await
}

/// Ingest a plain-text file into the knowledge base.
#[inline]
pub async fn ingest_file(config: &Config, path: &Path, name: Option<String>) -> Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let filename = name.unwrap_or_else(|| {
        path.file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    });

    info!("Ingesting {} ({} bytes)", filename, content.len());

    let service = open_service(config).await?;
    let id = service.ingest(&content, &filename).await?;

    println!(
        "{} {} (ID: {})",
        style("Ingested").green().bold(),
        filename,
        id
    );
    Ok(())
}

/// Query the knowledge base and print the nearest chunks.
#[inline]
pub async fn search(config: &Config, query: &str, limit: usize) -> Result<()> {
    let service = open_service(config).await?;
    let hits = service.search(query, limit).await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{} {} (distance {:.4})",
            style(format!("{}.", rank + 1)).bold(),
            style(&hit.filename).cyan(),
            hit.distance
        );
        println!("{}", hit.content.trim());
        println!();
    }
    Ok(())
}

/// List all documents in the knowledge base.
#[inline]
pub async fn list_documents(config: &Config) -> Result<()> {
    let service = open_service(config).await?;
    let summaries = service.list_documents().await;

    if summaries.is_empty() {
        println!("The knowledge base is empty.");
        return Ok(());
    }

    for summary in summaries {
        println!(
            "{:>4}  {}  {}",
            summary.id,
            summary.created_at.format("%Y-%m-%d %H:%M:%S"),
            summary.filename
        );
    }
    Ok(())
}

/// Delete a document from the knowledge base.
#[inline]
pub async fn delete_document(config: &Config, id: u64) -> Result<()> {
    let service = open_service(config).await?;
    service.delete_document(id).await?;

    println!("{} document {}", style("Deleted").green().bold(), id);
    Ok(())
}

/// Print the active configuration.
#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    println!("Base directory: {}", config.base_dir.display());
    let rendered =
        toml::to_string_pretty(config).context("Failed to render configuration as TOML")?;
    println!("{rendered}");
    Ok(())
}
