// Storage module
// Durable blob store capability used for snapshot persistence. The retrieval
// service only ever reads and writes whole blobs under fixed keys.


use async_trait::async_trait;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{KbError, Result};

/// Byte-addressed blob store with whole-blob reads and writes.
///
/// `download` and `download_text` return `Ok(None)` for a missing key so
/// callers can distinguish first-run bootstrap from a real storage failure.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, key: &str, bytes: &[u8]) -> Result<()>;

    async fn download(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn upload_text(&self, key: &str, text: &str) -> Result<()> {
        self.upload(key, text.as_bytes()).await
    }

    async fn download_text(&self, key: &str) -> Result<Option<String>> {
        match self.download(key).await? {
            Some(bytes) => {
                let text = String::from_utf8(bytes).map_err(|e| {
                    KbError::Persistence(format!("Blob {key} is not valid UTF-8: {e}"))
                })?;
                Ok(Some(text))
            }
            None => Ok(None),
        }
    }
}

/// Blob store backed by a local directory, one file per key.
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Open a blob store rooted at `root`, creating the directory if needed.
    #[inline]
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.blob_path(key);
        let staging_path = self.blob_path(&format!("{key}.tmp"));
        debug!("Writing {} bytes to blob {}", bytes.len(), key);

        // Write to a staging file and rename so a crash mid-write can never
        // leave a truncated blob under the final key.
        fs::write(&staging_path, bytes).await.map_err(|e| {
            KbError::Persistence(format!(
                "Failed to write blob {}: {e}",
                staging_path.display()
            ))
        })?;
        fs::rename(&staging_path, &path).await.map_err(|e| {
            KbError::Persistence(format!("Failed to commit blob {}: {e}", path.display()))
        })
    }

    async fn download(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.blob_path(key);

        match fs::read(&path).await {
            Ok(bytes) => {
                debug!("Read {} bytes from blob {}", bytes.len(), key);
                Ok(Some(bytes))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(KbError::Persistence(format!(
                "Failed to read blob {}: {e}",
                path.display()
            ))),
        }
    }
}

/// In-memory blob store, used in tests and for ephemeral deployments.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.blobs
            .lock()
            .await
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn download(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.lock().await.get(key).cloned())
    }
}
