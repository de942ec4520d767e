mod sessions;
mod stats;
mod tasks;

pub use sessions::{SessionListFilter, SessionStore, SessionsDocument};
pub use stats::{RequestOutcome, StatsDocument, StatsStore};
pub use tasks::{TaskListFilter, TaskStore, TasksDocument};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

/// File-backed JSON document store with exclusive-writer serialization.
///
/// One document per store. Reads are served from the in-memory cache, which
/// always reflects the latest committed write from this process. Writers run
/// one at a time under the document mutex: the mutator works on a copy, the
/// copy is persisted with write-to-temp-then-rename, and only a successful
/// persist commits the copy back to the cache.
pub struct DocumentStore<D> {
    path: PathBuf,
    doc: Arc<Mutex<D>>,
}

impl<D> Clone for DocumentStore<D> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            doc: self.doc.clone(),
        }
    }
}

impl<D> DocumentStore<D>
where
    D: Clone + Default + Serialize + DeserializeOwned + Send + 'static,
{
    /// Open the store, loading the current on-disk document or starting from
    /// the default structure when the file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let doc = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            D::default()
        };
        Ok(Self {
            path,
            doc: Arc::new(Mutex::new(doc)),
        })
    }

    /// Snapshot of the current document. May lag a concurrent writer but
    /// never observes a torn write.
    pub async fn read(&self) -> D {
        self.doc.lock().await.clone()
    }

    /// Run `mutator` under the store's exclusive lock and persist the result
    /// atomically. On any error the in-memory document is left untouched, so
    /// the cache never reflects a failed mutation.
    pub async fn with_lock<R>(&self, mutator: impl FnOnce(&mut D) -> Result<R>) -> Result<R> {
        let mut guard = self.doc.lock().await;
        let mut working = guard.clone();
        let out = mutator(&mut working)?;
        self.persist(&working).await?;
        *guard = working;
        Ok(out)
    }

    async fn persist(&self, doc: &D) -> Result<()> {
        let content = serde_json::to_string_pretty(doc).context("Failed to serialize document")?;
        atomic_write(&self.path, &content).await
    }
}

/// Atomic write using a temp file and rename.
async fn atomic_write(path: &Path, content: &str) -> Result<()> {
    let temp_path = path.with_extension("tmp");
    tokio::fs::write(&temp_path, content)
        .await
        .with_context(|| format!("Failed to write {}", temp_path.display()))?;
    tokio::fs::rename(&temp_path, path)
        .await
        .with_context(|| format!("Failed to rename {} into place", temp_path.display()))?;
    Ok(())
}
