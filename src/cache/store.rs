use std::future::Future;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Narrow persistence boundary for one key-value document.
pub trait DocumentStore<T>: Send + Sync {
    fn load(&self) -> impl Future<Output = Result<Option<T>>> + Send;
    fn save(&self, doc: &T) -> impl Future<Output = Result<()>> + Send;
}

/// JSON document on disk, replaced atomically (tmp write, fsync, rename).
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl<T> DocumentStore<T> for JsonFileStore
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    async fn load(&self) -> Result<Option<T>> {
        let raw = match fs::read(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("no persisted document at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("cannot read {}", self.path.display()))
            }
        };

        match serde_json::from_slice::<T>(&raw) {
            Ok(doc) => Ok(Some(doc)),
            Err(e) => {
                // a corrupt record is treated as absent and rewritten on the next save
                warn!("ignoring unreadable document {}: {}", self.path.display(), e);
                Ok(None)
            }
        }
    }

    async fn save(&self, doc: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(doc).context("cannot serialize document")?;
        let tmp = self.tmp_path();

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("cannot create {}", parent.display()))?;
        }

        let mut file = fs::File::create(&tmp)
            .await
            .with_context(|| format!("cannot create {}", tmp.display()))?;
        file.write_all(&bytes)
            .await
            .with_context(|| format!("cannot write {}", tmp.display()))?;
        file.sync_all()
            .await
            .with_context(|| format!("cannot flush {}", tmp.display()))?;
        drop(file);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
                .await
                .with_context(|| format!("cannot set permissions on {}", tmp.display()))?;
        }

        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("cannot replace {}", self.path.display()))?;
        debug!("document written to {}", self.path.display());
        Ok(())
    }
}

/// In-process store, shared between clones.
#[derive(Debug)]
pub struct MemoryStore<T> {
    inner: Arc<RwLock<Option<T>>>,
}

impl<T> MemoryStore<T> {
    pub fn new() -> Self {
        Self { inner: Arc::new(RwLock::new(None)) }
    }

    pub fn with_value(value: T) -> Self {
        Self { inner: Arc::new(RwLock::new(Some(value))) }
    }
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for MemoryStore<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<T> DocumentStore<T> for MemoryStore<T>
where
    T: Clone + Send + Sync,
{
    async fn load(&self) -> Result<Option<T>> {
        Ok(self.inner.read().await.clone())
    }

    async fn save(&self, doc: &T) -> Result<()> {
        *self.inner.write().await = Some(doc.clone());
        Ok(())
    }
}
