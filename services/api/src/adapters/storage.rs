//! services/api/src/adapters/storage.rs
//!
//! Object storage on the local filesystem. Files live under `root` and are
//! served back by the web layer at `{public_base_url}/uploads/{key}`.

use async_trait::async_trait;
use bytes::Bytes;
use hvac_consult_core::ports::{ObjectStorage, PortError, PortResult};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

#[derive(Clone, Debug)]
pub struct LocalObjectStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Resolves a key inside the root, refusing anything that would escape it.
    fn path_for(&self, key: &str) -> PortResult<PathBuf> {
        let relative = Path::new(key);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !safe {
            return Err(PortError::Unexpected(format!("Invalid storage key '{}'", key)));
        }
        Ok(self.root.join(relative))
    }

    pub fn url_for(&self, key: &str) -> String {
        format!("{}/uploads/{}", self.public_base_url, key)
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn upload(&self, key: &str, data: Bytes, content_type: &str) -> PortResult<String> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PortError::Unexpected(format!("Failed to create {:?}: {}", parent, e)))?;
        }
        tokio::fs::write(&path, &data)
            .await
            .map_err(|e| PortError::Unexpected(format!("Failed to write {}: {}", key, e)))?;
        debug!("Stored {} ({} bytes, {})", key, data.len(), content_type);
        Ok(self.url_for(key))
    }

    async fn download(&self, key: &str) -> PortResult<Bytes> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(PortError::NotFound(format!("Object {} not found", key)))
            }
            Err(e) => Err(PortError::Unexpected(format!("Failed to read {}: {}", key, e))),
        }
    }

    async fn delete(&self, key: &str) -> PortResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PortError::Unexpected(format!("Failed to delete {}: {}", key, e))),
        }
    }
}
