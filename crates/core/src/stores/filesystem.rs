use super::validate_name;
use crate::index::VectorIndex;
use crate::traits::IndexStore;
use crate::IndexError;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

const INDEX_FILE: &str = "index.json";

/// Stores each index as `<root>/<name>/index.json`.
pub struct FsIndexStore {
    root: PathBuf,
}

impl FsIndexStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_dir(&self, name: &str) -> Result<PathBuf, IndexError> {
        validate_name(name)?;
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl IndexStore for FsIndexStore {
    async fn load(&self, name: &str) -> Result<Option<VectorIndex>, IndexError> {
        let path = self.index_dir(name)?.join(INDEX_FILE);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };

        let index: VectorIndex = serde_json::from_slice(&bytes)?;
        debug!(path = %path.display(), chunks = index.len(), "loaded index from disk");
        Ok(Some(index))
    }

    async fn save(&self, index: &VectorIndex) -> Result<(), IndexError> {
        let dir = self.index_dir(index.name())?;
        fs::create_dir_all(&dir).await?;

        let staging = dir.join(format!("{INDEX_FILE}.tmp"));
        fs::write(&staging, serde_json::to_vec(index)?).await?;
        fs::rename(&staging, dir.join(INDEX_FILE)).await?;

        debug!(path = %dir.display(), chunks = index.len(), "persisted index");
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<bool, IndexError> {
        match fs::remove_dir_all(self.index_dir(name)?).await {
            Ok(()) => Ok(true),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(false),
            Err(error) => Err(error.into()),
        }
    }

    async fn contains(&self, name: &str) -> Result<bool, IndexError> {
        let path = self.index_dir(name)?.join(INDEX_FILE);
        Ok(fs::try_exists(path).await?)
    }
}
