// aethera-core/src/infrastructure/storage/local.rs

use crate::error::AetheraError;
use crate::infrastructure::fs::{atomic_write, ensure_dir};
use crate::infrastructure::storage::{StorageBackend, normalize_key};
use async_trait::async_trait;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use walkdir::WalkDir;

/// Filesystem backend rooted at the configured storage root. Writes are
/// atomic (temp file + rename in the target directory).
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, AetheraError> {
        Ok(self.root.join(normalize_key(path)?))
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    async fn save(&self, path: &str, bytes: &[u8]) -> Result<(), AetheraError> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            ensure_dir(parent)?;
        }
        atomic_write(target, bytes)?;
        Ok(())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, AetheraError> {
        let target = self.resolve(path)?;
        Ok(fs::read(target)?)
    }

    async fn delete(&self, path: &str) -> Result<(), AetheraError> {
        let target = self.resolve(path)?;
        if target.exists() {
            fs::remove_file(target)?;
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, AetheraError> {
        let base = self.resolve(prefix)?;
        if !base.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in WalkDir::new(&base).into_iter().filter_map(|e| e.ok()) {
            if entry.path().is_file() {
                if let Ok(rel) = entry.path().strip_prefix(&self.root) {
                    keys.push(rel.to_string_lossy().replace('\\', "/"));
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    async fn presign(&self, _path: &str, _ttl: Duration) -> Result<Option<String>, AetheraError> {
        // No URL story for plain disk.
        Ok(None)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_save_read_delete_list() -> Result<()> {
        let dir = tempdir()?;
        let storage = LocalStorage::new(dir.path());

        storage.save("run_1/manifest.json", b"{}").await?;
        storage
            .save("run_1/processed/land_cover_summary.json", b"{\"x\":1}")
            .await?;

        assert_eq!(storage.read("run_1/manifest.json").await?, b"{}");
        let keys = storage.list("run_1").await?;
        assert_eq!(
            keys,
            vec![
                "run_1/manifest.json".to_string(),
                "run_1/processed/land_cover_summary.json".to_string()
            ]
        );

        storage.delete("run_1/manifest.json").await?;
        assert_eq!(storage.list("run_1").await?.len(), 1);
        assert!(storage.presign("run_1/x", Duration::from_secs(60)).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_traversal_blocked() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());
        let err = storage.save("../outside.txt", b"x").await.unwrap_err();
        assert!(matches!(err, AetheraError::UnsafePath(_)));
    }
}
