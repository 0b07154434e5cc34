// aethera-core/src/infrastructure/storage/mod.rs

// This file defines what the application needs from artifact storage,
// without knowing how it's done: local disk today, an object store behind
// the same five calls tomorrow.

pub mod local;
pub mod object;

use crate::error::AetheraError;
use async_trait::async_trait;
use std::time::Duration;

pub use local::LocalStorage;
pub use object::ObjectStorage;

#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn save(&self, path: &str, bytes: &[u8]) -> Result<(), AetheraError>;

    async fn read(&self, path: &str) -> Result<Vec<u8>, AetheraError>;

    async fn delete(&self, path: &str) -> Result<(), AetheraError>;

    /// Relative keys under `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, AetheraError>;

    /// A time-limited fetch URL, when the backend supports one.
    async fn presign(&self, path: &str, ttl: Duration) -> Result<Option<String>, AetheraError>;
}

/// Normalize a storage key and reject traversal outside the root.
pub fn normalize_key(path: &str) -> Result<String, AetheraError> {
    if path.contains('\\') {
        return Err(AetheraError::UnsafePath(path.to_string()));
    }
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => continue,
            ".." => return Err(AetheraError::UnsafePath(path.to_string())),
            other => parts.push(other),
        }
    }
    if parts.is_empty() {
        return Err(AetheraError::UnsafePath(path.to_string()));
    }
    Ok(parts.join("/"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_collapses_dots_and_slashes() {
        assert_eq!(normalize_key("a/b/c.json").unwrap(), "a/b/c.json");
        assert_eq!(normalize_key("./a//b/./c").unwrap(), "a/b/c");
        assert_eq!(normalize_key("/rooted/key").unwrap(), "rooted/key");
    }

    #[test]
    fn test_traversal_rejected() {
        for bad in ["../etc/passwd", "a/../../b", "a\\b", "", ".", "a/.."] {
            assert!(normalize_key(bad).is_err(), "expected rejection: {bad}");
        }
    }
}
