// aethera-core/src/application/manifest.rs
//
// The artifact ledger and the manifest commit. Every artifact goes through
// `ArtifactWriter` so its SHA-256 is taken from the exact bytes persisted;
// the manifest write is the run's commit point.

use crate::domain::run::{ArtifactEntry, ErrorRecord, RunManifest};
use crate::error::AetheraError;
use crate::infrastructure::fs::sha256_bytes;
use crate::infrastructure::storage::StorageBackend;
use std::sync::Arc;
use tracing::debug;

pub struct ArtifactWriter {
    storage: Arc<dyn StorageBackend>,
    run_id: String,
    entries: Vec<ArtifactEntry>,
}

impl ArtifactWriter {
    pub fn new(storage: Arc<dyn StorageBackend>, run_id: &str) -> Self {
        Self {
            storage,
            run_id: run_id.to_string(),
            entries: Vec::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Persist a JSON artifact under the run directory and ledger its hash.
    pub async fn write_json<T: serde::Serialize>(
        &mut self,
        rel_path: &str,
        data: &T,
    ) -> Result<(), AetheraError> {
        let bytes = serde_json::to_vec_pretty(data)
            .map_err(|e| AetheraError::InternalError(format!("artifact serialization: {e}")))?;
        self.write_bytes(rel_path, &bytes).await
    }

    pub async fn write_bytes(&mut self, rel_path: &str, bytes: &[u8]) -> Result<(), AetheraError> {
        let key = format!("{}/{rel_path}", self.run_id);
        self.storage.save(&key, bytes).await?;
        debug!(artifact = rel_path, bytes = bytes.len(), "artifact persisted");
        self.entries.retain(|e| e.path != rel_path);
        self.entries.push(ArtifactEntry {
            path: rel_path.to_string(),
            sha256: sha256_bytes(bytes),
        });
        Ok(())
    }

    pub fn entries(&self) -> &[ArtifactEntry] {
        &self.entries
    }

    /// Commit the manifest. The manifest itself is not ledgered (it is the
    /// ledger); it must be the LAST write of a run.
    pub async fn commit_manifest(&self, manifest: &RunManifest) -> Result<(), AetheraError> {
        let bytes = serde_json::to_vec_pretty(manifest)
            .map_err(|e| AetheraError::InternalError(format!("manifest serialization: {e}")))?;
        let key = format!("{}/manifest.json", self.run_id);
        self.storage.save(&key, &bytes).await
    }

    /// Persist the structured failure record (`error.json`).
    pub async fn write_error(&self, record: &ErrorRecord) -> Result<(), AetheraError> {
        let bytes = serde_json::to_vec_pretty(record)
            .map_err(|e| AetheraError::InternalError(format!("error serialization: {e}")))?;
        let key = format!("{}/error.json", self.run_id);
        self.storage.save(&key, &bytes).await
    }
}
