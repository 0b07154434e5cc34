// aethera-core/src/infrastructure/model_store.rs
//
// Pretrained ensemble artifacts on disk, keyed `(name, schema_version)`.
// Loading fails closed: an artifact whose inner schema disagrees with the
// declared one aborts the run instead of silently reshaping vectors.

use crate::domain::error::DomainError;
use crate::domain::ml::ensemble::{EnsembleModel, EnsembleSpec};
use crate::error::AetheraError;
use crate::infrastructure::fs::{ensure_dir, save_json};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn artifact_path(&self, name: &str, schema_version: &str) -> PathBuf {
        self.dir.join(format!("{name}_{schema_version}.json"))
    }

    /// Try the pretrained artifact for `spec`. `Ok(None)` when absent,
    /// `Err(ModelSchemaMismatch)` when present but incompatible.
    pub fn load(&self, spec: &EnsembleSpec) -> Result<Option<EnsembleModel>, AetheraError> {
        let path = self.artifact_path(spec.name, &spec.schema.version);
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)?;
        let model: EnsembleModel = serde_json::from_str(&content).map_err(|e| {
            AetheraError::Domain(DomainError::DatasetCorrupt {
                name: path.to_string_lossy().to_string(),
                reason: format!("unreadable model artifact: {e}"),
            })
        })?;

        if model.name != spec.name {
            warn!(artifact = ?path, "model artifact carries a foreign ensemble name");
            return Err(AetheraError::Domain(DomainError::ModelSchemaMismatch {
                ensemble: spec.name.to_string(),
                expected: spec.name.to_string(),
                found: model.name,
            }));
        }
        spec.schema
            .ensure_matches(spec.name, &model.schema)
            .map_err(AetheraError::Domain)?;

        info!(ensemble = spec.name, artifact = ?path, "pretrained ensemble loaded");
        Ok(Some(model))
    }

    pub fn save(&self, model: &EnsembleModel) -> Result<(), AetheraError> {
        ensure_dir(&self.dir)?;
        let path = self.artifact_path(&model.name, &model.schema.version);
        save_json(path, model)?;
        Ok(())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::ml::biodiversity;
    use crate::domain::ml::ensemble::TrainingOrigin;
    use anyhow::Result;
    use tempfile::tempdir;

    fn fitted() -> EnsembleModel {
        EnsembleModel::fit(
            &biodiversity::spec(),
            &biodiversity::synthetic_training(5, 64),
            TrainingOrigin::Synthetic {
                seed: 5,
                samples: 64,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_absent_artifact_is_none() -> Result<()> {
        let dir = tempdir()?;
        let store = ModelStore::new(dir.path());
        assert!(store.load(&biodiversity::spec())?.is_none());
        Ok(())
    }

    #[test]
    fn test_save_then_load_round_trip() -> Result<()> {
        let dir = tempdir()?;
        let store = ModelStore::new(dir.path());
        let model = fitted();
        store.save(&model)?;

        let loaded = store.load(&biodiversity::spec())?.unwrap();
        assert_eq!(loaded.training_data_fingerprint, model.training_data_fingerprint);
        assert_eq!(loaded.members.len(), model.members.len());
        Ok(())
    }

    #[test]
    fn test_stale_schema_fails_closed() -> Result<()> {
        let dir = tempdir()?;
        let store = ModelStore::new(dir.path());
        let mut model = fitted();
        // poison the inner schema version but keep the filename key
        model.schema.version = "bio-v0-legacy".into();
        ensure_dir(dir.path())?;
        save_json(
            store.artifact_path("biodiversity", &biodiversity::spec().schema.version),
            &model,
        )?;

        let err = store.load(&biodiversity::spec()).unwrap_err();
        assert!(matches!(
            err,
            AetheraError::Domain(DomainError::ModelSchemaMismatch { .. })
        ));
        Ok(())
    }
}
