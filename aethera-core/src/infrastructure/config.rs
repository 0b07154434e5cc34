// aethera-core/src/infrastructure/config.rs

use crate::infrastructure::error::InfrastructureError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};
use validator::Validate;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    #[default]
    Local,
    Object,
}

/// Platform configuration. Discovered as `aethera.yaml` and layered with
/// `AETHERA_*` environment overrides.
#[derive(Debug, Deserialize, Serialize, Clone, Validate)]
pub struct AetheraConfig {
    /// Root of the base datasets, rule sets and registries.
    pub data_root: PathBuf,

    #[serde(default)]
    pub storage_backend: StorageBackendKind,

    /// Per-run artifact root (`<storage_root>/<run_id>/`).
    pub storage_root: PathBuf,

    #[serde(default = "default_working_crs")]
    pub working_crs: String,

    #[serde(default = "default_receptor_max_distance_km")]
    #[validate(range(min = 1.0, max = 500.0))]
    pub receptor_max_distance_km: f64,

    #[serde(default = "default_emission_factors_path")]
    pub emission_factors_path: PathBuf,

    #[serde(default = "default_rule_sets_dir")]
    pub rule_sets_dir: PathBuf,

    #[serde(default = "default_pretrained_models_dir")]
    pub pretrained_models_dir: PathBuf,

    #[serde(default = "default_cache_memory_bytes")]
    pub cache_memory_bytes: u64,

    #[serde(default = "default_cache_disk_bytes")]
    pub cache_disk_bytes: u64,

    #[serde(default = "default_cache_disk_ttl_seconds")]
    pub cache_disk_ttl_seconds: u64,

    #[serde(default = "default_wall_clock_hard_seconds")]
    #[validate(range(min = 1))]
    pub wall_clock_hard_seconds: u64,

    #[serde(default = "default_wall_clock_soft_seconds")]
    pub wall_clock_soft_seconds: u64,

    /// Narrative-generator provider name, consumed by the report engine
    /// downstream of the core. Recognized here so one config file serves
    /// the whole deployment.
    #[serde(default)]
    pub llm_provider: Option<String>,

    #[serde(default = "default_embedding_provider")]
    pub embedding_provider: String,

    #[serde(default = "default_embedding_dim")]
    #[validate(range(min = 8, max = 4096))]
    pub embedding_dim: usize,

    #[serde(default = "default_rag_top_k")]
    pub rag_top_k: usize,

    #[serde(default = "default_rag_min_score")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub rag_min_score: f64,

    #[serde(default = "default_horizon_years")]
    pub default_horizon_years: f64,

    #[serde(default = "default_ml_seed")]
    pub ml_synthetic_seed: u64,
}

fn default_working_crs() -> String {
    "EPSG:3035".to_string()
}
fn default_receptor_max_distance_km() -> f64 {
    50.0
}
fn default_emission_factors_path() -> PathBuf {
    PathBuf::from("factors/emission_factors.yaml")
}
fn default_rule_sets_dir() -> PathBuf {
    PathBuf::from("rule_sets")
}
fn default_pretrained_models_dir() -> PathBuf {
    PathBuf::from("models")
}
fn default_cache_memory_bytes() -> u64 {
    256 * 1024 * 1024
}
fn default_cache_disk_bytes() -> u64 {
    2 * 1024 * 1024 * 1024
}
fn default_cache_disk_ttl_seconds() -> u64 {
    7 * 24 * 3600
}
fn default_wall_clock_hard_seconds() -> u64 {
    3600
}
fn default_wall_clock_soft_seconds() -> u64 {
    1800
}
fn default_embedding_provider() -> String {
    "hashing".to_string()
}
fn default_embedding_dim() -> usize {
    256
}
fn default_rag_top_k() -> usize {
    3
}
fn default_rag_min_score() -> f64 {
    0.7
}
fn default_horizon_years() -> f64 {
    25.0
}
fn default_ml_seed() -> u64 {
    20240901
}

impl AetheraConfig {
    /// Sensible in-memory defaults rooted at `data_root` (tests, ad-hoc use).
    pub fn with_root(data_root: impl Into<PathBuf>) -> Self {
        let data_root = data_root.into();
        Self {
            storage_root: data_root.join("runs"),
            data_root,
            storage_backend: StorageBackendKind::default(),
            working_crs: default_working_crs(),
            receptor_max_distance_km: default_receptor_max_distance_km(),
            emission_factors_path: default_emission_factors_path(),
            rule_sets_dir: default_rule_sets_dir(),
            pretrained_models_dir: default_pretrained_models_dir(),
            cache_memory_bytes: default_cache_memory_bytes(),
            cache_disk_bytes: default_cache_disk_bytes(),
            cache_disk_ttl_seconds: default_cache_disk_ttl_seconds(),
            wall_clock_hard_seconds: default_wall_clock_hard_seconds(),
            wall_clock_soft_seconds: default_wall_clock_soft_seconds(),
            llm_provider: None,
            embedding_provider: default_embedding_provider(),
            embedding_dim: default_embedding_dim(),
            rag_top_k: default_rag_top_k(),
            rag_min_score: default_rag_min_score(),
            default_horizon_years: default_horizon_years(),
            ml_synthetic_seed: default_ml_seed(),
        }
    }

    /// Resolve a path declared relative to the data root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_root.join(path)
        }
    }

    pub fn cache_root(&self) -> PathBuf {
        self.data_root.join("cache")
    }

    pub fn registry_root(&self) -> PathBuf {
        self.data_root.join("registry")
    }

    pub fn memory_root(&self) -> PathBuf {
        self.data_root.join("memory")
    }
}

// --- LOADER ---

#[instrument(skip(root))] // Log automatique de l'entrée/sortie de la fonction
pub fn load_config(root: &Path) -> Result<AetheraConfig, InfrastructureError> {
    // 1. Découverte du fichier principal
    let config_path = find_main_config(root)?;
    info!(path = ?config_path, "Loading platform configuration");

    // 2. Chargement YAML Base
    let content = fs::read_to_string(&config_path)?;
    let mut config: AetheraConfig = serde_yaml::from_str(&content)?;

    // Relative roots are anchored at the directory holding the config file.
    if config.data_root.is_relative() {
        config.data_root = root.join(&config.data_root);
    }
    if config.storage_root.is_relative() {
        config.storage_root = config.data_root.join(&config.storage_root);
    }

    // 3. Override via Variables d'Environnement (Pattern 'Layering')
    apply_env_overrides(&mut config);

    // 4. Validation finale
    config
        .validate()
        .map_err(|e| InfrastructureError::ConfigError(e.to_string()))?;

    Ok(config)
}

fn find_main_config(root: &Path) -> Result<PathBuf, InfrastructureError> {
    let candidates = ["aethera.yaml", "aethera.yml"];
    for filename in candidates {
        let p = root.join(filename);
        if p.exists() {
            return Ok(p);
        }
    }
    Err(InfrastructureError::ConfigNotFound(format!(
        "No configuration file found in {:?}. Checked: {:?}",
        root, candidates
    )))
}

fn apply_env_overrides(config: &mut AetheraConfig) {
    if let Ok(val) = std::env::var("AETHERA_STORAGE_ROOT") {
        info!(old = ?config.storage_root, new = ?val, "Overriding storage root via ENV");
        config.storage_root = PathBuf::from(val);
    }
    if let Ok(val) = std::env::var("AETHERA_WORKING_CRS") {
        info!(old = ?config.working_crs, new = ?val, "Overriding working CRS via ENV");
        config.working_crs = val;
    }
    if let Ok(val) = std::env::var("AETHERA_WALL_CLOCK_HARD_SECONDS") {
        if let Ok(parsed) = val.parse::<u64>() {
            config.wall_clock_hard_seconds = parsed;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_with_root() {
        let cfg = AetheraConfig::with_root("/data/aethera");
        assert_eq!(cfg.working_crs, "EPSG:3035");
        assert_eq!(cfg.receptor_max_distance_km, 50.0);
        assert_eq!(cfg.rag_top_k, 3);
        assert_eq!(cfg.storage_root, PathBuf::from("/data/aethera/runs"));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_load_config_anchors_relative_roots() -> Result<()> {
        let dir = tempdir()?;
        fs::write(
            dir.path().join("aethera.yaml"),
            "data_root: data\nstorage_root: runs\nreceptor_max_distance_km: 25\n",
        )?;
        let cfg = load_config(dir.path())?;
        assert_eq!(cfg.data_root, dir.path().join("data"));
        assert_eq!(cfg.storage_root, dir.path().join("data").join("runs"));
        assert_eq!(cfg.receptor_max_distance_km, 25.0);
        Ok(())
    }

    #[test]
    fn test_missing_config_is_reported() {
        let dir = tempdir().unwrap();
        let err = load_config(dir.path()).unwrap_err();
        assert!(matches!(err, InfrastructureError::ConfigNotFound(_)));
    }

    #[test]
    fn test_validation_rejects_absurd_distance_cap() {
        let mut cfg = AetheraConfig::with_root("/tmp/x");
        cfg.receptor_max_distance_km = 10_000.0;
        assert!(cfg.validate().is_err());
    }
}
