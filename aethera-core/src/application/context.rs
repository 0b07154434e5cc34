// aethera-core/src/application/context.rs
//
// The long-lived analysis context: catalog, cache, storage, projector,
// registries, model store, tracker. Initialized once at worker start and
// threaded through every stage; there are no module-level singletons.

use crate::application::ports::TemplateEngine;
use crate::application::tracker::TaskTracker;
use crate::error::AetheraError;
use crate::infrastructure::cache::DatasetCache;
use crate::infrastructure::catalog::DataCatalog;
use crate::infrastructure::config::{AetheraConfig, StorageBackendKind};
use crate::infrastructure::crs::Projector;
use crate::infrastructure::embedding::{EmbeddingProvider, HashingEmbedder};
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::model_store::ModelStore;
use crate::infrastructure::registry::{ProjectRegistry, RunRegistry};
use crate::infrastructure::storage::{LocalStorage, ObjectStorage, StorageBackend};
use crate::infrastructure::storage::object::ObjectStorageConfig;
use crate::infrastructure::template::JinjaRenderer;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct AnalysisContext {
    pub config: AetheraConfig,
    pub catalog: DataCatalog,
    pub cache: Arc<DatasetCache>,
    pub storage: Arc<dyn StorageBackend>,
    pub projector: Projector,
    pub projects: ProjectRegistry,
    pub runs: RunRegistry,
    pub model_store: ModelStore,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub renderer: Arc<dyn TemplateEngine>,
    pub tracker: Arc<TaskTracker>,
}

impl AnalysisContext {
    /// Build the full context from configuration. Worker-start lifecycle.
    pub fn initialize(config: AetheraConfig) -> Result<Self, AetheraError> {
        let catalog = DataCatalog::scan(&config.data_root)?;
        let cache = Arc::new(DatasetCache::new(
            config.cache_root(),
            config.cache_memory_bytes,
            config.cache_disk_bytes,
            Duration::from_secs(config.cache_disk_ttl_seconds),
        ));
        let storage: Arc<dyn StorageBackend> = match config.storage_backend {
            StorageBackendKind::Local => Arc::new(LocalStorage::new(&config.storage_root)),
            StorageBackendKind::Object => Arc::new(ObjectStorage::new(object_config_from_env()?)),
        };
        let projector = Projector::new(config.working_crs.clone());
        let projects = ProjectRegistry::new(&config.registry_root());
        let runs = RunRegistry::new(&config.registry_root());
        let model_store = ModelStore::new(config.resolve(&config.pretrained_models_dir));
        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::new(HashingEmbedder::new(config.embedding_dim)?);

        info!(
            data_root = ?config.data_root,
            working_crs = %config.working_crs,
            "Analysis context initialized"
        );

        Ok(Self {
            config,
            catalog,
            cache,
            storage,
            projector,
            projects,
            runs,
            model_store,
            embedder,
            renderer: Arc::new(JinjaRenderer::new()),
            tracker: Arc::new(TaskTracker::new()),
        })
    }
}

fn object_config_from_env() -> Result<ObjectStorageConfig, AetheraError> {
    let var = |name: &str| {
        std::env::var(name).map_err(|_| {
            AetheraError::Infrastructure(InfrastructureError::ConfigError(format!(
                "object storage selected but {name} is not set"
            )))
        })
    };
    Ok(ObjectStorageConfig {
        endpoint: var("AETHERA_S3_ENDPOINT")?,
        bucket: var("AETHERA_S3_BUCKET")?,
        region: var("AETHERA_S3_REGION")?,
        access_key: var("AETHERA_S3_ACCESS_KEY")?,
        secret_key: var("AETHERA_S3_SECRET_KEY")?,
    })
}
