// aethera-core/src/domain/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum DomainError {
    #[error("Invalid AOI: {0}")]
    #[diagnostic(
        code(aethera::domain::invalid_aoi),
        help("The AOI must contain at least one valid polygon with area >= 1 m².")
    )]
    InvalidAoi(String),

    #[error("Required dataset missing: '{0}'")]
    #[diagnostic(
        code(aethera::domain::dataset_missing),
        help("Check the data root layout and the catalog naming conventions (<name>_<ISO3>.<ext>).")
    )]
    DatasetMissing(String),

    #[error("Dataset corrupt or unreadable: '{name}' ({reason})")]
    #[diagnostic(code(aethera::domain::dataset_corrupt))]
    DatasetCorrupt { name: String, reason: String },

    #[error("Stage '{stage}' failed: {reason}")]
    #[diagnostic(code(aethera::domain::stage_failed))]
    StageFailed {
        stage: String,
        optional: bool,
        reason: String,
    },

    #[error(
        "Feature schema mismatch for '{ensemble}': expected version '{expected}', artifact declares '{found}'"
    )]
    #[diagnostic(
        code(aethera::domain::model_schema),
        help("Pretrained artifacts fail closed. Retrain or remove the stale artifact.")
    )]
    ModelSchemaMismatch {
        ensemble: String,
        expected: String,
        found: String,
    },

    #[error("Legal rule set unparseable for '{country}': {reason}")]
    #[diagnostic(code(aethera::domain::legal_rules))]
    LegalRuleParse { country: String, reason: String },

    #[error("Run exceeded the hard wall-clock budget ({limit_seconds}s)")]
    #[diagnostic(code(aethera::domain::timeout))]
    Timeout { limit_seconds: u64 },

    #[error("Run cancelled at stage boundary '{0}'")]
    #[diagnostic(code(aethera::domain::cancelled))]
    Cancelled(String),

    #[error("Metric namespace error: {0}")]
    #[diagnostic(code(aethera::domain::metrics))]
    MetricError(String),
}

impl DomainError {
    /// Stable kind string matching the error taxonomy of the platform.
    pub fn kind(&self) -> &'static str {
        match self {
            DomainError::InvalidAoi(_) => "InvalidInput",
            DomainError::DatasetMissing(_) => "DatasetMissing",
            DomainError::DatasetCorrupt { .. } => "DatasetCorrupt",
            DomainError::StageFailed { .. } => "StageFailed",
            DomainError::ModelSchemaMismatch { .. } => "ModelSchemaMismatch",
            DomainError::LegalRuleParse { .. } => "LegalRuleParseError",
            DomainError::Timeout { .. } => "Timeout",
            DomainError::Cancelled(_) => "Cancelled",
            DomainError::MetricError(_) => "InvalidInput",
        }
    }
}
