// aethera-core/src/error.rs

use crate::domain::error::DomainError;
use crate::infrastructure::error::InfrastructureError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AetheraError {
    // --- ERREURS DU DOMAINE (AOI, Règles légales, Schémas ML) ---
    #[error(transparent)]
    Domain(#[from] DomainError),

    // --- ERREURS D'INFRASTRUCTURE (IO, Parsing, Projection) ---
    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),

    // --- ERREURS GÉNÉRIQUES / APPLICATIVES ---
    #[error("Internal Error: {0}")]
    InternalError(String),

    #[error("Unsafe path traversal detected: {0}")]
    UnsafePath(String),
}

// Manual implementation to avoid duplicate enum variant but keep ergonomics
impl From<std::io::Error> for AetheraError {
    fn from(err: std::io::Error) -> Self {
        AetheraError::Infrastructure(InfrastructureError::Io(err))
    }
}

impl AetheraError {
    /// Stable machine readable kind, persisted in `error.json` and surfaced
    /// by the task tracker.
    pub fn kind(&self) -> &'static str {
        match self {
            AetheraError::Domain(d) => d.kind(),
            AetheraError::Infrastructure(InfrastructureError::Storage(_)) => "StorageError",
            AetheraError::Infrastructure(_) => "InfrastructureError",
            AetheraError::InternalError(_) => "Internal",
            AetheraError::UnsafePath(_) => "StorageError",
        }
    }
}
