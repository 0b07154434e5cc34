// aethera-core/src/infrastructure/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum InfrastructureError {
    // --- FILESYSTEM (IO) ---
    #[error("File System Error: {0}")]
    #[diagnostic(
        code(aethera::infra::io),
        help("Check file permissions or path validity.")
    )]
    Io(#[from] std::io::Error),

    // --- CONFIG / YAML ---
    #[error("YAML Parsing Error: {0}")]
    #[diagnostic(
        code(aethera::infra::yaml),
        help("Check your YAML syntax (indentation, types).")
    )]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON Error: {0}")]
    #[diagnostic(code(aethera::infra::json))]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration Error: {0}")]
    ConfigError(String),

    #[error("Configuration not found at '{0}'")]
    #[diagnostic(code(aethera::infra::config_missing))]
    ConfigNotFound(String),

    // --- TEMPLATING ---
    #[error("Template Rendering Error: {0}")]
    #[diagnostic(
        code(aethera::infra::template),
        help("Check the Jinja syntax ({{ ... }}) inside the message template.")
    )]
    TemplateError(#[from] minijinja::Error),

    // --- GEOSPATIAL ---
    #[error("CRS Projection Error: {0}")]
    #[diagnostic(
        code(aethera::infra::projection),
        help("Check that both CRS codes are known to PROJ (e.g. 'EPSG:3035').")
    )]
    Projection(String),

    #[error("Geodata Error ({format}): {reason}")]
    #[diagnostic(code(aethera::infra::geodata))]
    Geodata { format: String, reason: String },

    // --- STORAGE / CACHE ---
    #[error("Storage Error: {0}")]
    #[diagnostic(code(aethera::infra::storage))]
    Storage(String),

    #[error("Cache Error: {0}")]
    #[diagnostic(code(aethera::infra::cache))]
    Cache(String),

    // --- EMBEDDINGS ---
    #[error("Embedding provider error: {0}")]
    #[diagnostic(code(aethera::infra::embedding))]
    Embedding(String),
}
