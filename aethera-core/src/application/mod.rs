// aethera-core/src/application/mod.rs

pub mod context;
pub mod legal;
pub mod manifest;
pub mod memory;
pub mod orchestrator;
pub mod ports;
pub mod predictors;
pub mod stages;
pub mod tracker;

// --- RE-EXPORTS (FACADE PATTERN) ---
// Cela permet au CLI de faire :
// `use aethera_core::application::{AnalysisContext, run_analysis, TaskTracker};`
// sans avoir à connaître la structure interne des fichiers.

pub use context::AnalysisContext;
pub use memory::ReportMemory;
pub use orchestrator::{RunRequest, run_analysis};
pub use tracker::TaskTracker;
