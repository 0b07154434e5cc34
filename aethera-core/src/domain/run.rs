// aethera-core/src/domain/run.rs
//
// Run and project records, the manifest schema and the structured error
// record. The manifest is the commit point: a reader that trusts it can
// verify every listed artifact by hash.

use crate::domain::ml::ensemble::ModelRun;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Revoked,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Revoked)
    }
}

/// Project configuration as supplied by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProjectAnalysisConfig {
    #[serde(rename = "type")]
    pub project_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity_mw: Option<f64>,
    /// ISO 3166-1 alpha-3; inferred from the AOI centroid when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub horizon_years: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avoided_tco2e_per_year: Option<f64>,
    #[serde(default)]
    pub options: serde_json::Value,
}

/// Persistent project record (registry-owned, append-only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRecord {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    pub project_type: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Persistent run record (registry-owned, append-only; a later record for
/// the same id supersedes earlier ones).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub project_id: String,
    pub status: RunStatus,
    pub output_dir: String,
    pub manifest_path: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub config: ProjectAnalysisConfig,
}

// --- MANIFEST ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactEntry {
    pub path: String,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScoreSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub biodiversity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ahsm: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cim: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EmissionSummary {
    pub baseline_tco2e: f64,
    pub project_tco2e_per_year: f64,
    pub net_tco2e: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegalSummary {
    pub overall_compliant: bool,
    pub critical: usize,
    pub warnings: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedStage {
    pub stage: String,
    pub reason: String,
}

/// Regional context attached to the manifest (admin/NUTS intersections).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunContext {
    #[serde(default)]
    pub nuts_regions: Vec<String>,
    #[serde(default)]
    pub countries: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub project_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Canonical GeoJSON Feature, EPSG:4326.
    pub aoi: serde_json::Value,
    pub config: ProjectAnalysisConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    pub scores: ScoreSummary,
    pub emissions: EmissionSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legal: Option<LegalSummary>,
    pub artifacts: Vec<ArtifactEntry>,
    pub model_runs: Vec<ModelRun>,
    #[serde(default)]
    pub skipped_stages: Vec<SkippedStage>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub context: RunContext,
}

/// Structured failure record persisted as `error.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: String,
    pub message: String,
    pub stage: String,
    pub stack_digest: String,
}

// --- RUN ID ALLOCATION ---

static LAST_RUN_EPOCH: Mutex<i64> = Mutex::new(0);

/// Allocate `run_YYYYMMDD_HHMMSS`, strictly monotonic within the process:
/// a second-resolution collision bumps the candidate forward.
pub fn allocate_run_id(now: DateTime<Utc>) -> String {
    let mut last = LAST_RUN_EPOCH.lock().unwrap_or_else(|e| e.into_inner());
    let mut epoch = now.timestamp();
    if epoch <= *last {
        epoch = *last + 1;
    }
    *last = epoch;
    let stamp = Utc
        .timestamp_opt(epoch, 0)
        .single()
        .unwrap_or(now)
        .format("%Y%m%d_%H%M%S");
    format!("run_{stamp}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_run_ids_are_monotonic_even_within_one_second() {
        let now = Utc::now();
        let a = allocate_run_id(now);
        let b = allocate_run_id(now);
        let c = allocate_run_id(now);
        assert!(a < b && b < c);
        assert!(a.starts_with("run_"));
        assert_eq!(a.len(), "run_20250101_120000".len());
    }

    #[test]
    fn test_status_terminality() {
        assert!(!RunStatus::Pending.is_terminal());
        assert!(!RunStatus::Processing.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Revoked.is_terminal());
    }

    #[test]
    fn test_status_serializes_screaming() {
        assert_eq!(
            serde_json::to_string(&RunStatus::Completed).unwrap(),
            "\"COMPLETED\""
        );
    }

    #[test]
    fn test_manifest_shape_round_trip() {
        let manifest = RunManifest {
            run_id: "run_20250101_120000".into(),
            project_id: "proj-1".into(),
            status: RunStatus::Completed,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            aoi: serde_json::json!({"type": "Feature"}),
            config: ProjectAnalysisConfig {
                project_type: "solar_farm".into(),
                capacity_mw: Some(10.0),
                ..Default::default()
            },
            country: Some("ITA".into()),
            scores: ScoreSummary::default(),
            emissions: EmissionSummary::default(),
            legal: Some(LegalSummary {
                overall_compliant: false,
                critical: 1,
                warnings: 0,
            }),
            artifacts: vec![ArtifactEntry {
                path: "processed/land_cover_summary.json".into(),
                sha256: "ab".repeat(32),
            }],
            model_runs: vec![],
            skipped_stages: vec![],
            warnings: vec![],
            context: RunContext::default(),
        };
        let json = serde_json::to_value(&manifest).unwrap();
        assert_eq!(json["status"], "COMPLETED");
        assert_eq!(json["legal"]["critical"], 1);
        let back: RunManifest = serde_json::from_value(json).unwrap();
        assert_eq!(back.artifacts.len(), 1);
    }
}
