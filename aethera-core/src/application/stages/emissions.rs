// aethera-core/src/application/stages/emissions.rs

use crate::application::context::AnalysisContext;
use crate::application::manifest::ArtifactWriter;
use crate::application::stages::StageResult;
use crate::application::stages::land_cover::LandCoverOutcome;
use crate::domain::emissions::{EmissionFactorCatalog, EmissionInputs, compute_balance};
use crate::domain::metrics::{MetricsMap, round_sig};
use crate::domain::run::ProjectAnalysisConfig;
use crate::error::AetheraError;
use serde::Serialize;
use std::fs;
use tracing::{info, instrument, warn};

pub const STAGE: &str = "emissions";
pub const ARTIFACT: &str = "processed/emissions_summary.json";

#[derive(Debug, Serialize)]
struct EmissionsSummary {
    project_type: String,
    capacity_mw: f64,
    horizon_years: f64,
    baseline_tco2e_per_year: f64,
    construction_tco2e: f64,
    operation_tco2e_per_year: f64,
    project_total_tco2e: f64,
    avoided_tco2e_per_year: f64,
    net_tco2e_per_year: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    unmatched_classes: Vec<String>,
}

#[instrument(skip_all)]
pub async fn run(
    ctx: &AnalysisContext,
    config: &ProjectAnalysisConfig,
    land_cover: &LandCoverOutcome,
    writer: &mut ArtifactWriter,
    metrics: &mut MetricsMap,
) -> Result<StageResult<()>, AetheraError> {
    let factors_path = ctx.config.resolve(&ctx.config.emission_factors_path);
    if !factors_path.exists() {
        return Ok(StageResult::Skipped(format!(
            "emission factor catalog absent at {}",
            factors_path.display()
        )));
    }
    let content = fs::read_to_string(&factors_path)?;
    let catalog: EmissionFactorCatalog = serde_yaml::from_str(&content)
        .map_err(crate::infrastructure::error::InfrastructureError::YamlError)?;

    let capacity_mw = config.capacity_mw.unwrap_or(0.0);
    let horizon_years = config
        .horizon_years
        .unwrap_or(ctx.config.default_horizon_years);
    if catalog.factors_for(&config.project_type).is_none() {
        warn!(
            project_type = %config.project_type,
            "no project-type factors declared; project-side emissions are zero"
        );
    }

    let balance = compute_balance(
        &catalog,
        &EmissionInputs {
            class_areas_ha: &land_cover.group_areas_ha,
            project_type: &config.project_type,
            capacity_mw,
            horizon_years,
            avoided_tco2e_per_year: config.avoided_tco2e_per_year,
        },
    );

    let summary = EmissionsSummary {
        project_type: config.project_type.clone(),
        capacity_mw,
        horizon_years,
        baseline_tco2e_per_year: round_sig(balance.baseline_tco2e_per_year),
        construction_tco2e: round_sig(balance.construction_tco2e),
        operation_tco2e_per_year: round_sig(balance.operation_tco2e_per_year),
        project_total_tco2e: round_sig(balance.project_total_tco2e),
        avoided_tco2e_per_year: round_sig(balance.avoided_tco2e_per_year),
        net_tco2e_per_year: round_sig(balance.net_tco2e_per_year),
        unmatched_classes: balance.unmatched_classes.clone(),
    };
    writer.write_json(ARTIFACT, &summary).await?;

    metrics.insert("baseline_tco2e_per_year", balance.baseline_tco2e_per_year);
    metrics.insert("project_construction_tco2e", balance.construction_tco2e);
    metrics.insert(
        "project_operation_tco2e_per_year",
        balance.operation_tco2e_per_year,
    );
    metrics.insert("project_total_tco2e", balance.project_total_tco2e);
    metrics.insert("avoided_tco2e_per_year", balance.avoided_tco2e_per_year);
    metrics.insert("net_tco2e_per_year", balance.net_tco2e_per_year);

    info!(
        net = round_sig(balance.net_tco2e_per_year),
        "emission balance computed"
    );
    Ok(StageResult::Done(()))
}
