// aethera-core/src/application/stages/kpis.rs

use crate::application::context::AnalysisContext;
use crate::application::manifest::ArtifactWriter;
use crate::application::stages::land_cover::LandCoverOutcome;
use crate::domain::kpi::{compute_kpis, fold_into_metrics};
use crate::domain::metrics::MetricsMap;
use crate::error::AetheraError;
use tracing::{info, instrument};

pub const STAGE: &str = "kpis";
pub const ARTIFACT: &str = "processed/environmental_kpis.json";

#[instrument(skip_all)]
pub async fn run(
    _ctx: &AnalysisContext,
    land_cover: &LandCoverOutcome,
    writer: &mut ArtifactWriter,
    metrics: &mut MetricsMap,
) -> Result<(), AetheraError> {
    let kpis = compute_kpis(&land_cover.group_shares, metrics);
    writer.write_json(ARTIFACT, &kpis).await?;
    fold_into_metrics(&kpis, metrics);
    info!(count = kpis.len(), "environmental KPIs derived");
    Ok(())
}
