// aethera-core/src/application/predictors.rs
//
// Ensemble loading policy and the prediction fan-out. Biodiversity, RESM
// and AHSM are independent and run concurrently; CIM consumes their scores
// and runs last. Loading order per ensemble: pretrained artifact ->
// catalog training table -> synthetic fallback.

use crate::application::context::AnalysisContext;
use crate::domain::error::DomainError;
use crate::domain::metrics::MetricsMap;
use crate::domain::ml::ensemble::{EnsembleModel, EnsembleSpec, Prediction, TrainingOrigin};
use crate::domain::ml::learner::TrainingSet;
use crate::domain::ml::{ahsm, biodiversity, cim, resm};
use crate::error::AetheraError;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};

const SYNTHETIC_SAMPLES: usize = 256;

#[derive(Debug, Clone)]
pub struct PredictionBundle {
    pub biodiversity: Prediction,
    pub resm: Prediction,
    pub ahsm: Prediction,
    pub cim: Prediction,
}

/// Resolve one ensemble according to the loading policy.
#[instrument(skip(ctx, spec, synthetic), fields(ensemble = spec.name))]
pub fn load_or_fit(
    ctx: &AnalysisContext,
    spec: &EnsembleSpec,
    synthetic: impl Fn(u64, usize) -> TrainingSet,
) -> Result<Arc<EnsembleModel>, AetheraError> {
    // 1. Pretrained artifact (schema mismatch fails the run, not the load).
    if let Some(model) = ctx.model_store.load(spec)? {
        return Ok(Arc::new(model));
    }

    // 2. Catalog-discovered training table.
    let training_name = format!("training_{}", spec.name);
    if let Some(descriptor) = ctx
        .catalog
        .locate(&training_name, None, false)
        .map_err(AetheraError::Domain)?
    {
        match read_training_csv(&descriptor.path, spec) {
            Ok(training) => {
                info!(rows = training.len(), path = ?descriptor.path, "fitting on catalog training table");
                let model = EnsembleModel::fit(
                    spec,
                    &training,
                    TrainingOrigin::CatalogDataset {
                        path: descriptor.path.to_string_lossy().to_string(),
                    },
                )?;
                return Ok(Arc::new(model));
            }
            Err(e) => {
                warn!(error = %e, "training table unusable, falling back to synthetic");
            }
        }
    }

    // 3. Synthetic fallback from the ensemble's labeling heuristic.
    let seed = ctx.config.ml_synthetic_seed;
    let training = synthetic(seed, SYNTHETIC_SAMPLES);
    let model = EnsembleModel::fit(
        spec,
        &training,
        TrainingOrigin::Synthetic {
            seed,
            samples: SYNTHETIC_SAMPLES,
        },
    )?;
    Ok(Arc::new(model))
}

/// Training CSV contract: one column per schema feature plus `label`.
fn read_training_csv(path: &Path, spec: &EnsembleSpec) -> Result<TrainingSet, AetheraError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| corrupt(path, e))?;
    let headers = reader.headers().map_err(|e| corrupt(path, e))?.clone();

    let mut columns = Vec::with_capacity(spec.schema.len());
    for name in spec.schema.names() {
        let idx = headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| corrupt(path, format!("missing feature column '{name}'")))?;
        columns.push(idx);
    }
    let label_idx = headers
        .iter()
        .position(|h| h == "label" || h == "score")
        .ok_or_else(|| corrupt(path, "missing 'label' column"))?;

    let mut rows = Vec::new();
    let mut labels = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| corrupt(path, e))?;
        let mut row = Vec::with_capacity(columns.len());
        for idx in &columns {
            let raw = record.get(*idx).unwrap_or_default();
            row.push(raw.parse::<f64>().map_err(|e| corrupt(path, e))?);
        }
        rows.push(row);
        labels.push(
            record
                .get(label_idx)
                .unwrap_or_default()
                .parse::<f64>()
                .map_err(|e| corrupt(path, e))?,
        );
    }

    Ok(TrainingSet {
        feature_names: spec.schema.names().iter().map(|s| s.to_string()).collect(),
        rows,
        labels,
    })
}

fn corrupt(path: &Path, reason: impl ToString) -> AetheraError {
    AetheraError::Domain(DomainError::DatasetCorrupt {
        name: path.to_string_lossy().to_string(),
        reason: reason.to_string(),
    })
}

/// The declared intra-run parallel point: three independent ensembles
/// concurrently, then CIM over their scores.
pub async fn run_predictions(
    ctx: &AnalysisContext,
    metrics: &mut MetricsMap,
) -> Result<PredictionBundle, AetheraError> {
    let bio_model = load_or_fit(ctx, &biodiversity::spec(), biodiversity::synthetic_training)?;
    let resm_model = load_or_fit(ctx, &resm::spec(), resm::synthetic_training)?;
    let ahsm_model = load_or_fit(ctx, &ahsm::spec(), ahsm::synthetic_training)?;

    let bio_vector = bio_model.schema.build_vector(metrics);
    let resm_vector = resm_model.schema.build_vector(metrics);
    let ahsm_vector = ahsm_model.schema.build_vector(metrics);

    let (biodiversity_p, resm_p, ahsm_p) = futures::future::try_join3(
        predict_on_worker(bio_model, bio_vector),
        predict_on_worker(resm_model, resm_vector),
        predict_on_worker(ahsm_model, ahsm_vector),
    )
    .await?;

    metrics.insert("biodiversity_score", biodiversity_p.score);
    metrics.insert("resm_score", resm_p.score);
    metrics.insert("ahsm_score", ahsm_p.score);

    // CIM last: upstream scores enter its vector as plain scalars.
    let cim_model = load_or_fit(ctx, &cim::spec(), cim::synthetic_training)?;
    let cim_vector = cim_model.schema.build_vector(metrics);
    let cim_p = cim_model.predict(&cim_vector).map_err(AetheraError::Domain)?;
    metrics.insert("cim_score", cim_p.score);

    Ok(PredictionBundle {
        biodiversity: biodiversity_p,
        resm: resm_p,
        ahsm: ahsm_p,
        cim: cim_p,
    })
}

async fn predict_on_worker(
    model: Arc<EnsembleModel>,
    vector: crate::domain::feature_vector::FeatureVector,
) -> Result<Prediction, AetheraError> {
    tokio::task::spawn_blocking(move || model.predict(&vector).map_err(AetheraError::Domain))
        .await
        .map_err(|e| AetheraError::InternalError(format!("prediction task failed: {e}")))?
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::infrastructure::config::AetheraConfig;
    use anyhow::Result;
    use std::fs;
    use tempfile::tempdir;

    fn base_metrics() -> MetricsMap {
        let mut m = MetricsMap::new();
        m.insert("aoi_area_ha", 120.0);
        m.insert("capacity_mw", 10.0);
        m.insert("protected_overlap_pct", 2.0);
        m.insert("natural_ratio", 0.3);
        m.insert("forest_ratio", 0.2);
        m.insert("agricultural_ratio", 0.4);
        m.insert("impervious_ratio", 0.1);
        m.insert("soil_erosion_risk_index", 35.0);
        m.insert("human_pressure_index", 25.0);
        m.insert("net_tco2e_per_year", -500.0);
        m
    }

    #[tokio::test]
    async fn test_full_fanout_on_synthetic_models() -> Result<()> {
        let dir = tempdir()?;
        let ctx = crate::application::context::AnalysisContext::initialize(
            AetheraConfig::with_root(dir.path()),
        )?;
        let mut metrics = base_metrics();
        let bundle = run_predictions(&ctx, &mut metrics).await?;

        for p in [&bundle.biodiversity, &bundle.resm, &bundle.ahsm, &bundle.cim] {
            assert!((0.0..=100.0).contains(&p.score));
            assert!((0.0..=1.0).contains(&p.confidence));
            assert!(p.drivers.len() <= 5);
            assert_eq!(p.model_run.origin, "synthetic");
            assert!(p.model_run.members.len() >= 2);
        }
        // feature_count matches each declared schema
        assert_eq!(bundle.biodiversity.model_run.feature_count, biodiversity::schema().len());
        assert_eq!(bundle.cim.model_run.feature_count, cim::schema().len());
        // the fan-out fed CIM with the upstream scores
        assert_eq!(metrics.get("cim_score"), Some(bundle.cim.score));
        assert!(metrics.get("biodiversity_score").is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_catalog_training_table_is_preferred() -> Result<()> {
        let dir = tempdir()?;
        let datasets = dir.path().join("datasets");
        fs::create_dir_all(&datasets)?;

        // tiny but valid training table for the CIM schema
        let spec = cim::spec();
        let mut csv_text = spec.schema.names().join(",");
        csv_text.push_str(",label\n");
        for i in 0..16 {
            let v = i as f64;
            csv_text.push_str(&format!(
                "{},{},{},{},{},{},{},{}\n",
                v, v, v, v / 10.0, v * 10.0, v, v * 5.0, v * 2.0
            ));
        }
        fs::write(datasets.join("training_cim.csv"), csv_text)?;

        let ctx = crate::application::context::AnalysisContext::initialize(
            AetheraConfig::with_root(dir.path()),
        )?;
        let model = load_or_fit(&ctx, &spec, cim::synthetic_training)?;
        assert!(matches!(model.origin, TrainingOrigin::CatalogDataset { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_unusable_training_table_falls_back_to_synthetic() -> Result<()> {
        let dir = tempdir()?;
        let datasets = dir.path().join("datasets");
        fs::create_dir_all(&datasets)?;
        fs::write(datasets.join("training_resm.csv"), "wrong,columns\n1,2\n")?;

        let ctx = crate::application::context::AnalysisContext::initialize(
            AetheraConfig::with_root(dir.path()),
        )?;
        let model = load_or_fit(&ctx, &resm::spec(), resm::synthetic_training)?;
        assert!(matches!(model.origin, TrainingOrigin::Synthetic { .. }));
        Ok(())
    }
}
