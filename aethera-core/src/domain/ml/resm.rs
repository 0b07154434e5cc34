// aethera-core/src/domain/ml/resm.rs
//
// Renewable Energy Suitability Model. Higher = better siting conditions.

use crate::domain::feature_vector::FeatureSchema;
use crate::domain::ml::ensemble::{CategoryBins, EnsembleSpec, LearnerPlan};
use crate::domain::ml::learner::TrainingSet;
use crate::domain::ml::synthetic::uniform_rows;

pub const NAME: &str = "resm";
pub const VERSION: &str = "0.4.0";
pub const SCHEMA_VERSION: &str = "resm-v1";

const FEATURES: &[(&str, f64, f64, f64)] = &[
    ("agricultural_ratio", 0.0, 0.0, 1.0),
    ("impervious_ratio", 0.0, 0.0, 1.0),
    ("natural_ratio", 0.0, 0.0, 1.0),
    ("aoi_compactness", 0.5, 0.0, 1.0),
    ("land_use_per_mw_ha", 10.0, 0.5, 50.0),
    ("distance_to_settlement_km", 50.0, 0.0, 50.0),
    ("capacity_mw", 0.0, 1.0, 500.0),
    ("aoi_area_ha", 0.0, 1.0, 5000.0),
];

pub fn schema() -> FeatureSchema {
    FeatureSchema::new(
        SCHEMA_VERSION,
        &FEATURES
            .iter()
            .map(|(name, default, _, _)| (*name, *default))
            .collect::<Vec<_>>(),
    )
}

pub fn spec() -> EnsembleSpec {
    EnsembleSpec {
        name: NAME,
        version: VERSION,
        schema: schema(),
        bins: CategoryBins::new(
            &["very_low", "low", "moderate", "high", "very_high"],
            &[20.0, 40.0, 60.0, 80.0],
        ),
        members: vec![
            LearnerPlan::Ridge {
                lambda: 1.0,
                non_negative: vec![],
            },
            LearnerPlan::Knn { k: 7 },
            LearnerPlan::Stumps {
                rounds: 40,
                learning_rate: 0.3,
                monotone: vec![],
            },
        ],
    }
}

/// Siting heuristic: favour already-worked, compact, grid-adjacent land;
/// penalise natural cover and sprawling footprints.
pub fn label(row: &[f64]) -> f64 {
    let agricultural = row[0];
    let impervious = row[1];
    let natural = row[2];
    let compactness = row[3];
    let land_per_mw = row[4];
    let dist_settlement = row[5];

    let raw = 0.30 * agricultural
        + 0.20 * (1.0 - natural)
        + 0.10 * (1.0 - impervious)
        + 0.15 * compactness
        + 0.15 * (1.0 - dist_settlement / 50.0)
        + 0.10 * (1.0 - (land_per_mw.min(30.0) / 30.0));
    100.0 * raw.clamp(0.0, 1.0)
}

pub fn synthetic_training(seed: u64, samples: usize) -> TrainingSet {
    let ranges: Vec<(f64, f64)> = FEATURES.iter().map(|(_, _, lo, hi)| (*lo, *hi)).collect();
    let rows = uniform_rows(&ranges, samples, seed);
    let labels = rows.iter().map(|r| label(r)).collect();
    TrainingSet {
        feature_names: FEATURES.iter().map(|(n, _, _, _)| (*n).to_string()).collect(),
        rows,
        labels,
    }
}
