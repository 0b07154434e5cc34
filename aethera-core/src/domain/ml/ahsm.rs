// aethera-core/src/domain/ml/ahsm.rs
//
// Abiotic Hazard Susceptibility Model. Higher = more exposed terrain.

use crate::domain::feature_vector::FeatureSchema;
use crate::domain::ml::ensemble::{CategoryBins, EnsembleSpec, LearnerPlan};
use crate::domain::ml::learner::TrainingSet;
use crate::domain::ml::synthetic::uniform_rows;

pub const NAME: &str = "ahsm";
pub const VERSION: &str = "0.4.0";
pub const SCHEMA_VERSION: &str = "ahsm-v1";

const FEATURES: &[(&str, f64, f64, f64)] = &[
    ("soil_erosion_risk_index", 30.0, 0.0, 100.0),
    ("water_presence_ratio", 0.0, 0.0, 0.5),
    ("distance_to_water_km", 50.0, 0.0, 50.0),
    ("wetland_ratio", 0.0, 0.0, 0.4),
    ("human_pressure_index", 30.0, 0.0, 100.0),
    ("edge_density_km_per_km2", 0.0, 0.0, 20.0),
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

/// Exposure heuristic: erodible soil near water under human pressure.
pub fn label(row: &[f64]) -> f64 {
    let erosion = row[0];
    let water_presence = row[1];
    let dist_water = row[2];
    let wetland = row[3];
    let pressure = row[4];
    let edge = row[5];

    let raw = 0.30 * (erosion / 100.0)
        + 0.20 * (1.0 - dist_water / 50.0)
        + 0.15 * (wetland / 0.4)
        + 0.20 * (pressure / 100.0)
        + 0.10 * (water_presence / 0.5)
        + 0.05 * (edge / 20.0);
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

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_floodplain_more_exposed_than_dry_plateau() {
        let floodplain = label(&[75.0, 0.4, 0.2, 0.35, 60.0, 12.0, 200.0]);
        let plateau = label(&[10.0, 0.0, 45.0, 0.0, 10.0, 1.0, 200.0]);
        assert!(floodplain > plateau + 30.0);
    }

    #[test]
    fn test_schema_count_matches_feature_table() {
        assert_eq!(schema().len(), FEATURES.len());
    }

    #[test]
    fn test_synthetic_labels_bounded() {
        let t = synthetic_training(31, 128);
        assert!(t.labels.iter().all(|l| (0.0..=100.0).contains(l)));
    }
}
