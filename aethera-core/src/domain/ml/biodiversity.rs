// aethera-core/src/domain/ml/biodiversity.rs
//
// Biodiversity sensitivity ensemble. Higher = more sensitive habitat.

use crate::domain::feature_vector::FeatureSchema;
use crate::domain::ml::ensemble::{CategoryBins, EnsembleSpec, LearnerPlan};
use crate::domain::ml::learner::TrainingSet;
use crate::domain::ml::synthetic::uniform_rows;

pub const NAME: &str = "biodiversity";
pub const VERSION: &str = "0.4.0";
pub const SCHEMA_VERSION: &str = "bio-v1";

/// Feature order is the schema contract; ranges feed the synthetic sampler.
const FEATURES: &[(&str, f64, f64, f64)] = &[
    // (name, default, sample_min, sample_max)
    ("protected_overlap_pct", 0.0, 0.0, 40.0),
    ("natural_ratio", 0.0, 0.0, 1.0),
    ("forest_ratio", 0.0, 0.0, 1.0),
    ("wetland_ratio", 0.0, 0.0, 0.4),
    ("shannon_diversity", 0.0, 0.0, 2.0),
    ("habitat_fragmentation_index", 0.5, 0.0, 1.0),
    ("distance_to_protected_km", 50.0, 0.0, 50.0),
    ("aoi_area_ha", 0.0, 1.0, 5000.0),
    ("green_infrastructure_ratio", 0.0, 0.0, 1.0),
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
        bins: CategoryBins::new(&["low", "moderate", "high", "very_high"], &[25.0, 50.0, 75.0]),
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

/// Sensitivity heuristic used to label synthetic rows when neither a
/// pretrained artifact nor a catalog training table exists.
pub fn label(row: &[f64]) -> f64 {
    let overlap = row[0];
    let natural = row[1];
    let forest = row[2];
    let wetland = row[3];
    let shannon = row[4];
    let fragmentation = row[5];
    let dist_protected = row[6];

    let raw = 0.30 * (overlap.min(25.0) / 25.0)
        + 0.20 * natural
        + 0.15 * forest
        + 0.10 * (wetland / 0.4)
        + 0.10 * (shannon / 2.0)
        + 0.10 * (1.0 - dist_protected / 50.0)
        + 0.05 * (1.0 - fragmentation);
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
    use crate::domain::metrics::MetricsMap;
    use crate::domain::ml::ensemble::{EnsembleModel, TrainingOrigin};

    #[test]
    fn test_labels_stay_in_score_range() {
        let t = synthetic_training(11, 128);
        assert!(t.labels.iter().all(|l| (0.0..=100.0).contains(l)));
        assert_eq!(t.feature_names, schema().names());
    }

    #[test]
    fn test_pristine_habitat_scores_higher_than_sealed_ground() {
        let pristine = label(&[20.0, 0.9, 0.7, 0.3, 1.8, 0.1, 0.5, 100.0, 0.9]);
        let sealed = label(&[0.0, 0.02, 0.0, 0.0, 0.3, 0.9, 48.0, 100.0, 0.05]);
        assert!(pristine > sealed + 30.0);
    }

    #[test]
    fn test_fitted_ensemble_tracks_the_heuristic() {
        let model = EnsembleModel::fit(
            &spec(),
            &synthetic_training(11, 256),
            TrainingOrigin::Synthetic {
                seed: 11,
                samples: 256,
            },
        )
        .unwrap();

        let mut metrics = MetricsMap::new();
        metrics.insert("protected_overlap_pct", 18.0);
        metrics.insert("natural_ratio", 0.8);
        metrics.insert("forest_ratio", 0.6);
        metrics.insert("wetland_ratio", 0.2);
        metrics.insert("shannon_diversity", 1.5);
        metrics.insert("habitat_fragmentation_index", 0.2);
        metrics.insert("distance_to_protected_km", 1.0);
        metrics.insert("aoi_area_ha", 500.0);
        metrics.insert("green_infrastructure_ratio", 0.8);
        let high = model.predict(&schema().build_vector(&metrics)).unwrap();

        let low = model
            .predict(&schema().build_vector(&MetricsMap::new()))
            .unwrap();

        assert!(high.score > low.score);
        assert_eq!(model.members.len(), 3);
    }
}
