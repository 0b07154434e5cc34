// aethera-core/src/domain/ml/cim.rs
//
// Cumulative Impact Model. Consumes the three upstream scores and is
// evaluated last. The member roster is structurally monotone
// (non-decreasing) in biodiversity, hazard and protected overlap: ridge
// coefficients on those features are clamped at zero and the stump
// committee rejects decreasing splits on them.

use crate::domain::feature_vector::FeatureSchema;
use crate::domain::ml::ensemble::{CategoryBins, EnsembleSpec, LearnerPlan};
use crate::domain::ml::learner::TrainingSet;
use crate::domain::ml::synthetic::{sigmoid, uniform_rows};

pub const NAME: &str = "cim";
pub const VERSION: &str = "0.4.0";
pub const SCHEMA_VERSION: &str = "cim-v1";

/// Upstream score inputs with a guaranteed non-decreasing response.
pub const MONOTONE_FEATURES: &[&str] =
    &["biodiversity_score", "ahsm_score", "protected_overlap_pct"];

const FEATURES: &[(&str, f64, f64, f64)] = &[
    ("biodiversity_score", 0.0, 0.0, 100.0),
    ("resm_score", 0.0, 0.0, 100.0),
    ("ahsm_score", 0.0, 0.0, 100.0),
    ("protected_overlap_pct", 0.0, 0.0, 40.0),
    ("net_tco2e_per_year", 0.0, -50_000.0, 10_000.0),
    ("human_pressure_index", 30.0, 0.0, 100.0),
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
        bins: CategoryBins::new(&["low", "moderate", "high", "very_high"], &[25.0, 50.0, 75.0]),
        members: vec![
            LearnerPlan::Ridge {
                lambda: 1.0,
                non_negative: MONOTONE_FEATURES.to_vec(),
            },
            LearnerPlan::Stumps {
                rounds: 60,
                learning_rate: 0.25,
                monotone: MONOTONE_FEATURES.to_vec(),
            },
        ],
    }
}

/// Cumulative-impact heuristic, monotone in the constrained inputs.
pub fn label(row: &[f64]) -> f64 {
    let bio = row[0];
    let resm = row[1];
    let ahsm = row[2];
    let overlap = row[3];
    let net = row[4];
    let pressure = row[5];

    let raw = 0.35 * (bio / 100.0)
        + 0.30 * (ahsm / 100.0)
        + 0.12 * (overlap.min(25.0) / 25.0)
        + 0.08 * (pressure / 100.0)
        + 0.08 * sigmoid(net / 5000.0)
        + 0.07 * (resm / 100.0);
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

    fn fitted() -> EnsembleModel {
        EnsembleModel::fit(
            &spec(),
            &synthetic_training(47, 256),
            TrainingOrigin::Synthetic {
                seed: 47,
                samples: 256,
            },
        )
        .unwrap()
    }

    fn vector(model: &EnsembleModel, ahsm_score: f64) -> crate::domain::feature_vector::FeatureVector {
        let mut metrics = MetricsMap::new();
        metrics.insert("biodiversity_score", 55.0);
        metrics.insert("resm_score", 62.0);
        metrics.insert("ahsm_score", ahsm_score);
        metrics.insert("protected_overlap_pct", 3.0);
        metrics.insert("net_tco2e_per_year", -1200.0);
        metrics.insert("human_pressure_index", 40.0);
        metrics.insert("aoi_area_ha", 350.0);
        model.schema.build_vector(&metrics)
    }

    /// Holding everything else fixed, raising the hazard input must never
    /// lower the cumulative impact score.
    #[test]
    fn test_cim_monotone_in_hazard_score() {
        let model = fitted();
        let mut prev = f64::NEG_INFINITY;
        for step in 0..=20 {
            let ahsm_score = 5.0 * step as f64;
            let p = model.predict(&vector(&model, ahsm_score)).unwrap();
            assert!(
                p.score >= prev - 1e-9,
                "score dropped from {prev} to {} at ahsm={ahsm_score}",
                p.score
            );
            prev = p.score;
        }
    }

    #[test]
    fn test_cim_roster_is_two_heterogeneous_members() {
        let model = fitted();
        let names: Vec<_> = model.members.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["ridge", "stump_committee"]);
    }

    #[test]
    fn test_label_monotone_in_overlap() {
        let lo = label(&[50.0, 50.0, 50.0, 0.0, 0.0, 30.0, 100.0]);
        let hi = label(&[50.0, 50.0, 50.0, 20.0, 0.0, 30.0, 100.0]);
        assert!(hi > lo);
    }
}
