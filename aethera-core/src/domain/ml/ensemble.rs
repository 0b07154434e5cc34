// aethera-core/src/domain/ml/ensemble.rs
//
// The shared ensemble contract: >= 2 heterogeneous members, simple score
// averaging, declared category bins, heuristic drivers, and a model_run
// provenance record that travels into the manifest.

use crate::domain::error::DomainError;
use crate::domain::feature_vector::{FeatureSchema, FeatureVector};
use crate::domain::metrics::round_sig;
use crate::domain::ml::learner::{
    KnnModel, Learner, RidgeModel, StumpCommittee, TrainingSet,
};
use serde::{Deserialize, Serialize};

pub const MAX_DRIVERS: usize = 5;

/// Declared score bins, e.g. {20,40,60,80} over five labels.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CategoryBins {
    pub labels: Vec<String>,
    pub thresholds: Vec<f64>,
}

impl CategoryBins {
    pub fn new(labels: &[&str], thresholds: &[f64]) -> Self {
        debug_assert_eq!(labels.len(), thresholds.len() + 1);
        Self {
            labels: labels.iter().map(|s| s.to_string()).collect(),
            thresholds: thresholds.to_vec(),
        }
    }

    pub fn categorize(&self, score: f64) -> &str {
        let mut idx = 0;
        for (i, t) in self.thresholds.iter().enumerate() {
            if score >= *t {
                idx = i + 1;
            }
        }
        &self.labels[idx]
    }
}

/// How an ensemble obtained its members.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrainingOrigin {
    Pretrained { artifact: String },
    CatalogDataset { path: String },
    Synthetic { seed: u64, samples: usize },
}

impl TrainingOrigin {
    pub fn label(&self) -> &'static str {
        match self {
            TrainingOrigin::Pretrained { .. } => "pretrained",
            TrainingOrigin::CatalogDataset { .. } => "catalog_dataset",
            TrainingOrigin::Synthetic { .. } => "synthetic",
        }
    }
}

/// Member roster declaration, resolved against the schema at fit time.
#[derive(Debug, Clone, PartialEq)]
pub enum LearnerPlan {
    Ridge {
        lambda: f64,
        /// Features whose coefficient is clamped to >= 0.
        non_negative: Vec<&'static str>,
    },
    Knn {
        k: usize,
    },
    Stumps {
        rounds: usize,
        learning_rate: f64,
        /// Features constrained to a non-decreasing response.
        monotone: Vec<&'static str>,
    },
}

/// Static description of one ensemble (schema + bins + member roster).
#[derive(Debug, Clone)]
pub struct EnsembleSpec {
    pub name: &'static str,
    pub version: &'static str,
    pub schema: FeatureSchema,
    pub bins: CategoryBins,
    pub members: Vec<LearnerPlan>,
}

/// Provenance block recorded with every prediction and in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelRun {
    pub name: String,
    pub version: String,
    pub schema_version: String,
    pub feature_count: usize,
    pub members: Vec<String>,
    pub training_data_fingerprint: Option<String>,
    pub thresholds: Vec<f64>,
    pub origin: String,
    #[serde(default)]
    pub defaulted_features: Vec<String>,
}

/// The shared prediction contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    pub score: f64,
    pub category: String,
    pub confidence: f64,
    /// (feature, contribution), positive pushes the score up. Max 5.
    pub drivers: Vec<(String, f64)>,
    pub model_run: ModelRun,
}

/// A fitted (or rehydrated) ensemble. Read-only after load; safe to share.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnsembleModel {
    pub name: String,
    pub version: String,
    pub schema: FeatureSchema,
    pub bins: CategoryBins,
    pub members: Vec<Learner>,
    pub feature_means: Vec<f64>,
    pub training_data_fingerprint: String,
    pub origin: TrainingOrigin,
}

impl EnsembleModel {
    /// Fit every member of the roster on the training table.
    pub fn fit(
        spec: &EnsembleSpec,
        training: &TrainingSet,
        origin: TrainingOrigin,
    ) -> Result<Self, DomainError> {
        if training.feature_names != spec.schema.names() {
            return Err(DomainError::ModelSchemaMismatch {
                ensemble: spec.name.to_string(),
                expected: spec.schema.version.clone(),
                found: format!("training columns {:?}", training.feature_names),
            });
        }
        if training.len() < 8 {
            return Err(DomainError::MetricError(format!(
                "training set for '{}' too small ({} rows)",
                spec.name,
                training.len()
            )));
        }

        let k = spec.schema.len();
        let members = spec
            .members
            .iter()
            .map(|plan| match plan {
                LearnerPlan::Ridge {
                    lambda,
                    non_negative,
                } => {
                    let bounds: Vec<Option<f64>> = spec
                        .schema
                        .entries
                        .iter()
                        .map(|e| non_negative.iter().any(|m| *m == e.name).then_some(0.0))
                        .collect();
                    Learner::Ridge(RidgeModel::fit(training, *lambda, &bounds))
                }
                LearnerPlan::Knn { k } => Learner::Knn(KnnModel::fit(training, *k)),
                LearnerPlan::Stumps {
                    rounds,
                    learning_rate,
                    monotone,
                } => {
                    let flags: Vec<bool> = spec
                        .schema
                        .entries
                        .iter()
                        .map(|e| monotone.iter().any(|m| *m == e.name))
                        .collect();
                    Learner::Stumps(StumpCommittee::fit(
                        training,
                        *rounds,
                        *learning_rate,
                        &flags,
                    ))
                }
            })
            .collect::<Vec<_>>();

        debug_assert!(members.len() >= 2, "ensembles combine >= 2 learners");
        let mut means = training.feature_means();
        means.resize(k, 0.0);

        Ok(Self {
            name: spec.name.to_string(),
            version: spec.version.to_string(),
            schema: spec.schema.clone(),
            bins: spec.bins.clone(),
            members,
            feature_means: means,
            training_data_fingerprint: training.fingerprint(),
            origin,
        })
    }

    pub fn model_run(&self, defaulted_features: &[String]) -> ModelRun {
        ModelRun {
            name: self.name.clone(),
            version: self.version.clone(),
            schema_version: self.schema.version.clone(),
            feature_count: self.schema.len(),
            members: self.members.iter().map(|m| m.name().to_string()).collect(),
            training_data_fingerprint: Some(self.training_data_fingerprint.clone()),
            thresholds: self.bins.thresholds.clone(),
            origin: self.origin.label().to_string(),
            defaulted_features: defaulted_features.to_vec(),
        }
    }

    /// Member-averaged prediction with heuristic drivers.
    pub fn predict(&self, vector: &FeatureVector) -> Result<Prediction, DomainError> {
        if vector.schema_version != self.schema.version {
            return Err(DomainError::ModelSchemaMismatch {
                ensemble: self.name.clone(),
                expected: self.schema.version.clone(),
                found: vector.schema_version.clone(),
            });
        }

        let x = vector.dense();
        let member_scores: Vec<f64> = self.members.iter().map(|m| m.predict(&x)).collect();
        let mean = member_scores.iter().sum::<f64>() / member_scores.len().max(1) as f64;
        let score = round_sig(mean.clamp(0.0, 100.0));

        let variance = member_scores
            .iter()
            .map(|s| (s - mean) * (s - mean))
            .sum::<f64>()
            / member_scores.len().max(1) as f64;
        let confidence = round_sig((1.0 / (1.0 + variance.sqrt() / 10.0)).clamp(0.0, 1.0));

        let drivers = self.drivers(&x);

        Ok(Prediction {
            score,
            category: self.bins.categorize(score).to_string(),
            confidence,
            drivers,
            model_run: self.model_run(&vector.defaulted),
        })
    }

    /// Importances averaged over members, weighted by the observation's
    /// deviation from the training mean. Positive pushes the score up.
    fn drivers(&self, x: &[f64]) -> Vec<(String, f64)> {
        let k = self.schema.len();
        let mut averaged = vec![0.0; k];
        for member in &self.members {
            for (j, imp) in member.importances(k).into_iter().enumerate() {
                averaged[j] += imp / self.members.len() as f64;
            }
        }

        let mut contributions: Vec<(String, f64)> = self
            .schema
            .names()
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let deviation = x.get(j).copied().unwrap_or(0.0) - self.feature_means[j];
                ((*name).to_string(), round_sig(averaged[j] * deviation))
            })
            .collect();
        contributions
            .sort_by(|a, b| b.1.abs().partial_cmp(&a.1.abs()).unwrap_or(std::cmp::Ordering::Equal));
        contributions.truncate(MAX_DRIVERS);
        contributions.retain(|(_, c)| *c != 0.0);
        contributions
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::metrics::MetricsMap;

    fn spec() -> EnsembleSpec {
        EnsembleSpec {
            name: "demo",
            version: "0.1",
            schema: FeatureSchema::new("demo-v1", &[("a", 0.0), ("b", 0.0)]),
            bins: CategoryBins::new(&["low", "moderate", "high", "very_high"], &[25.0, 50.0, 75.0]),
            members: vec![
                LearnerPlan::Ridge {
                    lambda: 1e-6,
                    non_negative: vec![],
                },
                LearnerPlan::Knn { k: 3 },
            ],
        }
    }

    fn training() -> TrainingSet {
        let rows: Vec<Vec<f64>> = (0..50)
            .map(|i| vec![(i % 10) as f64, (i / 10) as f64])
            .collect();
        let labels = rows.iter().map(|r| 8.0 * r[0] + 2.0 * r[1]).collect();
        TrainingSet {
            feature_names: vec!["a".into(), "b".into()],
            rows,
            labels,
        }
    }

    fn fitted() -> EnsembleModel {
        EnsembleModel::fit(
            &spec(),
            &training(),
            TrainingOrigin::Synthetic {
                seed: 7,
                samples: 50,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_bins_categorize_at_thresholds() {
        let bins = CategoryBins::new(&["very_low", "low", "moderate", "high", "very_high"], &[20.0, 40.0, 60.0, 80.0]);
        assert_eq!(bins.categorize(0.0), "very_low");
        assert_eq!(bins.categorize(19.99), "very_low");
        assert_eq!(bins.categorize(20.0), "low");
        assert_eq!(bins.categorize(79.9), "high");
        assert_eq!(bins.categorize(80.0), "very_high");
        assert_eq!(bins.categorize(100.0), "very_high");
    }

    #[test]
    fn test_predict_contract() {
        let model = fitted();
        let mut metrics = MetricsMap::new();
        metrics.insert("a", 9.0);
        metrics.insert("b", 4.0);
        let vector = model.schema.build_vector(&metrics);

        let p = model.predict(&vector).unwrap();
        assert!((0.0..=100.0).contains(&p.score));
        assert!((0.0..=1.0).contains(&p.confidence));
        assert!(p.drivers.len() <= MAX_DRIVERS);
        assert_eq!(p.model_run.feature_count, 2);
        assert_eq!(p.model_run.members, vec!["ridge", "knn"]);
        assert_eq!(p.model_run.origin, "synthetic");
        // "a" carries 4x the weight of "b": it must lead the drivers
        assert_eq!(p.drivers[0].0, "a");
        assert!(p.drivers[0].1 > 0.0);
    }

    #[test]
    fn test_predict_rejects_foreign_schema_version() {
        let model = fitted();
        let foreign = FeatureSchema::new("other-v9", &[("a", 0.0), ("b", 0.0)]);
        let vector = foreign.build_vector(&MetricsMap::new());
        assert!(matches!(
            model.predict(&vector),
            Err(DomainError::ModelSchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_fit_rejects_mismatched_training_columns() {
        let mut t = training();
        t.feature_names = vec!["a".into(), "zzz".into()];
        let err = EnsembleModel::fit(
            &spec(),
            &t,
            TrainingOrigin::Synthetic {
                seed: 1,
                samples: 50,
            },
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::ModelSchemaMismatch { .. }));
    }

    #[test]
    fn test_serde_round_trip_preserves_predictions() {
        let model = fitted();
        let json = serde_json::to_string(&model).unwrap();
        let back: EnsembleModel = serde_json::from_str(&json).unwrap();

        let mut metrics = MetricsMap::new();
        metrics.insert("a", 3.0);
        metrics.insert("b", 1.0);
        let vector = model.schema.build_vector(&metrics);
        assert_eq!(
            model.predict(&vector).unwrap().score,
            back.predict(&vector).unwrap().score
        );
    }
}
