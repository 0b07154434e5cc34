// aethera-core/src/domain/ml/learner.rs
//
// The three learner families the ensembles combine. Everything is
// deterministic: closed-form ridge, distance-weighted k-NN, and a greedy
// additive stump committee with an optional per-feature monotone
// (non-decreasing) constraint.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A labeled training table in schema feature order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingSet {
    pub feature_names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
    pub labels: Vec<f64>,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn feature_count(&self) -> usize {
        self.feature_names.len()
    }

    /// Stable hexadecimal fingerprint of the canonical training payload.
    pub fn fingerprint(&self) -> String {
        let payload = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(payload))
    }

    pub fn feature_means(&self) -> Vec<f64> {
        let k = self.feature_count();
        let n = self.len().max(1) as f64;
        let mut means = vec![0.0; k];
        for row in &self.rows {
            for (j, v) in row.iter().enumerate() {
                means[j] += v;
            }
        }
        means.iter_mut().for_each(|m| *m /= n);
        means
    }

    pub fn feature_stds(&self) -> Vec<f64> {
        let means = self.feature_means();
        let k = self.feature_count();
        let n = self.len().max(1) as f64;
        let mut vars = vec![0.0; k];
        for row in &self.rows {
            for (j, v) in row.iter().enumerate() {
                let d = v - means[j];
                vars[j] += d * d;
            }
        }
        vars.iter().map(|v| (v / n).sqrt()).collect()
    }

    pub fn label_mean(&self) -> f64 {
        if self.labels.is_empty() {
            return 0.0;
        }
        self.labels.iter().sum::<f64>() / self.labels.len() as f64
    }
}

// --- RIDGE ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RidgeModel {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    pub lambda: f64,
}

impl RidgeModel {
    /// Closed-form fit on centered data; the intercept is not penalized.
    /// `lower_bounds` clamps chosen coefficients after the solve (used to
    /// make the model structurally monotone in selected features).
    pub fn fit(training: &TrainingSet, lambda: f64, lower_bounds: &[Option<f64>]) -> Self {
        let n = training.len();
        let k = training.feature_count();
        if n == 0 || k == 0 {
            return Self {
                intercept: training.label_mean(),
                coefficients: vec![0.0; k],
                lambda,
            };
        }

        let means = training.feature_means();
        let label_mean = training.label_mean();

        let x = DMatrix::from_fn(n, k, |i, j| training.rows[i][j] - means[j]);
        let y = DVector::from_fn(n, |i, _| training.labels[i] - label_mean);

        let xtx = x.transpose() * &x + DMatrix::identity(k, k) * lambda;
        let xty = x.transpose() * y;
        let mut coefficients: Vec<f64> = xtx
            .lu()
            .solve(&xty)
            .map(|c| c.iter().copied().collect())
            .unwrap_or_else(|| vec![0.0; k]);

        for (j, bound) in lower_bounds.iter().enumerate().take(k) {
            if let Some(min) = bound {
                if coefficients[j] < *min {
                    coefficients[j] = *min;
                }
            }
        }

        let intercept =
            label_mean - coefficients.iter().zip(&means).map(|(c, m)| c * m).sum::<f64>();

        Self {
            intercept,
            coefficients,
            lambda,
        }
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(x)
                .map(|(c, v)| c * v)
                .sum::<f64>()
    }
}

// --- K-NEAREST NEIGHBOURS ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KnnModel {
    pub k: usize,
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
    pub rows: Vec<Vec<f64>>,
    pub labels: Vec<f64>,
    /// Pearson correlation of each feature with the label, the importance
    /// surrogate for this family.
    pub correlations: Vec<f64>,
}

impl KnnModel {
    pub fn fit(training: &TrainingSet, k: usize) -> Self {
        let means = training.feature_means();
        let stds = training.feature_stds();
        let rows: Vec<Vec<f64>> = training
            .rows
            .iter()
            .map(|row| standardize(row, &means, &stds))
            .collect();

        let correlations = feature_label_correlations(training, &means, &stds);

        Self {
            k: k.max(1),
            means,
            stds,
            rows,
            labels: training.labels.clone(),
            correlations,
        }
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        if self.rows.is_empty() {
            return 0.0;
        }
        let q = standardize(x, &self.means, &self.stds);
        let mut neighbours: Vec<(f64, usize)> = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let d = row
                    .iter()
                    .zip(&q)
                    .map(|(a, b)| (a - b) * (a - b))
                    .sum::<f64>()
                    .sqrt();
                (d, i)
            })
            .collect();
        // Deterministic: distance first, insertion index breaks ties.
        neighbours.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let mut weight_sum = 0.0;
        let mut value_sum = 0.0;
        for (d, i) in neighbours.into_iter().take(self.k) {
            let w = 1.0 / (d + 1e-6);
            weight_sum += w;
            value_sum += w * self.labels[i];
        }
        value_sum / weight_sum
    }
}

// --- STUMP COMMITTEE ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Stump {
    pub feature: usize,
    pub threshold: f64,
    /// Contribution when x[feature] <= threshold (learning rate applied).
    pub left: f64,
    /// Contribution when x[feature] > threshold.
    pub right: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StumpCommittee {
    pub base: f64,
    pub stumps: Vec<Stump>,
    pub learning_rate: f64,
    /// Features constrained to a non-decreasing response.
    pub monotone: Vec<bool>,
}

impl StumpCommittee {
    /// Greedy residual boosting. On monotone features, candidate splits
    /// whose right mean falls below the left mean are discarded, so the
    /// fitted committee is non-decreasing in those features by construction.
    pub fn fit(
        training: &TrainingSet,
        rounds: usize,
        learning_rate: f64,
        monotone: &[bool],
    ) -> Self {
        let n = training.len();
        let k = training.feature_count();
        let base = training.label_mean();
        let mut committee = Self {
            base,
            stumps: Vec::new(),
            learning_rate,
            monotone: monotone.to_vec(),
        };
        if n == 0 || k == 0 {
            return committee;
        }

        let mut residuals: Vec<f64> = training.labels.iter().map(|y| y - base).collect();

        for _ in 0..rounds {
            let mut best: Option<(f64, Stump)> = None;

            for feature in 0..k {
                let is_monotone = monotone.get(feature).copied().unwrap_or(false);
                for threshold in candidate_thresholds(training, feature) {
                    let (mut left_sum, mut left_n, mut right_sum, mut right_n) =
                        (0.0, 0usize, 0.0, 0usize);
                    for (row, r) in training.rows.iter().zip(&residuals) {
                        if row[feature] <= threshold {
                            left_sum += r;
                            left_n += 1;
                        } else {
                            right_sum += r;
                            right_n += 1;
                        }
                    }
                    if left_n == 0 || right_n == 0 {
                        continue;
                    }
                    let left_mean = left_sum / left_n as f64;
                    let right_mean = right_sum / right_n as f64;
                    if is_monotone && right_mean < left_mean {
                        continue;
                    }

                    let sse: f64 = training
                        .rows
                        .iter()
                        .zip(&residuals)
                        .map(|(row, r)| {
                            let pred = if row[feature] <= threshold {
                                left_mean
                            } else {
                                right_mean
                            };
                            (r - pred) * (r - pred)
                        })
                        .sum();

                    let better = match &best {
                        Some((best_sse, _)) => sse < *best_sse - 1e-12,
                        None => true,
                    };
                    if better {
                        best = Some((
                            sse,
                            Stump {
                                feature,
                                threshold,
                                left: learning_rate * left_mean,
                                right: learning_rate * right_mean,
                            },
                        ));
                    }
                }
            }

            let Some((_, stump)) = best else { break };
            for (row, r) in training.rows.iter().zip(residuals.iter_mut()) {
                *r -= if row[stump.feature] <= stump.threshold {
                    stump.left
                } else {
                    stump.right
                };
            }
            committee.stumps.push(stump);
        }

        committee
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        self.base
            + self
                .stumps
                .iter()
                .map(|s| {
                    if x.get(s.feature).copied().unwrap_or(0.0) <= s.threshold {
                        s.left
                    } else {
                        s.right
                    }
                })
                .sum::<f64>()
    }

    fn importances(&self, feature_count: usize) -> Vec<f64> {
        let mut out = vec![0.0; feature_count];
        for s in &self.stumps {
            if s.feature < feature_count {
                out[s.feature] += s.right - s.left;
            }
        }
        out
    }
}

/// Up to 15 quantile midpoints per feature.
fn candidate_thresholds(training: &TrainingSet, feature: usize) -> Vec<f64> {
    let mut values: Vec<f64> = training.rows.iter().map(|r| r[feature]).collect();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    values.dedup();
    if values.len() < 2 {
        return Vec::new();
    }
    let steps = 15.min(values.len() - 1);
    (1..=steps)
        .map(|i| {
            let idx = i * (values.len() - 1) / (steps + 1);
            (values[idx] + values[idx + 1]) / 2.0
        })
        .collect()
}

fn standardize(row: &[f64], means: &[f64], stds: &[f64]) -> Vec<f64> {
    row.iter()
        .enumerate()
        .map(|(j, v)| {
            let s = stds.get(j).copied().unwrap_or(0.0);
            if s > 1e-12 {
                (v - means[j]) / s
            } else {
                0.0
            }
        })
        .collect()
}

fn feature_label_correlations(training: &TrainingSet, means: &[f64], stds: &[f64]) -> Vec<f64> {
    let n = training.len() as f64;
    if n < 2.0 {
        return vec![0.0; training.feature_count()];
    }
    let label_mean = training.label_mean();
    let label_std = (training
        .labels
        .iter()
        .map(|y| (y - label_mean) * (y - label_mean))
        .sum::<f64>()
        / n)
        .sqrt();
    (0..training.feature_count())
        .map(|j| {
            if stds[j] <= 1e-12 || label_std <= 1e-12 {
                return 0.0;
            }
            let cov = training
                .rows
                .iter()
                .zip(&training.labels)
                .map(|(row, y)| (row[j] - means[j]) * (y - label_mean))
                .sum::<f64>()
                / n;
            cov / (stds[j] * label_std)
        })
        .collect()
}

// --- THE FAMILY ENUM ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum Learner {
    Ridge(RidgeModel),
    Knn(KnnModel),
    Stumps(StumpCommittee),
}

impl Learner {
    pub fn name(&self) -> &'static str {
        match self {
            Learner::Ridge(_) => "ridge",
            Learner::Knn(_) => "knn",
            Learner::Stumps(_) => "stump_committee",
        }
    }

    pub fn predict(&self, x: &[f64]) -> f64 {
        match self {
            Learner::Ridge(m) => m.predict(x),
            Learner::Knn(m) => m.predict(x),
            Learner::Stumps(m) => m.predict(x),
        }
    }

    /// Signed per-feature importance surrogate (positive = pushes up).
    pub fn importances(&self, feature_count: usize) -> Vec<f64> {
        match self {
            Learner::Ridge(m) => {
                let mut c = m.coefficients.clone();
                c.resize(feature_count, 0.0);
                c
            }
            Learner::Knn(m) => {
                let mut c = m.correlations.clone();
                c.resize(feature_count, 0.0);
                c
            }
            Learner::Stumps(m) => m.importances(feature_count),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// y = 2*x0 + 10, x1 is noise-free irrelevant.
    fn linear_training() -> TrainingSet {
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|i| vec![i as f64, ((i * 7) % 11) as f64])
            .collect();
        let labels = rows.iter().map(|r| 2.0 * r[0] + 10.0).collect();
        TrainingSet {
            feature_names: vec!["x0".into(), "x1".into()],
            rows,
            labels,
        }
    }

    #[test]
    fn test_ridge_recovers_linear_signal() {
        let model = RidgeModel::fit(&linear_training(), 1e-6, &[None, None]);
        assert!((model.coefficients[0] - 2.0).abs() < 1e-3);
        assert!(model.coefficients[1].abs() < 1e-3);
        assert!((model.predict(&[5.0, 3.0]) - 20.0).abs() < 0.05);
    }

    #[test]
    fn test_ridge_lower_bound_clamps() {
        // y decreases in x0; a zero lower bound must clamp the coefficient.
        let rows: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64]).collect();
        let labels = rows.iter().map(|r| 100.0 - 3.0 * r[0]).collect();
        let training = TrainingSet {
            feature_names: vec!["x0".into()],
            rows,
            labels,
        };
        let model = RidgeModel::fit(&training, 1e-6, &[Some(0.0)]);
        assert!(model.coefficients[0] >= 0.0);
    }

    #[test]
    fn test_knn_interpolates_locally() {
        let model = KnnModel::fit(&linear_training(), 3);
        let pred = model.predict(&[10.0, 0.0]);
        assert!((pred - 30.0).abs() < 3.0);
        // correlation importance keeps the causal feature dominant
        assert!(model.correlations[0] > 0.9);
        assert!(model.correlations[0].abs() > model.correlations[1].abs());
    }

    #[test]
    fn test_stumps_reduce_error_monotonically() {
        let training = linear_training();
        let short = StumpCommittee::fit(&training, 2, 0.5, &[false, false]);
        let long = StumpCommittee::fit(&training, 30, 0.5, &[false, false]);
        let sse = |m: &StumpCommittee| {
            training
                .rows
                .iter()
                .zip(&training.labels)
                .map(|(r, y)| (m.predict(r) - y) * (m.predict(r) - y))
                .sum::<f64>()
        };
        assert!(sse(&long) < sse(&short));
    }

    #[test]
    fn test_monotone_stumps_never_decrease() {
        // Labels strongly decreasing in x0, but x0 is constrained monotone:
        // every accepted stump must satisfy right >= left.
        let rows: Vec<Vec<f64>> = (0..30).map(|i| vec![i as f64, (i % 5) as f64]).collect();
        let labels = rows.iter().map(|r| 90.0 - 2.5 * r[0] + r[1]).collect();
        let training = TrainingSet {
            feature_names: vec!["x0".into(), "x1".into()],
            rows,
            labels,
        };
        let model = StumpCommittee::fit(&training, 25, 0.4, &[true, false]);
        for s in model.stumps.iter().filter(|s| s.feature == 0) {
            assert!(s.right >= s.left);
        }
        // and the prediction is non-decreasing when sweeping x0
        let mut prev = f64::NEG_INFINITY;
        for i in 0..30 {
            let p = model.predict(&[i as f64, 2.0]);
            assert!(p >= prev - 1e-9);
            prev = p;
        }
    }

    #[test]
    fn test_fingerprint_is_stable_and_input_sensitive() {
        let a = linear_training();
        let mut b = linear_training();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.labels[0] += 1.0;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
