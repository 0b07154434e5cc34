// aethera-core/src/domain/ml/synthetic.rs
//
// Seeded uniform sampling for the synthetic-training fallback. The labeling
// heuristics live with their ensembles; this module only draws the rows.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Draw `samples` rows, one uniform value per declared feature range.
pub fn uniform_rows(ranges: &[(f64, f64)], samples: usize, seed: u64) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..samples)
        .map(|_| {
            ranges
                .iter()
                .map(|(lo, hi)| {
                    if hi > lo {
                        rng.gen_range(*lo..*hi)
                    } else {
                        *lo
                    }
                })
                .collect()
        })
        .collect()
}

/// Logistic squashing used by a couple of labeling heuristics.
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_rows_deterministic_per_seed() {
        let ranges = [(0.0, 1.0), (10.0, 20.0)];
        let a = uniform_rows(&ranges, 16, 42);
        let b = uniform_rows(&ranges, 16, 42);
        let c = uniform_rows(&ranges, 16, 43);
        assert_eq!(a, b);
        assert_ne!(a, c);
        for row in &a {
            assert!((0.0..1.0).contains(&row[0]));
            assert!((10.0..20.0).contains(&row[1]));
        }
    }

    #[test]
    fn test_sigmoid_bounds() {
        assert!(sigmoid(-50.0) < 1e-9);
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(50.0) > 1.0 - 1e-9);
    }
}
