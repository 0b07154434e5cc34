// aethera-core/src/domain/metrics.rs
//
// The flat metrics namespace shared by the geospatial stages, the ML
// feature-vector builder and the legal evaluator. Keys are dotted-free
// snake_case names (e.g. `protected_overlap_pct`), values are scalars.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Round to 6 significant digits. Every float persisted in an artifact
/// goes through this, which is what makes re-runs byte-comparable.
pub fn round_sig(value: f64) -> f64 {
    if value == 0.0 || !value.is_finite() {
        return value;
    }
    let magnitude = value.abs().log10().floor();
    let factor = 10f64.powf(5.0 - magnitude);
    (value * factor).round() / factor
}

/// Flat, ordered scalar namespace. BTreeMap keeps serialization canonical.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetricsMap(BTreeMap<String, f64>);

impl MetricsMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a metric, rounded to 6 significant digits.
    pub fn insert(&mut self, key: impl Into<String>, value: f64) {
        self.0.insert(key.into(), round_sig(value));
    }

    /// Insert only when the value is present. Absent receptors (beyond the
    /// distance cap) simply do not appear in the namespace.
    pub fn insert_opt(&mut self, key: impl Into<String>, value: Option<f64>) {
        if let Some(v) = value {
            self.insert(key, v);
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn merge(&mut self, other: &MetricsMap) {
        for (k, v) in &other.0 {
            self.0.insert(k.clone(), *v);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.0.iter()
    }

    /// Expose the namespace as a JSON object (template rendering context).
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.0).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_round_sig_six_digits() {
        assert_eq!(round_sig(1234.56789), 1234.57);
        assert_eq!(round_sig(0.000123456789), 0.000123457);
        assert_eq!(round_sig(-98765.4321), -98765.4);
        assert_eq!(round_sig(0.0), 0.0);
    }

    #[test]
    fn test_insert_rounds() {
        let mut m = MetricsMap::new();
        m.insert("aoi_area_ha", 10.123456789);
        assert_eq!(m.get("aoi_area_ha"), Some(10.1235));
    }

    #[test]
    fn test_insert_opt_skips_none() {
        let mut m = MetricsMap::new();
        m.insert_opt("distance_to_water_km", None);
        assert!(!m.contains("distance_to_water_km"));
        m.insert_opt("distance_to_water_km", Some(2.0));
        assert_eq!(m.get("distance_to_water_km"), Some(2.0));
    }

    #[test]
    fn test_merge_overwrites() {
        let mut a = MetricsMap::new();
        a.insert("x", 1.0);
        let mut b = MetricsMap::new();
        b.insert("x", 2.0);
        b.insert("y", 3.0);
        a.merge(&b);
        assert_eq!(a.get("x"), Some(2.0));
        assert_eq!(a.get("y"), Some(3.0));
    }
}
