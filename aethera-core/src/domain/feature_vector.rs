// aethera-core/src/domain/feature_vector.rs
//
// Versioned, ordered feature-vector schemas. Vectors are built by explicit
// key lookup against the flat metrics namespace: missing keys take the
// declared default and are tracked, unknown keys never enter a vector.

use crate::domain::error::DomainError;
use crate::domain::metrics::MetricsMap;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One named scalar of a schema with its fallback value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureSpec {
    pub name: String,
    pub default: f64,
}

/// Ordered, versioned list of features an ensemble consumes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureSchema {
    pub version: String,
    pub entries: Vec<FeatureSpec>,
}

impl FeatureSchema {
    pub fn new(version: impl Into<String>, entries: &[(&str, f64)]) -> Self {
        Self {
            version: version.into(),
            entries: entries
                .iter()
                .map(|(name, default)| FeatureSpec {
                    name: (*name).to_string(),
                    default: *default,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Fail-closed compatibility check against a pretrained artifact.
    pub fn ensure_matches(
        &self,
        ensemble: &str,
        artifact_schema: &FeatureSchema,
    ) -> Result<(), DomainError> {
        if self.version != artifact_schema.version
            || self.names() != artifact_schema.names()
        {
            return Err(DomainError::ModelSchemaMismatch {
                ensemble: ensemble.to_string(),
                expected: self.version.clone(),
                found: artifact_schema.version.clone(),
            });
        }
        Ok(())
    }

    /// Build a vector from the metrics namespace. Missing keys take the
    /// declared default and are reported so the model_run record can flag
    /// them.
    pub fn build_vector(&self, metrics: &MetricsMap) -> FeatureVector {
        let mut values = IndexMap::with_capacity(self.entries.len());
        let mut defaulted = Vec::new();
        for spec in &self.entries {
            match metrics.get(&spec.name) {
                Some(v) => {
                    values.insert(spec.name.clone(), v);
                }
                None => {
                    values.insert(spec.name.clone(), spec.default);
                    defaulted.push(spec.name.clone());
                }
            }
        }
        FeatureVector {
            schema_version: self.version.clone(),
            values,
            defaulted,
        }
    }
}

/// A concrete, ordered vector instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureVector {
    pub schema_version: String,
    pub values: IndexMap<String, f64>,
    /// Names that fell back to their schema default.
    pub defaulted: Vec<String>,
}

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Override one component (CIM receives upstream scores this way).
    pub fn set(&mut self, name: &str, value: f64) {
        if let Some(slot) = self.values.get_mut(name) {
            *slot = value;
            self.defaulted.retain(|d| d != name);
        }
    }

    /// Dense view in schema order.
    pub fn dense(&self) -> Vec<f64> {
        self.values.values().copied().collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.values.keys().map(|k| k.as_str()).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn schema() -> FeatureSchema {
        FeatureSchema::new(
            "v1",
            &[("aoi_area_ha", 0.0), ("protected_overlap_pct", 0.0), ("forest_ratio", 0.2)],
        )
    }

    #[test]
    fn test_build_vector_order_and_defaults() {
        let mut metrics = MetricsMap::new();
        metrics.insert("protected_overlap_pct", 4.5);
        metrics.insert("unknown_key", 9.0);

        let v = schema().build_vector(&metrics);
        assert_eq!(
            v.names(),
            vec!["aoi_area_ha", "protected_overlap_pct", "forest_ratio"]
        );
        assert_eq!(v.dense(), vec![0.0, 4.5, 0.2]);
        assert_eq!(v.defaulted, vec!["aoi_area_ha", "forest_ratio"]);
        // unknown keys never enter the vector
        assert!(v.get("unknown_key").is_none());
    }

    #[test]
    fn test_schema_mismatch_fails_closed() {
        let artifact = FeatureSchema::new("v2", &[("aoi_area_ha", 0.0)]);
        let err = schema().ensure_matches("resm", &artifact).unwrap_err();
        assert!(matches!(err, DomainError::ModelSchemaMismatch { .. }));
    }

    #[test]
    fn test_schema_match_same_names_same_version() {
        let other = schema();
        assert!(schema().ensure_matches("resm", &other).is_ok());
    }

    #[test]
    fn test_set_clears_defaulted_flag() {
        let metrics = MetricsMap::new();
        let mut v = schema().build_vector(&metrics);
        assert!(v.defaulted.contains(&"forest_ratio".to_string()));
        v.set("forest_ratio", 0.5);
        assert_eq!(v.get("forest_ratio"), Some(0.5));
        assert!(!v.defaulted.contains(&"forest_ratio".to_string()));
    }
}
