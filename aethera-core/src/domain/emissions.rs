// aethera-core/src/domain/emissions.rs
//
// Carbon accounting over the land-cover summary and the project descriptor.
// Factors come from a YAML catalog; everything here is deterministic math.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Factor catalog loaded from `emission_factors.yaml`.
///
/// `baseline_tco2e_per_ha_year` is keyed by land-cover class name;
/// `project_types` carries per-MW construction/operation/avoided factors.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EmissionFactorCatalog {
    #[serde(default)]
    pub baseline_tco2e_per_ha_year: BTreeMap<String, f64>,
    #[serde(default)]
    pub project_types: BTreeMap<String, ProjectTypeFactors>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProjectTypeFactors {
    /// One-off construction emissions, tCO₂e per MW installed.
    pub construction_tco2e_per_mw: f64,
    /// Recurring operational emissions, tCO₂e per MW per year.
    pub operation_tco2e_per_mw_year: f64,
    /// Default grid displacement when the project config gives none,
    /// tCO₂e per MW per year.
    #[serde(default)]
    pub default_avoided_tco2e_per_mw_year: f64,
}

impl EmissionFactorCatalog {
    pub fn factors_for(&self, project_type: &str) -> Option<&ProjectTypeFactors> {
        self.project_types.get(project_type)
    }
}

/// Inputs to the balance. `class_areas_ha` is the land-cover clip result.
#[derive(Debug, Clone)]
pub struct EmissionInputs<'a> {
    pub class_areas_ha: &'a BTreeMap<String, f64>,
    pub project_type: &'a str,
    pub capacity_mw: f64,
    pub horizon_years: f64,
    /// Caller-provided displacement override, tCO₂e/yr.
    pub avoided_tco2e_per_year: Option<f64>,
}

/// The computed balance, persisted as `emissions_summary.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmissionBalance {
    /// Current sequestration/emission of the land as-is, tCO₂e/yr.
    pub baseline_tco2e_per_year: f64,
    /// One-off construction emissions, tCO₂e.
    pub construction_tco2e: f64,
    /// Recurring operational emissions, tCO₂e/yr.
    pub operation_tco2e_per_year: f64,
    /// Construction + operation x horizon, tCO₂e.
    pub project_total_tco2e: f64,
    /// Grid displacement credited to the project, tCO₂e/yr.
    pub avoided_tco2e_per_year: f64,
    /// operation - avoided, tCO₂e/yr. Negative means a net sink.
    pub net_tco2e_per_year: f64,
    pub horizon_years: f64,
    /// Classes present in the clip but absent from the factor catalog.
    pub unmatched_classes: Vec<String>,
}

/// Compute the balance. Classes without a factor contribute zero baseline
/// and are reported in `unmatched_classes`.
pub fn compute_balance(
    catalog: &EmissionFactorCatalog,
    inputs: &EmissionInputs<'_>,
) -> EmissionBalance {
    let mut baseline = 0.0;
    let mut unmatched = Vec::new();
    for (class, area_ha) in inputs.class_areas_ha {
        match catalog.baseline_tco2e_per_ha_year.get(class) {
            Some(factor) => baseline += factor * area_ha,
            None => unmatched.push(class.clone()),
        }
    }

    let type_factors = catalog.factors_for(inputs.project_type).cloned().unwrap_or_default();
    let construction = type_factors.construction_tco2e_per_mw * inputs.capacity_mw;
    let operation = type_factors.operation_tco2e_per_mw_year * inputs.capacity_mw;
    let avoided = inputs.avoided_tco2e_per_year.unwrap_or(
        type_factors.default_avoided_tco2e_per_mw_year * inputs.capacity_mw,
    );

    EmissionBalance {
        baseline_tco2e_per_year: baseline,
        construction_tco2e: construction,
        operation_tco2e_per_year: operation,
        project_total_tco2e: construction + operation * inputs.horizon_years,
        avoided_tco2e_per_year: avoided,
        net_tco2e_per_year: operation - avoided,
        horizon_years: inputs.horizon_years,
        unmatched_classes: unmatched,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn catalog() -> EmissionFactorCatalog {
        let yaml = r#"
baseline_tco2e_per_ha_year:
  forest: -6.2
  agricultural: 1.1
project_types:
  solar_farm:
    construction_tco2e_per_mw: 35.0
    operation_tco2e_per_mw_year: 2.5
    default_avoided_tco2e_per_mw_year: 410.0
"#;
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_balance_math() {
        let mut areas = BTreeMap::new();
        areas.insert("forest".to_string(), 10.0);
        areas.insert("agricultural".to_string(), 20.0);
        areas.insert("unknown_class".to_string(), 5.0);

        let balance = compute_balance(
            &catalog(),
            &EmissionInputs {
                class_areas_ha: &areas,
                project_type: "solar_farm",
                capacity_mw: 10.0,
                horizon_years: 25.0,
                avoided_tco2e_per_year: None,
            },
        );

        assert!((balance.baseline_tco2e_per_year - (-62.0 + 22.0)).abs() < 1e-9);
        assert!((balance.construction_tco2e - 350.0).abs() < 1e-9);
        assert!((balance.operation_tco2e_per_year - 25.0).abs() < 1e-9);
        assert!((balance.project_total_tco2e - (350.0 + 625.0)).abs() < 1e-9);
        assert!((balance.avoided_tco2e_per_year - 4100.0).abs() < 1e-9);
        assert!((balance.net_tco2e_per_year - (25.0 - 4100.0)).abs() < 1e-9);
        assert_eq!(balance.unmatched_classes, vec!["unknown_class"]);
    }

    #[test]
    fn test_explicit_avoided_overrides_default() {
        let areas = BTreeMap::new();
        let balance = compute_balance(
            &catalog(),
            &EmissionInputs {
                class_areas_ha: &areas,
                project_type: "solar_farm",
                capacity_mw: 10.0,
                horizon_years: 25.0,
                avoided_tco2e_per_year: Some(999.0),
            },
        );
        assert!((balance.avoided_tco2e_per_year - 999.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_project_type_yields_zero_factors() {
        let areas = BTreeMap::new();
        let balance = compute_balance(
            &catalog(),
            &EmissionInputs {
                class_areas_ha: &areas,
                project_type: "tidal_plant",
                capacity_mw: 50.0,
                horizon_years: 20.0,
                avoided_tco2e_per_year: None,
            },
        );
        assert_eq!(balance.construction_tco2e, 0.0);
        assert_eq!(balance.net_tco2e_per_year, 0.0);
    }
}
