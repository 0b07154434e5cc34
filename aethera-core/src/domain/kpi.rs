// aethera-core/src/domain/kpi.rs
//
// Derived environmental indicators. Every KPI is a deterministic formula
// over the metrics namespace populated by the earlier stages; the output is
// persisted as `environmental_kpis.json` with unit and scale annotations.

use crate::domain::metrics::{MetricsMap, round_sig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Kpi {
    pub value: f64,
    pub unit: String,
    pub scale: String,
}

impl Kpi {
    fn new(value: f64, unit: &str, scale: &str) -> Self {
        Self {
            value: round_sig(value),
            unit: unit.to_string(),
            scale: scale.to_string(),
        }
    }
}

/// Ecosystem service value coefficients, k€ per hectare per year.
/// Derived from the usual benefit-transfer tables, kept coarse on purpose.
const ESV_KEUR_PER_HA_YEAR: &[(&str, f64)] = &[
    ("forest", 3.1),
    ("wetland", 14.8),
    ("natural", 2.4),
    ("water", 8.5),
    ("agricultural", 1.2),
    ("impervious", 0.05),
];

/// Compute the full KPI block.
///
/// `class_shares` are the land-cover class proportions inside the AOI
/// (summing to ~1); `metrics` is the flat namespace after the land-cover,
/// biodiversity, receptor and emission stages ran.
pub fn compute_kpis(
    class_shares: &BTreeMap<String, f64>,
    metrics: &MetricsMap,
) -> BTreeMap<String, Kpi> {
    let mut out = BTreeMap::new();

    let area_ha = metrics.get("aoi_area_ha").unwrap_or(0.0);
    let area_km2 = area_ha / 100.0;
    let perimeter_km = metrics.get("aoi_perimeter_km").unwrap_or(0.0);
    let capacity_mw = metrics.get("capacity_mw").unwrap_or(0.0);

    let agricultural = metrics.get("agricultural_ratio").unwrap_or(0.0);
    let natural = metrics.get("natural_ratio").unwrap_or(0.0);
    let impervious = metrics.get("impervious_ratio").unwrap_or(0.0);
    let forest = metrics.get("forest_ratio").unwrap_or(0.0);
    let wetland = metrics.get("wetland_ratio").unwrap_or(0.0);
    let water = metrics.get("water_ratio").unwrap_or(0.0);

    // --- DIVERSITY (land-cover composition) ---
    let proportions: Vec<f64> = class_shares.values().copied().filter(|p| *p > 0.0).collect();
    let shannon = -proportions.iter().map(|p| p * p.ln()).sum::<f64>();
    let simpson = 1.0 - proportions.iter().map(|p| p * p).sum::<f64>();
    let evenness = if proportions.len() > 1 {
        shannon / (proportions.len() as f64).ln()
    } else {
        0.0
    };
    out.insert("shannon_diversity".into(), Kpi::new(shannon, "index", "0-ln(n)"));
    out.insert("simpson_diversity".into(), Kpi::new(simpson, "index", "0-1"));
    out.insert("landscape_evenness".into(), Kpi::new(evenness, "index", "0-1"));
    out.insert("dominance_index".into(), Kpi::new(1.0 - evenness, "index", "0-1"));

    // --- STRUCTURE (patches, edges, shape) ---
    let patch_count = metrics.get("land_cover_patch_count").unwrap_or(0.0);
    let edge_km = metrics.get("land_cover_edge_km").unwrap_or(0.0);
    let patches_per_km2 = if area_km2 > 0.0 { patch_count / area_km2 } else { 0.0 };
    let fragmentation = 1.0 - (-patches_per_km2 / 10.0).exp();
    let edge_density = if area_km2 > 0.0 { edge_km / area_km2 } else { 0.0 };
    let compactness = if perimeter_km > 0.0 {
        (4.0 * std::f64::consts::PI * area_km2) / (perimeter_km * perimeter_km)
    } else {
        0.0
    };
    out.insert(
        "habitat_fragmentation_index".into(),
        Kpi::new(fragmentation.clamp(0.0, 1.0), "index", "0-1"),
    );
    out.insert(
        "edge_density_km_per_km2".into(),
        Kpi::new(edge_density, "km/km²", ">=0"),
    );
    out.insert(
        "aoi_compactness".into(),
        Kpi::new(compactness.clamp(0.0, 1.0), "index", "0-1"),
    );
    out.insert(
        "habitat_connectivity_index".into(),
        Kpi::new(
            (compactness.clamp(0.0, 1.0) * (1.0 - fragmentation.clamp(0.0, 1.0))).clamp(0.0, 1.0),
            "index",
            "0-1",
        ),
    );

    // --- ECOSYSTEM SERVICES ---
    let esv: f64 = ESV_KEUR_PER_HA_YEAR
        .iter()
        .map(|(class, coeff)| class_shares.get(*class).copied().unwrap_or(0.0) * coeff)
        .sum::<f64>()
        * area_ha;
    out.insert(
        "ecosystem_service_value_keur_per_year".into(),
        Kpi::new(esv, "k€/yr", ">=0"),
    );
    out.insert(
        "green_infrastructure_ratio".into(),
        Kpi::new((forest + natural + wetland).clamp(0.0, 1.0), "ratio", "0-1"),
    );
    out.insert("water_presence_ratio".into(), Kpi::new(water, "ratio", "0-1"));

    // --- PRESSURE / RISK ---
    let erosion = 100.0 * (0.55 * agricultural + 0.30 * impervious + 0.15 * (1.0 - natural - forest).max(0.0));
    out.insert(
        "soil_erosion_risk_index".into(),
        Kpi::new(erosion.clamp(0.0, 100.0), "index", "0-100"),
    );
    let air_quality = 100.0 * (0.5 + 0.45 * (forest + natural) - 0.6 * impervious - 0.1 * agricultural);
    out.insert(
        "air_quality_index".into(),
        Kpi::new(air_quality.clamp(0.0, 100.0), "index", "0-100"),
    );
    let human_pressure = 100.0 * (0.7 * impervious + 0.3 * agricultural);
    out.insert(
        "human_pressure_index".into(),
        Kpi::new(human_pressure.clamp(0.0, 100.0), "index", "0-100"),
    );

    // --- ENERGY & CARBON ---
    if capacity_mw > 0.0 {
        out.insert(
            "land_use_per_mw_ha".into(),
            Kpi::new(area_ha / capacity_mw, "ha/MW", ">=0"),
        );
        if area_km2 > 0.0 {
            out.insert(
                "energy_density_mw_per_km2".into(),
                Kpi::new(capacity_mw / area_km2, "MW/km²", ">=0"),
            );
        }
        let mw_per_ha = capacity_mw / area_ha.max(1e-9);
        out.insert(
            "resource_efficiency_index".into(),
            Kpi::new(100.0 * (1.0 - (-mw_per_ha).exp()), "index", "0-100"),
        );
        let operation = metrics.get("project_operation_tco2e_per_year").unwrap_or(0.0);
        out.insert(
            "carbon_intensity_tco2e_per_mw_year".into(),
            Kpi::new(operation / capacity_mw, "tCO₂e/MW/yr", ">=0"),
        );
    }
    let baseline = metrics.get("baseline_tco2e_per_year").unwrap_or(0.0);
    out.insert(
        "climate_regulation_tco2e_per_year".into(),
        Kpi::new(-baseline, "tCO₂e/yr", "sequestration > 0"),
    );
    out.insert(
        "net_carbon_balance_tco2e_per_year".into(),
        Kpi::new(metrics.get("net_tco2e_per_year").unwrap_or(0.0), "tCO₂e/yr", "sink < 0"),
    );

    // --- CONTEXT COPIES (kept in the KPI block for report consumers) ---
    out.insert("aoi_area_ha".into(), Kpi::new(area_ha, "ha", ">=0"));
    out.insert("aoi_perimeter_km".into(), Kpi::new(perimeter_km, "km", ">=0"));
    out.insert(
        "protected_overlap_pct".into(),
        Kpi::new(metrics.get("protected_overlap_pct").unwrap_or(0.0), "%", "0-100"),
    );
    for key in [
        "distance_to_protected_km",
        "distance_to_settlement_km",
        "distance_to_water_km",
    ] {
        if let Some(v) = metrics.get(key) {
            out.insert(key.into(), Kpi::new(v, "km", ">=0"));
        }
    }

    out
}

/// Fold the KPI block back into the metrics namespace so the ML vectors
/// and legal rules can reference any indicator by name.
pub fn fold_into_metrics(kpis: &BTreeMap<String, Kpi>, metrics: &mut MetricsMap) {
    for (name, kpi) in kpis {
        metrics.insert(name.clone(), kpi.value);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn even_shares() -> BTreeMap<String, f64> {
        let mut shares = BTreeMap::new();
        shares.insert("forest".to_string(), 0.25);
        shares.insert("agricultural".to_string(), 0.25);
        shares.insert("natural".to_string(), 0.25);
        shares.insert("impervious".to_string(), 0.25);
        shares
    }

    fn base_metrics() -> MetricsMap {
        let mut m = MetricsMap::new();
        m.insert("aoi_area_ha", 100.0);
        m.insert("aoi_perimeter_km", 4.0);
        m.insert("capacity_mw", 10.0);
        m.insert("forest_ratio", 0.25);
        m.insert("agricultural_ratio", 0.25);
        m.insert("natural_ratio", 0.25);
        m.insert("impervious_ratio", 0.25);
        m.insert("project_operation_tco2e_per_year", 25.0);
        m
    }

    #[test]
    fn test_shannon_for_even_distribution() {
        let kpis = compute_kpis(&even_shares(), &base_metrics());
        // ln(4) for four equal classes
        assert!((kpis["shannon_diversity"].value - 4f64.ln()).abs() < 1e-4);
        assert!((kpis["landscape_evenness"].value - 1.0).abs() < 1e-4);
        assert!((kpis["simpson_diversity"].value - 0.75).abs() < 1e-4);
    }

    #[test]
    fn test_compactness_of_square() {
        // 1 km² square with 4 km perimeter: 4πA/P² = π/4
        let kpis = compute_kpis(&even_shares(), &base_metrics());
        assert!((kpis["aoi_compactness"].value - std::f64::consts::PI / 4.0).abs() < 1e-4);
    }

    #[test]
    fn test_indices_stay_in_declared_scales() {
        let kpis = compute_kpis(&even_shares(), &base_metrics());
        for name in [
            "soil_erosion_risk_index",
            "air_quality_index",
            "human_pressure_index",
            "resource_efficiency_index",
        ] {
            let v = kpis[name].value;
            assert!((0.0..=100.0).contains(&v), "{name} out of scale: {v}");
        }
        for name in ["habitat_fragmentation_index", "habitat_connectivity_index"] {
            let v = kpis[name].value;
            assert!((0.0..=1.0).contains(&v), "{name} out of scale: {v}");
        }
    }

    #[test]
    fn test_kpi_count_is_at_least_twenty() {
        let kpis = compute_kpis(&even_shares(), &base_metrics());
        assert!(kpis.len() >= 20, "expected >= 20 KPIs, got {}", kpis.len());
    }

    #[test]
    fn test_fold_into_metrics() {
        let kpis = compute_kpis(&even_shares(), &base_metrics());
        let mut metrics = base_metrics();
        fold_into_metrics(&kpis, &mut metrics);
        assert!(metrics.get("shannon_diversity").is_some());
        assert!(metrics.get("soil_erosion_risk_index").is_some());
    }
}
