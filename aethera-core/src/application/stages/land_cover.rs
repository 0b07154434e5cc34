// aethera-core/src/application/stages/land_cover.rs
//
// Clip the land-cover dataset to the AOI and summarize class composition.
// This is the only required stage: a missing land-cover dataset fails the
// run before anything else happens.

use crate::application::context::AnalysisContext;
use crate::application::manifest::ArtifactWriter;
use crate::application::stages::{aoi_bbox_for, as_multipolygon, to_working};
use crate::domain::aoi::Aoi;
use crate::domain::error::DomainError;
use crate::domain::metrics::{MetricsMap, round_sig};
use crate::error::AetheraError;
use geo::{Area, BooleanOps, EuclideanLength};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, instrument};

pub const STAGE: &str = "land_cover";
pub const ARTIFACT: &str = "processed/land_cover_summary.json";

/// Canonical land-cover groups the ratios and emission factors key on.
const CANONICAL_GROUPS: &[(&str, &[&str])] = &[
    ("forest", &["forest", "wood", "broadleaf", "conifer"]),
    ("agricultural", &["agric", "arable", "crop", "pasture", "vineyard", "orchard"]),
    ("impervious", &["urban", "industrial", "artificial", "road", "airport", "construction", "mine"]),
    ("wetland", &["wetland", "marsh", "bog", "peat"]),
    ("water", &["water", "lake", "river", "lagoon", "estuar", "sea"]),
    // everything else falls through to "natural"
];

const CLASS_KEYS: &[&str] = &["class", "CLASS", "clc_class", "label", "LABEL3", "code_18", "landcover"];

fn canonical_group(raw: &str) -> &'static str {
    let lower = raw.to_ascii_lowercase();
    for (group, keywords) in CANONICAL_GROUPS {
        if keywords.iter().any(|kw| lower.contains(kw)) {
            return group;
        }
    }
    "natural"
}

#[derive(Debug, Clone, Serialize)]
struct ClassRow {
    class: String,
    group: &'static str,
    area_ha: f64,
    share: f64,
}

#[derive(Debug, Serialize)]
struct LandCoverSummary {
    dataset: String,
    aoi_area_ha: f64,
    covered_area_ha: f64,
    classes: Vec<ClassRow>,
    group_areas_ha: BTreeMap<String, f64>,
    ratios: BTreeMap<String, f64>,
    patch_count: usize,
    edge_km: f64,
}

#[derive(Debug, Clone)]
pub struct LandCoverOutcome {
    /// Canonical-group shares of the covered area (sum ~ 1).
    pub group_shares: BTreeMap<String, f64>,
    /// Canonical-group areas in hectares, the emissions stage input.
    pub group_areas_ha: BTreeMap<String, f64>,
}

#[instrument(skip_all)]
pub async fn run(
    ctx: &AnalysisContext,
    aoi: &Aoi,
    country: Option<&str>,
    writer: &mut ArtifactWriter,
    metrics: &mut MetricsMap,
) -> Result<LandCoverOutcome, AetheraError> {
    let descriptor = ctx
        .catalog
        .locate("corine_land_cover", country, true)
        .map_err(AetheraError::Domain)?
        .ok_or(AetheraError::Domain(DomainError::DatasetMissing(
            "corine_land_cover".into(),
        )))?;

    let dataset_crs = descriptor.crs.clone().unwrap_or_else(|| "EPSG:4326".into());
    let bbox = aoi_bbox_for(ctx, aoi, &dataset_crs, 0.0);
    let set = ctx.cache.load(&descriptor, bbox, None).await?;

    let aoi_mp = aoi.working_multipolygon();
    let aoi_area_ha = aoi.area_ha();

    let mut class_areas: BTreeMap<String, f64> = BTreeMap::new();
    let mut patch_count = 0usize;
    let mut edge_m = 0.0f64;

    for record in &set.records {
        let Some(parts) = as_multipolygon(&to_working(ctx, &set.crs, &record.geometry)?) else {
            continue;
        };
        let clipped = aoi_mp.intersection(&parts);
        let area_m2 = clipped.unsigned_area();
        if area_m2 <= 0.0 {
            continue;
        }
        patch_count += clipped.0.len();
        edge_m += clipped
            .0
            .iter()
            .map(|p| p.exterior().euclidean_length())
            .sum::<f64>();

        let raw_class = CLASS_KEYS
            .iter()
            .find_map(|key| record.properties.get(*key))
            .and_then(|v| v.as_text().map(str::to_string))
            .unwrap_or_else(|| "unclassified".to_string());
        *class_areas.entry(raw_class).or_insert(0.0) += area_m2 / 10_000.0;
    }

    if class_areas.is_empty() {
        return Err(AetheraError::Domain(DomainError::StageFailed {
            stage: STAGE.into(),
            optional: false,
            reason: "land-cover dataset does not intersect the AOI".into(),
        }));
    }

    let covered_ha: f64 = class_areas.values().sum();
    let mut group_areas: BTreeMap<String, f64> = BTreeMap::new();
    let mut rows = Vec::new();
    for (class, area_ha) in &class_areas {
        let group = canonical_group(class);
        *group_areas.entry(group.to_string()).or_insert(0.0) += area_ha;
        rows.push(ClassRow {
            class: class.clone(),
            group,
            area_ha: round_sig(*area_ha),
            share: round_sig(area_ha / covered_ha),
        });
    }
    rows.sort_by(|a, b| b.area_ha.partial_cmp(&a.area_ha).unwrap_or(std::cmp::Ordering::Equal));

    let mut ratios = BTreeMap::new();
    let mut group_shares = BTreeMap::new();
    for group in ["forest", "agricultural", "impervious", "wetland", "water", "natural"] {
        let share = group_areas.get(group).copied().unwrap_or(0.0) / covered_ha;
        ratios.insert(format!("{group}_ratio"), round_sig(share));
        group_shares.insert(group.to_string(), share);
        metrics.insert(format!("{group}_ratio"), share);
    }

    metrics.insert("land_cover_patch_count", patch_count as f64);
    metrics.insert("land_cover_edge_km", edge_m / 1000.0);
    metrics.insert("land_cover_covered_ha", covered_ha);
    metrics.insert("water_presence_ratio", group_shares.get("water").copied().unwrap_or(0.0));

    let summary = LandCoverSummary {
        dataset: descriptor.path.to_string_lossy().to_string(),
        aoi_area_ha: round_sig(aoi_area_ha),
        covered_area_ha: round_sig(covered_ha),
        classes: rows,
        group_areas_ha: group_areas
            .iter()
            .map(|(k, v)| (k.clone(), round_sig(*v)))
            .collect(),
        ratios,
        patch_count,
        edge_km: round_sig(edge_m / 1000.0),
    };
    writer.write_json(ARTIFACT, &summary).await?;

    info!(
        classes = summary.classes.len(),
        covered_ha = summary.covered_area_ha,
        "land cover clipped"
    );

    Ok(LandCoverOutcome {
        group_shares,
        group_areas_ha: group_areas,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_grouping() {
        assert_eq!(canonical_group("Broadleaf forest"), "forest");
        assert_eq!(canonical_group("Non-irrigated arable land"), "agricultural");
        assert_eq!(canonical_group("Continuous urban fabric"), "impervious");
        assert_eq!(canonical_group("Peat bogs"), "wetland");
        assert_eq!(canonical_group("Water courses"), "water");
        assert_eq!(canonical_group("Sclerophyllous vegetation"), "natural");
    }
}
