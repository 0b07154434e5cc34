// aethera-core/src/application/stages/biodiversity.rs
//
// Protected-area overlay: Natura 2000 preferred, WDPA as global fallback,
// both combined (dedup on site identifier) when present.

use crate::application::context::AnalysisContext;
use crate::application::manifest::ArtifactWriter;
use crate::application::stages::{StageResult, aoi_bbox_for, as_multipolygon, feature_collection, to_working};
use crate::domain::aoi::Aoi;
use crate::domain::metrics::{MetricsMap, round_sig};
use crate::error::AetheraError;
use geo::{Area, BooleanOps, Geometry, MultiPolygon};
use std::collections::BTreeSet;
use tracing::{info, instrument};

pub const STAGE: &str = "biodiversity_overlay";
pub const CLIPPED_ARTIFACT: &str = "processed/biodiversity/natura_clipped.geojson";
pub const OVERLAP_ARTIFACT: &str = "processed/biodiversity/overlap.geojson";
pub const SENSITIVITY_ARTIFACT: &str = "processed/biodiversity/sensitivity.geojson";

#[derive(Debug, Clone)]
pub struct BiodiversityOutcome {
    pub protected_overlap_pct: f64,
    pub site_count: usize,
}

struct Site {
    id: String,
    name: Option<String>,
    source: &'static str,
    geometry_wgs84: Geometry<f64>,
    footprint: MultiPolygon<f64>,
}

#[instrument(skip_all)]
pub async fn run(
    ctx: &AnalysisContext,
    aoi: &Aoi,
    country: Option<&str>,
    writer: &mut ArtifactWriter,
    metrics: &mut MetricsMap,
) -> Result<StageResult<BiodiversityOutcome>, AetheraError> {
    // Regional dataset preferred, global fallback, both combined when both
    // are present.
    let mut sites: Vec<Site> = Vec::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut any_dataset = false;

    for (logical, source) in [("natura2000", "natura2000"), ("wdpa", "wdpa")] {
        let Some(descriptor) = ctx
            .catalog
            .locate(logical, country, false)
            .map_err(AetheraError::Domain)?
        else {
            continue;
        };
        any_dataset = true;

        let dataset_crs = descriptor.crs.clone().unwrap_or_else(|| "EPSG:4326".into());
        let bbox = aoi_bbox_for(ctx, aoi, &dataset_crs, 0.0);
        let set = ctx.cache.load(&descriptor, bbox, None).await?;

        for record in &set.records {
            let id = record.identifier();
            if !seen.insert(id.clone()) {
                continue; // regional record wins over the global duplicate
            }
            let Some(footprint) = as_multipolygon(&to_working(ctx, &set.crs, &record.geometry)?)
            else {
                continue;
            };
            sites.push(Site {
                id,
                name: record
                    .properties
                    .get("name")
                    .or_else(|| record.properties.get("NAME"))
                    .and_then(|v| v.as_text().map(str::to_string)),
                source,
                geometry_wgs84: record.geometry.clone(),
                footprint,
            });
        }
    }

    if !any_dataset {
        return Ok(StageResult::Skipped(
            "no protected-area dataset (natura2000/wdpa) available".into(),
        ));
    }

    let aoi_mp = aoi.working_multipolygon();
    let aoi_area_m2 = aoi.area_m2();

    let mut clipped_features = Vec::new();
    let mut overlap_features = Vec::new();
    let mut sensitivity_features = Vec::new();
    let mut overlap_union: Option<MultiPolygon<f64>> = None;

    for site in &sites {
        clipped_features.push((
            site.geometry_wgs84.clone(),
            serde_json::json!({
                "site_id": site.id,
                "name": site.name,
                "source": site.source,
            }),
        ));

        let intersection = aoi_mp.intersection(&site.footprint);
        let overlap_m2 = intersection.unsigned_area();
        if overlap_m2 <= 0.0 {
            continue;
        }

        let overlap_pct_of_aoi = 100.0 * overlap_m2 / aoi_area_m2;
        let grade = match overlap_pct_of_aoi {
            p if p >= 10.0 => "high",
            p if p >= 1.0 => "moderate",
            _ => "low",
        };

        let overlap_wgs84 = ctx
            .projector
            .to_wgs84(&Geometry::MultiPolygon(intersection.clone()))?;
        overlap_features.push((
            overlap_wgs84.clone(),
            serde_json::json!({
                "site_id": site.id,
                "source": site.source,
                "overlap_ha": round_sig(overlap_m2 / 10_000.0),
            }),
        ));
        sensitivity_features.push((
            overlap_wgs84,
            serde_json::json!({
                "site_id": site.id,
                "name": site.name,
                "overlap_pct_of_aoi": round_sig(overlap_pct_of_aoi),
                "sensitivity": grade,
            }),
        ));

        overlap_union = Some(match overlap_union.take() {
            Some(acc) => acc.union(&intersection),
            None => intersection,
        });
    }

    let overlap_pct = overlap_union
        .map(|mp| (100.0 * mp.unsigned_area() / aoi_area_m2).min(100.0))
        .unwrap_or(0.0);

    writer
        .write_json(CLIPPED_ARTIFACT, &feature_collection(clipped_features))
        .await?;
    writer
        .write_json(OVERLAP_ARTIFACT, &feature_collection(overlap_features))
        .await?;
    writer
        .write_json(SENSITIVITY_ARTIFACT, &feature_collection(sensitivity_features))
        .await?;

    metrics.insert("protected_overlap_pct", overlap_pct);
    metrics.insert("protected_sites_count", sites.len() as f64);

    info!(
        sites = sites.len(),
        overlap_pct = round_sig(overlap_pct),
        "protected-area overlay computed"
    );

    Ok(StageResult::Done(BiodiversityOutcome {
        protected_overlap_pct: overlap_pct,
        site_count: sites.len(),
    }))
}
