// aethera-core/src/application/stages/receptors.rs
//
// Nearest-receptor distances from the AOI boundary, computed in the metric
// working CRS (pairwise nearest points, never centroid-to-centroid).
// Receptors beyond the configured cap report null.

use crate::application::context::AnalysisContext;
use crate::application::manifest::ArtifactWriter;
use crate::application::stages::{StageResult, aoi_bbox_for, distance_m, to_working};
use crate::domain::aoi::Aoi;
use crate::domain::metrics::{MetricsMap, round_sig};
use crate::error::AetheraError;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, instrument};

pub const STAGE: &str = "receptors";
pub const ARTIFACT: &str = "processed/receptor_distances.json";

/// (receptor class, candidate logical datasets in preference order,
/// metric key)
const RECEPTOR_CLASSES: &[(&str, &[&str], &str)] = &[
    ("protected_areas", &["natura2000", "wdpa"], "distance_to_protected_km"),
    ("settlements", &["settlements"], "distance_to_settlement_km"),
    ("water_bodies", &["water_bodies"], "distance_to_water_km"),
];

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ReceptorReport {
    Missing {
        available: bool,
    },
    Measured {
        available: bool,
        /// Null when the nearest receptor lies beyond the cap.
        distance_km: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        nearest_id: Option<String>,
        dataset: String,
    },
}

#[derive(Debug, Serialize)]
struct ReceptorSummary {
    receptor_max_distance_km: f64,
    receptors: BTreeMap<String, ReceptorReport>,
}

#[instrument(skip_all)]
pub async fn run(
    ctx: &AnalysisContext,
    aoi: &Aoi,
    country: Option<&str>,
    writer: &mut ArtifactWriter,
    metrics: &mut MetricsMap,
) -> Result<StageResult<()>, AetheraError> {
    let cap_km = ctx.config.receptor_max_distance_km;
    let cap_m = cap_km * 1000.0;
    let aoi_mp = aoi.working_multipolygon();

    let mut receptors = BTreeMap::new();
    let mut any_dataset = false;

    for (class, candidates, metric_key) in RECEPTOR_CLASSES {
        let mut descriptor = None;
        for logical in candidates.iter().copied() {
            if let Some(found) = ctx
                .catalog
                .locate(logical, country, false)
                .map_err(AetheraError::Domain)?
            {
                descriptor = Some(found);
                break;
            }
        }
        let Some(descriptor) = descriptor else {
            receptors.insert((*class).to_string(), ReceptorReport::Missing { available: false });
            continue;
        };
        any_dataset = true;

        let dataset_crs = descriptor.crs.clone().unwrap_or_else(|| "EPSG:4326".into());
        // Widen the cache clip by the cap so near-but-outside receptors
        // are not lost to the bbox filter.
        let bbox = aoi_bbox_for(ctx, aoi, &dataset_crs, cap_m);
        let set = ctx.cache.load(&descriptor, bbox, None).await?;

        // Nearest by distance; smaller identifier breaks exact ties.
        let mut nearest: Option<(f64, String)> = None;
        for record in &set.records {
            let working = to_working(ctx, &set.crs, &record.geometry)?;
            let d = distance_m(&aoi_mp, &working);
            if !d.is_finite() {
                continue;
            }
            let id = record.identifier();
            let closer = match &nearest {
                None => true,
                Some((best, best_id)) => {
                    d < *best - 1e-9 || ((d - *best).abs() <= 1e-9 && id < *best_id)
                }
            };
            if closer {
                nearest = Some((d, id));
            }
        }

        let report = match nearest {
            Some((d, id)) if d <= cap_m => {
                let km = d / 1000.0;
                metrics.insert(*metric_key, km);
                ReceptorReport::Measured {
                    available: true,
                    distance_km: Some(round_sig(km)),
                    nearest_id: Some(id),
                    dataset: descriptor.logical_name.clone(),
                }
            }
            _ => ReceptorReport::Measured {
                available: true,
                distance_km: None,
                nearest_id: None,
                dataset: descriptor.logical_name.clone(),
            },
        };
        receptors.insert((*class).to_string(), report);
    }

    if !any_dataset {
        return Ok(StageResult::Skipped(
            "no receptor dataset (protected/settlements/water) available".into(),
        ));
    }

    let summary = ReceptorSummary {
        receptor_max_distance_km: cap_km,
        receptors,
    };
    writer.write_json(ARTIFACT, &summary).await?;
    info!(cap_km, "receptor distances computed");

    Ok(StageResult::Done(()))
}
