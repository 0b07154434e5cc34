// aethera-core/src/application/stages/mod.rs
//
// The geospatial stages. Each stage reads through the cache, writes exactly
// one canonical artifact via the ledger, and reports Done or Skipped; the
// orchestrator decides what a failure means based on the stage's
// required-ness.

pub mod biodiversity;
pub mod emissions;
pub mod kpis;
pub mod land_cover;
pub mod receptors;

use crate::application::context::AnalysisContext;
use crate::domain::aoi::Aoi;
use crate::error::AetheraError;
use geo::{EuclideanDistance, Geometry, MultiPolygon, Polygon, Rect};

/// Outcome of an individually skippable stage.
#[derive(Debug)]
pub enum StageResult<T> {
    Done(T),
    Skipped(String),
}

impl<T> StageResult<T> {
    pub fn skipped_reason(&self) -> Option<&str> {
        match self {
            StageResult::Skipped(reason) => Some(reason),
            StageResult::Done(_) => None,
        }
    }
}

/// Reproject a dataset geometry into the working CRS when needed.
pub(crate) fn to_working(
    ctx: &AnalysisContext,
    dataset_crs: &str,
    geometry: &Geometry<f64>,
) -> Result<Geometry<f64>, AetheraError> {
    if dataset_crs == ctx.config.working_crs {
        return Ok(geometry.clone());
    }
    Ok(ctx
        .projector
        .transform(geometry, dataset_crs, &ctx.config.working_crs)?)
}

/// The AOI bbox expressed in a dataset's CRS, for cache-level filtering.
/// `margin_m` widens the box (receptor searches).
pub(crate) fn aoi_bbox_for(
    ctx: &AnalysisContext,
    aoi: &Aoi,
    dataset_crs: &str,
    margin_m: f64,
) -> Option<Rect<f64>> {
    if dataset_crs == ctx.config.working_crs {
        return aoi.working_bbox().map(|r| grow(r, margin_m));
    }
    // Geographic datasets: widen in degrees (1° latitude ~ 111 km).
    aoi.wgs84_bbox().map(|r| grow(r, margin_m / 111_000.0))
}

fn grow(rect: Rect<f64>, by: f64) -> Rect<f64> {
    Rect::new(
        geo::Coord {
            x: rect.min().x - by,
            y: rect.min().y - by,
        },
        geo::Coord {
            x: rect.max().x + by,
            y: rect.max().y + by,
        },
    )
}

/// Areal view of a record geometry, when it has one.
pub(crate) fn as_multipolygon(geometry: &Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        Geometry::Polygon(p) => Some(MultiPolygon(vec![p.clone()])),
        Geometry::MultiPolygon(mp) => Some(mp.clone()),
        _ => None,
    }
}

/// Pairwise nearest distance (metres) between the AOI footprint and an
/// arbitrary receptor geometry, both in the working CRS. Zero when they
/// intersect.
pub(crate) fn distance_m(aoi: &MultiPolygon<f64>, geometry: &Geometry<f64>) -> f64 {
    aoi.0
        .iter()
        .map(|polygon| polygon_distance(polygon, geometry))
        .fold(f64::INFINITY, f64::min)
}

fn polygon_distance(polygon: &Polygon<f64>, geometry: &Geometry<f64>) -> f64 {
    match geometry {
        Geometry::Point(p) => p.euclidean_distance(polygon),
        Geometry::MultiPoint(mp) => mp
            .0
            .iter()
            .map(|p| p.euclidean_distance(polygon))
            .fold(f64::INFINITY, f64::min),
        Geometry::Line(l) => {
            geo::LineString::from(vec![l.start, l.end]).euclidean_distance(polygon)
        }
        Geometry::LineString(ls) => ls.euclidean_distance(polygon),
        Geometry::MultiLineString(mls) => mls
            .0
            .iter()
            .map(|ls| ls.euclidean_distance(polygon))
            .fold(f64::INFINITY, f64::min),
        Geometry::Polygon(other) => polygon.euclidean_distance(other),
        Geometry::MultiPolygon(mp) => mp
            .0
            .iter()
            .map(|other| polygon.euclidean_distance(other))
            .fold(f64::INFINITY, f64::min),
        Geometry::GeometryCollection(gc) => gc
            .0
            .iter()
            .map(|g| polygon_distance(polygon, g))
            .fold(f64::INFINITY, f64::min),
        Geometry::Rect(r) => polygon.euclidean_distance(&r.to_polygon()),
        Geometry::Triangle(t) => polygon.euclidean_distance(&t.to_polygon()),
    }
}

/// Assemble a GeoJSON FeatureCollection from (geometry, properties) pairs.
pub(crate) fn feature_collection(
    features: Vec<(Geometry<f64>, serde_json::Value)>,
) -> serde_json::Value {
    let features: Vec<serde_json::Value> = features
        .into_iter()
        .map(|(geometry, properties)| {
            let geom = geojson::Geometry::new(geojson::Value::from(&geometry));
            serde_json::json!({
                "type": "Feature",
                "geometry": serde_json::to_value(&geom).unwrap_or(serde_json::Value::Null),
                "properties": properties,
            })
        })
        .collect();
    serde_json::json!({"type": "FeatureCollection", "features": features})
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use geo::polygon;

    fn unit_square() -> MultiPolygon<f64> {
        MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 100.0, y: 0.0),
            (x: 100.0, y: 100.0),
            (x: 0.0, y: 100.0),
            (x: 0.0, y: 0.0),
        ]])
    }

    #[test]
    fn test_distance_to_point_and_polygon() {
        let aoi = unit_square();
        let point = Geometry::Point(geo::Point::new(200.0, 0.0));
        assert!((distance_m(&aoi, &point) - 100.0).abs() < 1e-9);

        let touching = Geometry::Polygon(polygon![
            (x: 50.0, y: 50.0),
            (x: 60.0, y: 50.0),
            (x: 60.0, y: 60.0),
            (x: 50.0, y: 50.0),
        ]);
        assert_eq!(distance_m(&aoi, &touching), 0.0);
    }

    #[test]
    fn test_feature_collection_shape() {
        let fc = feature_collection(vec![(
            Geometry::Point(geo::Point::new(1.0, 2.0)),
            serde_json::json!({"id": "A"}),
        )]);
        assert_eq!(fc["type"], "FeatureCollection");
        assert_eq!(fc["features"][0]["properties"]["id"], "A");
        assert_eq!(fc["features"][0]["geometry"]["type"], "Point");
    }
}
