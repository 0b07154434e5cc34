// aethera-core/src/infrastructure/crs.rs
//
// Thin wrapper around PROJ. A `Projector` is cheap to clone and Sync: the
// underlying `proj::Proj` handle is created per call, which keeps the
// context shareable across worker tasks.

use crate::infrastructure::error::InfrastructureError;
use geo::{Geometry, MapCoords, Polygon};
use proj::Proj;

pub const WGS84: &str = "EPSG:4326";

#[derive(Debug, Clone)]
pub struct Projector {
    pub source_crs: String,
    pub working_crs: String,
}

impl Projector {
    pub fn new(working_crs: impl Into<String>) -> Self {
        Self {
            source_crs: WGS84.to_string(),
            working_crs: working_crs.into(),
        }
    }

    fn transformer(&self, from: &str, to: &str) -> Result<Proj, InfrastructureError> {
        Proj::new_known_crs(from, to, None)
            .map_err(|e| InfrastructureError::Projection(format!("{from} -> {to}: {e}")))
    }

    /// Wire CRS (lon/lat) into the metric working CRS.
    pub fn to_working(&self, geometry: &Geometry<f64>) -> Result<Geometry<f64>, InfrastructureError> {
        self.map(geometry, &self.source_crs, &self.working_crs)
    }

    /// Metric working CRS back to the wire CRS.
    pub fn to_wgs84(&self, geometry: &Geometry<f64>) -> Result<Geometry<f64>, InfrastructureError> {
        self.map(geometry, &self.working_crs, &self.source_crs)
    }

    pub fn polygon_to_working(&self, polygon: &Polygon<f64>) -> Result<Polygon<f64>, InfrastructureError> {
        match self.to_working(&Geometry::Polygon(polygon.clone()))? {
            Geometry::Polygon(p) => Ok(p),
            _ => Err(InfrastructureError::Projection(
                "projection changed the geometry type".into(),
            )),
        }
    }

    /// Arbitrary CRS-to-CRS transform (datasets carrying a sidecar CRS).
    pub fn transform(
        &self,
        geometry: &Geometry<f64>,
        from: &str,
        to: &str,
    ) -> Result<Geometry<f64>, InfrastructureError> {
        self.map(geometry, from, to)
    }

    fn map(
        &self,
        geometry: &Geometry<f64>,
        from: &str,
        to: &str,
    ) -> Result<Geometry<f64>, InfrastructureError> {
        let proj = self.transformer(from, to)?;
        geometry.try_map_coords(|coord| {
            let (x, y) = proj
                .convert((coord.x, coord.y))
                .map_err(|e| InfrastructureError::Projection(e.to_string()))?;
            Ok(geo::Coord { x, y })
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use geo::{Area, polygon};

    fn small_square(lon: f64, lat: f64, d: f64) -> Polygon<f64> {
        polygon![
            (x: lon, y: lat),
            (x: lon + d, y: lat),
            (x: lon + d, y: lat + d),
            (x: lon, y: lat + d),
            (x: lon, y: lat),
        ]
    }

    #[test]
    fn test_wgs84_round_trip_through_laea() {
        let projector = Projector::new("EPSG:3035");
        let src = small_square(11.25, 43.77, 0.01);
        let working = projector.polygon_to_working(&src).unwrap();
        // ~0.01° near Florence is on the order of a square kilometre
        let area_km2 = working.unsigned_area() / 1e6;
        assert!(area_km2 > 0.5 && area_km2 < 1.5, "area {area_km2} km²");

        let back = projector.to_wgs84(&Geometry::Polygon(working)).unwrap();
        if let Geometry::Polygon(p) = back {
            let first = p.exterior().0[0];
            assert!((first.x - 11.25).abs() < 1e-6);
            assert!((first.y - 43.77).abs() < 1e-6);
        } else {
            panic!("expected polygon back");
        }
    }

    #[test]
    fn test_antimeridian_parts_project_without_wraparound() {
        // A MultiPolygon split at the antimeridian: both halves must land
        // close together in a Pacific-centred planar CRS.
        let projector = Projector::new("EPSG:3832");
        let west = projector
            .polygon_to_working(&small_square(179.9, -17.0, 0.05))
            .unwrap();
        let east = projector
            .polygon_to_working(&small_square(-179.95, -17.0, 0.05))
            .unwrap();
        let wx = west.exterior().0[0].x;
        let ex = east.exterior().0[0].x;
        assert!((wx - ex).abs() < 50_000.0, "halves {wx} / {ex} drifted apart");
    }

    #[test]
    fn test_unknown_crs_is_reported() {
        let projector = Projector::new("EPSG:999999");
        let src = Geometry::Polygon(small_square(0.0, 0.0, 1.0));
        assert!(matches!(
            projector.to_working(&src),
            Err(InfrastructureError::Projection(_))
        ));
    }
}
