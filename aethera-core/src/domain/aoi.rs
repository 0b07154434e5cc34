// aethera-core/src/domain/aoi.rs

use crate::domain::error::DomainError;
use geo::{Area, BoundingRect, Geometry, MultiPolygon, Polygon, Rect};
use serde::{Deserialize, Serialize};

/// Minimal accepted AOI footprint, in the working (metric) CRS.
pub const MIN_AOI_AREA_M2: f64 = 1.0;

/// The four accepted AOI input forms.
#[derive(Debug, Clone)]
pub enum AoiInput {
    /// Inline GeoJSON: Feature, FeatureCollection or bare geometry.
    GeoJson(serde_json::Value),
    /// Path to a vector file (.geojson/.json/.shp/.wkt).
    Path(std::path::PathBuf),
    /// A single WKT string.
    Wkt(String),
}

/// One polygonal AOI part. Multi-geometries are flattened into several
/// features before validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AoiFeature {
    pub id: usize,
    pub geometry: Polygon<f64>,
}

/// A normalized Area of Interest.
///
/// `wgs84` holds the wire representation (EPSG:4326); `working` holds the
/// same features reprojected into the metric working CRS used for every
/// area/distance computation. Both are retained on the run record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Aoi {
    pub wgs84: Vec<AoiFeature>,
    pub working: Vec<AoiFeature>,
    pub working_crs: String,
}

impl Aoi {
    /// Validate and assemble an AOI from already-reprojected parts.
    ///
    /// Invariants enforced here:
    /// - at least one feature survives filtering,
    /// - total area in the working CRS >= 1 m²,
    /// - per-feature zero-area parts are dropped.
    pub fn new(
        wgs84: Vec<Polygon<f64>>,
        working: Vec<Polygon<f64>>,
        working_crs: impl Into<String>,
    ) -> Result<Self, DomainError> {
        if wgs84.len() != working.len() {
            return Err(DomainError::InvalidAoi(
                "reprojection produced a different feature count".into(),
            ));
        }

        let mut kept_wgs84 = Vec::new();
        let mut kept_working = Vec::new();
        for (idx, (geo_part, work_part)) in wgs84.into_iter().zip(working).enumerate() {
            if work_part.unsigned_area() <= 0.0 {
                continue;
            }
            kept_wgs84.push(AoiFeature {
                id: idx,
                geometry: geo_part,
            });
            kept_working.push(AoiFeature {
                id: idx,
                geometry: work_part,
            });
        }

        if kept_working.is_empty() {
            return Err(DomainError::InvalidAoi(
                "no non-empty polygonal feature in input".into(),
            ));
        }

        let aoi = Self {
            wgs84: kept_wgs84,
            working: kept_working,
            working_crs: working_crs.into(),
        };

        let area = aoi.area_m2();
        if area < MIN_AOI_AREA_M2 {
            return Err(DomainError::InvalidAoi(format!(
                "total area {:.4} m² is below the {} m² minimum",
                area, MIN_AOI_AREA_M2
            )));
        }

        Ok(aoi)
    }

    /// Flatten a parsed geometry into polygon parts. Non-areal geometries
    /// (points, lines) are rejected for analysis.
    pub fn flatten_polygons(geometry: Geometry<f64>) -> Result<Vec<Polygon<f64>>, DomainError> {
        let mut out = Vec::new();
        collect_polygons(geometry, &mut out)?;
        if out.is_empty() {
            return Err(DomainError::InvalidAoi("empty geometry".into()));
        }
        Ok(out)
    }

    /// Total footprint in the working CRS, m².
    pub fn area_m2(&self) -> f64 {
        self.working.iter().map(|f| f.geometry.unsigned_area()).sum()
    }

    /// Total footprint, hectares.
    pub fn area_ha(&self) -> f64 {
        self.area_m2() / 10_000.0
    }

    /// Total exterior perimeter in the working CRS, km.
    pub fn perimeter_km(&self) -> f64 {
        use geo::EuclideanLength;
        self.working
            .iter()
            .map(|f| f.geometry.exterior().euclidean_length())
            .sum::<f64>()
            / 1_000.0
    }

    /// Union-free multipolygon view of the working features.
    pub fn working_multipolygon(&self) -> MultiPolygon<f64> {
        MultiPolygon(self.working.iter().map(|f| f.geometry.clone()).collect())
    }

    /// Bounding box of the working features. The AOI is guaranteed
    /// non-empty, so a box always exists.
    pub fn working_bbox(&self) -> Option<Rect<f64>> {
        self.working_multipolygon().bounding_rect()
    }

    /// Bounding box on the wire representation (EPSG:4326).
    pub fn wgs84_bbox(&self) -> Option<Rect<f64>> {
        MultiPolygon::<f64>(self.wgs84.iter().map(|f| f.geometry.clone()).collect())
            .bounding_rect()
    }

    /// Centroid of the wire representation, used for country inference.
    pub fn wgs84_centroid(&self) -> Option<geo::Point<f64>> {
        use geo::Centroid;
        MultiPolygon::<f64>(self.wgs84.iter().map(|f| f.geometry.clone()).collect()).centroid()
    }

    /// Canonical GeoJSON (EPSG:4326) feature for the manifest.
    pub fn to_geojson_feature(&self) -> serde_json::Value {
        let mp = MultiPolygon::<f64>(self.wgs84.iter().map(|f| f.geometry.clone()).collect());
        let geometry = geojson::Geometry::new(geojson::Value::from(&mp));
        serde_json::json!({
            "type": "Feature",
            "geometry": serde_json::to_value(&geometry).unwrap_or(serde_json::Value::Null),
            "properties": { "role": "aoi", "features": self.wgs84.len() }
        })
    }
}

fn collect_polygons(
    geometry: Geometry<f64>,
    out: &mut Vec<Polygon<f64>>,
) -> Result<(), DomainError> {
    match geometry {
        Geometry::Polygon(p) => {
            if !p.exterior().0.is_empty() {
                out.push(p);
            }
            Ok(())
        }
        Geometry::MultiPolygon(mp) => {
            for p in mp.0 {
                if !p.exterior().0.is_empty() {
                    out.push(p);
                }
            }
            Ok(())
        }
        Geometry::GeometryCollection(gc) => {
            for g in gc.0 {
                collect_polygons(g, out)?;
            }
            Ok(())
        }
        Geometry::Point(_)
        | Geometry::MultiPoint(_)
        | Geometry::Line(_)
        | Geometry::LineString(_)
        | Geometry::MultiLineString(_) => Err(DomainError::InvalidAoi(
            "non-areal geometry cannot be analysed as an AOI".into(),
        )),
        _ => Err(DomainError::InvalidAoi("unsupported geometry type".into())),
    }
}
