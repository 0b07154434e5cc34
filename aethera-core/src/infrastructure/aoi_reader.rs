// aethera-core/src/infrastructure/aoi_reader.rs
//
// Normalizes the four accepted AOI input forms into a validated `Aoi`.
// Parse failures of any form are InvalidAoi: the run is rejected before a
// run directory is created.

use crate::domain::aoi::{Aoi, AoiInput};
use crate::domain::error::DomainError;
use crate::infrastructure::crs::Projector;
use crate::infrastructure::geodata;
use geo::{Geometry, GeometryCollection, Polygon};
use std::path::Path;
use tracing::instrument;
use wkt::TryFromWkt;

#[instrument(skip(input, projector))]
pub fn load_aoi(input: &AoiInput, projector: &Projector) -> Result<Aoi, DomainError> {
    let geometry = match input {
        AoiInput::GeoJson(value) => geometry_from_geojson(value)?,
        AoiInput::Wkt(text) => Geometry::<f64>::try_from_wkt_str(text)
            .map_err(|e| DomainError::InvalidAoi(format!("unparsable WKT: {e}")))?,
        AoiInput::Path(path) => geometry_from_path(path)?,
    };

    let wgs84 = Aoi::flatten_polygons(geometry)?;
    let working = wgs84
        .iter()
        .map(|polygon| reproject(polygon, projector))
        .collect::<Result<Vec<_>, _>>()?;

    Aoi::new(wgs84, working, projector.working_crs.clone())
}

fn reproject(polygon: &Polygon<f64>, projector: &Projector) -> Result<Polygon<f64>, DomainError> {
    projector
        .polygon_to_working(polygon)
        .map_err(|e| DomainError::InvalidAoi(format!("reprojection failed: {e}")))
}

fn geometry_from_geojson(value: &serde_json::Value) -> Result<Geometry<f64>, DomainError> {
    let text = value.to_string();
    let records = geodata::parse_geojson_str(&text)
        .map_err(|e| DomainError::InvalidAoi(format!("unparsable GeoJSON: {e}")))?;
    collection_of(records)
}

fn geometry_from_path(path: &Path) -> Result<Geometry<f64>, DomainError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let records = match ext.as_str() {
        "geojson" | "json" => geodata::read_geojson(path),
        "shp" => geodata::read_shapefile(path),
        "wkt" | "txt" => geodata::read_wkt_lines(path),
        other => {
            return Err(DomainError::InvalidAoi(format!(
                "unsupported AOI file extension '{other}'"
            )));
        }
    }
    .map_err(|e| DomainError::InvalidAoi(format!("unreadable AOI file: {e}")))?;

    collection_of(records)
}

fn collection_of(records: Vec<geodata::GeoRecord>) -> Result<Geometry<f64>, DomainError> {
    if records.is_empty() {
        return Err(DomainError::InvalidAoi("input contains no geometry".into()));
    }
    Ok(Geometry::GeometryCollection(GeometryCollection(
        records.into_iter().map(|r| r.geometry).collect(),
    )))
}
