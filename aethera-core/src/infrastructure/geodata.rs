// aethera-core/src/infrastructure/geodata.rs
//
// In-memory vector datasets and the per-format readers behind the cache.
// Properties use a bincode-friendly scalar enum rather than raw JSON so the
// disk cache tier can rehydrate entries without a self-describing format.

use crate::domain::dataset::{DatasetDescriptor, DatasetFormat};
use crate::infrastructure::error::InfrastructureError;
use geo::{BoundingRect, Geometry, Intersects, Rect};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use wkt::TryFromWkt;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum PropValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl PropValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropValue::Int(i) => Some(*i as f64),
            PropValue::Float(f) => Some(*f),
            PropValue::Text(t) => t.parse().ok(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropValue::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PropValue::Null => serde_json::Value::Null,
            PropValue::Bool(b) => serde_json::Value::from(*b),
            PropValue::Int(i) => serde_json::Value::from(*i),
            PropValue::Float(f) => serde_json::Value::from(*f),
            PropValue::Text(t) => serde_json::Value::from(t.clone()),
        }
    }

    fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => PropValue::Null,
            serde_json::Value::Bool(b) => PropValue::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => PropValue::Int(i),
                None => PropValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => PropValue::Text(s.clone()),
            other => PropValue::Text(other.to_string()),
        }
    }
}

/// Property keys tried, in order, when a record identifier is needed
/// (receptor tie-breaks, protected-site dedup).
const ID_KEYS: &[&str] = &[
    "id", "ID", "site_id", "SITECODE", "sitecode", "WDPAID", "wdpa_id", "GEOID", "code", "name",
    "NAME",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeoRecord {
    pub index: usize,
    pub properties: BTreeMap<String, PropValue>,
    pub geometry: Geometry<f64>,
}

impl GeoRecord {
    /// Stable identifier for dedup and deterministic tie-breaking.
    pub fn identifier(&self) -> String {
        for key in ID_KEYS {
            if let Some(v) = self.properties.get(*key) {
                match v {
                    PropValue::Text(t) if !t.is_empty() => return t.clone(),
                    PropValue::Int(i) => return i.to_string(),
                    PropValue::Float(f) => return f.to_string(),
                    _ => {}
                }
            }
        }
        format!("#{}", self.index)
    }
}

/// A loaded, possibly AOI-filtered dataset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureSet {
    pub logical_name: String,
    pub crs: String,
    pub records: Vec<GeoRecord>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Keep records whose bounding box intersects `bbox`.
    pub fn filter_bbox(&self, bbox: &Rect<f64>) -> FeatureSet {
        let records = self
            .records
            .iter()
            .filter(|r| {
                r.geometry
                    .bounding_rect()
                    .is_some_and(|rect| rect.intersects(bbox))
            })
            .cloned()
            .collect();
        FeatureSet {
            logical_name: self.logical_name.clone(),
            crs: self.crs.clone(),
            records,
        }
    }

    /// Apply a `field=value` equality filter (the only supported
    /// expression form).
    pub fn filter_expr(&self, expr: &str) -> Result<FeatureSet, InfrastructureError> {
        let (field, expected) = expr.split_once('=').ok_or_else(|| {
            InfrastructureError::Geodata {
                format: "filter".into(),
                reason: format!("unsupported filter expression '{expr}' (expected field=value)"),
            }
        })?;
        let field = field.trim();
        let expected = expected.trim();
        let records = self
            .records
            .iter()
            .filter(|r| match r.properties.get(field) {
                Some(PropValue::Text(t)) => t == expected,
                Some(other) => other
                    .as_f64()
                    .zip(expected.parse::<f64>().ok())
                    .is_some_and(|(a, b)| (a - b).abs() < 1e-9),
                None => false,
            })
            .cloned()
            .collect();
        Ok(FeatureSet {
            logical_name: self.logical_name.clone(),
            crs: self.crs.clone(),
            records,
        })
    }

    /// Approximate in-memory footprint, used by the cache byte accounting.
    pub fn approx_size_bytes(&self) -> u64 {
        bincode::serialized_size(self).unwrap_or(0)
    }
}

// --- READERS ---

/// Load a dataset described by the catalog. The descriptor's declared CRS
/// defaults to EPSG:4326 when unspecified.
pub fn load_dataset(descriptor: &DatasetDescriptor) -> Result<FeatureSet, InfrastructureError> {
    let crs = descriptor.crs.clone().unwrap_or_else(|| "EPSG:4326".to_string());
    let records = match descriptor.format {
        DatasetFormat::GeoJson => read_geojson(&descriptor.path)?,
        DatasetFormat::Shapefile => read_shapefile(&descriptor.path)?,
        DatasetFormat::CsvWkt => read_csv_wkt(&descriptor.path)?,
        DatasetFormat::WktText => read_wkt_lines(&descriptor.path)?,
    };
    Ok(FeatureSet {
        logical_name: descriptor.logical_name.clone(),
        crs,
        records,
    })
}

fn geodata_err(format: &str, reason: impl ToString) -> InfrastructureError {
    InfrastructureError::Geodata {
        format: format.to_string(),
        reason: reason.to_string(),
    }
}

pub fn read_geojson(path: &Path) -> Result<Vec<GeoRecord>, InfrastructureError> {
    let content = fs::read_to_string(path)?;
    parse_geojson_str(&content)
}

pub fn parse_geojson_str(content: &str) -> Result<Vec<GeoRecord>, InfrastructureError> {
    let parsed: geojson::GeoJson = content
        .parse()
        .map_err(|e| geodata_err("geojson", e))?;

    let mut records = Vec::new();
    match parsed {
        geojson::GeoJson::FeatureCollection(fc) => {
            for feature in fc.features {
                push_feature(&mut records, feature)?;
            }
        }
        geojson::GeoJson::Feature(feature) => push_feature(&mut records, feature)?,
        geojson::GeoJson::Geometry(geometry) => {
            let geom = Geometry::<f64>::try_from(geometry.value)
                .map_err(|e| geodata_err("geojson", e))?;
            records.push(GeoRecord {
                index: 0,
                properties: BTreeMap::new(),
                geometry: geom,
            });
        }
    }
    Ok(records)
}

fn push_feature(
    records: &mut Vec<GeoRecord>,
    feature: geojson::Feature,
) -> Result<(), InfrastructureError> {
    let Some(geometry) = feature.geometry else {
        return Ok(()); // empty features are filtered
    };
    let geom =
        Geometry::<f64>::try_from(geometry.value).map_err(|e| geodata_err("geojson", e))?;
    let mut properties = BTreeMap::new();
    if let Some(props) = feature.properties {
        for (k, v) in props {
            properties.insert(k, PropValue::from_json(&v));
        }
    }
    records.push(GeoRecord {
        index: records.len(),
        properties,
        geometry: geom,
    });
    Ok(())
}

pub fn read_shapefile(path: &Path) -> Result<Vec<GeoRecord>, InfrastructureError> {
    let pairs = shapefile::read(path).map_err(|e| geodata_err("shapefile", e))?;
    let mut records = Vec::new();
    for (shape, record) in pairs {
        let Some(geometry) = shape_to_geometry(shape) else {
            continue;
        };
        let mut properties = BTreeMap::new();
        for (name, value) in record {
            properties.insert(name, field_to_prop(value));
        }
        records.push(GeoRecord {
            index: records.len(),
            properties,
            geometry,
        });
    }
    Ok(records)
}

fn shape_to_geometry(shape: shapefile::Shape) -> Option<Geometry<f64>> {
    use shapefile::Shape;
    match shape {
        Shape::Point(p) => Some(Geometry::Point(geo::Point::from(p))),
        Shape::Multipoint(mp) => Some(Geometry::MultiPoint(geo::MultiPoint::from(mp))),
        Shape::Polyline(l) => Some(Geometry::MultiLineString(geo::MultiLineString::from(l))),
        Shape::Polygon(p) => Some(Geometry::MultiPolygon(geo::MultiPolygon::from(p))),
        _ => None,
    }
}

fn field_to_prop(value: shapefile::dbase::FieldValue) -> PropValue {
    use shapefile::dbase::FieldValue;
    match value {
        FieldValue::Character(Some(s)) => PropValue::Text(s),
        FieldValue::Character(None) => PropValue::Null,
        FieldValue::Numeric(Some(n)) => PropValue::Float(n),
        FieldValue::Numeric(None) => PropValue::Null,
        FieldValue::Float(Some(f)) => PropValue::Float(f as f64),
        FieldValue::Float(None) => PropValue::Null,
        FieldValue::Integer(i) => PropValue::Int(i as i64),
        FieldValue::Double(d) => PropValue::Float(d),
        FieldValue::Logical(Some(b)) => PropValue::Bool(b),
        FieldValue::Logical(None) => PropValue::Null,
        other => PropValue::Text(format!("{other:?}")),
    }
}

/// CSV with a WKT geometry column (named `wkt` or `geometry`, any case).
pub fn read_csv_wkt(path: &Path) -> Result<Vec<GeoRecord>, InfrastructureError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| geodata_err("csv", e))?;
    let headers = reader
        .headers()
        .map_err(|e| geodata_err("csv", e))?
        .clone();
    let geometry_col = headers
        .iter()
        .position(|h| matches!(h.to_ascii_lowercase().as_str(), "wkt" | "geometry"))
        .ok_or_else(|| geodata_err("csv", "no 'wkt' or 'geometry' column"))?;

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| geodata_err("csv", e))?;
        let Some(wkt_text) = row.get(geometry_col) else {
            continue;
        };
        let geometry = Geometry::<f64>::try_from_wkt_str(wkt_text)
            .map_err(|e| geodata_err("csv", format!("bad WKT: {e}")))?;
        let mut properties = BTreeMap::new();
        for (i, header) in headers.iter().enumerate() {
            if i == geometry_col {
                continue;
            }
            let raw = row.get(i).unwrap_or_default();
            let prop = match raw.parse::<i64>() {
                Ok(int) => PropValue::Int(int),
                Err(_) => match raw.parse::<f64>() {
                    Ok(float) => PropValue::Float(float),
                    Err(_) if raw.is_empty() => PropValue::Null,
                    Err(_) => PropValue::Text(raw.to_string()),
                },
            };
            properties.insert(header.to_string(), prop);
        }
        records.push(GeoRecord {
            index: records.len(),
            properties,
            geometry,
        });
    }
    Ok(records)
}

/// One WKT geometry per line; `#` starts a comment.
pub fn read_wkt_lines(path: &Path) -> Result<Vec<GeoRecord>, InfrastructureError> {
    let content = fs::read_to_string(path)?;
    let mut records = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let geometry = Geometry::<f64>::try_from_wkt_str(line)
            .map_err(|e| geodata_err("wkt", format!("line {}: {e}", records.len() + 1)))?;
        records.push(GeoRecord {
            index: records.len(),
            properties: BTreeMap::new(),
            geometry,
        });
    }
    Ok(records)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use geo::Coord;
    use tempfile::tempdir;

    const FC: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature",
             "properties": {"SITECODE": "IT123", "area_ha": 10.5},
             "geometry": {"type": "Polygon",
                          "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
            {"type": "Feature",
             "properties": {"SITECODE": "IT456"},
             "geometry": {"type": "Point", "coordinates": [5, 5]}}
        ]
    }"#;

    #[test]
    fn test_parse_geojson_collection() {
        let records = parse_geojson_str(FC).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].identifier(), "IT123");
        assert_eq!(records[0].properties["area_ha"].as_f64(), Some(10.5));
        assert!(matches!(records[1].geometry, Geometry::Point(_)));
    }

    #[test]
    fn test_filter_bbox() {
        let set = FeatureSet {
            logical_name: "demo".into(),
            crs: "EPSG:4326".into(),
            records: parse_geojson_str(FC).unwrap(),
        };
        let bbox = Rect::new(Coord { x: -1.0, y: -1.0 }, Coord { x: 2.0, y: 2.0 });
        let filtered = set.filter_bbox(&bbox);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.records[0].identifier(), "IT123");
    }

    #[test]
    fn test_filter_expr_on_text_and_numbers() {
        let set = FeatureSet {
            logical_name: "demo".into(),
            crs: "EPSG:4326".into(),
            records: parse_geojson_str(FC).unwrap(),
        };
        assert_eq!(set.filter_expr("SITECODE=IT456").unwrap().len(), 1);
        assert_eq!(set.filter_expr("area_ha=10.5").unwrap().len(), 1);
        assert_eq!(set.filter_expr("area_ha=99").unwrap().len(), 0);
        assert!(set.filter_expr("garbage").is_err());
    }

    #[test]
    fn test_read_csv_wkt_and_wkt_lines() -> Result<()> {
        let dir = tempdir()?;
        let csv_path = dir.path().join("receptors.csv");
        fs::write(
            &csv_path,
            "name,population,wkt\nvillage_a,1200,POINT(4 4)\nvillage_b,90,POINT(8 1)\n",
        )?;
        let records = read_csv_wkt(&csv_path)?;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].properties["name"].as_text(), Some("village_a"));
        assert_eq!(records[0].properties["population"].as_f64(), Some(1200.0));

        let wkt_path = dir.path().join("aoi.wkt");
        fs::write(
            &wkt_path,
            "# comment line\nPOLYGON((0 0,1 0,1 1,0 1,0 0))\n\nPOINT(2 2)\n",
        )?;
        let records = read_wkt_lines(&wkt_path)?;
        assert_eq!(records.len(), 2);
        Ok(())
    }

    #[test]
    fn test_bincode_round_trip_for_disk_tier() {
        let set = FeatureSet {
            logical_name: "demo".into(),
            crs: "EPSG:4326".into(),
            records: parse_geojson_str(FC).unwrap(),
        };
        let bytes = bincode::serialize(&set).unwrap();
        let back: FeatureSet = bincode::deserialize(&bytes).unwrap();
        assert_eq!(set, back);
        assert!(set.approx_size_bytes() > 0);
    }
}
