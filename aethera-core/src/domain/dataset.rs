// aethera-core/src/domain/dataset.rs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Vector formats the catalog enumerates and the loaders understand.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DatasetFormat {
    GeoJson,
    Shapefile,
    CsvWkt,
    WktText,
}

impl DatasetFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "geojson" | "json" => Some(Self::GeoJson),
            "shp" => Some(Self::Shapefile),
            "csv" => Some(Self::CsvWkt),
            "wkt" => Some(Self::WktText),
            _ => None,
        }
    }
}

/// Whether a stage treats a dataset as required or optional.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Requirement {
    Required,
    Optional,
}

impl Requirement {
    pub fn is_required(self) -> bool {
        matches!(self, Requirement::Required)
    }
}

/// Metadata-only handle on a discovered dataset. The catalog never opens
/// the file; mtime/size feed the cache fingerprint.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DatasetDescriptor {
    pub logical_name: String,
    /// ISO 3166-1 alpha-3 when the file is a country-specific pre-clip.
    pub country: Option<String>,
    pub path: PathBuf,
    pub format: DatasetFormat,
    pub mtime_unix: i64,
    pub size_bytes: u64,
    /// Declared CRS of the source when known (sidecar or convention).
    pub crs: Option<String>,
}

/// One line of the availability report persisted as
/// `dataset_availability.json`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DatasetAvailability {
    pub present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    pub required: bool,
}

/// The logical dataset table: which names the platform knows about and
/// which of them are required for a given project type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalDataset {
    pub name: &'static str,
    pub requirement: Requirement,
}

/// Every project type currently shares the same dataset contract: land
/// cover is the only hard requirement, everything else degrades to a
/// recorded stage skip.
pub const LOGICAL_DATASETS: &[LogicalDataset] = &[
    LogicalDataset {
        name: "corine_land_cover",
        requirement: Requirement::Required,
    },
    LogicalDataset {
        name: "natura2000",
        requirement: Requirement::Optional,
    },
    LogicalDataset {
        name: "wdpa",
        requirement: Requirement::Optional,
    },
    LogicalDataset {
        name: "settlements",
        requirement: Requirement::Optional,
    },
    LogicalDataset {
        name: "water_bodies",
        requirement: Requirement::Optional,
    },
    LogicalDataset {
        name: "admin_boundaries",
        requirement: Requirement::Optional,
    },
    LogicalDataset {
        name: "nuts_regions",
        requirement: Requirement::Optional,
    },
];
