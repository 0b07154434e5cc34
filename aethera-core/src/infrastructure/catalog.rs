// aethera-core/src/infrastructure/catalog.rs
//
// The dataset catalog (metadata only, never opens a dataset). The data
// tree is walked exactly once per process; `locate` answers from the
// in-memory index with the country-specific > continental > prefix
// fallback resolution order.

use crate::domain::dataset::{
    DatasetAvailability, DatasetDescriptor, DatasetFormat, LOGICAL_DATASETS,
};
use crate::domain::error::DomainError;
use crate::infrastructure::error::InfrastructureError;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info, instrument};
use walkdir::WalkDir;

#[derive(Debug, Clone)]
struct CatalogEntry {
    stem: String,
    stem_lower: String,
    path: PathBuf,
    format: DatasetFormat,
}

#[derive(Debug)]
pub struct DataCatalog {
    datasets_dir: PathBuf,
    entries: Vec<CatalogEntry>,
}

impl DataCatalog {
    /// Walk `<data_root>/datasets` once and build the index.
    #[instrument(skip(data_root))]
    pub fn scan(data_root: &Path) -> Result<Self, InfrastructureError> {
        let datasets_dir = data_root.join("datasets");
        let mut entries = Vec::new();

        if datasets_dir.exists() {
            for entry in WalkDir::new(&datasets_dir)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let path = entry.path();
                if !path.is_file() {
                    continue;
                }
                let Some(format) = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .and_then(DatasetFormat::from_extension)
                else {
                    continue;
                };
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                entries.push(CatalogEntry {
                    stem: stem.to_string(),
                    stem_lower: stem.to_ascii_lowercase(),
                    path: path.to_path_buf(),
                    format,
                });
            }
        }

        // Deterministic resolution independent of walk order.
        entries.sort_by(|a, b| a.stem.cmp(&b.stem).then_with(|| a.path.cmp(&b.path)));
        info!(count = entries.len(), dir = ?datasets_dir, "Dataset catalog indexed");

        Ok(Self {
            datasets_dir,
            entries,
        })
    }

    pub fn datasets_dir(&self) -> &Path {
        &self.datasets_dir
    }

    /// Resolve a logical dataset. Resolution order:
    /// (a) `<name>_<ISO3>`, (b) `<name>`, (c) case-insensitive stem prefix.
    pub fn locate(
        &self,
        name: &str,
        country: Option<&str>,
        required: bool,
    ) -> Result<Option<DatasetDescriptor>, DomainError> {
        let candidate = self.resolve(name, country);

        match candidate {
            Some(entry) => {
                let descriptor = self.describe(name, country, entry).map_err(|e| {
                    DomainError::DatasetCorrupt {
                        name: name.to_string(),
                        reason: e.to_string(),
                    }
                })?;
                Ok(Some(descriptor))
            }
            None if required => Err(DomainError::DatasetMissing(name.to_string())),
            None => Ok(None),
        }
    }

    fn resolve(&self, name: &str, country: Option<&str>) -> Option<&CatalogEntry> {
        if let Some(iso3) = country {
            let wanted = format!("{name}_{}", iso3.to_ascii_uppercase());
            if let Some(entry) = self.entries.iter().find(|e| e.stem == wanted) {
                debug!(dataset = name, path = ?entry.path, "country-specific hit");
                return Some(entry);
            }
        }
        if let Some(entry) = self.entries.iter().find(|e| e.stem == name) {
            return Some(entry);
        }
        // Prefix fallback: shortest stem wins, index order breaks ties.
        let prefix = name.to_ascii_lowercase();
        self.entries
            .iter()
            .filter(|e| e.stem_lower.starts_with(&prefix))
            .min_by_key(|e| e.stem.len())
    }

    fn describe(
        &self,
        name: &str,
        country: Option<&str>,
        entry: &CatalogEntry,
    ) -> Result<DatasetDescriptor, InfrastructureError> {
        let metadata = fs::metadata(&entry.path)?;
        let mtime_unix = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        // Optional `<stem>.crs` sidecar declares a non-default source CRS.
        let crs_sidecar = entry.path.with_extension("crs");
        let crs = fs::read_to_string(&crs_sidecar)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let matched_country = country
            .map(|c| c.to_ascii_uppercase())
            .filter(|iso3| entry.stem == format!("{name}_{iso3}"));

        Ok(DatasetDescriptor {
            logical_name: name.to_string(),
            country: matched_country,
            path: entry.path.clone(),
            format: entry.format,
            mtime_unix,
            size_bytes: metadata.len(),
            crs,
        })
    }

    /// The availability table persisted as `dataset_availability.json`.
    pub fn availability_report(
        &self,
        country: Option<&str>,
    ) -> BTreeMap<String, DatasetAvailability> {
        let mut report = BTreeMap::new();
        for logical in LOGICAL_DATASETS {
            let located = self.resolve(logical.name, country);
            report.insert(
                logical.name.to_string(),
                DatasetAvailability {
                    present: located.is_some(),
                    path: located.map(|e| e.path.clone()),
                    required: logical.requirement.is_required(),
                },
            );
        }
        report
    }

    /// Fail-fast check used at run start (step 4 of the orchestration).
    pub fn ensure_required_present(&self, country: Option<&str>) -> Result<(), DomainError> {
        for logical in LOGICAL_DATASETS {
            if logical.requirement.is_required() && self.resolve(logical.name, country).is_none() {
                return Err(DomainError::DatasetMissing(logical.name.to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    fn seed(dir: &Path, files: &[&str]) -> Result<()> {
        let datasets = dir.join("datasets");
        fs::create_dir_all(&datasets)?;
        for f in files {
            fs::write(datasets.join(f), "{}")?;
        }
        Ok(())
    }

    #[test]
    fn test_country_specific_beats_continental() -> Result<()> {
        let dir = tempdir()?;
        seed(
            dir.path(),
            &["natura2000.geojson", "natura2000_ITA.geojson"],
        )?;
        let catalog = DataCatalog::scan(dir.path())?;

        let hit = catalog.locate("natura2000", Some("ITA"), true)?.unwrap();
        assert_eq!(hit.country.as_deref(), Some("ITA"));
        assert!(hit.path.ends_with("natura2000_ITA.geojson"));

        let continental = catalog.locate("natura2000", Some("GRC"), true)?.unwrap();
        assert_eq!(continental.country, None);
        assert!(continental.path.ends_with("natura2000.geojson"));
        Ok(())
    }

    #[test]
    fn test_prefix_fallback_prefers_shortest_stem() -> Result<()> {
        let dir = tempdir()?;
        seed(
            dir.path(),
            &["corine_land_cover_clc2018_v2.geojson", "corine_land_cover_clc2018.geojson"],
        )?;
        let catalog = DataCatalog::scan(dir.path())?;
        let hit = catalog.locate("corine_land_cover", None, true)?.unwrap();
        assert!(hit.path.ends_with("corine_land_cover_clc2018.geojson"));
        Ok(())
    }

    #[test]
    fn test_missing_required_dataset_is_fatal() -> Result<()> {
        let dir = tempdir()?;
        seed(dir.path(), &["settlements.csv"])?;
        let catalog = DataCatalog::scan(dir.path())?;

        assert!(catalog.locate("corine_land_cover", None, false)?.is_none());
        let err = catalog.locate("corine_land_cover", None, true).unwrap_err();
        assert!(matches!(err, DomainError::DatasetMissing(_)));
        assert!(catalog.ensure_required_present(None).is_err());
        Ok(())
    }

    #[test]
    fn test_availability_report_covers_logical_table() -> Result<()> {
        let dir = tempdir()?;
        seed(dir.path(), &["corine_land_cover.geojson", "wdpa.shp"])?;
        let catalog = DataCatalog::scan(dir.path())?;
        let report = catalog.availability_report(None);

        assert_eq!(report.len(), LOGICAL_DATASETS.len());
        assert!(report["corine_land_cover"].present);
        assert!(report["corine_land_cover"].required);
        assert!(report["wdpa"].present);
        assert!(!report["natura2000"].present);
        assert!(!report["natura2000"].required);
        Ok(())
    }

    #[test]
    fn test_crs_sidecar_is_attached() -> Result<()> {
        let dir = tempdir()?;
        seed(dir.path(), &["water_bodies.csv"])?;
        fs::write(
            dir.path().join("datasets").join("water_bodies.crs"),
            "EPSG:3035\n",
        )?;
        let catalog = DataCatalog::scan(dir.path())?;
        let hit = catalog.locate("water_bodies", None, true)?.unwrap();
        assert_eq!(hit.crs.as_deref(), Some("EPSG:3035"));
        Ok(())
    }
}
