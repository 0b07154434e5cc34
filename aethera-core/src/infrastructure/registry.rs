// aethera-core/src/infrastructure/registry.rs
//
// Append-only JSONL ledgers for projects and runs. Writes are serialized
// by a mutex and flushed before returning; reads re-scan the ledger with
// last-record-per-id-wins semantics. Nothing is ever rewritten in place.

use crate::domain::run::{ProjectRecord, RunRecord, RunStatus};
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::fs::ensure_dir;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

fn append_record<T: Serialize>(
    lock: &Mutex<()>,
    path: &Path,
    record: &T,
) -> Result<(), InfrastructureError> {
    let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let mut line = serde_json::to_string(record)?;
    line.push('\n');
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    // Durability contract: the record survives a crash after we return.
    file.sync_all()?;
    Ok(())
}

fn scan_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, InfrastructureError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    let mut out = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        // A torn trailing line (crash mid-append) is skipped, not fatal.
        if let Ok(record) = serde_json::from_str::<T>(line) {
            out.push(record);
        }
    }
    Ok(out)
}

// --- PROJECTS ---

#[derive(Debug)]
pub struct ProjectRegistry {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ProjectRegistry {
    pub fn new(registry_root: &Path) -> Self {
        Self {
            path: registry_root.join("projects.jsonl"),
            write_lock: Mutex::new(()),
        }
    }

    pub fn create_project(&self, record: &ProjectRecord) -> Result<(), InfrastructureError> {
        append_record(&self.write_lock, &self.path, record)
    }

    pub fn get(&self, id: &str) -> Result<Option<ProjectRecord>, InfrastructureError> {
        Ok(self.latest_by_id()?.remove(id))
    }

    pub fn list(&self) -> Result<Vec<ProjectRecord>, InfrastructureError> {
        Ok(self.latest_by_id()?.into_values().collect())
    }

    fn latest_by_id(&self) -> Result<BTreeMap<String, ProjectRecord>, InfrastructureError> {
        let mut map = BTreeMap::new();
        for record in scan_records::<ProjectRecord>(&self.path)? {
            map.insert(record.id.clone(), record);
        }
        Ok(map)
    }
}

// --- RUNS ---

#[derive(Debug)]
pub struct RunRegistry {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl RunRegistry {
    pub fn new(registry_root: &Path) -> Self {
        Self {
            path: registry_root.join("runs.jsonl"),
            write_lock: Mutex::new(()),
        }
    }

    /// Append a run state record. Terminal states supersede earlier
    /// records for the same run id; nothing is rolled back.
    pub fn record(&self, record: &RunRecord) -> Result<(), InfrastructureError> {
        append_record(&self.write_lock, &self.path, record)
    }

    pub fn get(&self, run_id: &str) -> Result<Option<RunRecord>, InfrastructureError> {
        Ok(self.latest_by_id()?.remove(run_id))
    }

    pub fn list_for_project(&self, project_id: &str) -> Result<Vec<RunRecord>, InfrastructureError> {
        Ok(self
            .latest_by_id()?
            .into_values()
            .filter(|r| r.project_id == project_id)
            .collect())
    }

    pub fn completed_for_project(
        &self,
        project_id: &str,
    ) -> Result<Vec<RunRecord>, InfrastructureError> {
        Ok(self
            .list_for_project(project_id)?
            .into_iter()
            .filter(|r| r.status == RunStatus::Completed)
            .collect())
    }

    fn latest_by_id(&self) -> Result<BTreeMap<String, RunRecord>, InfrastructureError> {
        let mut map = BTreeMap::new();
        for record in scan_records::<RunRecord>(&self.path)? {
            map.insert(record.run_id.clone(), record);
        }
        Ok(map)
    }
}
