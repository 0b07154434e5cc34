// aethera-core/src/infrastructure/cache.rs
//
// Process-wide two-tier dataset cache. Memory tier: LRU under a byte
// ceiling. Disk tier: content-addressed bincode blobs with TTL + size cap.
// Single-flight per fingerprint: concurrent loads share one build and, on
// failure, share the same error; the in-flight marker is always released.

use crate::domain::dataset::DatasetDescriptor;
use crate::error::AetheraError;
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::geodata::{self, FeatureSet};
use dashmap::DashMap;
use geo::Rect;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, UNIX_EPOCH};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

type BuildOutcome = Result<Arc<FeatureSet>, String>;

#[derive(Debug, Default)]
struct MemoryTier {
    entries: HashMap<String, MemEntry>,
    bytes: u64,
    tick: u64,
}

#[derive(Debug)]
struct MemEntry {
    data: Arc<FeatureSet>,
    size: u64,
    last_access: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CacheStats {
    pub entries: usize,
    pub bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub build_count: u64,
}

pub struct DatasetCache {
    disk_root: PathBuf,
    memory_ceiling: u64,
    disk_ceiling: u64,
    disk_ttl: Duration,
    memory: Mutex<MemoryTier>,
    inflight: DashMap<String, Arc<OnceCell<BuildOutcome>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    builds: AtomicU64,
}

impl DatasetCache {
    pub fn new(
        disk_root: PathBuf,
        memory_ceiling: u64,
        disk_ceiling: u64,
        disk_ttl: Duration,
    ) -> Self {
        Self {
            disk_root,
            memory_ceiling,
            disk_ceiling,
            disk_ttl,
            memory: Mutex::new(MemoryTier::default()),
            inflight: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            builds: AtomicU64::new(0),
        }
    }

    /// Stable fingerprint: path ‖ mtime ‖ size ‖ bbox (1 m rounding) ‖ filter.
    pub fn fingerprint(
        descriptor: &DatasetDescriptor,
        bbox: Option<&Rect<f64>>,
        filter_expr: Option<&str>,
    ) -> String {
        let mut hasher = Sha256::new();
        hasher.update(descriptor.path.to_string_lossy().as_bytes());
        hasher.update(descriptor.mtime_unix.to_le_bytes());
        hasher.update(descriptor.size_bytes.to_le_bytes());
        if let Some(rect) = bbox {
            for v in [rect.min().x, rect.min().y, rect.max().x, rect.max().y] {
                hasher.update(round_coord(v).to_le_bytes());
            }
        }
        if let Some(expr) = filter_expr {
            hasher.update(expr.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    /// Load an AOI-filtered dataset, building at most once per fingerprint
    /// across concurrent callers.
    pub async fn load(
        &self,
        descriptor: &DatasetDescriptor,
        bbox: Option<Rect<f64>>,
        filter_expr: Option<String>,
    ) -> Result<Arc<FeatureSet>, AetheraError> {
        let fingerprint = Self::fingerprint(descriptor, bbox.as_ref(), filter_expr.as_deref());

        if let Some(found) = self.memory_get(&fingerprint) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(found);
        }

        let cell = self
            .inflight
            .entry(fingerprint.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let outcome = cell
            .get_or_init(|| {
                self.resolve(&fingerprint, descriptor, bbox.as_ref(), filter_expr.as_deref())
            })
            .await
            .clone();

        // Always release the in-flight marker: success lives in the tiers,
        // failure must not poison later (non-concurrent) rebuilds.
        self.inflight
            .remove_if(&fingerprint, |_, existing| Arc::ptr_eq(existing, &cell));

        outcome.map_err(|message| {
            AetheraError::Infrastructure(InfrastructureError::Cache(message))
        })
    }

    /// Memory -> disk -> source, recording tier stats. Runs inside the
    /// single-flight cell, so at most once per fingerprint at a time.
    async fn resolve(
        &self,
        fingerprint: &str,
        descriptor: &DatasetDescriptor,
        bbox: Option<&Rect<f64>>,
        filter_expr: Option<&str>,
    ) -> BuildOutcome {
        if let Some(found) = self.memory_get(fingerprint) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(found);
        }
        if let Some(found) = self.disk_get(fingerprint) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            self.memory_put(fingerprint, found.clone());
            return Ok(found);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        self.builds.fetch_add(1, Ordering::Relaxed);
        debug!(%fingerprint, path = ?descriptor.path, "cache build");

        let built = self
            .build(descriptor, bbox, filter_expr)
            .map_err(|e| e.to_string())?;
        let built = Arc::new(built);
        self.memory_put(fingerprint, built.clone());
        self.disk_put(fingerprint, &built);
        Ok(built)
    }

    fn build(
        &self,
        descriptor: &DatasetDescriptor,
        bbox: Option<&Rect<f64>>,
        filter_expr: Option<&str>,
    ) -> Result<FeatureSet, AetheraError> {
        let mut set = geodata::load_dataset(descriptor)?;
        if let Some(rect) = bbox {
            set = set.filter_bbox(rect);
        }
        if let Some(expr) = filter_expr {
            set = set.filter_expr(expr)?;
        }
        Ok(set)
    }

    // --- MEMORY TIER ---

    fn memory_get(&self, fingerprint: &str) -> Option<Arc<FeatureSet>> {
        let mut tier = self.memory.lock().unwrap_or_else(|e| e.into_inner());
        tier.tick += 1;
        let tick = tier.tick;
        let entry = tier.entries.get_mut(fingerprint)?;
        entry.last_access = tick;
        Some(entry.data.clone())
    }

    fn memory_put(&self, fingerprint: &str, data: Arc<FeatureSet>) {
        let size = data.approx_size_bytes();
        let mut tier = self.memory.lock().unwrap_or_else(|e| e.into_inner());
        tier.tick += 1;
        let tick = tier.tick;
        if let Some(old) = tier.entries.insert(
            fingerprint.to_string(),
            MemEntry {
                data,
                size,
                last_access: tick,
            },
        ) {
            tier.bytes = tier.bytes.saturating_sub(old.size);
        }
        tier.bytes += size;

        // LRU eviction down to the byte ceiling.
        while tier.bytes > self.memory_ceiling && tier.entries.len() > 1 {
            let Some(victim) = tier
                .entries
                .iter()
                .filter(|(k, _)| k.as_str() != fingerprint)
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            if let Some(evicted) = tier.entries.remove(&victim) {
                tier.bytes = tier.bytes.saturating_sub(evicted.size);
            }
        }
    }

    // --- DISK TIER ---

    fn blob_path(&self, fingerprint: &str) -> PathBuf {
        self.disk_root.join(format!("{fingerprint}.bin"))
    }

    fn disk_get(&self, fingerprint: &str) -> Option<Arc<FeatureSet>> {
        let path = self.blob_path(fingerprint);
        let bytes = fs::read(&path).ok()?;
        match bincode::deserialize::<FeatureSet>(&bytes) {
            Ok(set) => {
                // Refresh the access time by rewriting the blob.
                let _ = fs::write(&path, &bytes);
                Some(Arc::new(set))
            }
            Err(e) => {
                // Corruption counts as a miss: drop the blob and rebuild.
                warn!(%fingerprint, error = %e, "corrupt cache blob dropped");
                let _ = fs::remove_file(&path);
                None
            }
        }
    }

    fn disk_put(&self, fingerprint: &str, data: &FeatureSet) {
        if fs::create_dir_all(&self.disk_root).is_err() {
            return;
        }
        if let Ok(bytes) = bincode::serialize(data) {
            let _ = fs::write(self.blob_path(fingerprint), bytes);
        }
        self.disk_sweep();
    }

    /// TTL expiry, then oldest-first eviction down to the size ceiling.
    fn disk_sweep(&self) {
        let Ok(dir) = fs::read_dir(&self.disk_root) else {
            return;
        };
        let now = std::time::SystemTime::now();
        let mut blobs: Vec<(PathBuf, u64, Duration)> = Vec::new();
        for entry in dir.filter_map(|e| e.ok()) {
            let path = entry.path();
            let Ok(meta) = entry.metadata() else { continue };
            let age = meta
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if age > self.disk_ttl {
                let _ = fs::remove_file(&path);
                continue;
            }
            blobs.push((path, meta.len(), age));
        }

        let mut total: u64 = blobs.iter().map(|(_, size, _)| size).sum();
        if total <= self.disk_ceiling {
            return;
        }
        blobs.sort_by_key(|(_, _, age)| std::cmp::Reverse(*age));
        for (path, size, _) in blobs {
            if total <= self.disk_ceiling {
                break;
            }
            if fs::remove_file(&path).is_ok() {
                total = total.saturating_sub(size);
            }
        }
    }

    // --- OPERATIONAL CONTROL ---

    pub fn stats(&self) -> CacheStats {
        let tier = self.memory.lock().unwrap_or_else(|e| e.into_inner());
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            entries: tier.entries.len(),
            bytes: tier.bytes,
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
            build_count: self.builds.load(Ordering::Relaxed),
        }
    }

    pub fn clear(&self) {
        {
            let mut tier = self.memory.lock().unwrap_or_else(|e| e.into_inner());
            tier.entries.clear();
            tier.bytes = 0;
        }
        if let Ok(dir) = fs::read_dir(&self.disk_root) {
            for entry in dir.filter_map(|e| e.ok()) {
                let _ = fs::remove_file(entry.path());
            }
        }
    }
}

/// 1 m rounding: ~1e-5 degrees for geographic coordinates, whole metres
/// for projected ones.
fn round_coord(v: f64) -> f64 {
    if v.abs() <= 360.0 {
        (v * 1e5).round() / 1e5
    } else {
        v.round()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::dataset::DatasetFormat;
    use anyhow::Result;
    use geo::Coord;
    use std::fs;
    use tempfile::TempDir;

    fn seeded(dir: &TempDir) -> (DatasetDescriptor, DatasetCache) {
        let data_path = dir.path().join("sites.geojson");
        fs::write(
            &data_path,
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "properties": {"SITECODE": "A"},
                 "geometry": {"type": "Polygon",
                              "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
                {"type": "Feature", "properties": {"SITECODE": "B"},
                 "geometry": {"type": "Point", "coordinates": [10, 10]}}
            ]}"#,
        )
        .unwrap();
        let meta = fs::metadata(&data_path).unwrap();
        let descriptor = DatasetDescriptor {
            logical_name: "sites".into(),
            country: None,
            path: data_path,
            format: DatasetFormat::GeoJson,
            mtime_unix: 1_700_000_000,
            size_bytes: meta.len(),
            crs: None,
        };
        let cache = DatasetCache::new(
            dir.path().join("cache"),
            1024 * 1024,
            1024 * 1024,
            Duration::from_secs(3600),
        );
        (descriptor, cache)
    }

    #[test]
    fn test_fingerprint_sensitivity() {
        let dir = TempDir::new().unwrap();
        let (descriptor, _) = seeded(&dir);
        let bbox = Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 2.0, y: 2.0 });

        let base = DatasetCache::fingerprint(&descriptor, Some(&bbox), None);
        assert_eq!(base, DatasetCache::fingerprint(&descriptor, Some(&bbox), None));

        // sub-metre bbox jitter does not change the key
        let jitter = Rect::new(
            Coord { x: 1e-7, y: 0.0 },
            Coord { x: 2.0, y: 2.0 },
        );
        assert_eq!(base, DatasetCache::fingerprint(&descriptor, Some(&jitter), None));

        // mtime change invalidates every derived entry
        let mut touched = descriptor.clone();
        touched.mtime_unix += 1;
        assert_ne!(base, DatasetCache::fingerprint(&touched, Some(&bbox), None));

        // so does the filter expression
        assert_ne!(
            base,
            DatasetCache::fingerprint(&descriptor, Some(&bbox), Some("SITECODE=A"))
        );
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_build() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let (descriptor, cache) = seeded(&dir);
        let cache = Arc::new(cache);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let cache = cache.clone();
            let descriptor = descriptor.clone();
            handles.push(tokio::spawn(async move {
                cache.load(&descriptor, None, None).await.map(|s| s.len())
            }));
        }
        for handle in handles {
            assert_eq!(handle.await??, 2);
        }
        assert_eq!(cache.stats().build_count, 1);
        assert!(cache.inflight.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_disk_rehydration_after_memory_clear() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let (descriptor, cache) = seeded(&dir);

        cache.load(&descriptor, None, None).await?;
        assert_eq!(cache.stats().build_count, 1);

        // wipe only the memory tier
        {
            let mut tier = cache.memory.lock().unwrap();
            tier.entries.clear();
            tier.bytes = 0;
        }

        cache.load(&descriptor, None, None).await?;
        // disk hit, no second build
        assert_eq!(cache.stats().build_count, 1);
        assert!(cache.stats().hit_rate > 0.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_corrupt_blob_treated_as_absent() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let (descriptor, cache) = seeded(&dir);

        cache.load(&descriptor, None, None).await?;
        let fingerprint = DatasetCache::fingerprint(&descriptor, None, None);
        fs::write(cache.blob_path(&fingerprint), b"garbage")?;
        {
            let mut tier = cache.memory.lock().unwrap();
            tier.entries.clear();
            tier.bytes = 0;
        }

        cache.load(&descriptor, None, None).await?;
        assert_eq!(cache.stats().build_count, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_build_is_shared_then_released() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let (mut descriptor, cache) = seeded(&dir);
        descriptor.path = dir.path().join("missing.geojson");

        let err = cache.load(&descriptor, None, None).await.unwrap_err();
        assert!(matches!(
            err,
            AetheraError::Infrastructure(InfrastructureError::Cache(_))
        ));
        // marker released: the next call rebuilds instead of deadlocking
        assert!(cache.inflight.is_empty());
        let err2 = cache.load(&descriptor, None, None).await.unwrap_err();
        assert!(matches!(
            err2,
            AetheraError::Infrastructure(InfrastructureError::Cache(_))
        ));
        assert_eq!(cache.stats().build_count, 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_bbox_and_filter_reach_the_result() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let (descriptor, cache) = seeded(&dir);
        let bbox = Rect::new(Coord { x: -1.0, y: -1.0 }, Coord { x: 2.0, y: 2.0 });

        let clipped = cache.load(&descriptor, Some(bbox), None).await?;
        assert_eq!(clipped.len(), 1);

        let filtered = cache
            .load(&descriptor, None, Some("SITECODE=B".into()))
            .await?;
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered.records[0].identifier(), "B");
        Ok(())
    }
}
