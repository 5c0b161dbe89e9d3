//! Extract-once disk cache.
//!
//! A cached entry is a plain file at `{cache_root}/{resolved_path}`; its
//! existence is the only hit signal. Entries are never evicted: archives are
//! treated as immutable for the life of the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use tokio::fs;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::path::normalize;
use crate::zip::{Archive, ZipEntry};

type PathLock = Arc<AsyncMutex<()>>;

/// Writes extracted entries into cache trees, at most once per destination.
///
/// Concurrent [`materialize`](Self::materialize) calls for one destination
/// queue on a shared lock and only the first extracts. Bytes are written to a
/// hidden temporary sibling and renamed into place, so a half-written file is
/// never visible as cached.
#[derive(Default)]
pub struct ExtractionCache {
    in_flight: Mutex<HashMap<PathBuf, PathLock>>,
    extractions: AtomicU64,
}

impl ExtractionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries this cache has extracted.
    pub fn extractions(&self) -> u64 {
        self.extractions.load(Ordering::Relaxed)
    }

    /// Where `resolved_path` lives inside `cache_root`.
    pub fn cache_path(cache_root: &Path, resolved_path: &str) -> PathBuf {
        normalize(resolved_path)
            .split('/')
            .filter(|segment| !segment.is_empty())
            .fold(cache_root.to_path_buf(), |path, segment| path.join(segment))
    }

    /// True iff a plain file is cached for `resolved_path`. Directories don't count.
    pub async fn has_cached(cache_root: &Path, resolved_path: &str) -> Result<bool> {
        let path = Self::cache_path(cache_root, resolved_path);
        match fs::metadata(&path).await {
            Ok(metadata) => Ok(metadata.is_file()),
            // A parent that is a cached file (`index.html/x`) is a miss too.
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory
                ) =>
            {
                Ok(false)
            }
            Err(e) => Err(e).with_context(|| format!("Failed to inspect {}", path.display())),
        }
    }

    /// `mkdir -p`: existing directories are fine.
    pub async fn ensure_directory(path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .await
            .with_context(|| format!("Failed to create directory {}", path.display()))
    }

    /// Extract `entry` to the cache unless it is already there.
    ///
    /// Returns `true` if this call did the extraction.
    pub async fn materialize(
        &self,
        archive: &mut Archive,
        entry: &ZipEntry,
        cache_root: &Path,
        resolved_path: &str,
    ) -> Result<bool> {
        let destination = Self::cache_path(cache_root, resolved_path);
        let lock = self.lock_for(&destination);

        let result = {
            let _guard = lock.lock().await;
            self.extract_if_absent(archive, entry, cache_root, resolved_path, &destination)
                .await
        };

        self.release(&destination, &lock);
        result
    }

    async fn extract_if_absent(
        &self,
        archive: &mut Archive,
        entry: &ZipEntry,
        cache_root: &Path,
        resolved_path: &str,
        destination: &Path,
    ) -> Result<bool> {
        if Self::has_cached(cache_root, resolved_path).await? {
            debug!(path = %destination.display(), "already extracted");
            return Ok(false);
        }

        let parent = destination
            .parent()
            .ok_or_else(|| anyhow!("Cache path {} has no parent", destination.display()))?;
        Self::ensure_directory(parent).await?;

        let file_name = destination
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = tempfile::Builder::new()
            .prefix(&format!(".{file_name}."))
            .suffix(".part")
            .tempfile_in(parent)
            .with_context(|| format!("Failed to create temporary file in {}", parent.display()))?
            .into_temp_path();

        info!(entry = %entry.name, path = %destination.display(), "extracting");
        if let Err(e) = archive.extract_to_file(entry, &temp).await {
            warn!(entry = %entry.name, error = %e, "extraction failed");
            return Err(e);
        }
        temp.persist(destination)
            .with_context(|| format!("Failed to move extracted file to {}", destination.display()))?;

        self.extractions.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    fn lock_for(&self, destination: &Path) -> PathLock {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(in_flight.entry(destination.to_path_buf()).or_default())
    }

    /// Forget the lock once no other request is waiting on it.
    fn release(&self, destination: &Path, lock: &PathLock) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        let idle = in_flight
            .get(destination)
            .is_some_and(|current| Arc::ptr_eq(current, lock) && Arc::strong_count(lock) <= 2);
        if idle {
            in_flight.remove(destination);
        }
    }

    #[cfg(test)]
    fn in_flight_len(&self) -> usize {
        self.in_flight.lock().unwrap().len()
    }
}
