//! On-disk blob cache with a modification-time TTL.
//!
//! Holds downloaded graph extracts and persisted stop-match tables.  The
//! cache is an optimisation only: every read or write failure is logged
//! and reported as a miss.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use tracing::{debug, warn};

/// Distinguishes temporaries of concurrent saves within one process.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct CacheManager {
    dir: PathBuf,
}

impl CacheManager {
    /// The directory is created on first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the entry called `name`.  Path separators in `name` are
    /// flattened so every entry stays inside the cache directory.
    pub fn path_for(&self, name: &str) -> PathBuf {
        let flat: String = name
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.dir.join(flat)
    }

    /// Return the entry's bytes if it exists and was written no more than
    /// `ttl` ago.
    ///
    /// An mtime in the future counts as fresh.
    pub fn retrieve(&self, name: &str, ttl: Duration) -> Option<Vec<u8>> {
        let path = self.path_for(name);
        let modified = match fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(_) => {
                debug!(name, "cache miss");
                return None;
            }
        };

        let age = SystemTime::now().duration_since(modified).unwrap_or(Duration::ZERO);
        if age > ttl {
            debug!(name, age_s = age.as_secs(), "cache entry stale");
            return None;
        }

        match fs::read(&path) {
            Ok(bytes) => {
                debug!(name, bytes = bytes.len(), "cache hit");
                Some(bytes)
            }
            Err(e) => {
                warn!(name, error = %e, "cache read failed");
                None
            }
        }
    }

    /// Store `bytes` under `name`, replacing any previous entry.
    ///
    /// The write goes to a temporary sibling first and is renamed into
    /// place, so a concurrent `retrieve` never sees a torn entry.  Returns
    /// `false` if the entry could not be written.
    pub fn save(&self, name: &str, bytes: &[u8]) -> bool {
        match self.try_save(name, bytes) {
            Ok(()) => {
                debug!(name, bytes = bytes.len(), "cache entry saved");
                true
            }
            Err(e) => {
                warn!(name, error = %e, "cache write failed");
                false
            }
        }
    }

    fn try_save(&self, name: &str, bytes: &[u8]) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(name);
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("tmp{}-{seq}", std::process::id()));
        {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(bytes)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, &path).inspect_err(|_| {
            let _ = fs::remove_file(&tmp);
        })
    }
}
