use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tracing::debug;

use crate::sources::http::sha256_hex;

const CACHE_TTL_DAYS: u64 = 7;

/// File-backed cache for fetched pages, keyed by URL hash. University
/// pages change slowly; a week-old copy is as good as a fresh one and
/// spares the host a repeat visit.
#[derive(Debug, Clone)]
pub struct PageCache {
    dir: PathBuf,
}

impl PageCache {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join("page_cache"),
        }
    }

    pub fn get(&self, url: &str) -> Option<String> {
        let path = self.entry_path(url);
        let modified = fs::metadata(&path).ok()?.modified().ok()?;
        if !fresh(modified, SystemTime::now()) {
            return None;
        }
        fs::read_to_string(&path).ok()
    }

    /// Cache writes are best-effort: a full disk or bad permissions must
    /// never abort a scrape.
    pub fn put(&self, url: &str, body: &str) {
        if let Err(err) = fs::create_dir_all(&self.dir) {
            debug!("page cache directory unavailable: {err}");
            return;
        }
        let path = self.entry_path(url);
        if let Err(err) = fs::write(&path, body) {
            debug!("page cache write failed for {url}: {err}");
        }
    }

    fn entry_path(&self, url: &str) -> PathBuf {
        self.dir.join(sha256_hex(url))
    }
}

fn fresh(modified: SystemTime, now: SystemTime) -> bool {
    match now.duration_since(modified) {
        Ok(age) => age < Duration::from_secs(CACHE_TTL_DAYS * 24 * 60 * 60),
        // mtime in the future means clock skew, not staleness
        Err(_) => true,
    }
}
