use pointstream_storage::{FetchError, Fetcher, Octree};

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// An in-memory [`Fetcher`] that serves a fixed url -> bytes map, counts every fetch, and can be
/// scripted to fail.
pub struct CountingFetcher {
    files: HashMap<String, Vec<u8>>,
    counts: Mutex<HashMap<String, usize>>,
    fail_once: Mutex<HashSet<String>>,
}

impl CountingFetcher {
    pub fn new(files: HashMap<String, Vec<u8>>) -> Self {
        Self {
            files,
            counts: Mutex::new(HashMap::new()),
            fail_once: Mutex::new(HashSet::new()),
        }
    }

    /// Make the next fetch of `url` fail; fetches after that succeed again.
    pub fn fail_once(&self, url: &str) {
        self.fail_once.lock().unwrap().insert(url.to_string());
    }

    /// How many times `url` has been fetched, failures included.
    pub fn fetch_count(&self, url: &str) -> usize {
        self.counts.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.counts.lock().unwrap().values().sum()
    }
}

impl Fetcher for CountingFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        *self
            .counts
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_insert(0) += 1;

        if self.fail_once.lock().unwrap().remove(url) {
            return Err(FetchError::Other(format!("scripted failure for {}", url)));
        }

        self.files
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(url.to_string()))
    }
}

/// Pump the octree until `pred` holds, sleeping between polls. Returns `false` on timeout.
pub fn pump_until(
    octree: &mut Octree,
    mut pred: impl FnMut(&Octree) -> bool,
    max_iters: usize,
) -> bool {
    for _ in 0..max_iters {
        octree.pump();
        if pred(octree) {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(1));
    }

    false
}

/// Pump until every requested load has fully resolved.
pub fn pump_until_idle(octree: &mut Octree, max_iters: usize) -> bool {
    pump_until(octree, |o| o.is_idle(), max_iters)
}
