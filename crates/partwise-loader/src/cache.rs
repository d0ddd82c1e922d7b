use crate::loader::{DatasetError, DatasetLoader, RowTransform};
use partwise_model::{CacheKey, DatasetRequest};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::debug;

type EntryCell<T> = Arc<OnceCell<Result<Arc<Vec<T>>, DatasetError>>>;

/// Process-lifetime cache guaranteeing at most one fetch sequence per
/// [`CacheKey`]. Construct it once at application start and hand it to every
/// call site that loads datasets.
///
/// Each key moves through an explicit lifecycle: absent (not started), cell
/// present but unset (a load is in flight and later callers await it), cell
/// set to `Ok` (resolved) or `Err` (failed). Entries are never evicted and a
/// failed load stays failed until [`DatasetCache::invalidate`] is called, so
/// a transient outage poisons its key for the process lifetime.
pub struct DatasetCache<T> {
    loader: DatasetLoader,
    entries: Mutex<HashMap<CacheKey, EntryCell<T>>>,
}

impl<T> DatasetCache<T> {
    #[must_use]
    pub fn new(loader: DatasetLoader) -> Self {
        Self {
            loader,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached rows for the request's key, starting the one and
    /// only load for that key if none has started yet. Concurrent callers
    /// with an equal key share a single underlying fetch sequence and
    /// observe the same eventual result.
    pub async fn get_or_load(
        &self,
        request: &DatasetRequest,
        transform: &RowTransform<T>,
    ) -> Result<Arc<Vec<T>>, DatasetError> {
        let key = request.cache_key();
        // Check-and-insert must happen in one synchronous critical section:
        // an await between the lookup and the insert would let two callers
        // both observe "no entry" and start duplicate fetch sequences.
        let cell = {
            let mut entries = match self.entries.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(entries.entry(key).or_insert_with(|| Arc::new(OnceCell::new())))
        };
        cell.get_or_init(|| async {
            self.loader
                .load(request, transform)
                .await
                .map(Arc::new)
        })
        .await
        .clone()
    }

    /// Drop the entry for a key so the next request retries the load. The
    /// loader itself never retries; this is the operator's escape hatch for
    /// a poisoned key.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let removed = entries.remove(key).is_some();
        if removed {
            debug!(key = %key, "cache entry invalidated");
        }
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self.entries.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted keys currently tracked, for operator debugging.
    #[must_use]
    pub fn cached_keys_debug(&self) -> Vec<String> {
        let entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut keys: Vec<String> = entries.keys().map(|k| k.as_str().to_string()).collect();
        keys.sort();
        keys
    }
}
