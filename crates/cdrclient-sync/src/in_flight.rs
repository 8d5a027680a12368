//! In-flight deduplication set
//!
//! The watcher and the poller discover the same files independently. Before a
//! path is dispatched it is inserted into the [`InFlightSet`]; a second
//! discovery of a path that is still present is dropped. The entry is removed
//! once the upload task finishes, whatever its outcome.
//!
//! The set is bounded and evicts oldest-inserted-first: when a new path
//! arrives while the set is full, the earliest inserted path is dropped and a
//! warning is logged. A rejected duplicate insert does not refresh an entry.
//! An evicted path may be dispatched a second time.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::warn;

/// Callback invoked with every path evicted to make room
pub type EvictionObserver = Box<dyn Fn(&Path) + Send + Sync>;

#[derive(Default)]
struct Inner {
    /// path -> insertion sequence number
    entries: HashMap<PathBuf, u64>,
    /// insertion sequence number -> path, oldest first
    order: BTreeMap<u64, PathBuf>,
    next_seq: u64,
}

/// Bounded membership set of paths being processed, evicting the
/// oldest-inserted path when full
pub struct InFlightSet {
    inner: Mutex<Inner>,
    capacity: usize,
    on_evict: Option<EvictionObserver>,
}

impl InFlightSet {
    /// Creates an empty set holding at most `capacity` paths (minimum 1)
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            capacity: capacity.max(1),
            on_evict: None,
        }
    }

    /// Registers a callback for forced evictions
    pub fn with_eviction_observer(mut self, observer: EvictionObserver) -> Self {
        self.on_evict = Some(observer);
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts `path` if it is absent
    ///
    /// Returns `true` if the caller now owns the path and may dispatch it,
    /// `false` if it was already in flight.
    pub fn try_insert(&self, path: &Path) -> bool {
        let evicted = {
            let mut inner = self.lock();
            if inner.entries.contains_key(path) {
                return false;
            }

            let evicted = if inner.entries.len() >= self.capacity {
                inner.order.pop_first().map(|(_, oldest)| {
                    inner.entries.remove(&oldest);
                    oldest
                })
            } else {
                None
            };

            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.entries.insert(path.to_path_buf(), seq);
            inner.order.insert(seq, path.to_path_buf());
            evicted
        };

        if let Some(evicted) = evicted {
            warn!(
                path = %evicted.display(),
                capacity = self.capacity,
                "In-flight set full, evicted oldest entry"
            );
            if let Some(observer) = &self.on_evict {
                observer(&evicted);
            }
        }
        true
    }

    /// Removes `path`, returning whether it was present
    pub fn remove(&self, path: &Path) -> bool {
        let mut inner = self.lock();
        match inner.entries.remove(path) {
            Some(seq) => {
                inner.order.remove(&seq);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl fmt::Debug for InFlightSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InFlightSet")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
