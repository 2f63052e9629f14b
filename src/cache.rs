//! Pending-ack cache.
//!
//! Maps a record's tag to the shared record until the collector resolves it
//! (ack), the resender ages it out, or a failing synchronous send erases it.
//! Not a general-purpose map; it implements exactly the operations the
//! shipper needs.

use std::collections::HashMap;
use std::sync::Arc;

use log::trace;
use parking_lot::Mutex;

use crate::record::Record;

/// Thread-safe tag → record store shared by sender, reader, and resender.
#[derive(Default)]
pub struct PendingCache {
    inner: Mutex<HashMap<String, Arc<Record>>>,
}

impl PendingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record under its tag, replacing any prior entry. Tags are
    /// unique by construction, so replacement is theoretical.
    pub fn insert(&self, tag: String, record: Arc<Record>) {
        self.inner.lock().insert(tag, record);
    }

    /// Remove one tag. Returns the number of entries removed (0 or 1).
    pub fn erase(&self, tag: &str) -> usize {
        let removed = usize::from(self.inner.lock().remove(tag).is_some());
        trace!("PendingCache: erase tag='{tag}' removed={removed}");
        removed
    }

    /// Remove a batch of tags, tolerating misses. Returns the number
    /// actually removed.
    pub fn erase_many(&self, tags: &[String]) -> usize {
        if tags.is_empty() {
            return 0;
        }
        let mut inner = self.inner.lock();
        tags.iter()
            .filter(|tag| inner.remove(tag.as_str()).is_some())
            .count()
    }

    pub fn get(&self, tag: &str) -> Option<Arc<Record>> {
        self.inner.lock().get(tag).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Clone the current contents under the lock. Callers iterate the
    /// snapshot without holding any cache lock, so their callbacks are free
    /// to call back into the cache.
    pub fn snapshot(&self) -> HashMap<String, Arc<Record>> {
        self.inner.lock().clone()
    }

    /// Keys whose record satisfies `predicate`. The predicate runs against a
    /// snapshot, never under the cache lock.
    pub fn filter_keys(&self, predicate: impl Fn(&Record) -> bool) -> Vec<String> {
        self.snapshot()
            .into_iter()
            .filter(|(_, record)| predicate(record))
            .map(|(tag, _)| tag)
            .collect()
    }

    /// Apply `f` to every record under the lock.
    pub fn for_each(&self, mut f: impl FnMut(&Arc<Record>)) {
        for record in self.inner.lock().values() {
            f(record);
        }
    }
}
