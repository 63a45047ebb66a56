use super::entry::Entry;
use parking_lot::Mutex;
use std::time::SystemTime;

#[cfg(feature = "ahash")]
use ahash::AHashMap as HashMap;
#[cfg(not(feature = "ahash"))]
use std::collections::HashMap;

/// One lock-protected partition of the key space
pub(crate) struct Shard {
    pub(crate) entries: Mutex<HashMap<String, Entry>>,
}

impl Shard {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Shard {
            entries: Mutex::new(HashMap::with_capacity(capacity)),
        }
    }

    /// Drop every entry at or past its expiry, returning how many were removed
    pub(crate) fn purge_expired(&self, now: SystemTime) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        before - entries.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
