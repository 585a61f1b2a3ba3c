use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tokio::time::{Duration, Instant};

pub const DEFAULT_DEDUP_TTL: Duration = Duration::from_millis(1500);
const MAX_TRACKED_KEYS: usize = 512;

/// Drops duplicate event keys observed within a TTL window. Expired
/// entries are swept lazily on each call; the tracked set is hard-capped
/// with oldest-first eviction so a burst of unique keys cannot grow it
/// without bound.
pub struct EventDedupCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Instant>>,
}

impl Default for EventDedupCache {
    fn default() -> Self {
        Self::with_ttl(DEFAULT_DEDUP_TTL)
    }
}

impl EventDedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// True when the key was not seen within the TTL window. The window
    /// is anchored at the first occurrence; duplicates do not extend it.
    pub fn consume(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entries = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        entries.retain(|_, seen| now.duration_since(*seen) < self.ttl);
        if entries.contains_key(key) {
            return false;
        }
        entries.insert(key.to_string(), now);
        while entries.len() > MAX_TRACKED_KEYS {
            let oldest = entries
                .iter()
                .min_by_key(|(_, seen)| **seen)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => entries.remove(&key),
                None => break,
            };
        }
        true
    }
}
