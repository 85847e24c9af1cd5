use std::collections::BTreeMap;
use tokio::time::Instant;

/// Values keyed by id, each carrying a deadline after which it is swept.
///
/// Ordered by key so batches built from it are deterministic.
#[derive(Debug, Clone)]
pub struct ExpiringEntries<K, V> {
    entries: BTreeMap<K, (V, Instant)>,
}

impl<K: Ord, V> ExpiringEntries<K, V> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Inserts or replaces `key`, resetting its deadline. Returns true when the key is new.
    pub fn upsert(&mut self, key: K, value: V, deadline: Instant) -> bool {
        self.entries.insert(key, (value, deadline)).is_none()
    }

    /// Drops every entry whose deadline is at or before `now`, returning how many went.
    pub fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, (_, deadline)| *deadline > now);
        before - self.entries.len()
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(value, _)| value)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values().map(|(value, _)| value)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|(value, _)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Ord, V> Default for ExpiringEntries<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
