//! Buffer state owned by the control loop.

use std::collections::HashMap;

/// A batch of buffered entries, handed to the sink on flush.
pub type Batch<V> = HashMap<String, V>;

/// The mapping of buffered entries plus the running count.
///
/// Only the control loop holds a `PoolState`; nothing here is synchronized.
///
/// `count` follows the pool's counting policy rather than `entries.len()`:
/// re-adding an existing key does not bump it, and a delete on a non-empty
/// pool always decrements it, even when the key is missing. It therefore
/// never exceeds `entries.len()` and never goes below zero.
#[derive(Debug)]
pub(crate) struct PoolState<V> {
    entries: Batch<V>,
    count: usize,
    max_entries: usize,
}

impl<V> PoolState<V> {
    pub(crate) fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            count: 0,
            max_entries,
        }
    }

    /// Upserts an entry. Returns true when the size threshold is reached
    /// and the caller must flush before handling the next event.
    pub(crate) fn add(&mut self, key: String, value: V) -> bool {
        if self.entries.insert(key, value).is_none() {
            self.count += 1;
        }
        self.count >= self.max_entries
    }

    /// Removes an entry. A no-op while the count is zero.
    pub(crate) fn delete(&mut self, key: &str) {
        if self.count == 0 {
            return;
        }
        self.entries.remove(key);
        self.count -= 1;
    }

    /// Moves the buffered entries out and resets the state.
    ///
    /// The state is always left empty. Returns `None` when the count is zero,
    /// in which case the sink must not be called.
    pub(crate) fn take(&mut self) -> Option<Batch<V>> {
        let count = std::mem::take(&mut self.count);
        let entries = std::mem::take(&mut self.entries);
        if count == 0 {
            return None;
        }
        Some(entries)
    }

    pub(crate) fn count(&self) -> usize {
        self.count
    }

    #[cfg(test)]
    pub(crate) fn entries(&self) -> &Batch<V> {
        &self.entries
    }
}
