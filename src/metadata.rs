//! Metadata map (C2): ordered string→string attachments shared by
//! service implementation records and component records.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{ArcRwLockReadGuard, RawRwLock, RwLock};

/// A mapping from string to string, attached to any registry entry.
///
/// `set`/`get` operate directly; `create_iterator` returns a handle that
/// borrows the owning record's read lock for its lifetime, mirroring the
/// contract of the original registry's metadata iterator.
#[derive(Debug, Default)]
pub struct Metadata {
    entries: HashMap<String, String>,
}

impl Metadata {
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    /// Insert or overwrite a value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(name.into(), value.into());
    }

    /// Look up a value by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A metadata map guarded by a reader/writer lock, as embedded in a
/// service implementation record or component record.
#[derive(Debug, Default)]
pub struct LockedMetadata {
    inner: Arc<RwLock<Metadata>>,
}

impl LockedMetadata {
    pub fn new() -> Self {
        Self { inner: Arc::new(RwLock::new(Metadata::new())) }
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.write().set(name, value);
    }

    pub fn get_owned(&self, name: &str) -> Option<String> {
        self.inner.read().get(name).map(str::to_owned)
    }

    /// Create an iterator positioned at the first entry, holding the
    /// owning map's read lock for as long as the iterator lives.
    pub fn create_iterator(&self) -> MetadataIterator {
        let guard = parking_lot::RwLock::read_arc(&self.inner);
        let keys: Vec<String> = guard.entries.keys().cloned().collect();
        MetadataIterator { guard, keys, pos: 0 }
    }
}

impl Clone for LockedMetadata {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

/// An iterator over a [`LockedMetadata`] map. Holds the map's read lock
/// for its entire lifetime; dropping it releases the lock.
pub struct MetadataIterator {
    guard: ArcRwLockReadGuard<RawRwLock, Metadata>,
    keys: Vec<String>,
    pos: usize,
}

impl MetadataIterator {
    /// `true` while the iterator has not run past the last entry.
    pub fn is_valid(&self) -> bool {
        self.pos < self.keys.len()
    }

    /// Current entry, or `None` if positioned past the end.
    pub fn get(&self) -> Option<(&str, &str)> {
        let key = self.keys.get(self.pos)?;
        self.guard.get(key).map(|v| (key.as_str(), v))
    }

    /// Advance to the next entry. Returns `false` once the iterator has
    /// moved one-past-the-last element (mirrors the registry iterator's
    /// convention, see [`crate::registry::ServiceIterator::next`]).
    pub fn next(&mut self) -> bool {
        if self.pos < self.keys.len() {
            self.pos += 1;
        }
        self.is_valid()
    }
}
