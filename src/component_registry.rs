//! Component registry (C6): URN→component map and generation groups.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::component::ComponentRecord;
use crate::lock::{self, ReadToken, WriteToken};

struct GenerationGroup {
    id: u64,
    members: Vec<String>,
}

/// The registry's guarded state: the URN→component map and the
/// generation groups list, kept in lockstep.
#[derive(Default)]
pub(crate) struct ComponentRegistryInner {
    by_urn: BTreeMap<String, Arc<ComponentRecord>>,
    generations: VecDeque<GenerationGroup>,
    urn_generation: HashMap<String, u64>,
    next_generation_id: u64,
}

impl ComponentRegistryInner {
    /// Publishes a batch of components as one new generation group,
    /// prepended to the groups list (L7).
    pub(crate) fn insert_generation(&mut self, members: Vec<(String, ComponentRecord)>) -> Vec<Arc<ComponentRecord>> {
        let id = self.next_generation_id;
        self.next_generation_id += 1;
        let mut urns = Vec::with_capacity(members.len());
        let mut arcs = Vec::with_capacity(members.len());
        for (urn, record) in members {
            let arc = Arc::new(record);
            self.by_urn.insert(urn.clone(), Arc::clone(&arc));
            self.urn_generation.insert(urn.clone(), id);
            urns.push(urn);
            arcs.push(arc);
        }
        self.generations.push_front(GenerationGroup { id, members: urns });
        arcs
    }

    /// Removes a component, dropping its generation group if this was
    /// the last member (U9).
    pub(crate) fn remove(&mut self, urn: &str) -> Option<Arc<ComponentRecord>> {
        let record = self.by_urn.remove(urn)?;
        if let Some(gid) = self.urn_generation.remove(urn) {
            if let Some(pos) = self.generations.iter().position(|g| g.id == gid) {
                if let Some(mpos) = self.generations[pos].members.iter().position(|u| u == urn) {
                    self.generations[pos].members.remove(mpos);
                }
                if self.generations[pos].members.is_empty() {
                    self.generations.remove(pos);
                }
            }
        }
        Some(record)
    }

    pub(crate) fn find(&self, urn: &str) -> Option<Arc<ComponentRecord>> {
        self.by_urn.get(urn).cloned()
    }

    pub(crate) fn contains(&self, urn: &str) -> bool {
        self.by_urn.contains_key(urn)
    }

    /// Snapshot of generation groups, newest first, as URN lists —
    /// consumed by the chassis bootstrap's reverse teardown (§4.8).
    fn generations_newest_first(&self) -> Vec<Vec<String>> {
        self.generations.iter().map(|g| g.members.clone()).collect()
    }
}

/// A token proving the caller already holds `L_loader` as writer. The
/// loader always holds this for the whole of a `load`/`unload` call
/// (§5), so the pipeline stages take it by parameter rather than
/// re-acquiring.
pub type ComponentWriteToken = WriteToken<ComponentRegistryInner>;
/// A token proving the caller already holds `L_loader` as reader.
pub type ComponentReadToken = ReadToken<ComponentRegistryInner>;

/// The URN-addressed store of loaded components. Cheaply `Clone`-able,
/// like [`crate::registry::ServiceRegistry`].
#[derive(Clone)]
pub struct ComponentRegistry {
    inner: Arc<RwLock<ComponentRegistryInner>>,
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self { inner: Arc::new(RwLock::new(ComponentRegistryInner::default())) }
    }

    /// As [`Self::new`], pre-sizing the URN index for `capacity`
    /// expected components (`ChassisConfig::component_capacity`).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(ComponentRegistryInner {
                by_urn: BTreeMap::new(),
                generations: VecDeque::with_capacity(capacity),
                urn_generation: HashMap::with_capacity(capacity),
                next_generation_id: 0,
            })),
        }
    }

    /// Acquire `L_loader` for writing, held for the duration of a
    /// `load`/`unload` pipeline.
    pub fn lock_write(&self) -> ComponentWriteToken {
        WriteToken::new(lock::write(&self.inner))
    }

    pub fn lock_read(&self) -> ComponentReadToken {
        ReadToken::new(lock::read(&self.inner))
    }

    pub fn find(&self, urn: &str) -> Option<Arc<ComponentRecord>> {
        lock::read(&self.inner).find(urn)
    }

    pub fn contains(&self, urn: &str) -> bool {
        lock::read(&self.inner).contains(urn)
    }

    pub fn len(&self) -> usize {
        lock::read(&self.inner).by_urn.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn generations_newest_first(&self) -> Vec<Vec<String>> {
        lock::read(&self.inner).generations_newest_first()
    }

    /// Creates an iterator over loaded components in URN order. Holds
    /// `L_loader` for reading until released (§4.7.3).
    pub fn iterator_create(&self) -> ComponentIterator {
        let guard = lock::read(&self.inner);
        let urns: Vec<String> = guard.by_urn.keys().cloned().collect();
        ComponentIterator { guard, urns, pos: 0 }
    }
}

/// An iterator over [`ComponentRegistry`] in lexicographic URN order.
pub struct ComponentIterator {
    guard: lock::ReadGuard<ComponentRegistryInner>,
    urns: Vec<String>,
    pos: usize,
}

impl ComponentIterator {
    pub fn is_valid(&self) -> bool {
        self.pos < self.urns.len()
    }

    pub fn get(&self) -> Option<(&str, Arc<ComponentRecord>)> {
        let urn = self.urns.get(self.pos)?;
        self.guard.find(urn).map(|r| (urn.as_str(), r))
    }

    pub fn next(&mut self) -> bool {
        if self.pos < self.urns.len() {
            self.pos += 1;
        }
        self.is_valid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentDescriptor;

    fn record(urn: &str) -> ComponentRecord {
        let (record, _provides) = ComponentRecord::pending(urn.to_string(), ComponentDescriptor::new(urn));
        record
    }

    #[test]
    fn insert_and_find() {
        let registry = ComponentRegistry::new();
        let mut token = registry.lock_write();
        token.insert_generation(vec![("mem://a".into(), record("a"))]);
        drop(token);
        assert!(registry.contains("mem://a"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn removing_last_member_drops_generation() {
        let registry = ComponentRegistry::new();
        let mut token = registry.lock_write();
        token.insert_generation(vec![("mem://a".into(), record("a"))]);
        assert_eq!(token.generations_newest_first().len(), 1);
        token.remove("mem://a");
        assert_eq!(token.generations_newest_first().len(), 0);
    }

    #[test]
    fn flatten_matches_by_urn() {
        let registry = ComponentRegistry::new();
        let mut token = registry.lock_write();
        token.insert_generation(vec![("mem://a".into(), record("a")), ("mem://b".into(), record("b"))]);
        let flat: Vec<String> = token.generations_newest_first().into_iter().flatten().collect();
        let mut flat_sorted = flat.clone();
        flat_sorted.sort();
        assert_eq!(flat_sorted, vec!["mem://a".to_string(), "mem://b".to_string()]);
    }

    #[test]
    fn iterator_is_lexicographic() {
        let registry = ComponentRegistry::new();
        let mut token = registry.lock_write();
        token.insert_generation(vec![("mem://b".into(), record("b")), ("mem://a".into(), record("a"))]);
        drop(token);
        let mut it = registry.iterator_create();
        let mut seen = Vec::new();
        while it.is_valid() {
            if let Some((urn, _)) = it.get() {
                seen.push(urn.to_string());
            }
            it.next();
        }
        assert_eq!(seen, vec!["mem://a".to_string(), "mem://b".to_string()]);
    }
}
