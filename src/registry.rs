//! Service registry (C4): the name→implementation map, default-
//! implementation tracking, and the reverse interface→record index.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{ChassisError, Result};
use crate::lock::{self, ReadToken, WriteToken};
use crate::name::ServiceName;
use crate::service::{Interface, ServiceHandle};

/// The registry's guarded state. Kept private; mutation always goes
/// through [`RegistryInner::register`] / `unregister` / `set_default`, so
/// the two coupled indices (`by_name`, `by_interface`) never drift.
#[derive(Default)]
pub(crate) struct RegistryInner {
    by_name: BTreeMap<String, ServiceHandle>,
    by_interface: HashMap<usize, ServiceHandle>,
}

impl RegistryInner {
    fn acquire(&self, name: &str) -> Result<ServiceHandle> {
        let handle = self.by_name.get(name).cloned().ok_or_else(|| ChassisError::not_found(name))?;
        handle.add_reference();
        Ok(handle)
    }

    fn acquire_related(&self, name: &str, existing: &ServiceHandle) -> Result<ServiceHandle> {
        let parsed = ServiceName::parse(name)?;
        if parsed.is_full() {
            return Err(ChassisError::malformed_name(name));
        }
        if !self.by_interface.contains_key(&existing.interface_address()) {
            return Err(ChassisError::not_found(existing.full_name()));
        }
        let suffix = existing
            .full_name()
            .split_once('.')
            .map(|(_, suffix)| suffix)
            .ok_or_else(|| ChassisError::not_found(existing.full_name()))?;
        let candidate = format!("{}.{}", parsed.service(), suffix);
        let handle = self.by_name.get(&candidate).cloned().ok_or_else(|| ChassisError::not_found(candidate))?;
        handle.add_reference();
        Ok(handle)
    }

    fn register(&mut self, full_name: &str, interface: Interface) -> Result<ServiceHandle> {
        let parsed = ServiceName::parse(full_name)?;
        let ServiceName::Full { service, .. } = &parsed else {
            return Err(ChassisError::malformed_name(full_name));
        };
        let key = parsed.to_key();
        if self.by_name.contains_key(&key) {
            return Err(ChassisError::already_registered(key));
        }
        let handle = ServiceHandle::new(key.clone(), interface);
        self.by_interface.insert(handle.interface_address(), handle.clone());
        self.by_name.insert(key, handle.clone());
        if !self.by_name.contains_key(service) {
            self.by_name.insert(service.clone(), handle.clone());
        }
        Ok(handle)
    }

    fn unregister(&mut self, full_name: &str) -> Result<()> {
        let parsed = ServiceName::parse(full_name)?;
        let ServiceName::Full { service, .. } = &parsed else {
            return Err(ChassisError::malformed_name(full_name));
        };
        let key = parsed.to_key();
        let handle = self
            .by_name
            .get(&key)
            .cloned()
            .ok_or_else(|| ChassisError::not_found(key.clone()))?;
        if handle.reference_count() > 0 {
            return Err(ChassisError::still_referenced(key));
        }
        self.by_interface.remove(&handle.interface_address());
        self.by_name.remove(&key);

        let was_default = self
            .by_name
            .get(service)
            .map(|d| d.same_record(&handle))
            .unwrap_or(false);
        if was_default {
            self.by_name.remove(service);
            let prefix = format!("{service}.");
            if let Some((_, replacement)) = self
                .by_name
                .range(prefix.clone()..)
                .take_while(|(k, _)| k.starts_with(&prefix))
                .next()
            {
                let replacement = replacement.clone();
                self.by_name.insert(service.clone(), replacement);
            }
        }
        Ok(())
    }

    fn set_default(&mut self, full_name: &str) -> Result<()> {
        let parsed = ServiceName::parse(full_name)?;
        let ServiceName::Full { service, .. } = &parsed else {
            return Err(ChassisError::malformed_name(full_name));
        };
        let key = parsed.to_key();
        let handle = self
            .by_name
            .get(&key)
            .cloned()
            .ok_or_else(|| ChassisError::not_found(key))?;
        self.by_name.insert(service.clone(), handle);
        Ok(())
    }
}

/// A token proving the caller already holds `L_registry` as writer —
/// the realization of the source's `_nolock` registry methods (§4.4,
/// §9 "No-lock variants").
pub type RegistryWriteToken = WriteToken<RegistryInner>;
/// A token proving the caller already holds `L_registry` as reader.
pub type RegistryReadToken = ReadToken<RegistryInner>;

/// The name-addressed store of service implementations.
///
/// Cheaply `Clone`-able: clones share the same underlying lock and maps
/// (an `Arc` handle), the way the chassis and loader share one registry.
#[derive(Clone)]
pub struct ServiceRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner::default())),
        }
    }

    /// As [`Self::new`], pre-sizing the by-interface index for
    /// `capacity` expected implementations (`ChassisConfig::registry_capacity`).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner {
                by_name: BTreeMap::new(),
                by_interface: HashMap::with_capacity(capacity),
            })),
        }
    }

    /// Acquire `L_registry` for writing, for use across several
    /// `_with`-suffixed calls (the loader does this for L4/L5 and for
    /// the promoted portion of unload, U4-U8).
    pub fn lock_write(&self) -> RegistryWriteToken {
        WriteToken::new(lock::write(&self.inner))
    }

    /// Acquire `L_registry` for reading.
    pub fn lock_read(&self) -> RegistryReadToken {
        ReadToken::new(lock::read(&self.inner))
    }

    /// Finds and acquires a service by name (bare or full). Returns a
    /// handle whose reference count has been incremented by exactly one.
    #[cfg_attr(feature = "logging", tracing::instrument(level = "trace", skip(self), fields(name)))]
    pub fn acquire(&self, name: &str) -> Result<ServiceHandle> {
        let guard = lock::read(&self.inner);
        let handle = guard.acquire(name)?;
        #[cfg(feature = "logging")]
        tracing::trace!(target: "component_chassis", name, "service acquired");
        Ok(handle)
    }

    /// As [`Self::acquire`], for a caller that already holds
    /// `L_registry` as writer (the loader's L5 bind-required stage).
    pub fn acquire_with(token: &mut RegistryWriteToken, name: &str) -> Result<ServiceHandle> {
        token.acquire(name)
    }

    /// Finds a service with the same component (implementation suffix)
    /// as `existing`, under a different bare service name.
    pub fn acquire_related(&self, name: &str, existing: &ServiceHandle) -> Result<ServiceHandle> {
        let guard = lock::read(&self.inner);
        guard.acquire_related(name, existing)
    }

    /// Releases a handle from a prior `acquire`.
    ///
    /// The reference count lives on the handle itself as an independent
    /// atomic (§9 "Shared ownership of implementation records"), so this
    /// needs no map lock — which matters because the loader's unload
    /// pipeline calls this while already holding `L_registry` as writer
    /// (U7), where re-acquiring even a reader lock would deadlock.
    pub fn release(&self, handle: &ServiceHandle) -> Result<()> {
        if handle.release_reference() {
            Ok(())
        } else {
            Err(ChassisError::RefcountUnderflow(handle.full_name().to_string()))
        }
    }

    /// Registers a new service implementation, taking `L_registry` for
    /// the whole call.
    #[cfg_attr(feature = "logging", tracing::instrument(level = "debug", skip(self, interface), fields(full_name)))]
    pub fn register_service(&self, full_name: &str, interface: Interface) -> Result<ServiceHandle> {
        let mut guard = lock::write(&self.inner);
        let result = guard.register(full_name, interface);
        #[cfg(feature = "logging")]
        tracing::debug!(target: "component_chassis", full_name, ok = result.is_ok(), "register_service");
        result
    }

    /// As [`Self::register_service`], but for a caller that already
    /// holds `L_registry` as writer.
    pub fn register_service_with(token: &mut RegistryWriteToken, full_name: &str, interface: Interface) -> Result<ServiceHandle> {
        token.register(full_name, interface)
    }

    /// Removes a previously registered service implementation.
    #[cfg_attr(feature = "logging", tracing::instrument(level = "debug", skip(self), fields(full_name)))]
    pub fn unregister(&self, full_name: &str) -> Result<()> {
        let mut guard = lock::write(&self.inner);
        guard.unregister(full_name)
    }

    /// As [`Self::unregister`], for a caller already holding the writer
    /// lock.
    pub fn unregister_with(token: &mut RegistryWriteToken, full_name: &str) -> Result<()> {
        token.unregister(full_name)
    }

    /// Rewires the default implementation of `full_name`'s service.
    pub fn set_default(&self, full_name: &str) -> Result<()> {
        let mut guard = lock::write(&self.inner);
        guard.set_default(full_name)
    }

    /// Current reference count for the implementation backing
    /// `interface`, or zero if it is not registered. Used by the
    /// loader's external-reference check (U5).
    pub fn reference_count_of(&self, handle: &ServiceHandle) -> u64 {
        let guard = lock::read(&self.inner);
        guard
            .by_interface
            .get(&handle.interface_address())
            .map(ServiceHandle::reference_count)
            .unwrap_or(0)
    }

    /// `true` if `name` (bare or full) currently resolves to a record.
    pub fn contains(&self, name: &str) -> bool {
        let guard = lock::read(&self.inner);
        guard.by_name.contains_key(name)
    }

    /// Creates an iterator positioned at the first entry whose key is
    /// `>= prefix`. Holds `L_registry` for reading until released
    /// (dropped).
    pub fn iterator_create(&self, prefix: Option<&str>) -> ServiceIterator {
        let guard = lock::read(&self.inner);
        let keys: Vec<String> = guard.by_name.keys().cloned().collect();
        let pos = match prefix.filter(|p| !p.is_empty()) {
            Some(p) => match keys.iter().position(|k| k.as_str() >= p) {
                Some(i) if keys[i].starts_with(p) => i,
                _ => keys.len(),
            },
            None => 0,
        };
        ServiceIterator { guard, keys, pos }
    }

    pub fn len(&self) -> usize {
        lock::read(&self.inner).by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An iterator over the registry's `by_name` index, in key order.
///
/// Per §4.4: both the bare-prefix (default) entry and the full-name
/// entry for the same record appear, so the default implementation of a
/// service is visited twice.
pub struct ServiceIterator {
    guard: lock::ReadGuard<RegistryInner>,
    keys: Vec<String>,
    pos: usize,
}

impl ServiceIterator {
    pub fn is_valid(&self) -> bool {
        self.pos < self.keys.len()
    }

    pub fn get(&self) -> Option<(&str, ServiceHandle)> {
        let key = self.keys.get(self.pos)?;
        self.guard.by_name.get(key).map(|h| (key.as_str(), h.clone()))
    }

    pub fn next(&mut self) -> bool {
        if self.pos < self.keys.len() {
            self.pos += 1;
        }
        self.is_valid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn registry_with_one() -> (ServiceRegistry, ServiceHandle) {
        let reg = ServiceRegistry::new();
        let h = reg.register_service("foo.a", Arc::new(1i32)).unwrap();
        (reg, h)
    }

    #[test]
    fn register_installs_default() {
        let (reg, _) = registry_with_one();
        assert!(reg.contains("foo"));
        assert!(reg.contains("foo.a"));
    }

    #[test]
    fn acquire_increments_refcount() {
        let (reg, _) = registry_with_one();
        let h = reg.acquire("foo").unwrap();
        assert_eq!(h.reference_count(), 1);
        reg.release(&h).unwrap();
        assert_eq!(h.reference_count(), 0);
    }

    #[test]
    fn unregister_fails_while_referenced() {
        let (reg, _) = registry_with_one();
        let h = reg.acquire("foo.a").unwrap();
        assert!(reg.unregister("foo.a").is_err());
        reg.release(&h).unwrap();
        assert!(reg.unregister("foo.a").is_ok());
    }

    #[test]
    fn unregister_promotes_remaining_default() {
        let reg = ServiceRegistry::new();
        reg.register_service("foo.a", Arc::new(1i32)).unwrap();
        reg.register_service("foo.b", Arc::new(2i32)).unwrap();
        reg.unregister("foo.a").unwrap();
        assert!(reg.contains("foo"));
        let default = reg.acquire("foo").unwrap();
        assert_eq!(default.full_name(), "foo.b");
    }

    #[test]
    fn unregister_last_removes_default_entry() {
        let (reg, _) = registry_with_one();
        reg.unregister("foo.a").unwrap();
        assert!(!reg.contains("foo"));
        assert!(!reg.contains("foo.a"));
    }

    #[test]
    fn already_registered_rejected() {
        let (reg, _) = registry_with_one();
        assert!(reg.register_service("foo.a", Arc::new(9i32)).is_err());
    }

    #[test]
    fn malformed_name_rejected() {
        let reg = ServiceRegistry::new();
        assert!(reg.register_service("foo", Arc::new(1i32)).is_err());
        assert!(reg.register_service("foo.bar.baz", Arc::new(1i32)).is_err());
    }

    #[test]
    fn acquire_related_finds_sibling_implementation() {
        let reg = ServiceRegistry::new();
        reg.register_service("foo.comp", Arc::new(1i32)).unwrap();
        let bar = reg.register_service("bar.comp", Arc::new(2i32)).unwrap();
        let foo = reg.acquire("foo.comp").unwrap();
        let related = reg.acquire_related("bar", &foo).unwrap();
        assert!(related.same_record(&bar));
    }

    #[test]
    fn acquire_related_rejects_fully_qualified_name() {
        let reg = ServiceRegistry::new();
        reg.register_service("foo.comp", Arc::new(1i32)).unwrap();
        let foo = reg.acquire("foo.comp").unwrap();
        assert!(reg.acquire_related("bar.comp", &foo).is_err());
    }

    #[test]
    fn iterator_visits_default_twice() {
        let (reg, _) = registry_with_one();
        let mut it = reg.iterator_create(None);
        let mut names = Vec::new();
        while it.is_valid() {
            if let Some((k, _)) = it.get() {
                names.push(k.to_string());
            }
            it.next();
        }
        assert_eq!(names, vec!["foo".to_string(), "foo.a".to_string()]);
    }

    #[test]
    fn iterator_with_nonmatching_prefix_is_invalid() {
        let (reg, _) = registry_with_one();
        let it = reg.iterator_create(Some("zzz"));
        assert!(!it.is_valid());
    }

    #[test]
    fn release_underflow_fails() {
        let (reg, h) = registry_with_one();
        assert!(reg.release(&h).is_err());
    }
}
