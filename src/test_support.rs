//! An in-memory scheme handler (`mem://tail`), used by this crate's own
//! unit and integration tests to exercise the loader without touching
//! the filesystem. Not a production scheme handler and not part of the
//! crate's supported public API — kept visible (rather than
//! `#[cfg(test)]`) only so `tests/` integration files, which compile
//! against the library as an ordinary dependency, can reach it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::component::ComponentDescriptor;
use crate::error::{ChassisError, Result};
use crate::scheme::{split_urn, SchemeHandler};

type Builder = Box<dyn Fn(&str) -> ComponentDescriptor + Send + Sync>;

/// Holds a descriptor factory per registered URN tail and tracks which
/// URNs are currently "loaded" so double-load/double-unload are
/// rejected the way a real handler would (matches `dynamic_loader_scheme_file`'s
/// contract in the original implementation).
#[doc(hidden)]
pub struct MemScheme {
    builders: HashMap<String, Builder>,
    loaded: Mutex<HashSet<String>>,
}

impl Default for MemScheme {
    fn default() -> Self {
        Self::new()
    }
}

impl MemScheme {
    pub fn new() -> Self {
        Self { builders: HashMap::new(), loaded: Mutex::new(HashSet::new()) }
    }

    pub fn register(mut self, tail: &str, builder: impl Fn(&str) -> ComponentDescriptor + Send + Sync + 'static) -> Self {
        self.builders.insert(tail.to_string(), Box::new(builder));
        self
    }

    pub fn into_handler(self) -> Arc<dyn SchemeHandler> {
        Arc::new(self)
    }
}

impl SchemeHandler for MemScheme {
    fn load(&self, urn: &str) -> Result<ComponentDescriptor> {
        let (_, tail) = split_urn(urn).ok_or_else(|| ChassisError::NoScheme(urn.to_string()))?;
        let mut loaded = self.loaded.lock();
        if loaded.contains(tail) {
            return Err(ChassisError::SchemeHandlerFailed {
                urn: urn.to_string(),
                reason: "double load".into(),
            });
        }
        let builder = self.builders.get(tail).ok_or_else(|| ChassisError::SchemeHandlerFailed {
            urn: urn.to_string(),
            reason: "no such mem component".into(),
        })?;
        loaded.insert(tail.to_string());
        Ok(builder(tail))
    }

    fn unload(&self, urn: &str) -> Result<()> {
        let (_, tail) = split_urn(urn).ok_or_else(|| ChassisError::NoScheme(urn.to_string()))?;
        let mut loaded = self.loaded.lock();
        if !loaded.remove(tail) {
            return Err(ChassisError::SchemeHandlerFailed {
                urn: urn.to_string(),
                reason: "not loaded".into(),
            });
        }
        Ok(())
    }
}
