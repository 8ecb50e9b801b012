//! Component record (C5) and the descriptor shape a scheme handler hands
//! back to the loader.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::Result;
use crate::metadata::LockedMetadata;
use crate::service::{Interface, ServiceHandle};

/// A service a component provides, as handed back by a scheme handler.
pub struct ProvidedService {
    pub full_name: String,
    pub interface: Interface,
}

/// A service a component requires, named but not yet bound.
pub struct RequiredService {
    pub name: String,
}

/// Called after a component's provided services are registered and its
/// required slots are bound (L6). Receives the record so it can read its
/// own bound slots; returns `Ok(())` on success.
pub type InitFn = Box<dyn Fn(&ComponentRecord) -> Result<()> + Send + Sync>;

/// Called before a component's provided services are unregistered (U6).
pub type DeinitFn = Box<dyn Fn(&ComponentRecord) -> Result<()> + Send + Sync>;

/// What a scheme handler's `load(urn)` produces: everything the loader
/// needs to bring a component up, before any registry interaction has
/// happened.
pub struct ComponentDescriptor {
    pub name: String,
    pub provides: Vec<ProvidedService>,
    pub requires: Vec<RequiredService>,
    pub init: Option<InitFn>,
    pub deinit: Option<DeinitFn>,
    pub metadata: Vec<(String, String)>,
}

impl ComponentDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            provides: Vec::new(),
            requires: Vec::new(),
            init: None,
            deinit: None,
            metadata: Vec::new(),
        }
    }

    pub fn provides(mut self, full_name: impl Into<String>, interface: Interface) -> Self {
        self.provides.push(ProvidedService { full_name: full_name.into(), interface });
        self
    }

    pub fn requires(mut self, name: impl Into<String>) -> Self {
        self.requires.push(RequiredService { name: name.into() });
        self
    }

    pub fn with_init(mut self, f: impl Fn(&ComponentRecord) -> Result<()> + Send + Sync + 'static) -> Self {
        self.init = Some(Box::new(f));
        self
    }

    pub fn with_deinit(mut self, f: impl Fn(&ComponentRecord) -> Result<()> + Send + Sync + 'static) -> Self {
        self.deinit = Some(Box::new(f));
        self
    }
}

/// A writable required-service cell. The loader is the exclusive writer;
/// every other reader only ever observes a fully-bound or still-empty
/// slot (§5 "Shared-resource policy").
#[derive(Clone)]
pub struct RequiredSlot {
    name: String,
    cell: Arc<Mutex<Option<ServiceHandle>>>,
}

impl RequiredSlot {
    fn new(name: String) -> Self {
        Self { name, cell: Arc::new(Mutex::new(None)) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bind(&self, handle: ServiceHandle) {
        *self.cell.lock() = Some(handle);
    }

    pub fn unbind(&self) -> Option<ServiceHandle> {
        self.cell.lock().take()
    }

    pub fn get(&self) -> Option<ServiceHandle> {
        self.cell.lock().clone()
    }

    pub fn is_bound(&self) -> bool {
        self.cell.lock().is_some()
    }
}

/// A loaded component: URN, the services it provides (already
/// registered in C4) and requires (bound slots), its callbacks, and its
/// metadata.
pub struct ComponentRecord {
    urn: String,
    name: String,
    provided: Vec<ServiceHandle>,
    required: Vec<RequiredSlot>,
    init: Option<InitFn>,
    deinit: Option<DeinitFn>,
    metadata: LockedMetadata,
}

impl ComponentRecord {
    /// Build a pending record from a descriptor, with empty (unbound)
    /// required slots — used by the loader's L1 stage. `provided` is
    /// filled in by L4 once registration has actually happened.
    pub(crate) fn pending(urn: String, descriptor: ComponentDescriptor) -> (Self, Vec<ProvidedService>) {
        let required = descriptor.requires.into_iter().map(|r| RequiredSlot::new(r.name)).collect();
        let metadata = LockedMetadata::new();
        for (k, v) in descriptor.metadata {
            metadata.set(k, v);
        }
        (
            Self {
                urn,
                name: descriptor.name,
                provided: Vec::new(),
                required,
                init: descriptor.init,
                deinit: descriptor.deinit,
                metadata,
            },
            descriptor.provides,
        )
    }

    pub fn urn(&self) -> &str {
        &self.urn
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provided(&self) -> &[ServiceHandle] {
        &self.provided
    }

    pub(crate) fn set_provided(&mut self, provided: Vec<ServiceHandle>) {
        self.provided = provided;
    }

    pub fn required(&self) -> &[RequiredSlot] {
        &self.required
    }

    /// The bound handle for a required slot by name, if bound.
    pub fn get_required(&self, name: &str) -> Option<ServiceHandle> {
        self.required.iter().find(|s| s.name() == name).and_then(RequiredSlot::get)
    }

    pub fn metadata(&self) -> &LockedMetadata {
        &self.metadata
    }

    pub(crate) fn call_init(&self) -> Result<()> {
        match &self.init {
            Some(f) => f(self),
            None => Ok(()),
        }
    }

    pub(crate) fn call_deinit(&self) -> Result<()> {
        match &self.deinit {
            Some(f) => f(self),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ComponentRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRecord")
            .field("urn", &self.urn)
            .field("name", &self.name)
            .field("provided", &self.provided.len())
            .field("required", &self.required.len())
            .finish()
    }
}
