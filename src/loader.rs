//! Dynamic loader (C7): the multi-stage, failure-atomic `load`/`unload`
//! protocol over the component registry (C6), using the service
//! registry (C4) and scheme handlers (C1).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::component::{ComponentDescriptor, ComponentRecord, ProvidedService};
use crate::component_registry::{ComponentIterator, ComponentRegistry, ComponentWriteToken};
use crate::error::{ChassisError, Result};
use crate::name::bare_service_of;
use crate::registry::ServiceRegistry;
use crate::scheme::{split_urn, SchemeHandler};
use crate::service::ServiceHandle;

/// Outcome of a successful `load`.
#[derive(Debug, Clone)]
pub struct LoadReport {
    pub urns: Vec<String>,
}

/// Outcome of an `unload` call that reached the commit stage (U10).
///
/// `success` mirrors the source's boolean convention at the outer API
/// (§7 "Propagation"): `false` if every deinit and unregister in the
/// batch succeeded. `deinit_failures` / `unregister_failures` are the
/// supplemental detail this rewrite adds (§SPEC_FULL 8.1) — which URNs
/// or services recorded a failure, for callers that want more than the
/// aggregate flag.
#[derive(Debug, Clone)]
pub struct UnloadReport {
    pub urns: Vec<String>,
    pub success: bool,
    pub deinit_failures: Vec<String>,
    pub unregister_failures: Vec<String>,
}

/// The coordinator for grouped load/unload over components.
///
/// Holds a [`ComponentRegistry`] (`L_loader`) and shares a
/// [`ServiceRegistry`] (`L_registry`) with the rest of the chassis. Both
/// are cheap `Clone` handles over an inner `Arc`, so a `DynamicLoader`
/// can be constructed from the same registries the host process already
/// has. `DynamicLoader` itself is cheaply `Clone` for the same reason.
#[derive(Clone)]
pub struct DynamicLoader {
    registry: ServiceRegistry,
    components: ComponentRegistry,
}

impl DynamicLoader {
    pub fn new(registry: ServiceRegistry, components: ComponentRegistry) -> Self {
        Self { registry, components }
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// Iterator over loaded components, in URN order (§4.7.3). Holds
    /// `L_loader` for reading until released.
    pub fn iterator_create(&self) -> ComponentIterator {
        self.components.iterator_create()
    }

    /// Resolves (and caches) the scheme handler for `scheme`, looked up
    /// as the service `dynamic_loader_scheme_<scheme>` (§6).
    fn scheme_handler(&self, cache: &mut HashMap<String, Arc<dyn SchemeHandler>>, scheme: &str) -> Result<Arc<dyn SchemeHandler>> {
        if let Some(handler) = cache.get(scheme) {
            return Ok(Arc::clone(handler));
        }
        let service_name = format!("dynamic_loader_scheme_{scheme}");
        let handle = self
            .registry
            .acquire(&service_name)
            .map_err(|_| ChassisError::SchemeUnknown(scheme.to_string()))?;
        let boxed: Arc<Arc<dyn SchemeHandler>> =
            handle.downcast().ok_or_else(|| ChassisError::SchemeUnknown(scheme.to_string()))?;
        let _ = self.registry.release(&handle);
        let handler = Arc::clone(&*boxed);
        cache.insert(scheme.to_string(), Arc::clone(&handler));
        Ok(handler)
    }

    /// Rolls back L1's fetches: tells every already-resolved handler to
    /// `unload` the URN it just gave us a descriptor for. Best-effort,
    /// matching §4.7.1's rollback policy.
    fn rollback_fetches(&self, cache: &HashMap<String, Arc<dyn SchemeHandler>>, fetched: &[(String, ComponentDescriptor)]) {
        for (urn, _) in fetched {
            if let Some((scheme, _)) = split_urn(urn) {
                if let Some(handler) = cache.get(scheme) {
                    if let Err(e) = handler.unload(urn) {
                        #[cfg(feature = "logging")]
                        tracing::warn!(target: "component_chassis", urn, error = %e, "rollback unload failed");
                    }
                }
            }
        }
    }

    /// `load(urns)`: the L1-L7 pipeline (§4.7.1). Empty input is a
    /// no-op success (§8 boundary cases).
    #[cfg_attr(feature = "logging", tracing::instrument(level = "debug", skip(self, urns)))]
    pub fn load(&self, urns: &[String]) -> Result<LoadReport> {
        if urns.is_empty() {
            return Ok(LoadReport { urns: Vec::new() });
        }
        let mut loader_token = self.components.lock_write();
        self.load_pipeline(&mut loader_token, urns)
    }

    fn load_pipeline(&self, loader: &mut ComponentWriteToken, urns: &[String]) -> Result<LoadReport> {
        let mut scheme_cache: HashMap<String, Arc<dyn SchemeHandler>> = HashMap::new();

        // L1 Resolve & fetch.
        let mut fetched: Vec<(String, ComponentDescriptor)> = Vec::with_capacity(urns.len());
        for urn in urns {
            let (scheme, _tail) = match split_urn(urn) {
                Some(parts) => parts,
                None => {
                    self.rollback_fetches(&scheme_cache, &fetched);
                    return Err(ChassisError::NoScheme(urn.clone()));
                }
            };
            let handler = match self.scheme_handler(&mut scheme_cache, scheme) {
                Ok(h) => h,
                Err(e) => {
                    self.rollback_fetches(&scheme_cache, &fetched);
                    return Err(e);
                }
            };
            match handler.load(urn) {
                Ok(descriptor) => fetched.push((urn.clone(), descriptor)),
                Err(e) => {
                    self.rollback_fetches(&scheme_cache, &fetched);
                    return Err(e);
                }
            }
        }

        let mut pending: Vec<ComponentRecord> = Vec::with_capacity(fetched.len());
        let mut pending_provides: Vec<Vec<ProvidedService>> = Vec::with_capacity(fetched.len());
        for (urn, descriptor) in fetched.drain(..) {
            let (record, provides) = ComponentRecord::pending(urn, descriptor);
            pending.push(record);
            pending_provides.push(provides);
        }

        // L2 Collect provided: the bare service names provided across
        // all pending records.
        let mut provided_set: HashSet<String> = HashSet::new();
        for provides in &pending_provides {
            for p in provides {
                provided_set.insert(bare_service_of(&p.full_name).to_string());
            }
        }

        // L3 Check required: every slot must resolve either within the
        // batch or against what's already registered.
        for record in &pending {
            for slot in record.required() {
                let bare = bare_service_of(slot.name());
                let satisfied = provided_set.contains(bare) || self.registry.contains(bare);
                if !satisfied {
                    // `fetched` was already drained into `pending`; roll back
                    // by URN instead, valid since every URN in the batch
                    // fetched successfully by construction at this point.
                    self.rollback_all_fetched(&scheme_cache, urns);
                    return Err(ChassisError::dependency_unsatisfiable(record.name().to_string(), slot.name().to_string()));
                }
            }
        }

        // L4 Register provided, under `L_registry`'s writer lock, held
        // through L6 (matches the source's lock span for the unload
        // pipeline's symmetric stages, U4-U8; see DESIGN.md).
        let mut registry_token = self.registry.lock_write();
        let mut registered: Vec<String> = Vec::new();
        let mut provided_handles: Vec<Vec<ServiceHandle>> = vec![Vec::new(); pending.len()];
        for (i, provides) in pending_provides.iter().enumerate() {
            for p in provides {
                match ServiceRegistry::register_service_with(&mut registry_token, &p.full_name, p.interface.clone()) {
                    Ok(handle) => {
                        registered.push(p.full_name.clone());
                        provided_handles[i].push(handle);
                    }
                    Err(e) => {
                        for name in registered.iter().rev() {
                            let _ = ServiceRegistry::unregister_with(&mut registry_token, name);
                        }
                        drop(registry_token);
                        self.rollback_all_fetched(&scheme_cache, urns);
                        return Err(e);
                    }
                }
            }
        }
        for (record, handles) in pending.iter_mut().zip(provided_handles) {
            record.set_provided(handles);
        }

        // L5 Bind required.
        let mut bound: Vec<(usize, ServiceHandle)> = Vec::new();
        for (i, record) in pending.iter().enumerate() {
            for slot in record.required() {
                match ServiceRegistry::acquire_with(&mut registry_token, slot.name()) {
                    Ok(handle) => {
                        slot.bind(handle.clone());
                        bound.push((i, handle));
                    }
                    Err(e) => {
                        for (_, h) in bound.iter().rev() {
                            let _ = self.registry.release(h);
                        }
                        for record in &pending {
                            for slot in record.required() {
                                slot.unbind();
                            }
                        }
                        for name in registered.iter().rev() {
                            let _ = ServiceRegistry::unregister_with(&mut registry_token, name);
                        }
                        drop(registry_token);
                        self.rollback_all_fetched(&scheme_cache, urns);
                        return Err(e);
                    }
                }
            }
        }

        // L6 Initialize.
        let mut initialized: Vec<usize> = Vec::new();
        for (i, record) in pending.iter().enumerate() {
            if let Err(_init_err) = record.call_init() {
                for &j in initialized.iter().rev() {
                    if let Err(e) = pending[j].call_deinit() {
                        #[cfg(feature = "logging")]
                        tracing::warn!(target: "component_chassis", urn = pending[j].urn(), error = %e, "rollback deinit failed");
                    }
                }
                for (_, h) in bound.iter().rev() {
                    let _ = self.registry.release(h);
                }
                for record in &pending {
                    for slot in record.required() {
                        slot.unbind();
                    }
                }
                for name in registered.iter().rev() {
                    let _ = ServiceRegistry::unregister_with(&mut registry_token, name);
                }
                drop(registry_token);
                self.rollback_all_fetched(&scheme_cache, urns);
                return Err(ChassisError::InitFailed(record.name().to_string()));
            }
            initialized.push(i);
        }
        drop(registry_token);

        // L7 Commit.
        let members: Vec<(String, ComponentRecord)> = urns.iter().cloned().zip(pending).collect();
        loader.insert_generation(members);
        #[cfg(feature = "logging")]
        tracing::debug!(target: "component_chassis", count = urns.len(), "load committed");
        Ok(LoadReport { urns: urns.to_vec() })
    }

    /// Best-effort rollback of every URN's scheme fetch, used by stages
    /// past L1 where all of `urns` is known to have been fetched
    /// successfully.
    fn rollback_all_fetched(&self, cache: &HashMap<String, Arc<dyn SchemeHandler>>, urns: &[String]) {
        for urn in urns {
            if let Some((scheme, _)) = split_urn(urn) {
                if let Some(handler) = cache.get(scheme) {
                    if let Err(e) = handler.unload(urn) {
                        #[cfg(feature = "logging")]
                        tracing::warn!(target: "component_chassis", urn, error = %e, "rollback unload failed");
                    }
                }
            }
        }
    }

    /// `unload(urns)`: the U1-U10 pipeline (§4.7.2). Empty input is a
    /// no-op success.
    #[cfg_attr(feature = "logging", tracing::instrument(level = "debug", skip(self, urns)))]
    pub fn unload(&self, urns: &[String]) -> Result<UnloadReport> {
        if urns.is_empty() {
            return Ok(UnloadReport { urns: Vec::new(), success: true, deinit_failures: Vec::new(), unregister_failures: Vec::new() });
        }
        let mut loader_token = self.components.lock_write();
        self.unload_pipeline(&mut loader_token, urns)
    }

    fn unload_pipeline(&self, loader: &mut ComponentWriteToken, urns: &[String]) -> Result<UnloadReport> {
        // U1 Resolve.
        let mut seen = HashSet::with_capacity(urns.len());
        let mut records: Vec<Arc<ComponentRecord>> = Vec::with_capacity(urns.len());
        for urn in urns {
            if !seen.insert(urn.clone()) {
                return Err(ChassisError::DuplicateUrn(urn.clone()));
            }
            let record = loader.find(urn).ok_or_else(|| ChassisError::not_found(urn.clone()))?;
            records.push(record);
        }

        // U2 Topological order.
        let order = topo_unload_order(&records);

        // U3 Prefetch scheme handlers.
        let mut scheme_cache: HashMap<String, Arc<dyn SchemeHandler>> = HashMap::new();
        for urn in urns {
            let (scheme, _tail) = split_urn(urn).ok_or_else(|| ChassisError::NoScheme(urn.clone()))?;
            self.scheme_handler(&mut scheme_cache, scheme)?;
        }

        // U4 Lock for write: promote to `L_registry`.
        let mut registry_token = self.registry.lock_write();

        // U5 Check external refs.
        let mut in_batch_users: HashMap<usize, u64> = HashMap::new();
        for record in &records {
            for slot in record.required() {
                if let Some(h) = slot.get() {
                    *in_batch_users.entry(h.interface_address()).or_insert(0) += 1;
                }
            }
        }
        for record in &records {
            for provided in record.provided() {
                let in_batch = in_batch_users.get(&provided.interface_address()).copied().unwrap_or(0);
                let ext = provided.reference_count().saturating_sub(in_batch);
                if ext > 0 {
                    drop(registry_token);
                    return Err(ChassisError::ExternalReferences(provided.full_name().to_string()));
                }
            }
        }

        // U6 Deinitialize, in topological order. Failures recorded, not
        // fatal (§7 "Deinit failure").
        let mut deinit_failures = Vec::new();
        for &idx in &order {
            if let Err(e) = records[idx].call_deinit() {
                #[cfg(feature = "logging")]
                tracing::warn!(target: "component_chassis", urn = records[idx].urn(), error = %e, "deinit failed");
                deinit_failures.push(records[idx].urn().to_string());
            }
        }

        // U7 Unbind required.
        for &idx in &order {
            for slot in records[idx].required() {
                if let Some(handle) = slot.unbind() {
                    if let Err(e) = self.registry.release(&handle) {
                        #[cfg(feature = "logging")]
                        tracing::warn!(target: "component_chassis", error = %e, "release during unbind failed");
                    }
                }
            }
        }

        // U8 Unregister provided.
        let mut unregister_failures = Vec::new();
        for &idx in &order {
            for provided in records[idx].provided() {
                if let Err(e) = ServiceRegistry::unregister_with(&mut registry_token, provided.full_name()) {
                    #[cfg(feature = "logging")]
                    tracing::warn!(target: "component_chassis", full_name = provided.full_name(), error = %e, "unregister failed");
                    unregister_failures.push(provided.full_name().to_string());
                }
            }
        }
        drop(registry_token);

        // U9 Remove & ask scheme.
        for &idx in &order {
            let urn = records[idx].urn();
            loader.remove(urn);
            if let Some((scheme, _)) = split_urn(urn) {
                if let Some(handler) = scheme_cache.get(scheme) {
                    if let Err(e) = handler.unload(urn) {
                        #[cfg(feature = "logging")]
                        tracing::warn!(target: "component_chassis", urn, error = %e, "scheme unload failed");
                    }
                }
            }
        }

        // U10 Commit.
        let success = deinit_failures.is_empty() && unregister_failures.is_empty();
        #[cfg(feature = "logging")]
        tracing::debug!(target: "component_chassis", count = urns.len(), success, "unload committed");
        Ok(UnloadReport { urns: urns.to_vec(), success, deinit_failures, unregister_failures })
    }
}

/// DFS post-order over the intra-batch provide/require dependency graph
/// (§4.7.2 U2): an edge `A → B` when `B`'s required slot holds a handle
/// that `A` provided. Visit on entry, emit on exit — a component is
/// emitted only after every component that depends on it, so dependents
/// deinitialize before the services they depend on are torn down. Back
/// edges from a cycle are silently skipped (`visited` is set on entry).
fn topo_unload_order(records: &[Arc<ComponentRecord>]) -> Vec<usize> {
    let n = records.len();
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); n];
    for i in 0..n {
        for provided in records[i].provided() {
            let addr = provided.interface_address();
            for (j, other) in records.iter().enumerate() {
                if j == i {
                    continue;
                }
                for slot in other.required() {
                    if let Some(h) = slot.get() {
                        if h.interface_address() == addr {
                            successors[i].push(j);
                        }
                    }
                }
            }
        }
    }

    let mut visited = vec![false; n];
    let mut output = Vec::with_capacity(n);

    fn visit(u: usize, successors: &[Vec<usize>], visited: &mut [bool], output: &mut Vec<usize>) {
        visited[u] = true;
        for &v in &successors[u] {
            if !visited[v] {
                visit(v, successors, visited, output);
            }
        }
        output.push(u);
    }

    for i in 0..n {
        if !visited[i] {
            visit(i, &successors, &mut visited, &mut output);
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::ComponentDescriptor;
    use crate::scheme::as_interface;
    use crate::test_support::MemScheme;
    use std::sync::Arc;

    fn new_loader_with_mem(mem: MemScheme) -> DynamicLoader {
        let registry = ServiceRegistry::new();
        let components = ComponentRegistry::new();
        registry
            .register_service("dynamic_loader_scheme_mem", as_interface(mem.into_handler()))
            .unwrap();
        DynamicLoader::new(registry, components)
    }

    #[test]
    fn boundary_empty_batch_is_a_noop() {
        let loader = new_loader_with_mem(MemScheme::new());
        assert!(loader.load(&[]).unwrap().urns.is_empty());
        assert!(loader.unload(&[]).unwrap().success);
    }

    #[test]
    fn s1_simple_load_iterate_unload() {
        let mem = MemScheme::new().register("a", |_| {
            ComponentDescriptor::new("a").provides("foo.a", Arc::new(1i32))
        });
        let loader = new_loader_with_mem(mem);
        loader.load(&["mem://a".to_string()]).unwrap();
        assert!(loader.registry().contains("foo"));
        assert!(loader.registry().contains("foo.a"));
        loader.unload(&["mem://a".to_string()]).unwrap();
        assert!(!loader.registry().contains("foo"));
        assert!(!loader.registry().contains("foo.a"));
    }

    #[test]
    fn s2_dependency_satisfied_within_batch() {
        let mem = MemScheme::new()
            .register("a", |_| ComponentDescriptor::new("a").provides("foo.a", Arc::new(1i32)))
            .register("b", |_| ComponentDescriptor::new("b").requires("foo"));
        let loader = new_loader_with_mem(mem);
        loader
            .load(&["mem://a".to_string(), "mem://b".to_string()])
            .unwrap();
        let foo = loader.registry().acquire("foo.a").unwrap();
        assert_eq!(foo.reference_count(), 2); // bound by b's slot + our acquire
    }

    #[test]
    fn s2_dependency_missing_fails_at_l3() {
        let mem = MemScheme::new().register("b", |_| ComponentDescriptor::new("b").requires("foo"));
        let loader = new_loader_with_mem(mem);
        assert!(loader.load(&["mem://b".to_string()]).is_err());
        assert!(loader.components().is_empty());
    }

    #[test]
    fn s3_cyclic_batch_loads_and_unloads() {
        let mem = MemScheme::new()
            .register("a", |_| ComponentDescriptor::new("a").provides("x.a", Arc::new(1i32)).requires("y"))
            .register("b", |_| ComponentDescriptor::new("b").provides("y.b", Arc::new(2i32)).requires("x"));
        let loader = new_loader_with_mem(mem);
        loader
            .load(&["mem://a".to_string(), "mem://b".to_string()])
            .unwrap();
        let report = loader
            .unload(&["mem://a".to_string(), "mem://b".to_string()])
            .unwrap();
        assert!(report.success);
    }

    #[test]
    fn s4_external_reference_blocks_unload() {
        let mem = MemScheme::new().register("a", |_| ComponentDescriptor::new("a").provides("foo.a", Arc::new(1i32)));
        let loader = new_loader_with_mem(mem);
        loader.load(&["mem://a".to_string()]).unwrap();
        let held = loader.registry().acquire("foo").unwrap();
        assert!(loader.unload(&["mem://a".to_string()]).is_err());
        loader.registry().release(&held).unwrap();
        assert!(loader.unload(&["mem://a".to_string()]).unwrap().success);
    }

    #[test]
    fn s5_init_failure_rolls_back() {
        let mem = MemScheme::new()
            .register("a", |_| ComponentDescriptor::new("a").provides("foo.a", Arc::new(1i32)))
            .register("b", |_| {
                ComponentDescriptor::new("b")
                    .provides("bar.b", Arc::new(2i32))
                    .with_init(|_| Err(ChassisError::Internal("boom".into())))
            });
        let loader = new_loader_with_mem(mem);
        let err = loader.load(&["mem://a".to_string(), "mem://b".to_string()]).unwrap_err();
        assert!(matches!(err, ChassisError::InitFailed(_)));
        assert!(!loader.registry().contains("foo"));
        assert!(!loader.registry().contains("bar"));
        assert!(loader.components().is_empty());
    }

    #[test]
    fn duplicate_urn_in_unload_batch_rejected() {
        let mem = MemScheme::new().register("a", |_| ComponentDescriptor::new("a").provides("foo.a", Arc::new(1i32)));
        let loader = new_loader_with_mem(mem);
        loader.load(&["mem://a".to_string()]).unwrap();
        let dup = vec!["mem://a".to_string(), "mem://a".to_string()];
        assert!(loader.unload(&dup).is_err());
    }

    #[test]
    fn unknown_scheme_rejected() {
        let loader = new_loader_with_mem(MemScheme::new());
        assert!(loader.load(&["nosuch://a".to_string()]).is_err());
    }

    #[test]
    fn no_scheme_separator_rejected() {
        let loader = new_loader_with_mem(MemScheme::new());
        assert!(loader.load(&["not-a-urn".to_string()]).is_err());
    }
}
