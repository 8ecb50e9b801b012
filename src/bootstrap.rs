//! Chassis bootstrap (C8): brings up C4 and C7, publishes the
//! self-describing bootstrap services into the registry, and reverses
//! the whole thing on shutdown.
//!
//! Grounded on `minimal_chassis_init`/`minimal_chassis_deinit`
//! (`examples/original_source/components/libminchassis/minimal_chassis.cc`):
//! that function registers the registry's own service implementations
//! (including a `_no_lock` flavor under a distinct name) into the
//! registry it just created, then initializes the dynamic loader, then
//! seeds a statically-linked component's provided services. Teardown
//! runs the same steps in reverse, unloading loaded components before
//! tearing down the registry itself.

use std::sync::Arc;

use crate::component_registry::ComponentRegistry;
use crate::config::ChassisConfig;
use crate::error::Result;
use crate::loader::DynamicLoader;
use crate::registry::ServiceRegistry;
use crate::service::Interface;

/// The running chassis: a service registry, a dynamic loader sharing
/// it, and (optionally) a set of self-describing bootstrap services
/// published into the registry itself (§4.8).
pub struct Chassis {
    pub registry: ServiceRegistry,
    pub loader: DynamicLoader,
    config: ChassisConfig,
    self_service_names: Vec<String>,
}

impl Chassis {
    /// Brings up the registry and loader, then (unless
    /// `ChassisConfig::register_bootstrap_services` is false) publishes
    /// the bootstrap services.
    #[cfg_attr(feature = "logging", tracing::instrument(level = "debug", skip(config)))]
    pub fn new(config: ChassisConfig) -> Result<Self> {
        let registry = ServiceRegistry::with_capacity(config.registry_capacity);
        let components = ComponentRegistry::with_capacity(config.component_capacity);
        let loader = DynamicLoader::new(registry.clone(), components);

        let self_service_names = if config.register_bootstrap_services {
            Self::register_self_services(&registry, &loader)?
        } else {
            Vec::new()
        };

        #[cfg(feature = "logging")]
        tracing::info!(target: "component_chassis", bootstrap_services = self_service_names.len(), "chassis initialized");
        Ok(Self { registry, loader, config, self_service_names })
    }

    pub fn config(&self) -> &ChassisConfig {
        &self.config
    }

    /// Publishes the registry's and loader's own operations into the
    /// registry under the names enumerated in §4.8, so a loaded
    /// component can `acquire` them like any other service. `registry`
    /// and `registry_registration` are each published twice: a
    /// `.locking` flavor (the default, reached by the bare name) and a
    /// `.no_lock` flavor reached only by its full name — the realization
    /// of the source's simultaneous `mysql_minimal_chassis` /
    /// `mysql_minimal_chassis_no_lock` service pairs. Every other
    /// bootstrap service has a single flavor, matching
    /// `minimal_chassis.cc`'s `BEGIN_SERVICE_IMPLEMENTATION` list (it
    /// only declares a `_no_lock` pair for `registry` /
    /// `registry_registration`).
    ///
    /// Rolls back everything already registered if any one registration
    /// fails (full names are assumed not to collide in a fresh chassis,
    /// so failure here indicates a configuration bug rather than a
    /// runtime condition).
    fn register_self_services(registry: &ServiceRegistry, loader: &DynamicLoader) -> Result<Vec<String>> {
        let plan: Vec<(&str, Interface)> = vec![
            ("registry.locking", Arc::new(registry.clone())),
            ("registry.no_lock", Arc::new(registry.clone())),
            ("registry_registration.locking", Arc::new(registry.clone())),
            ("registry_registration.no_lock", Arc::new(registry.clone())),
            ("registry_query.bootstrap", Arc::new(registry.clone())),
            ("registry_metadata_enumerate.bootstrap", Arc::new(registry.clone())),
            ("registry_metadata_query.bootstrap", Arc::new(registry.clone())),
            ("dynamic_loader.bootstrap", Arc::new(loader.clone())),
            ("dynamic_loader_query.bootstrap", Arc::new(loader.clone())),
            ("dynamic_loader_metadata_enumerate.bootstrap", Arc::new(loader.clone())),
            ("dynamic_loader_metadata_query.bootstrap", Arc::new(loader.clone())),
        ];

        let mut registered = Vec::with_capacity(plan.len());
        for (name, interface) in plan {
            match registry.register_service(name, interface) {
                Ok(_) => registered.push(name.to_string()),
                Err(e) => {
                    for done in registered.iter().rev() {
                        let _ = registry.unregister(done);
                    }
                    return Err(e);
                }
            }
        }
        Ok(registered)
    }

    /// Reverses bootstrap: unloads every generation group newest first
    /// (a group that fails to unload cleanly is logged and force-removed
    /// rather than retried, per §4.8/§9), unregisters the self-services,
    /// then drops the registry and loader handles.
    #[cfg_attr(feature = "logging", tracing::instrument(level = "debug", skip(self)))]
    pub fn shutdown(self) -> Result<()> {
        for group in self.loader.components().generations_newest_first() {
            match self.loader.unload(&group) {
                Ok(report) if report.success => {}
                Ok(report) => {
                    #[cfg(feature = "logging")]
                    tracing::warn!(
                        target: "component_chassis",
                        deinit_failures = report.deinit_failures.len(),
                        unregister_failures = report.unregister_failures.len(),
                        "generation group unloaded with failures during shutdown"
                    );
                }
                Err(e) => {
                    #[cfg(feature = "logging")]
                    tracing::warn!(target: "component_chassis", error = %e, "generation group failed to unload during shutdown, dropping");
                    let mut token = self.loader.components().lock_write();
                    for urn in &group {
                        token.remove(urn);
                    }
                }
            }
        }

        for name in self.self_service_names.iter().rev() {
            if let Err(e) = self.registry.unregister(name) {
                #[cfg(feature = "logging")]
                tracing::warn!(target: "component_chassis", name, error = %e, "failed to unregister bootstrap service during shutdown");
            }
        }

        #[cfg(feature = "logging")]
        tracing::info!(target: "component_chassis", "chassis shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_services_are_reachable() {
        let chassis = Chassis::new(ChassisConfig::default()).unwrap();
        assert!(chassis.registry.contains("registry"));
        assert!(chassis.registry.contains("registry.no_lock"));
        assert!(chassis.registry.contains("dynamic_loader"));
        let handle = chassis.registry.acquire("dynamic_loader.bootstrap").unwrap();
        assert!(handle.downcast::<DynamicLoader>().is_some());
        chassis.registry.release(&handle).unwrap();
    }

    #[test]
    fn without_bootstrap_services_registry_is_empty() {
        let chassis = Chassis::new(ChassisConfig::default().without_bootstrap_services()).unwrap();
        assert!(chassis.registry.is_empty());
        chassis.shutdown().unwrap();
    }

    #[test]
    fn shutdown_unregisters_self_services() {
        let chassis = Chassis::new(ChassisConfig::default()).unwrap();
        chassis.shutdown().unwrap();
    }
}
