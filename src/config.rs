//! Chassis configuration knobs: capacity hints and bootstrap behavior.

/// Configuration for a [`crate::bootstrap::Chassis`].
///
/// Mirrors the teacher's `Container::with_capacity` convention of taking
/// capacity hints up front rather than resizing maps on first insert —
/// generalized here to the registry and component registry this runtime
/// actually holds.
#[derive(Debug, Clone)]
pub struct ChassisConfig {
    /// Expected number of distinct service implementations, used to
    /// pre-size the registry's indices.
    pub registry_capacity: usize,
    /// Expected number of components loaded at once, used to pre-size
    /// the component registry.
    pub component_capacity: usize,
    /// Whether [`crate::bootstrap::Chassis::new`] registers the
    /// self-describing bootstrap services (§4.8) — registry and
    /// dynamic-loader lookup/registration/metadata services. Disabling
    /// this is useful for tests that only need the bare registries.
    pub register_bootstrap_services: bool,
}

impl Default for ChassisConfig {
    fn default() -> Self {
        Self {
            registry_capacity: 64,
            component_capacity: 16,
            register_bootstrap_services: true,
        }
    }
}

impl ChassisConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registry_capacity(mut self, capacity: usize) -> Self {
        self.registry_capacity = capacity;
        self
    }

    pub fn with_component_capacity(mut self, capacity: usize) -> Self {
        self.component_capacity = capacity;
        self
    }

    pub fn without_bootstrap_services(mut self) -> Self {
        self.register_bootstrap_services = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_register_bootstrap_services() {
        assert!(ChassisConfig::default().register_bootstrap_services);
    }

    #[test]
    fn builder_chain() {
        let cfg = ChassisConfig::new()
            .with_registry_capacity(128)
            .with_component_capacity(32)
            .without_bootstrap_services();
        assert_eq!(cfg.registry_capacity, 128);
        assert_eq!(cfg.component_capacity, 32);
        assert!(!cfg.register_bootstrap_services);
    }
}
