//! # component-chassis
//!
//! A service registry and dynamic component loader: a name-addressed
//! store of type-erased service implementations (the registry), and a
//! multi-stage, failure-atomic loader that brings up and tears down
//! groups of components against it.
//!
//! ## Quick start
//!
//! ```rust
//! use component_chassis::bootstrap::Chassis;
//! use component_chassis::component::ComponentDescriptor;
//! use component_chassis::config::ChassisConfig;
//! use component_chassis::scheme::as_interface;
//! use component_chassis::test_support::MemScheme;
//! use std::sync::Arc;
//!
//! let chassis = Chassis::new(ChassisConfig::default()).unwrap();
//!
//! let mem = MemScheme::new().register("greeter", |_| {
//!     ComponentDescriptor::new("greeter").provides("greeting.default", Arc::new(String::from("hi")))
//! });
//! chassis
//!     .registry
//!     .register_service("dynamic_loader_scheme_mem", as_interface(mem.into_handler()))
//!     .unwrap();
//!
//! chassis.loader.load(&["mem://greeter".to_string()]).unwrap();
//! let greeting = chassis.registry.acquire("greeting").unwrap();
//! assert_eq!(greeting.downcast::<String>().unwrap().as_str(), "hi");
//! chassis.registry.release(&greeting).unwrap();
//!
//! chassis.loader.unload(&["mem://greeter".to_string()]).unwrap();
//! ```
//!
//! ## Module map
//!
//! - [`error`] — `ChassisError` and the crate's `Result` alias.
//! - [`name`] — the `service.implementation` naming grammar.
//! - [`metadata`] — the per-record string metadata map.
//! - [`lock`] — the scoped read/write lock and token primitives.
//! - [`service`] — `ServiceHandle`, the registry's opaque value type.
//! - [`registry`] — `ServiceRegistry`, the name→implementation store.
//! - [`component`] — `ComponentRecord`, `ComponentDescriptor`, required slots.
//! - [`component_registry`] — `ComponentRegistry`, the URN→component store.
//! - [`scheme`] — the `SchemeHandler` trait and URN parsing.
//! - [`loader`] — `DynamicLoader`, the load/unload pipelines.
//! - [`bootstrap`] — `Chassis`, init/teardown and self-describing services.
//! - [`config`] — `ChassisConfig`.
//! - [`logging`] — structured logging setup (requires the `logging` feature).

pub mod bootstrap;
pub mod component;
pub mod component_registry;
pub mod config;
pub mod error;
pub mod lock;
#[cfg(feature = "logging")]
pub mod logging;
pub mod metadata;
pub mod name;
pub mod registry;
pub mod scheme;
pub mod service;
pub mod test_support;

mod loader;
pub use loader::{DynamicLoader, LoadReport, UnloadReport};

pub use bootstrap::Chassis;
pub use config::ChassisConfig;
pub use error::{ChassisError, Result};

// Re-export tracing macros for convenience when the logging feature is
// enabled, matching the teacher's convention for this crate's callers.
#[cfg(feature = "logging")]
pub use tracing::{debug, error, info, trace, warn};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::bootstrap::Chassis;
    pub use crate::component::{ComponentDescriptor, ComponentRecord};
    pub use crate::component_registry::ComponentRegistry;
    pub use crate::config::ChassisConfig;
    pub use crate::error::{ChassisError, Result};
    pub use crate::loader::{DynamicLoader, LoadReport, UnloadReport};
    pub use crate::registry::ServiceRegistry;
    pub use crate::scheme::SchemeHandler;
    pub use crate::service::ServiceHandle;
}
