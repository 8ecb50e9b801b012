//! Scheme handler interface (C1): maps a URN to and from a component
//! descriptor. Concrete handlers (the OS "file" scheme, dynamic
//! linking, etc.) are out of scope — this module defines the trait the
//! loader calls through, plus an in-memory handler used by this crate's
//! own test suite.

use std::sync::Arc;

use crate::component::ComponentDescriptor;
use crate::error::Result;
use crate::service::Interface;

/// A pluggable resolver from URNs to component archives.
///
/// Registered into the service registry like any other implementation,
/// under the name `dynamic_loader_scheme_<scheme>` (§6), so the loader
/// discovers handlers through the ordinary service mechanism.
pub trait SchemeHandler: Send + Sync + 'static {
    /// Resolve `urn` to a component descriptor. Must be idempotent
    /// under failure (a failed `load` leaves no state) and must refuse
    /// a double-load of the same URN.
    fn load(&self, urn: &str) -> Result<ComponentDescriptor>;

    /// Inverse of `load`. After this returns `Ok`, any descriptor
    /// previously yielded by `load(urn)` is invalid.
    fn unload(&self, urn: &str) -> Result<()>;
}

/// Split a URN into `(scheme, tail)`. Returns `None` if there is no
/// `://` separator (reported by callers as `ChassisError::NoScheme`).
pub fn split_urn(urn: &str) -> Option<(&str, &str)> {
    urn.split_once("://")
}

/// Wrap a handler as the opaque interface value stored under
/// `dynamic_loader_scheme_<scheme>` in the service registry.
pub fn as_interface(handler: Arc<dyn SchemeHandler>) -> Interface {
    Arc::new(handler)
}
