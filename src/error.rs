//! Error types for the component runtime.

use thiserror::Error;

/// Errors that can occur during registry or loader operations.
#[derive(Error, Debug, Clone)]
pub enum ChassisError {
    /// A service name violated the `service.implementation` grammar.
    #[error("malformed service name: {name:?}")]
    MalformedName { name: String },

    /// Lookup of a service, component, or generation failed.
    #[error("not found: {0}")]
    NotFound(String),

    /// A full name was already present in the registry.
    #[error("service already registered: {0}")]
    AlreadyRegistered(String),

    /// `unregister` was attempted while the record's reference count was
    /// still above zero.
    #[error("service still referenced: {0}")]
    StillReferenced(String),

    /// A required service slot could not be satisfied from the registry
    /// or from the services provided within the same load batch.
    #[error("dependency unsatisfiable: {component} requires {service}")]
    DependencyUnsatisfiable { component: String, service: String },

    /// A URN's scheme has no registered handler.
    #[error("unknown scheme: {0}")]
    SchemeUnknown(String),

    /// A scheme handler's `load`/`unload` call failed.
    #[error("scheme handler failed for {urn}: {reason}")]
    SchemeHandlerFailed { urn: String, reason: String },

    /// A component's `init` callback reported failure.
    #[error("init failed for component {0}")]
    InitFailed(String),

    /// A component's `deinit` callback reported failure. Recorded, not
    /// fatal to the enclosing `unload`.
    #[error("deinit failed for component {0}")]
    DeinitFailed(String),

    /// `release` was called on a handle whose reference count was
    /// already zero.
    #[error("reference count underflow releasing {0}")]
    RefcountUnderflow(String),

    /// `unload` was rejected because a service provided within the batch
    /// is still held by a consumer outside the batch.
    #[error("external references remain on {0}")]
    ExternalReferences(String),

    /// A URN lacked the `scheme://` separator.
    #[error("no scheme in URN: {0}")]
    NoScheme(String),

    /// A URN appeared more than once in the same `load`/`unload` call.
    #[error("duplicate URN in batch: {0}")]
    DuplicateUrn(String),

    /// Internal error that does not fit another variant.
    #[error("internal chassis error: {0}")]
    Internal(String),
}

impl ChassisError {
    #[inline]
    pub fn malformed_name(name: impl Into<String>) -> Self {
        Self::MalformedName { name: name.into() }
    }

    #[inline]
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound(name.into())
    }

    #[inline]
    pub fn already_registered(name: impl Into<String>) -> Self {
        Self::AlreadyRegistered(name.into())
    }

    #[inline]
    pub fn still_referenced(name: impl Into<String>) -> Self {
        Self::StillReferenced(name.into())
    }

    #[inline]
    pub fn dependency_unsatisfiable(component: impl Into<String>, service: impl Into<String>) -> Self {
        Self::DependencyUnsatisfiable {
            component: component.into(),
            service: service.into(),
        }
    }
}

/// Result type alias for chassis operations.
pub type Result<T> = std::result::Result<T, ChassisError>;
