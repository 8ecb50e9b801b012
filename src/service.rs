//! Service implementation record (C3): a named vtable, a reference
//! count, and a metadata map.

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::metadata::LockedMetadata;

/// The opaque interface value a service implementation provides. Any
/// `Send + Sync + 'static` value can stand in for a vtable; identity for
/// the registry's by-interface index is the value's allocation address.
pub type Interface = Arc<dyn Any + Send + Sync>;

struct ServiceRecordInner {
    full_name: String,
    interface: Interface,
    refcount: AtomicU64,
    metadata: LockedMetadata,
}

/// A handle to a registered service implementation.
///
/// Cloning a `ServiceHandle` is cheap (it shares the underlying record)
/// but does **not** itself bump the record's reference count — only
/// [`crate::registry::ServiceRegistry::acquire`] does that. This mirrors
/// the source's distinction between a raw pointer to a vtable and the
/// logical "I hold a reference" count the registry tracks separately.
#[derive(Clone)]
pub struct ServiceHandle(Arc<ServiceRecordInner>);

impl ServiceHandle {
    pub(crate) fn new(full_name: String, interface: Interface) -> Self {
        Self(Arc::new(ServiceRecordInner {
            full_name,
            interface,
            refcount: AtomicU64::new(0),
            metadata: LockedMetadata::new(),
        }))
    }

    /// The record's full `service.implementation` name.
    pub fn full_name(&self) -> &str {
        &self.0.full_name
    }

    /// The opaque interface value, downcast to a concrete type.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.0.interface).downcast::<T>().ok()
    }

    /// A stable identity for this record's interface value, used by the
    /// registry's by-interface index.
    pub(crate) fn interface_address(&self) -> usize {
        Arc::as_ptr(&self.0.interface) as *const () as usize
    }

    pub(crate) fn metadata(&self) -> &LockedMetadata {
        &self.0.metadata
    }

    /// Current reference count. Exposed for testing invariant 2 (§8) and
    /// for the loader's external-reference check (U5).
    pub fn reference_count(&self) -> u64 {
        self.0.refcount.load(Ordering::Acquire)
    }

    /// Atomic fetch-add; returns the count *before* this call.
    pub(crate) fn add_reference(&self) -> u64 {
        self.0.refcount.fetch_add(1, Ordering::AcqRel)
    }

    /// CAS loop that refuses to decrement below zero.
    ///
    /// Returns `true` on success, `false` if the count was already zero
    /// (mirrors `my_ref_counted::release_reference`'s `bool` convention,
    /// inverted here to the idiomatic "did it work" sense used
    /// throughout this crate).
    pub(crate) fn release_reference(&self) -> bool {
        let mut current = self.0.refcount.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return false;
            }
            match self.0.refcount.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    /// Identity comparison: do two handles refer to the same record?
    pub fn same_record(&self, other: &ServiceHandle) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for ServiceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceHandle")
            .field("full_name", &self.0.full_name)
            .field("refcount", &self.reference_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_release_reference_round_trip() {
        let h = ServiceHandle::new("foo.bar".into(), Arc::new(42i32));
        assert_eq!(h.add_reference(), 0);
        assert_eq!(h.reference_count(), 1);
        assert!(h.release_reference());
        assert_eq!(h.reference_count(), 0);
    }

    #[test]
    fn release_below_zero_fails() {
        let h = ServiceHandle::new("foo.bar".into(), Arc::new(42i32));
        assert!(!h.release_reference());
        assert_eq!(h.reference_count(), 0);
    }

    #[test]
    fn downcast_roundtrips_value() {
        let h = ServiceHandle::new("foo.bar".into(), Arc::new(7i32));
        let v = h.downcast::<i32>().unwrap();
        assert_eq!(*v, 7);
        assert!(h.downcast::<String>().is_none());
    }
}
