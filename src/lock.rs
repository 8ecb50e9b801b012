//! The scoped-lock design primitive (§4.1): a reader/writer lock whose
//! acquisition yields a value that releases the lock on every exit path,
//! including unwinding. The guard is movable, never copyable — moving it
//! transfers release responsibility to the new owner.
//!
//! Built on `parking_lot`'s owned-guard API (the `arc_lock` feature)
//! rather than borrowed guards, so a scoped lock can be returned from a
//! function, stored in an iterator, or threaded through a multi-stage
//! pipeline without fighting lifetimes.

use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, RawRwLock, RwLock};
use std::sync::Arc;

/// An owned read-lock guard over `T`.
pub type ReadGuard<T> = ArcRwLockReadGuard<RawRwLock, T>;
/// An owned write-lock guard over `T`.
pub type WriteGuard<T> = ArcRwLockWriteGuard<RawRwLock, T>;

/// Acquire `lock` for reading, returning an owned guard.
pub fn read<T>(lock: &Arc<RwLock<T>>) -> ReadGuard<T> {
    RwLock::read_arc(lock)
}

/// Acquire `lock` for writing, returning an owned guard.
pub fn write<T>(lock: &Arc<RwLock<T>>) -> WriteGuard<T> {
    RwLock::write_arc(lock)
}

/// A token proving the caller already holds a writer lock on `T`.
///
/// This is the realization of the design note in `spec.md` §9 ("No-lock
/// variants"): instead of a parallel `_nolock` method for every locking
/// one, a method that needs the writer lock already held takes
/// `&mut WriteToken<T>` and operates on its contents directly. There is
/// no way to construct a `WriteToken` except by actually acquiring the
/// lock, so calling a `_with`-suffixed method without holding the lock
/// is a type error, not a runtime footgun.
pub struct WriteToken<T> {
    guard: WriteGuard<T>,
}

impl<T> WriteToken<T> {
    pub fn new(guard: WriteGuard<T>) -> Self {
        Self { guard }
    }
}

impl<T> std::ops::Deref for WriteToken<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> std::ops::DerefMut for WriteToken<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

/// A token proving the caller already holds a reader lock on `T`.
pub struct ReadToken<T> {
    guard: ReadGuard<T>,
}

impl<T> ReadToken<T> {
    pub fn new(guard: ReadGuard<T>) -> Self {
        Self { guard }
    }
}

impl<T> std::ops::Deref for ReadToken<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.guard
    }
}
