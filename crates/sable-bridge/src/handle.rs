//! Handle registry
//!
//! Managed-runtime values cross to the host as opaque u64 tokens. The
//! registry owns the mapping; pin creates a token, deref resolves one
//! without consuming it, release removes it. Keys come from a monotonic
//! counter and are never reissued, so a released handle can never resolve
//! to a different value later.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use sable_core::InstanceRef;
use std::sync::Arc;

use crate::error::{BridgeError, Result};
use crate::resolve::{ClassRef, MethodRef};
use crate::scope::{LoadedModule, ScopeId};

/// Opaque token identifying one managed value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(u64);

impl Handle {
    /// The null handle (resolves to nothing)
    pub const NULL: Handle = Handle(0);

    /// Wrap a raw token value
    pub fn from_raw(raw: u64) -> Self {
        Handle(raw)
    }

    /// Raw token value
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Check for the null handle
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

/// An instance pinned together with its defining module
///
/// The module reference is what lets the accessor resolve enum types
/// declared next to the instance's class.
#[derive(Clone)]
pub struct InstanceSlot {
    /// The heap instance
    pub instance: InstanceRef,
    /// Module the class was loaded from (None for well-known types)
    pub module: Option<Arc<LoadedModule>>,
}

/// A value held by the registry
#[derive(Clone)]
pub enum HandleValue {
    /// Execution scope
    Scope(ScopeId),
    /// Loaded module
    Module(Arc<LoadedModule>),
    /// Resolved class
    Class(ClassRef),
    /// Resolved method
    Method(MethodRef),
    /// Constructed instance
    Instance(InstanceSlot),
}

#[derive(Default)]
struct RegistryInner {
    next: u64,
    entries: FxHashMap<u64, HandleValue>,
}

/// Process-wide table mapping tokens to owned values
#[derive(Default)]
pub struct HandleRegistry {
    inner: Mutex<RegistryInner>,
}

impl HandleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a value and return its token
    pub fn pin(&self, value: HandleValue) -> Handle {
        let mut inner = self.inner.lock();
        inner.next += 1;
        let key = inner.next;
        inner.entries.insert(key, value);
        Handle(key)
    }

    /// Resolve a token without consuming it
    pub fn deref(&self, handle: Handle) -> Result<HandleValue> {
        self.inner
            .lock()
            .entries
            .get(&handle.0)
            .cloned()
            .ok_or(BridgeError::MissingRequiredArgument)
    }

    /// Remove a registration; releasing an unknown handle is a no-op
    pub fn release(&self, handle: Handle) {
        self.inner.lock().entries.remove(&handle.0);
    }

    /// Remove every entry the predicate selects
    pub fn purge(&self, mut keep: impl FnMut(&HandleValue) -> bool) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, value| keep(value));
        before - inner.entries.len()
    }

    /// Number of outstanding handles
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Check whether any handle is outstanding
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_deref_release() {
        let registry = HandleRegistry::new();
        let handle = registry.pin(HandleValue::Scope(ScopeId(7)));
        assert!(!handle.is_null());

        match registry.deref(handle).unwrap() {
            HandleValue::Scope(id) => assert_eq!(id, ScopeId(7)),
            _ => panic!("wrong handle value"),
        }

        registry.release(handle);
        assert!(matches!(
            registry.deref(handle),
            Err(BridgeError::MissingRequiredArgument)
        ));
    }

    #[test]
    fn test_release_is_idempotent() {
        let registry = HandleRegistry::new();
        let handle = registry.pin(HandleValue::Scope(ScopeId(1)));
        registry.release(handle);
        registry.release(handle);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_keys_are_never_reused() {
        let registry = HandleRegistry::new();
        let first = registry.pin(HandleValue::Scope(ScopeId(1)));
        registry.release(first);
        let second = registry.pin(HandleValue::Scope(ScopeId(2)));
        assert_ne!(first.raw(), second.raw());

        // The released token stays dead even after new registrations.
        assert!(registry.deref(first).is_err());
        assert!(registry.deref(second).is_ok());
    }

    #[test]
    fn test_null_handle_never_resolves() {
        let registry = HandleRegistry::new();
        assert!(registry.deref(Handle::NULL).is_err());
    }
}
