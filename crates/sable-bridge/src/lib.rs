//! Sable embedding bridge
//!
//! Lets a native host drive objects living in the Sable managed runtime
//! through flat opaque handles: create isolated execution scopes, load
//! compiled modules into them, resolve types and methods by name,
//! construct objects, read and write members, and invoke methods with raw
//! marshaled arguments.
//!
//! The safe API lives on [`Bridge`]; the [`ffi`] module exposes the same
//! operations as a flat `extern "C"` surface with numeric error codes.

#![warn(rust_2018_idioms)]

pub mod error;
pub mod handle;
pub mod scope;
pub mod resolve;
pub mod access;
pub mod invoke;
pub mod catalog;
pub mod ffi;

pub use error::{BridgeError, Result};
pub use handle::{Handle, HandleRegistry, HandleValue, InstanceSlot};
pub use scope::{LoadedModule, ScopeId};
pub use resolve::{ClassRef, MethodRef};
pub use access::{FieldMeta, MetaData, PropertyMeta};
pub use catalog::{ScriptCatalog, ScriptInstance};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use sable_core::Heap;
use std::sync::atomic::AtomicU64;

use scope::ScopeState;

/// The embedding bridge
///
/// Owns the handle registry, the instance heap and all execution scopes.
/// Operations are synchronous and unsynchronized beyond the internal
/// locks; a host calling from multiple threads must serialize access to
/// any single scope itself.
pub struct Bridge {
    pub(crate) registry: HandleRegistry,
    pub(crate) heap: Heap,
    pub(crate) scopes: Mutex<FxHashMap<ScopeId, ScopeState>>,
    pub(crate) next_scope: AtomicU64,
}

impl Bridge {
    /// Create a bridge with no scopes and no outstanding handles
    pub fn new() -> Self {
        Self {
            registry: HandleRegistry::new(),
            heap: Heap::new(),
            scopes: Mutex::new(FxHashMap::default()),
            next_scope: AtomicU64::new(1),
        }
    }

    /// Release a handle of any kind; unknown handles are a no-op
    pub fn release(&self, handle: Handle) {
        self.registry.release(handle);
    }

    /// Handle registry (for hosts that manage raw tokens directly)
    pub fn registry(&self) -> &HandleRegistry {
        &self.registry
    }

    /// Instance heap
    pub fn heap(&self) -> &Heap {
        &self.heap
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}
