//! Script catalog
//!
//! Host-facing convenience layer over the bridge: script classes are
//! registered once by name, their metadata is captured at registration,
//! and resolved methods are cached per (name, arity) so repeated lookups
//! from a hot loop stay cheap.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::access::MetaData;
use crate::error::{BridgeError, Result};
use crate::handle::Handle;
use crate::Bridge;

struct ScriptType {
    name: String,
    class: Handle,
    metadata: MetaData,
    methods: Mutex<FxHashMap<(String, i32), Handle>>,
}

/// A constructed script object, tied to its registered type
pub struct ScriptInstance {
    /// Index of the registered type
    pub index: usize,
    /// Instance handle
    pub instance: Handle,
}

/// Registry of script classes known to the host
#[derive(Default)]
pub struct ScriptCatalog {
    scripts: Vec<ScriptType>,
    by_name: FxHashMap<String, usize>,
}

impl ScriptCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a script class from a loaded module
    ///
    /// Resolves the class, captures its metadata once and indexes it by
    /// the given name. Fails with ModuleNotLoaded when no module handle is
    /// supplied.
    pub fn register(
        &mut self,
        bridge: &Bridge,
        module: Option<Handle>,
        name: &str,
    ) -> Result<usize> {
        let module = module.ok_or(BridgeError::ModuleNotLoaded)?;
        let class = bridge.get_class(module, name)?;
        let metadata = bridge.meta_data(class)?;

        let index = self.scripts.len();
        self.by_name.insert(name.to_string(), index);
        self.scripts.push(ScriptType {
            name: name.to_string(),
            class,
            metadata,
            methods: Mutex::new(FxHashMap::default()),
        });
        tracing::debug!(script = name, index, "script registered");
        Ok(index)
    }

    /// Construct an instance of a registered script class
    pub fn create(&self, bridge: &Bridge, name: &str) -> Result<ScriptInstance> {
        let index = *self
            .by_name
            .get(name)
            .ok_or(BridgeError::ClassNotRegistered)?;
        let instance = bridge.new_object(self.scripts[index].class)?;
        Ok(ScriptInstance { index, instance })
    }

    /// Resolve a method on a script instance, caching by (name, arity)
    ///
    /// Returns `Ok(None)` when the type declares no matching method; other
    /// failures propagate.
    pub fn get_method(
        &self,
        bridge: &Bridge,
        script: &ScriptInstance,
        name: &str,
        argc: i32,
    ) -> Result<Option<Handle>> {
        let entry = match self.scripts.get(script.index) {
            Some(entry) => entry,
            None => return Ok(None),
        };

        let key = (name.to_string(), argc);
        if let Some(cached) = entry.methods.lock().get(&key) {
            return Ok(Some(*cached));
        }

        match bridge.get_method(entry.class, name, argc) {
            Ok(method) => {
                entry.methods.lock().insert(key, method);
                Ok(Some(method))
            }
            Err(BridgeError::MethodNotFound) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Metadata captured when the script's type was registered
    pub fn meta_data(&self, script: &ScriptInstance) -> Option<&MetaData> {
        self.scripts.get(script.index).map(|entry| &entry.metadata)
    }

    /// Number of registered script classes
    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    /// Check whether any script class is registered
    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    /// Drop every registration, releasing class and cached method handles
    ///
    /// Instance handles created through [`ScriptCatalog::create`] are not
    /// tracked here; the host destroys those itself before unloading the
    /// scope they came from.
    pub fn clear(&mut self, bridge: &Bridge) {
        for entry in self.scripts.drain(..) {
            for (_, method) in entry.methods.into_inner() {
                bridge.release(method);
            }
            bridge.release(entry.class);
            tracing::debug!(script = %entry.name, "script unregistered");
        }
        self.by_name.clear();
    }
}
