//! Execution scopes
//!
//! A scope is an isolated, independently unloadable container for loaded
//! modules. Scopes exist so a rebuilt module can replace the old one:
//! unloading drops everything the scope loaded, purges every handle
//! derived from its modules, and forces a full collection cycle so the
//! backing file can be overwritten.

use rustc_hash::FxHashMap;
use sable_core::{ClassDef, EnumDef, ModuleImage, StaticStore};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::error::Result;
use crate::handle::{Handle, HandleValue};
use crate::Bridge;

/// Unique identifier for an execution scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub(crate) u64);

impl ScopeId {
    /// Raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// A module loaded into a scope
pub struct LoadedModule {
    /// Owning scope
    pub scope: ScopeId,
    /// Module name (from the image header)
    pub name: String,
    /// Class definitions, in image order
    pub classes: Vec<Arc<ClassDef>>,
    /// Enum definitions, keyed by qualified name
    pub enums: FxHashMap<String, EnumDef>,
    /// Static field storage for this module's classes
    pub statics: StaticStore,
    by_name: FxHashMap<String, usize>,
}

impl LoadedModule {
    pub(crate) fn from_image(scope: ScopeId, image: ModuleImage) -> Self {
        let name = image.name.clone();
        let statics = StaticStore::for_classes(image.classes.iter());
        let classes: Vec<Arc<ClassDef>> = image.classes.into_iter().map(Arc::new).collect();
        let by_name = classes
            .iter()
            .enumerate()
            .map(|(index, class)| (class.name.clone(), index))
            .collect();
        let enums = image
            .enums
            .into_iter()
            .map(|e| (e.name.clone(), e))
            .collect();

        Self {
            scope,
            name,
            classes,
            enums,
            statics,
            by_name,
        }
    }

    /// Look up a class by qualified name
    pub fn class(&self, name: &str) -> Option<Arc<ClassDef>> {
        self.by_name.get(name).map(|index| self.classes[*index].clone())
    }
}

pub(crate) struct ScopeState {
    pub base_dir: PathBuf,
    pub modules: FxHashMap<String, Arc<LoadedModule>>,
}

impl Bridge {
    /// Create a new execution scope
    ///
    /// `base_dir` anchors relative module paths; it defaults to the
    /// directory of the running executable.
    pub fn create_scope(&self, base_dir: Option<&Path>) -> Handle {
        let base_dir = base_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(default_base_dir);
        let id = ScopeId(self.next_scope.fetch_add(1, Ordering::Relaxed));

        self.scopes.lock().insert(
            id,
            ScopeState {
                base_dir,
                modules: FxHashMap::default(),
            },
        );
        tracing::debug!(scope = id.as_u64(), "scope created");
        self.registry.pin(HandleValue::Scope(id))
    }

    /// Unload a scope
    ///
    /// Drops every module loaded into the scope, invalidates every module,
    /// class and method handle derived from them, and forces one full
    /// collection cycle. Instance handles are not tracked per scope and
    /// may be left dangling; destroying them first is the caller's
    /// responsibility. Other scopes are unaffected.
    pub fn unload_scope(&self, scope: Handle) -> Result<()> {
        let id = self.deref_scope(scope)?;

        let state = self.scopes.lock().remove(&id);
        self.registry.release(scope);
        let purged = self.registry.purge(|value| match value {
            HandleValue::Module(module) => module.scope != id,
            HandleValue::Class(class) => class.scope() != Some(id),
            HandleValue::Method(method) => method.class.scope() != Some(id),
            _ => true,
        });
        drop(state);

        let reclaimed = self.heap.collect();
        tracing::debug!(
            scope = id.as_u64(),
            purged,
            reclaimed,
            "scope unloaded"
        );
        Ok(())
    }

    /// Load a module from a path relative to the scope's base directory
    ///
    /// Returns `Ok(None)` on any load failure: missing file, invalid
    /// image, or a module with the same name already loaded into the
    /// scope.
    pub fn load_from_path(&self, scope: Handle, relative: &str) -> Result<Option<Handle>> {
        let id = self.deref_scope(scope)?;
        let path = {
            let scopes = self.scopes.lock();
            let state = match scopes.get(&id) {
                Some(state) => state,
                None => return Ok(None),
            };
            state.base_dir.join(relative)
        };

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "module load failed");
                return Ok(None);
            }
        };
        Ok(self.load_image(id, &bytes, Some(&path)))
    }

    /// Load a module from an in-memory image
    ///
    /// The buffer is copied before decoding; the caller may free it as
    /// soon as the call returns. Same null-on-failure contract as
    /// [`Bridge::load_from_path`].
    pub fn load_from_bytes(&self, scope: Handle, buffer: &[u8]) -> Result<Option<Handle>> {
        let id = self.deref_scope(scope)?;
        let owned = buffer.to_vec();
        Ok(self.load_image(id, &owned, None))
    }

    fn load_image(&self, id: ScopeId, bytes: &[u8], origin: Option<&Path>) -> Option<Handle> {
        let image = match ModuleImage::decode(bytes) {
            Ok(image) => image,
            Err(err) => {
                tracing::warn!(%err, "invalid module image");
                return None;
            }
        };
        let name = image.name.clone();

        let mut scopes = self.scopes.lock();
        let state = scopes.get_mut(&id)?;
        if state.modules.contains_key(&name) {
            tracing::warn!(module = %name, "module already loaded into scope");
            return None;
        }

        let module = Arc::new(LoadedModule::from_image(id, image));
        state.modules.insert(name.clone(), module.clone());
        drop(scopes);

        tracing::debug!(
            scope = id.as_u64(),
            module = %name,
            origin = %origin.map(|p| p.display().to_string()).unwrap_or_else(|| "<bytes>".into()),
            "module loaded"
        );
        Some(self.registry.pin(HandleValue::Module(module)))
    }

    fn deref_scope(&self, scope: Handle) -> Result<ScopeId> {
        match self.registry.deref(scope)? {
            HandleValue::Scope(id) => Ok(id),
            _ => Err(crate::BridgeError::MissingRequiredArgument),
        }
    }
}

fn default_base_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}
