//! Type and method resolution
//!
//! Class lookup runs three tiers: the global well-known-type table, the
//! module's qualified-name map, then a linear scan over every type in the
//! module. Method lookup matches on name and parameter count only; when
//! overloads share both, declaration order decides and callers must not
//! rely on which one wins.

use once_cell::sync::Lazy;
use rustc_hash::{FxHashMap, FxHashSet};
use sable_core::{ClassDef, MethodDef};
use std::sync::Arc;

use crate::error::{BridgeError, Result};
use crate::handle::{Handle, HandleValue};
use crate::scope::{LoadedModule, ScopeId};
use crate::Bridge;

/// Root of the type hierarchy; every class is assignable to it
pub const ROOT_CLASS: &str = "sable.Object";

/// Globally known types, resolvable without a module scan
static WELL_KNOWN: Lazy<FxHashMap<&'static str, Arc<ClassDef>>> = Lazy::new(|| {
    let mut table = FxHashMap::default();
    table.insert(ROOT_CLASS, Arc::new(ClassDef::new(ROOT_CLASS)));
    table
});

/// A resolved class, pinned together with its defining module
#[derive(Clone)]
pub struct ClassRef {
    /// Defining module (None for well-known types)
    pub module: Option<Arc<LoadedModule>>,
    /// The class definition
    pub class: Arc<ClassDef>,
}

impl ClassRef {
    /// Scope the class was loaded into, if any
    pub fn scope(&self) -> Option<ScopeId> {
        self.module.as_ref().map(|m| m.scope)
    }
}

/// A resolved method overload
#[derive(Clone)]
pub struct MethodRef {
    /// Declaring class
    pub class: ClassRef,
    /// Index into the class's method table
    pub index: usize,
}

impl MethodRef {
    /// The method definition
    pub fn method(&self) -> &MethodDef {
        &self.class.class.methods[self.index]
    }
}

impl Bridge {
    /// Resolve a class by name within a module
    ///
    /// Resolution order: well-known types, the module's qualified-name
    /// map, then a linear scan comparing fully qualified names exactly
    /// (case-sensitive). First match wins.
    pub fn get_class(&self, module: Handle, name: &str) -> Result<Handle> {
        let module = self.deref_module(module)?;

        if let Some(class) = WELL_KNOWN.get(name) {
            return Ok(self.registry.pin(HandleValue::Class(ClassRef {
                module: None,
                class: class.clone(),
            })));
        }

        let found = module
            .class(name)
            .or_else(|| {
                module
                    .classes
                    .iter()
                    .find(|class| class.name == name)
                    .cloned()
            })
            .ok_or(BridgeError::ClassNotFound)?;

        Ok(self.registry.pin(HandleValue::Class(ClassRef {
            module: Some(module),
            class: found,
        })))
    }

    /// Resolve a method by name and parameter count
    ///
    /// Searches every method declared on the class, static or instance,
    /// and returns the first whose name matches exactly and whose
    /// parameter count equals `argc`. No signature disambiguation is
    /// performed.
    pub fn get_method(&self, class: Handle, name: &str, argc: i32) -> Result<Handle> {
        let class = self.deref_class(class)?;
        if argc < 0 {
            return Err(BridgeError::MethodNotFound);
        }

        let (index, _) = class
            .class
            .find_method(name, argc as usize)
            .ok_or(BridgeError::MethodNotFound)?;

        Ok(self
            .registry
            .pin(HandleValue::Method(MethodRef { class, index })))
    }

    /// Check whether an instance of `target` can be used where `base` is
    /// required
    ///
    /// Walks `extends` chains and `implements` lists transitively,
    /// resolving names against the target's module and the well-known
    /// table.
    pub fn is_assignable_from(&self, base: Handle, target: Handle) -> Result<bool> {
        let base = self.deref_class(base)?;
        let target = self.deref_class(target)?;

        if base.class.name == ROOT_CLASS {
            return Ok(true);
        }

        let mut pending = vec![target.class.clone()];
        let mut visited: FxHashSet<String> = FxHashSet::default();

        while let Some(class) = pending.pop() {
            if class.name == base.class.name {
                return Ok(true);
            }
            if !visited.insert(class.name.clone()) {
                continue;
            }

            let parents = class
                .extends
                .iter()
                .chain(class.implements.iter());
            for name in parents {
                if let Some(parent) = resolve_in(&target, name) {
                    pending.push(parent);
                } else if name == &base.class.name {
                    // Unresolvable parent still matches by name.
                    return Ok(true);
                }
            }
        }

        Ok(false)
    }

    pub(crate) fn deref_module(&self, module: Handle) -> Result<Arc<LoadedModule>> {
        match self.registry.deref(module)? {
            HandleValue::Module(module) => Ok(module),
            _ => Err(BridgeError::MissingRequiredArgument),
        }
    }

    pub(crate) fn deref_class(&self, class: Handle) -> Result<ClassRef> {
        match self.registry.deref(class)? {
            HandleValue::Class(class) => Ok(class),
            _ => Err(BridgeError::MissingRequiredArgument),
        }
    }

    pub(crate) fn deref_method(&self, method: Handle) -> Result<MethodRef> {
        match self.registry.deref(method)? {
            HandleValue::Method(method) => Ok(method),
            _ => Err(BridgeError::MissingRequiredArgument),
        }
    }
}

fn resolve_in(context: &ClassRef, name: &str) -> Option<Arc<ClassDef>> {
    if let Some(class) = WELL_KNOWN.get(name) {
        return Some(class.clone());
    }
    context.module.as_ref().and_then(|m| m.class(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_core::{ClassKind, ModuleImage, ParamDef, TypeTag};

    fn hierarchy_image() -> ModuleImage {
        let mut image = ModuleImage::new("demo");

        let mut iface = ClassDef::new("demo.IScript");
        iface.kind = ClassKind::Interface;
        iface.methods.push(MethodDef {
            name: "Update".into(),
            is_static: false,
            params: vec![ParamDef { name: "dt".into(), ty: TypeTag::F32, by_ref: false }],
            body: vec![],
        });
        image.classes.push(iface);

        let mut base = ClassDef::new("demo.Actor");
        base.implements.push("demo.IScript".into());
        image.classes.push(base);

        let mut player = ClassDef::new("demo.Player");
        player.extends = Some("demo.Actor".into());
        player.methods.push(MethodDef {
            name: "Update".into(),
            is_static: false,
            params: vec![ParamDef { name: "dt".into(), ty: TypeTag::F32, by_ref: false }],
            body: vec![],
        });
        player.methods.push(MethodDef {
            name: "Update".into(),
            is_static: false,
            params: vec![ParamDef { name: "frame".into(), ty: TypeTag::I64, by_ref: false }],
            body: vec![],
        });
        image.classes.push(player);

        image
    }

    fn loaded(bridge: &Bridge) -> Handle {
        let scope = bridge.create_scope(None);
        bridge
            .load_from_bytes(scope, &hierarchy_image().encode())
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_class_resolution_by_qualified_name() {
        let bridge = Bridge::new();
        let module = loaded(&bridge);
        assert!(bridge.get_class(module, "demo.Player").is_ok());
        assert!(matches!(
            bridge.get_class(module, "demo.player"),
            Err(BridgeError::ClassNotFound)
        ));
    }

    #[test]
    fn test_well_known_type_resolves_from_any_module() {
        let bridge = Bridge::new();
        let module = loaded(&bridge);
        assert!(bridge.get_class(module, ROOT_CLASS).is_ok());
    }

    #[test]
    fn test_method_lookup_first_declared_wins() {
        let bridge = Bridge::new();
        let module = loaded(&bridge);
        let player = bridge.get_class(module, "demo.Player").unwrap();

        let method = bridge.get_method(player, "Update", 1).unwrap();
        let method = bridge.deref_method(method).unwrap();
        assert_eq!(method.method().params[0].name, "dt");
    }

    #[test]
    fn test_method_not_found() {
        let bridge = Bridge::new();
        let module = loaded(&bridge);
        let player = bridge.get_class(module, "demo.Player").unwrap();
        assert!(matches!(
            bridge.get_method(player, "Update", 3),
            Err(BridgeError::MethodNotFound)
        ));
        assert!(matches!(
            bridge.get_method(player, "Render", 0),
            Err(BridgeError::MethodNotFound)
        ));
    }

    #[test]
    fn test_assignability_walks_extends_and_implements() {
        let bridge = Bridge::new();
        let module = loaded(&bridge);
        let iface = bridge.get_class(module, "demo.IScript").unwrap();
        let actor = bridge.get_class(module, "demo.Actor").unwrap();
        let player = bridge.get_class(module, "demo.Player").unwrap();

        assert!(bridge.is_assignable_from(actor, player).unwrap());
        assert!(bridge.is_assignable_from(iface, player).unwrap());
        assert!(!bridge.is_assignable_from(player, actor).unwrap());
    }

    #[test]
    fn test_everything_assignable_to_root() {
        let bridge = Bridge::new();
        let module = loaded(&bridge);
        let root = bridge.get_class(module, ROOT_CLASS).unwrap();
        let player = bridge.get_class(module, "demo.Player").unwrap();
        assert!(bridge.is_assignable_from(root, player).unwrap());
    }
}
