//! Invocation engine and argument marshaling
//!
//! Methods are invoked for effect; there is no return-value marshaling.
//! Marshaling walks the resolved method's declared parameter list in
//! order and converts the corresponding raw slot: value types are copied
//! by declared byte width through one typed-copy primitive, enums recurse
//! into their underlying integer, strings are read as NUL-terminated
//! UTF-8, and everything else is treated as a handle and dereferenced
//! through the registry. By-ref parameters are read through their element
//! type; outbound mutation is not performed.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use sable_core::{interp, ClassKind, EnumDef, StaticStore, TypeTag, Value};
use std::ffi::{c_char, c_void, CStr};

use crate::error::{BridgeError, Result};
use crate::handle::{Handle, HandleValue, InstanceSlot};
use crate::Bridge;

static EMPTY_STATICS: Lazy<StaticStore> = Lazy::new(StaticStore::default);

/// Copy one value out of a raw argument slot
///
/// # Safety
/// `slot` must point to at least `size_of::<T>()` readable bytes. The
/// parameter's declared type is the sole source of truth for width and
/// interpretation; a mismatched slot is undefined behavior.
unsafe fn read_slot<T: Copy>(slot: *const c_void) -> T {
    std::ptr::read_unaligned(slot as *const T)
}

/// Convert one raw slot according to a declared type
pub(crate) unsafe fn marshal_slot(
    registry: &crate::HandleRegistry,
    enums: Option<&FxHashMap<String, EnumDef>>,
    ty: &TypeTag,
    slot: *const c_void,
) -> Result<Value> {
    if ty.byte_width().is_some() && slot.is_null() {
        return Err(BridgeError::MissingRequiredArgument);
    }

    Ok(match ty {
        TypeTag::Bool => Value::Bool(read_slot::<u8>(slot) != 0),
        TypeTag::I8 => Value::I8(read_slot(slot)),
        TypeTag::I16 => Value::I16(read_slot(slot)),
        TypeTag::I32 => Value::I32(read_slot(slot)),
        TypeTag::I64 => Value::I64(read_slot(slot)),
        TypeTag::U8 => Value::U8(read_slot(slot)),
        TypeTag::U16 => Value::U16(read_slot(slot)),
        TypeTag::U32 => Value::U32(read_slot(slot)),
        TypeTag::U64 => Value::U64(read_slot(slot)),
        TypeTag::F32 => Value::F32(read_slot(slot)),
        TypeTag::F64 => Value::F64(read_slot(slot)),
        TypeTag::Str => {
            if slot.is_null() {
                return Err(BridgeError::MissingRequiredArgument);
            }
            let text = CStr::from_ptr(slot as *const c_char)
                .to_str()
                .map_err(|_| BridgeError::MissingRequiredArgument)?;
            Value::Str(text.to_string())
        }
        TypeTag::Enum(name) => {
            let underlying = enums
                .and_then(|table| table.get(name))
                .map(|e| e.underlying.clone())
                .unwrap_or(TypeTag::I32);
            let inner = marshal_slot(registry, enums, &underlying, slot)?;
            Value::Enum(Box::new(inner))
        }
        TypeTag::Ref(_) => {
            let token = slot as u64;
            if token == 0 {
                Value::Null
            } else {
                match registry.deref(Handle::from_raw(token))? {
                    HandleValue::Instance(pinned) => Value::Ref(pinned.instance),
                    _ => return Err(BridgeError::MissingRequiredArgument),
                }
            }
        }
    })
}

impl Bridge {
    /// Construct an instance of a class via its zero-argument constructor
    ///
    /// Field defaults are applied; interfaces are not constructible.
    pub fn new_object(&self, class: Handle) -> Result<Handle> {
        let class = self.deref_class(class)?;
        if class.class.kind == ClassKind::Interface {
            return Err(BridgeError::ClassNotFound);
        }

        let instance = self.heap.allocate(class.class.clone());
        Ok(self.registry.pin(HandleValue::Instance(InstanceSlot {
            instance,
            module: class.module,
        })))
    }

    /// Invoke a resolved method with a flat raw argument buffer
    ///
    /// `argv` must supply exactly one slot per declared parameter; a
    /// mismatched count fails with MissingRequiredArgument rather than
    /// reading out of bounds. Instance methods require an instance
    /// handle; static methods ignore it.
    ///
    /// # Safety
    /// Each slot must satisfy the marshaling contract for its declared
    /// parameter type: value-type slots must point to at least the
    /// declared width, string slots must point to NUL-terminated UTF-8,
    /// and reference slots must be handle tokens. No bounds or type
    /// validation is possible beyond the declared parameter list.
    pub unsafe fn invoke(
        &self,
        method: Handle,
        instance: Option<Handle>,
        argv: &[*const c_void],
    ) -> Result<()> {
        let method = self.deref_method(method)?;
        let def = method.method();

        if argv.len() != def.params.len() {
            return Err(BridgeError::MissingRequiredArgument);
        }

        let instance_slot = if def.is_static {
            None
        } else {
            let handle = instance.ok_or(BridgeError::MissingRequiredArgument)?;
            match self.registry.deref(handle)? {
                HandleValue::Instance(slot) => Some(slot),
                _ => return Err(BridgeError::MissingRequiredArgument),
            }
        };

        let enums = method.class.module.as_ref().map(|m| &m.enums);
        let mut args = Vec::with_capacity(def.params.len());
        for (param, slot) in def.params.iter().zip(argv) {
            // By-ref parameters read through the element type; no
            // write-back happens after the call.
            args.push(marshal_slot(&self.registry, enums, &param.ty, *slot)?);
        }

        let statics = method
            .class
            .module
            .as_ref()
            .map(|m| &m.statics)
            .unwrap_or(&EMPTY_STATICS);

        interp::execute(
            def,
            &method.class.class,
            instance_slot.as_ref().map(|s| &s.instance),
            statics,
            &args,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_core::{ClassDef, FieldDef, MethodDef, ModuleImage, Op, ParamDef};
    use std::ffi::CString;

    fn invocation_image() -> ModuleImage {
        let mut image = ModuleImage::new("demo");
        image.enums.push(EnumDef {
            name: "demo.Mode".into(),
            underlying: TypeTag::I64,
            variants: vec![("Idle".into(), 0), ("Walk".into(), 1)],
        });

        let mut class = ClassDef::new("demo.Player");
        class.fields.push(FieldDef {
            name: "Health".into(),
            ty: TypeTag::I32,
            is_static: false,
            readonly: false,
            default: Some(Value::I32(100)),
        });
        class.fields.push(FieldDef {
            name: "Tag".into(),
            ty: TypeTag::Str,
            is_static: false,
            readonly: false,
            default: None,
        });
        class.fields.push(FieldDef {
            name: "Mode".into(),
            ty: TypeTag::Enum("demo.Mode".into()),
            is_static: false,
            readonly: false,
            default: None,
        });
        class.methods.push(MethodDef {
            name: "TakeDamage".into(),
            is_static: false,
            params: vec![ParamDef { name: "amount".into(), ty: TypeTag::I32, by_ref: false }],
            body: vec![
                Op::LoadField("Health".into()),
                Op::LoadArg(0),
                Op::Sub,
                Op::StoreField("Health".into()),
                Op::Ret,
            ],
        });
        class.methods.push(MethodDef {
            name: "Rename".into(),
            is_static: false,
            params: vec![ParamDef { name: "tag".into(), ty: TypeTag::Str, by_ref: false }],
            body: vec![Op::LoadArg(0), Op::StoreField("Tag".into())],
        });
        class.methods.push(MethodDef {
            name: "SetMode".into(),
            is_static: false,
            params: vec![ParamDef {
                name: "mode".into(),
                ty: TypeTag::Enum("demo.Mode".into()),
                by_ref: false,
            }],
            body: vec![Op::LoadArg(0), Op::StoreField("Mode".into())],
        });
        image.classes.push(class);
        image
    }

    fn setup(bridge: &Bridge) -> (Handle, Handle) {
        let scope = bridge.create_scope(None);
        let module = bridge
            .load_from_bytes(scope, &invocation_image().encode())
            .unwrap()
            .unwrap();
        let class = bridge.get_class(module, "demo.Player").unwrap();
        let instance = bridge.new_object(class).unwrap();
        (class, instance)
    }

    #[test]
    fn test_invoke_mutates_fields() {
        let bridge = Bridge::new();
        let (class, instance) = setup(&bridge);
        let method = bridge.get_method(class, "TakeDamage", 1).unwrap();

        let amount = 30i32;
        unsafe {
            bridge
                .invoke(method, Some(instance), &[&amount as *const i32 as *const c_void])
                .unwrap();
        }
        assert_eq!(bridge.get_field_value(instance, "Health").unwrap(), "70");
    }

    #[test]
    fn test_string_argument_marshaling() {
        let bridge = Bridge::new();
        let (class, instance) = setup(&bridge);
        let method = bridge.get_method(class, "Rename", 1).unwrap();

        let tag = CString::new("boss").unwrap();
        unsafe {
            bridge
                .invoke(method, Some(instance), &[tag.as_ptr() as *const c_void])
                .unwrap();
        }
        assert_eq!(bridge.get_field_value(instance, "Tag").unwrap(), "\"boss\"");
    }

    #[test]
    fn test_enum_argument_recurses_into_underlying() {
        let bridge = Bridge::new();
        let (class, instance) = setup(&bridge);
        let method = bridge.get_method(class, "SetMode", 1).unwrap();

        let walk = 1i64;
        unsafe {
            bridge
                .invoke(method, Some(instance), &[&walk as *const i64 as *const c_void])
                .unwrap();
        }
        assert_eq!(bridge.get_field_value(instance, "Mode").unwrap(), "1");
    }

    #[test]
    fn test_argument_count_is_validated() {
        let bridge = Bridge::new();
        let (class, instance) = setup(&bridge);
        let method = bridge.get_method(class, "TakeDamage", 1).unwrap();

        let err = unsafe { bridge.invoke(method, Some(instance), &[]).unwrap_err() };
        assert!(matches!(err, BridgeError::MissingRequiredArgument));
    }

    #[test]
    fn test_instance_method_requires_instance() {
        let bridge = Bridge::new();
        let (class, _) = setup(&bridge);
        let method = bridge.get_method(class, "TakeDamage", 1).unwrap();

        let amount = 1i32;
        let err = unsafe {
            bridge
                .invoke(method, None, &[&amount as *const i32 as *const c_void])
                .unwrap_err()
        };
        assert!(matches!(err, BridgeError::MissingRequiredArgument));
    }

    #[test]
    fn test_released_method_handle_fails() {
        let bridge = Bridge::new();
        let (class, instance) = setup(&bridge);
        let method = bridge.get_method(class, "TakeDamage", 1).unwrap();
        bridge.release(method);

        let amount = 1i32;
        let err = unsafe {
            bridge
                .invoke(method, Some(instance), &[&amount as *const i32 as *const c_void])
                .unwrap_err()
        };
        assert!(matches!(err, BridgeError::MissingRequiredArgument));
    }

    #[test]
    fn test_interface_is_not_constructible() {
        let bridge = Bridge::new();
        let scope = bridge.create_scope(None);

        let mut image = ModuleImage::new("ifaces");
        let mut iface = ClassDef::new("demo.IScript");
        iface.kind = ClassKind::Interface;
        image.classes.push(iface);

        let module = bridge.load_from_bytes(scope, &image.encode()).unwrap().unwrap();
        let class = bridge.get_class(module, "demo.IScript").unwrap();
        assert!(matches!(
            bridge.new_object(class),
            Err(BridgeError::ClassNotFound)
        ));
    }
}
