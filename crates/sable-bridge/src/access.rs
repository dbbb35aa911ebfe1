//! Member accessor
//!
//! Reads and writes fields and properties by name. Get-operations return
//! the value serialized into a self-describing JSON form (field names
//! included) so the host can decode arbitrary shapes without prior schema
//! knowledge. Instance members require an instance handle; static members
//! are read and written against the class itself.

use serde::{Deserialize, Serialize};
use std::ffi::c_void;

use crate::error::{BridgeError, Result};
use crate::handle::{Handle, HandleValue, InstanceSlot};
use crate::invoke::marshal_slot;
use crate::resolve::ClassRef;
use crate::Bridge;

/// Reflected member metadata for one class
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetaData {
    /// Field entries, in declaration order
    pub fields: Vec<FieldMeta>,
    /// Property entries, in declaration order
    pub properties: Vec<PropertyMeta>,
}

/// One reflected field
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FieldMeta {
    /// Field name
    pub name: String,
    /// Whether the field is static
    pub is_static: bool,
    /// Fields are always readable
    pub can_read: bool,
    /// False for readonly fields
    pub can_write: bool,
}

/// One reflected property
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PropertyMeta {
    /// Property name
    pub name: String,
    /// Whether the property is static
    pub is_static: bool,
    /// Whether a getter exists
    pub can_read: bool,
    /// Whether a setter exists
    pub can_write: bool,
}

enum MemberTarget {
    Instance(InstanceSlot),
    Static(ClassRef),
}

impl Bridge {
    /// Reflect a class's fields and properties
    pub fn meta_data(&self, class: Handle) -> Result<MetaData> {
        let class = self.deref_class(class)?;
        Ok(MetaData {
            fields: class
                .class
                .fields
                .iter()
                .map(|f| FieldMeta {
                    name: f.name.clone(),
                    is_static: f.is_static,
                    can_read: true,
                    can_write: !f.readonly,
                })
                .collect(),
            properties: class
                .class
                .properties
                .iter()
                .map(|p| PropertyMeta {
                    name: p.name.clone(),
                    is_static: p.is_static,
                    can_read: p.can_read,
                    can_write: p.can_write,
                })
                .collect(),
        })
    }

    /// Reflect a class's members as a serialized payload
    pub fn get_meta_data(&self, class: Handle) -> Result<String> {
        Ok(serde_json::to_string(&self.meta_data(class)?)?)
    }

    /// Read a field value as self-describing JSON
    pub fn get_field_value(&self, target: Handle, name: &str) -> Result<String> {
        let value = match self.member_target(target)? {
            MemberTarget::Instance(slot) => {
                let instance = slot.instance.lock();
                instance
                    .class
                    .field(name)
                    .filter(|f| !f.is_static)
                    .ok_or(BridgeError::FieldNotFound)?;
                instance
                    .get_field(name)
                    .cloned()
                    .ok_or(BridgeError::FieldNotFound)?
            }
            MemberTarget::Static(class) => {
                class
                    .class
                    .field(name)
                    .filter(|f| f.is_static)
                    .ok_or(BridgeError::FieldNotFound)?;
                class
                    .module
                    .as_ref()
                    .and_then(|m| m.statics.get(&class.class.name, name))
                    .ok_or(BridgeError::FieldNotFound)?
            }
        };
        Ok(serde_json::to_string(&value.to_json())?)
    }

    /// Write a field from a raw value slot
    ///
    /// The slot is interpreted according to the field's declared type, the
    /// same way method arguments are marshaled.
    ///
    /// # Safety
    /// `value` must point to (or, for reference types, be) a value of at
    /// least the declared type's width. No bounds checking is performed.
    pub unsafe fn set_field_value(
        &self,
        target: Handle,
        name: &str,
        value: *const c_void,
    ) -> Result<()> {
        match self.member_target(target)? {
            MemberTarget::Instance(slot) => {
                let class = slot.instance.lock().class.clone();
                let field = class
                    .field(name)
                    .filter(|f| !f.is_static)
                    .ok_or(BridgeError::FieldNotFound)?;
                if field.readonly {
                    return Err(BridgeError::ReadonlyField);
                }
                let enums = slot.module.as_ref().map(|m| &m.enums);
                let marshaled = marshal_slot(&self.registry, enums, &field.ty, value)?;
                slot.instance.lock().set_field(name, marshaled);
            }
            MemberTarget::Static(class) => {
                let field = class
                    .class
                    .field(name)
                    .filter(|f| f.is_static)
                    .ok_or(BridgeError::FieldNotFound)?;
                if field.readonly {
                    return Err(BridgeError::ReadonlyField);
                }
                let module = class.module.as_ref().ok_or(BridgeError::FieldNotFound)?;
                let marshaled =
                    marshal_slot(&self.registry, Some(&module.enums), &field.ty, value)?;
                module.statics.set(&class.class.name, name, marshaled);
            }
        }
        Ok(())
    }

    /// Read a property value as self-describing JSON
    ///
    /// Fails with MissingGetter when the property has no getter.
    pub fn get_property_value(&self, target: Handle, name: &str) -> Result<String> {
        let value = match self.member_target(target)? {
            MemberTarget::Instance(slot) => {
                let instance = slot.instance.lock();
                let prop = instance
                    .class
                    .property(name)
                    .filter(|p| !p.is_static)
                    .ok_or(BridgeError::PropertyNotFound)?;
                if !prop.can_read {
                    return Err(BridgeError::MissingGetter);
                }
                instance
                    .get_field(&prop.backing)
                    .cloned()
                    .ok_or(BridgeError::PropertyNotFound)?
            }
            MemberTarget::Static(class) => {
                let prop = class
                    .class
                    .property(name)
                    .filter(|p| p.is_static)
                    .ok_or(BridgeError::PropertyNotFound)?;
                if !prop.can_read {
                    return Err(BridgeError::MissingGetter);
                }
                class
                    .module
                    .as_ref()
                    .and_then(|m| m.statics.get(&class.class.name, &prop.backing))
                    .ok_or(BridgeError::PropertyNotFound)?
            }
        };
        Ok(serde_json::to_string(&value.to_json())?)
    }

    /// Write a property from a raw value slot
    ///
    /// Fails with MissingSetter when the property has no setter.
    ///
    /// # Safety
    /// Same slot contract as [`Bridge::set_field_value`].
    pub unsafe fn set_property_value(
        &self,
        target: Handle,
        name: &str,
        value: *const c_void,
    ) -> Result<()> {
        match self.member_target(target)? {
            MemberTarget::Instance(slot) => {
                let class = slot.instance.lock().class.clone();
                let prop = class
                    .property(name)
                    .filter(|p| !p.is_static)
                    .ok_or(BridgeError::PropertyNotFound)?;
                if !prop.can_write {
                    return Err(BridgeError::MissingSetter);
                }
                let enums = slot.module.as_ref().map(|m| &m.enums);
                let marshaled = marshal_slot(&self.registry, enums, &prop.ty, value)?;
                slot.instance.lock().set_field(&prop.backing, marshaled);
            }
            MemberTarget::Static(class) => {
                let prop = class
                    .class
                    .property(name)
                    .filter(|p| p.is_static)
                    .ok_or(BridgeError::PropertyNotFound)?;
                if !prop.can_write {
                    return Err(BridgeError::MissingSetter);
                }
                let module = class.module.as_ref().ok_or(BridgeError::PropertyNotFound)?;
                let marshaled =
                    marshal_slot(&self.registry, Some(&module.enums), &prop.ty, value)?;
                module.statics.set(&class.class.name, &prop.backing, marshaled);
            }
        }
        Ok(())
    }

    fn member_target(&self, target: Handle) -> Result<MemberTarget> {
        match self.registry.deref(target)? {
            HandleValue::Instance(slot) => Ok(MemberTarget::Instance(slot)),
            HandleValue::Class(class) => Ok(MemberTarget::Static(class)),
            _ => Err(BridgeError::MissingRequiredArgument),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_core::{ClassDef, FieldDef, ModuleImage, PropertyDef, TypeTag, Value};

    fn accessor_image() -> ModuleImage {
        let mut image = ModuleImage::new("demo");
        let mut class = ClassDef::new("demo.Player");
        class.fields.push(FieldDef {
            name: "Health".into(),
            ty: TypeTag::I32,
            is_static: false,
            readonly: false,
            default: Some(Value::I32(100)),
        });
        class.fields.push(FieldDef {
            name: "Id".into(),
            ty: TypeTag::I32,
            is_static: false,
            readonly: true,
            default: Some(Value::I32(7)),
        });
        class.fields.push(FieldDef {
            name: "Count".into(),
            ty: TypeTag::I64,
            is_static: true,
            readonly: false,
            default: None,
        });
        class.properties.push(PropertyDef {
            name: "Name".into(),
            ty: TypeTag::Str,
            is_static: false,
            backing: "Name$backing".into(),
            can_read: true,
            can_write: true,
        });
        class.properties.push(PropertyDef {
            name: "Secret".into(),
            ty: TypeTag::Str,
            is_static: false,
            backing: "Secret$backing".into(),
            can_read: false,
            can_write: true,
        });
        image.classes.push(class);
        image
    }

    fn setup(bridge: &Bridge) -> (Handle, Handle) {
        let scope = bridge.create_scope(None);
        let module = bridge
            .load_from_bytes(scope, &accessor_image().encode())
            .unwrap()
            .unwrap();
        let class = bridge.get_class(module, "demo.Player").unwrap();
        let instance = bridge.new_object(class).unwrap();
        (class, instance)
    }

    #[test]
    fn test_metadata_payload_shape() {
        let bridge = Bridge::new();
        let (class, _) = setup(&bridge);
        let payload = bridge.get_meta_data(class).unwrap();
        let meta: MetaData = serde_json::from_str(&payload).unwrap();

        assert_eq!(meta.fields.len(), 3);
        let id = meta.fields.iter().find(|f| f.name == "Id").unwrap();
        assert!(id.can_read && !id.can_write);

        let secret = meta.properties.iter().find(|p| p.name == "Secret").unwrap();
        assert!(!secret.can_read && secret.can_write);
    }

    #[test]
    fn test_field_round_trip() {
        let bridge = Bridge::new();
        let (_, instance) = setup(&bridge);

        let raw = 55i32;
        unsafe {
            bridge
                .set_field_value(instance, "Health", &raw as *const i32 as *const c_void)
                .unwrap();
        }
        let payload = bridge.get_field_value(instance, "Health").unwrap();
        assert_eq!(payload, "55");
    }

    #[test]
    fn test_readonly_field_rejects_writes() {
        let bridge = Bridge::new();
        let (_, instance) = setup(&bridge);
        let raw = 1i32;
        let err = unsafe {
            bridge
                .set_field_value(instance, "Id", &raw as *const i32 as *const c_void)
                .unwrap_err()
        };
        assert!(matches!(err, BridgeError::ReadonlyField));
        assert_eq!(bridge.get_field_value(instance, "Id").unwrap(), "7");
    }

    #[test]
    fn test_unknown_field() {
        let bridge = Bridge::new();
        let (_, instance) = setup(&bridge);
        assert!(matches!(
            bridge.get_field_value(instance, "Mana"),
            Err(BridgeError::FieldNotFound)
        ));
    }

    #[test]
    fn test_static_field_reads_against_class() {
        let bridge = Bridge::new();
        let (class, instance) = setup(&bridge);

        assert_eq!(bridge.get_field_value(class, "Count").unwrap(), "0");
        // Static members are not visible through an instance handle.
        assert!(matches!(
            bridge.get_field_value(instance, "Count"),
            Err(BridgeError::FieldNotFound)
        ));
    }

    #[test]
    fn test_property_round_trip_and_missing_getter() {
        let bridge = Bridge::new();
        let (_, instance) = setup(&bridge);

        let name = std::ffi::CString::new("Lea").unwrap();
        unsafe {
            bridge
                .set_property_value(instance, "Name", name.as_ptr() as *const c_void)
                .unwrap();
            bridge
                .set_property_value(instance, "Secret", name.as_ptr() as *const c_void)
                .unwrap();
        }
        assert_eq!(bridge.get_property_value(instance, "Name").unwrap(), "\"Lea\"");
        assert!(matches!(
            bridge.get_property_value(instance, "Secret"),
            Err(BridgeError::MissingGetter)
        ));
    }
}
