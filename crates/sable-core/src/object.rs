//! Reflection records and the object model
//!
//! Classes, enums, fields, properties and methods are plain data records
//! produced by the compiler (or decoded from a module image) and
//! introspected at run time by the bridge resolver.

use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::interp::Op;
use crate::value::Value;

/// Declared type of a field or parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeTag {
    /// Boolean (1 byte)
    Bool,
    /// 8-bit signed integer
    I8,
    /// 16-bit signed integer
    I16,
    /// 32-bit signed integer
    I32,
    /// 64-bit signed integer
    I64,
    /// 8-bit unsigned integer
    U8,
    /// 16-bit unsigned integer
    U16,
    /// 32-bit unsigned integer
    U32,
    /// 64-bit unsigned integer
    U64,
    /// 32-bit float
    F32,
    /// 64-bit float
    F64,
    /// NUL-terminated UTF-8 string
    Str,
    /// Enum type, by qualified name
    Enum(String),
    /// Reference type, by qualified class name
    Ref(String),
}

impl TypeTag {
    /// Byte width of a value-type slot, None for strings and references
    pub fn byte_width(&self) -> Option<usize> {
        match self {
            TypeTag::Bool | TypeTag::I8 | TypeTag::U8 => Some(1),
            TypeTag::I16 | TypeTag::U16 => Some(2),
            TypeTag::I32 | TypeTag::U32 | TypeTag::F32 => Some(4),
            TypeTag::I64 | TypeTag::U64 | TypeTag::F64 => Some(8),
            TypeTag::Enum(_) | TypeTag::Str | TypeTag::Ref(_) => None,
        }
    }

    /// Zero/default value for a freshly constructed field of this type
    pub fn default_value(&self) -> Value {
        match self {
            TypeTag::Bool => Value::Bool(false),
            TypeTag::I8 => Value::I8(0),
            TypeTag::I16 => Value::I16(0),
            TypeTag::I32 => Value::I32(0),
            TypeTag::I64 => Value::I64(0),
            TypeTag::U8 => Value::U8(0),
            TypeTag::U16 => Value::U16(0),
            TypeTag::U32 => Value::U32(0),
            TypeTag::U64 => Value::U64(0),
            TypeTag::F32 => Value::F32(0.0),
            TypeTag::F64 => Value::F64(0.0),
            TypeTag::Str => Value::Str(String::new()),
            TypeTag::Enum(_) => Value::Enum(Box::new(Value::I32(0))),
            TypeTag::Ref(_) => Value::Null,
        }
    }
}

/// Field definition
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    /// Field name
    pub name: String,
    /// Declared type
    pub ty: TypeTag,
    /// Static fields live on the class, not on instances
    pub is_static: bool,
    /// Readonly fields reject writes through the accessor
    pub readonly: bool,
    /// Initial value (declared type's zero value when absent)
    pub default: Option<Value>,
}

impl FieldDef {
    /// Value a new instance (or static store) starts with
    pub fn initial_value(&self) -> Value {
        self.default.clone().unwrap_or_else(|| self.ty.default_value())
    }
}

/// Property definition (field-backed)
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDef {
    /// Property name
    pub name: String,
    /// Declared type
    pub ty: TypeTag,
    /// Static properties live on the class
    pub is_static: bool,
    /// Name of the backing field
    pub backing: String,
    /// Whether a getter exists
    pub can_read: bool,
    /// Whether a setter exists
    pub can_write: bool,
}

/// Method parameter
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDef {
    /// Parameter name
    pub name: String,
    /// Declared type
    pub ty: TypeTag,
    /// By-reference parameters are read through their element type
    pub by_ref: bool,
}

/// Method definition
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    /// Method name
    pub name: String,
    /// Static methods execute without an instance
    pub is_static: bool,
    /// Declared parameters, in order
    pub params: Vec<ParamDef>,
    /// Body instructions (empty for interface signatures)
    pub body: Vec<Op>,
}

/// Kind of a class record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    /// Concrete class: constructible, has state
    Class,
    /// Interface: signatures only, used for assignability checks
    Interface,
}

/// Class definition
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    /// Fully qualified name (e.g. `demo.Player`)
    pub name: String,
    /// Class or interface
    pub kind: ClassKind,
    /// Qualified name of the base class, if any
    pub extends: Option<String>,
    /// Qualified names of implemented interfaces
    pub implements: Vec<String>,
    /// Field definitions, in declaration order
    pub fields: Vec<FieldDef>,
    /// Property definitions, in declaration order
    pub properties: Vec<PropertyDef>,
    /// Method definitions, in declaration order
    pub methods: Vec<MethodDef>,
}

impl ClassDef {
    /// Create an empty concrete class
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ClassKind::Class,
            extends: None,
            implements: Vec::new(),
            fields: Vec::new(),
            properties: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a property by name
    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// First method matching name and parameter count, in declaration order
    pub fn find_method(&self, name: &str, argc: usize) -> Option<(usize, &MethodDef)> {
        self.methods
            .iter()
            .enumerate()
            .find(|(_, m)| m.name == name && m.params.len() == argc)
    }
}

/// Enum definition
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDef {
    /// Fully qualified name
    pub name: String,
    /// Underlying integer type
    pub underlying: TypeTag,
    /// Variant names and their integer values, in declaration order
    pub variants: Vec<(String, i64)>,
}

/// A constructed object
///
/// Instance fields are initialized from the class's field defaults by the
/// heap at allocation time.
#[derive(Debug)]
pub struct Instance {
    /// Defining class
    pub class: Arc<ClassDef>,
    /// Instance field values, keyed by field name
    pub fields: FxHashMap<String, Value>,
}

impl Instance {
    /// Get an instance field value
    pub fn get_field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Overwrite an instance field value
    pub fn set_field(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }
}
