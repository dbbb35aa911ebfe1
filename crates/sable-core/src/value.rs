//! Runtime value representation
//!
//! Values are the currency of the bridge: field contents, marshaled
//! arguments and interpreter operands are all `Value`s. Reference values
//! point into the instance heap; everything else is held inline.

use crate::heap::InstanceRef;

/// Maximum nesting depth when projecting a value to JSON.
///
/// Reference fields can form cycles through the heap; anything deeper than
/// this projects as null.
const MAX_JSON_DEPTH: usize = 32;

/// A runtime value
#[derive(Debug, Clone)]
pub enum Value {
    /// Null reference
    Null,
    /// Boolean
    Bool(bool),
    /// 8-bit signed integer
    I8(i8),
    /// 16-bit signed integer
    I16(i16),
    /// 32-bit signed integer
    I32(i32),
    /// 64-bit signed integer
    I64(i64),
    /// 8-bit unsigned integer
    U8(u8),
    /// 16-bit unsigned integer
    U16(u16),
    /// 32-bit unsigned integer
    U32(u32),
    /// 64-bit unsigned integer
    U64(u64),
    /// 32-bit float
    F32(f32),
    /// 64-bit float
    F64(f64),
    /// UTF-8 string
    Str(String),
    /// Enum value carrying its underlying integer
    Enum(Box<Value>),
    /// Reference to a heap instance
    Ref(InstanceRef),
}

impl Value {
    /// Check if this value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::I8(_) => "i8",
            Value::I16(_) => "i16",
            Value::I32(_) => "i32",
            Value::I64(_) => "i64",
            Value::U8(_) => "u8",
            Value::U16(_) => "u16",
            Value::U32(_) => "u32",
            Value::U64(_) => "u64",
            Value::F32(_) => "f32",
            Value::F64(_) => "f64",
            Value::Str(_) => "str",
            Value::Enum(_) => "enum",
            Value::Ref(_) => "ref",
        }
    }

    /// Widen to i64 if this is an integer or boolean value
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(*b as i64),
            Value::I8(v) => Some(*v as i64),
            Value::I16(v) => Some(*v as i64),
            Value::I32(v) => Some(*v as i64),
            Value::I64(v) => Some(*v),
            Value::U8(v) => Some(*v as i64),
            Value::U16(v) => Some(*v as i64),
            Value::U32(v) => Some(*v as i64),
            Value::U64(v) => Some(*v as i64),
            Value::Enum(inner) => inner.as_i64(),
            _ => None,
        }
    }

    /// Widen to f64 if this is any numeric value
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F32(v) => Some(*v as f64),
            Value::F64(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Check if this value is a float
    pub fn is_float(&self) -> bool {
        matches!(self, Value::F32(_) | Value::F64(_))
    }

    /// Project the value into a self-describing JSON form
    ///
    /// Instances become objects keyed by field name so a host can decode
    /// arbitrary shapes without prior schema knowledge.
    pub fn to_json(&self) -> serde_json::Value {
        self.to_json_at(0)
    }

    fn to_json_at(&self, depth: usize) -> serde_json::Value {
        use serde_json::{json, Value as Json};

        if depth > MAX_JSON_DEPTH {
            return Json::Null;
        }

        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => json!(b),
            Value::I8(v) => json!(v),
            Value::I16(v) => json!(v),
            Value::I32(v) => json!(v),
            Value::I64(v) => json!(v),
            Value::U8(v) => json!(v),
            Value::U16(v) => json!(v),
            Value::U32(v) => json!(v),
            Value::U64(v) => json!(v),
            Value::F32(v) => json!(v),
            Value::F64(v) => json!(v),
            Value::Str(s) => json!(s),
            Value::Enum(inner) => inner.to_json_at(depth + 1),
            Value::Ref(instance) => {
                let instance = instance.lock();
                let mut object = serde_json::Map::new();
                for field in instance.class.fields.iter().filter(|f| !f.is_static) {
                    let value = instance
                        .fields
                        .get(&field.name)
                        .map(|v| v.to_json_at(depth + 1))
                        .unwrap_or(Json::Null);
                    object.insert(field.name.clone(), value);
                }
                Json::Object(object)
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => std::sync::Arc::ptr_eq(a, b),
            (Value::F32(a), Value::F32(b)) => a == b,
            (Value::F64(a), Value::F64(b)) => a == b,
            (a, b) => match (a.as_i64(), b.as_i64()) {
                (Some(a), Some(b)) => a == b && std::mem::discriminant(self) == std::mem::discriminant(other),
                _ => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_widening() {
        assert_eq!(Value::I32(42).as_i64(), Some(42));
        assert_eq!(Value::U8(7).as_i64(), Some(7));
        assert_eq!(Value::F32(1.5).as_f64(), Some(1.5));
        assert_eq!(Value::Str("x".into()).as_i64(), None);
    }

    #[test]
    fn test_enum_widens_through_underlying() {
        let v = Value::Enum(Box::new(Value::I32(3)));
        assert_eq!(v.as_i64(), Some(3));
    }

    #[test]
    fn test_scalar_json() {
        assert_eq!(Value::I32(10).to_json(), serde_json::json!(10));
        assert_eq!(Value::Str("hi".into()).to_json(), serde_json::json!("hi"));
        assert_eq!(Value::Null.to_json(), serde_json::Value::Null);
    }
}
