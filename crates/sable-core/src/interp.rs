//! Stack interpreter for method bodies
//!
//! Method bodies are short instruction lists produced by the compiler.
//! Methods are invoked for effect: the interpreter mutates instance fields
//! and static fields and discards whatever is left on the operand stack.

use crate::heap::{InstanceRef, StaticStore};
use crate::object::{ClassDef, MethodDef, TypeTag};
use crate::value::Value;
use crate::{CoreError, CoreResult};

/// One method body instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    /// Push argument by index
    LoadArg(u8),
    /// Push a constant
    LoadConst(Value),
    /// Push an instance field of `this`
    LoadField(String),
    /// Pop into an instance field of `this`
    StoreField(String),
    /// Push a static field of the declaring class
    LoadStatic(String),
    /// Pop into a static field of the declaring class
    StoreStatic(String),
    /// Pop two operands, push their sum
    Add,
    /// Pop two operands, push their difference
    Sub,
    /// Pop two operands, push their product
    Mul,
    /// Stop execution
    Ret,
}

/// Convert a value to a field's declared type
///
/// Integer and float values convert freely between numeric tags; anything
/// else must already match.
pub fn coerce(value: Value, ty: &TypeTag) -> CoreResult<Value> {
    let mismatch = |value: &Value| {
        CoreError::TypeError(format!("cannot store {} into {:?}", value.type_name(), ty))
    };

    match ty {
        TypeTag::Bool => match value {
            Value::Bool(_) => Ok(value),
            other => other.as_i64().map(|v| Value::Bool(v != 0)).ok_or_else(|| mismatch(&other)),
        },
        TypeTag::I8 => num(value, |v| Value::I8(v as i8), mismatch),
        TypeTag::I16 => num(value, |v| Value::I16(v as i16), mismatch),
        TypeTag::I32 => num(value, |v| Value::I32(v as i32), mismatch),
        TypeTag::I64 => num(value, |v| Value::I64(v), mismatch),
        TypeTag::U8 => num(value, |v| Value::U8(v as u8), mismatch),
        TypeTag::U16 => num(value, |v| Value::U16(v as u16), mismatch),
        TypeTag::U32 => num(value, |v| Value::U32(v as u32), mismatch),
        TypeTag::U64 => num(value, |v| Value::U64(v as u64), mismatch),
        TypeTag::F32 => match value.as_f64() {
            Some(v) => Ok(Value::F32(v as f32)),
            None => Err(mismatch(&value)),
        },
        TypeTag::F64 => match value.as_f64() {
            Some(v) => Ok(Value::F64(v)),
            None => Err(mismatch(&value)),
        },
        TypeTag::Str => match value {
            Value::Str(_) => Ok(value),
            other => Err(mismatch(&other)),
        },
        TypeTag::Enum(_) => match value {
            Value::Enum(_) => Ok(value),
            other => match other.as_i64() {
                Some(v) => Ok(Value::Enum(Box::new(Value::I64(v)))),
                None => Err(mismatch(&other)),
            },
        },
        TypeTag::Ref(_) => match value {
            Value::Ref(_) | Value::Null => Ok(value),
            other => Err(mismatch(&other)),
        },
    }
}

fn num(
    value: Value,
    make: impl FnOnce(i64) -> Value,
    mismatch: impl FnOnce(&Value) -> CoreError,
) -> CoreResult<Value> {
    if let Some(v) = value.as_i64() {
        return Ok(make(v));
    }
    // Floats truncate toward zero when stored into integer fields.
    match value {
        Value::F32(v) => Ok(make(v as i64)),
        Value::F64(v) => Ok(make(v as i64)),
        other => Err(mismatch(&other)),
    }
}

/// Execute a method body against an optional instance and argument list
pub fn execute(
    method: &MethodDef,
    class: &ClassDef,
    instance: Option<&InstanceRef>,
    statics: &StaticStore,
    args: &[Value],
) -> CoreResult<()> {
    let mut stack: Vec<Value> = Vec::with_capacity(4);

    for op in &method.body {
        match op {
            Op::LoadArg(index) => {
                let value = args
                    .get(*index as usize)
                    .cloned()
                    .ok_or(CoreError::ArgOutOfRange(*index))?;
                stack.push(value);
            }
            Op::LoadConst(value) => stack.push(value.clone()),
            Op::LoadField(name) => {
                let instance = instance.ok_or(CoreError::MissingInstance)?;
                let value = instance
                    .lock()
                    .get_field(name)
                    .cloned()
                    .ok_or_else(|| CoreError::UnknownField(name.clone()))?;
                stack.push(value);
            }
            Op::StoreField(name) => {
                let instance = instance.ok_or(CoreError::MissingInstance)?;
                let field = class
                    .field(name)
                    .ok_or_else(|| CoreError::UnknownField(name.clone()))?;
                let value = stack.pop().ok_or(CoreError::StackUnderflow)?;
                instance.lock().set_field(name, coerce(value, &field.ty)?);
            }
            Op::LoadStatic(name) => {
                let value = statics
                    .get(&class.name, name)
                    .ok_or_else(|| CoreError::UnknownField(name.clone()))?;
                stack.push(value);
            }
            Op::StoreStatic(name) => {
                let field = class
                    .field(name)
                    .ok_or_else(|| CoreError::UnknownField(name.clone()))?;
                let value = stack.pop().ok_or(CoreError::StackUnderflow)?;
                statics.set(&class.name, name, coerce(value, &field.ty)?);
            }
            Op::Add => binary(&mut stack, |a, b| a + b, |a, b| a.wrapping_add(b))?,
            Op::Sub => binary(&mut stack, |a, b| a - b, |a, b| a.wrapping_sub(b))?,
            Op::Mul => binary(&mut stack, |a, b| a * b, |a, b| a.wrapping_mul(b))?,
            Op::Ret => break,
        }
    }

    Ok(())
}

fn binary(
    stack: &mut Vec<Value>,
    float_op: impl FnOnce(f64, f64) -> f64,
    int_op: impl FnOnce(i64, i64) -> i64,
) -> CoreResult<()> {
    let rhs = stack.pop().ok_or(CoreError::StackUnderflow)?;
    let lhs = stack.pop().ok_or(CoreError::StackUnderflow)?;

    let result = if lhs.is_float() || rhs.is_float() {
        let (a, b) = match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(CoreError::TypeError(format!(
                    "cannot apply arithmetic to {} and {}",
                    lhs.type_name(),
                    rhs.type_name()
                )))
            }
        };
        Value::F64(float_op(a, b))
    } else {
        let (a, b) = match (lhs.as_i64(), rhs.as_i64()) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(CoreError::TypeError(format!(
                    "cannot apply arithmetic to {} and {}",
                    lhs.type_name(),
                    rhs.type_name()
                )))
            }
        };
        Value::I64(int_op(a, b))
    };

    stack.push(result);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::Heap;
    use crate::object::{FieldDef, ParamDef};
    use std::sync::Arc;

    fn counter_class() -> Arc<ClassDef> {
        let mut class = ClassDef::new("demo.Counter");
        class.fields.push(FieldDef {
            name: "Value".into(),
            ty: TypeTag::I32,
            is_static: false,
            readonly: false,
            default: Some(Value::I32(10)),
        });
        class.fields.push(FieldDef {
            name: "Total".into(),
            ty: TypeTag::I64,
            is_static: true,
            readonly: false,
            default: None,
        });
        class.methods.push(MethodDef {
            name: "Sub".into(),
            is_static: false,
            params: vec![ParamDef { name: "amount".into(), ty: TypeTag::I32, by_ref: false }],
            body: vec![
                Op::LoadField("Value".into()),
                Op::LoadArg(0),
                Op::Sub,
                Op::StoreField("Value".into()),
                Op::Ret,
            ],
        });
        class.methods.push(MethodDef {
            name: "Bump".into(),
            is_static: true,
            params: vec![],
            body: vec![
                Op::LoadStatic("Total".into()),
                Op::LoadConst(Value::I64(1)),
                Op::Add,
                Op::StoreStatic("Total".into()),
            ],
        });
        Arc::new(class)
    }

    #[test]
    fn test_field_mutation() {
        let class = counter_class();
        let heap = Heap::new();
        let instance = heap.allocate(class.clone());
        let statics = StaticStore::for_classes(std::iter::once(class.as_ref()));

        let method = &class.methods[0];
        execute(method, &class, Some(&instance), &statics, &[Value::I32(3)]).unwrap();
        assert_eq!(instance.lock().get_field("Value"), Some(&Value::I32(7)));
    }

    #[test]
    fn test_static_mutation_without_instance() {
        let class = counter_class();
        let statics = StaticStore::for_classes(std::iter::once(class.as_ref()));

        let method = &class.methods[1];
        execute(method, &class, None, &statics, &[]).unwrap();
        execute(method, &class, None, &statics, &[]).unwrap();
        assert_eq!(statics.get("demo.Counter", "Total"), Some(Value::I64(2)));
    }

    #[test]
    fn test_instance_op_without_instance_fails() {
        let class = counter_class();
        let statics = StaticStore::for_classes(std::iter::once(class.as_ref()));
        let method = &class.methods[0];

        let err = execute(method, &class, None, &statics, &[Value::I32(1)]).unwrap_err();
        assert!(matches!(err, CoreError::MissingInstance));
    }

    #[test]
    fn test_float_promotion_and_store_coercion() {
        let class = counter_class();
        let heap = Heap::new();
        let instance = heap.allocate(class.clone());
        let statics = StaticStore::for_classes(std::iter::once(class.as_ref()));

        // Value(i32) - 2.5 promotes to float, truncates on store.
        let method = MethodDef {
            name: "Drain".into(),
            is_static: false,
            params: vec![ParamDef { name: "dt".into(), ty: TypeTag::F64, by_ref: false }],
            body: vec![
                Op::LoadField("Value".into()),
                Op::LoadArg(0),
                Op::Sub,
                Op::StoreField("Value".into()),
            ],
        };
        execute(&method, &class, Some(&instance), &statics, &[Value::F64(2.5)]).unwrap();
        assert_eq!(instance.lock().get_field("Value"), Some(&Value::I32(7)));
    }

    #[test]
    fn test_arg_out_of_range() {
        let class = counter_class();
        let statics = StaticStore::for_classes(std::iter::once(class.as_ref()));
        let heap = Heap::new();
        let instance = heap.allocate(class.clone());

        let err = execute(&class.methods[0], &class, Some(&instance), &statics, &[]).unwrap_err();
        assert!(matches!(err, CoreError::ArgOutOfRange(0)));
    }
}
