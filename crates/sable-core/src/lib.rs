//! Sable managed runtime core
//!
//! This crate provides the reflective runtime the embedding bridge drives:
//! - Tagged value representation
//! - Class/enum/module reflection records
//! - Binary module image format (.sbin)
//! - Instance heap with deferred reclamation
//! - Stack interpreter for method bodies

#![warn(rust_2018_idioms)]

pub mod value;
pub mod object;
pub mod image;
pub mod heap;
pub mod interp;

pub use value::Value;
pub use object::{
    ClassDef, ClassKind, EnumDef, FieldDef, Instance, MethodDef, ParamDef, PropertyDef, TypeTag,
};
pub use image::{ImageError, ImageReader, ImageWriter, ModuleImage};
pub use heap::{Heap, InstanceRef, StaticStore};
pub use interp::Op;

/// Runtime execution errors
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Operand stack underflow
    #[error("operand stack underflow")]
    StackUnderflow,

    /// Instance method executed without an instance
    #[error("instance method executed without an instance")]
    MissingInstance,

    /// Field referenced by a method body does not exist
    #[error("unknown field: {0}")]
    UnknownField(String),

    /// Argument index out of range
    #[error("argument index {0} out of range")]
    ArgOutOfRange(u8),

    /// Operand type mismatch
    #[error("type error: {0}")]
    TypeError(String),
}

/// Runtime execution result
pub type CoreResult<T> = Result<T, CoreError>;
