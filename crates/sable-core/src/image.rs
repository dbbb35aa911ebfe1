//! Binary module image format (.sbin)
//!
//! A module image is what the build service emits and what execution
//! scopes load: a flat little-endian encoding of the module's class and
//! enum tables, including method bodies.

use thiserror::Error;

use crate::interp::Op;
use crate::object::{
    ClassDef, ClassKind, EnumDef, FieldDef, MethodDef, ParamDef, PropertyDef, TypeTag,
};
use crate::value::Value;

/// Magic number for Sable module images: "SBLM"
pub const MAGIC: [u8; 4] = *b"SBLM";

/// Current image format version
pub const VERSION: u32 = 1;

/// Errors that can occur while decoding raw image bytes
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Unexpected end of the image
    #[error("unexpected end of image at offset {0}")]
    UnexpectedEnd(usize),

    /// Invalid UTF-8 string
    #[error("invalid UTF-8 string at offset {0}")]
    InvalidUtf8(usize),

    /// Unknown tag byte
    #[error("invalid tag {0} at offset {1}")]
    InvalidTag(u8, usize),
}

/// Image decoding errors
#[derive(Debug, Error)]
pub enum ImageError {
    /// Decode error
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Invalid magic number
    #[error("invalid magic number: expected SBLM, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// Unsupported format version
    #[error("unsupported image version: {0} (current: {VERSION})")]
    UnsupportedVersion(u32),
}

/// A compiled Sable module
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleImage {
    /// Module name
    pub name: String,
    /// Class and interface definitions
    pub classes: Vec<ClassDef>,
    /// Enum definitions
    pub enums: Vec<EnumDef>,
}

impl ModuleImage {
    /// Create an empty module image
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            classes: Vec::new(),
            enums: Vec::new(),
        }
    }

    /// Encode the image to bytes
    pub fn encode(&self) -> Vec<u8> {
        let mut w = ImageWriter::new();
        w.buffer.extend_from_slice(&MAGIC);
        w.emit_u32(VERSION);
        w.emit_string(&self.name);

        w.emit_u32(self.enums.len() as u32);
        for e in &self.enums {
            encode_enum(&mut w, e);
        }

        w.emit_u32(self.classes.len() as u32);
        for c in &self.classes {
            encode_class(&mut w, c);
        }

        w.into_bytes()
    }

    /// Decode an image from bytes
    pub fn decode(bytes: &[u8]) -> Result<Self, ImageError> {
        let mut r = ImageReader::new(bytes);

        let magic = r.read_array::<4>()?;
        if magic != MAGIC {
            return Err(ImageError::InvalidMagic(magic));
        }
        let version = r.read_u32()?;
        if version != VERSION {
            return Err(ImageError::UnsupportedVersion(version));
        }

        let name = r.read_string()?;

        let enum_count = r.read_u32()? as usize;
        let mut enums = Vec::with_capacity(enum_count);
        for _ in 0..enum_count {
            enums.push(decode_enum(&mut r)?);
        }

        let class_count = r.read_u32()? as usize;
        let mut classes = Vec::with_capacity(class_count);
        for _ in 0..class_count {
            classes.push(decode_class(&mut r)?);
        }

        Ok(Self { name, classes, enums })
    }
}

// ===== Record encoding =====

fn encode_enum(w: &mut ImageWriter, e: &EnumDef) {
    w.emit_string(&e.name);
    encode_type(w, &e.underlying);
    w.emit_u32(e.variants.len() as u32);
    for (name, value) in &e.variants {
        w.emit_string(name);
        w.emit_i64(*value);
    }
}

fn decode_enum(r: &mut ImageReader<'_>) -> Result<EnumDef, DecodeError> {
    let name = r.read_string()?;
    let underlying = decode_type(r)?;
    let count = r.read_u32()? as usize;
    let mut variants = Vec::with_capacity(count);
    for _ in 0..count {
        let name = r.read_string()?;
        let value = r.read_i64()?;
        variants.push((name, value));
    }
    Ok(EnumDef { name, underlying, variants })
}

fn encode_class(w: &mut ImageWriter, c: &ClassDef) {
    w.emit_string(&c.name);
    w.emit_u8(match c.kind {
        ClassKind::Class => 0,
        ClassKind::Interface => 1,
    });

    match &c.extends {
        Some(base) => {
            w.emit_u8(1);
            w.emit_string(base);
        }
        None => w.emit_u8(0),
    }
    w.emit_u32(c.implements.len() as u32);
    for iface in &c.implements {
        w.emit_string(iface);
    }

    w.emit_u32(c.fields.len() as u32);
    for f in &c.fields {
        w.emit_string(&f.name);
        encode_type(w, &f.ty);
        let mut flags = 0u8;
        if f.is_static {
            flags |= 1;
        }
        if f.readonly {
            flags |= 2;
        }
        if f.default.is_some() {
            flags |= 4;
        }
        w.emit_u8(flags);
        if let Some(default) = &f.default {
            encode_value(w, default);
        }
    }

    w.emit_u32(c.properties.len() as u32);
    for p in &c.properties {
        w.emit_string(&p.name);
        encode_type(w, &p.ty);
        let mut flags = 0u8;
        if p.is_static {
            flags |= 1;
        }
        if p.can_read {
            flags |= 2;
        }
        if p.can_write {
            flags |= 4;
        }
        w.emit_u8(flags);
        w.emit_string(&p.backing);
    }

    w.emit_u32(c.methods.len() as u32);
    for m in &c.methods {
        w.emit_string(&m.name);
        w.emit_u8(m.is_static as u8);
        w.emit_u32(m.params.len() as u32);
        for p in &m.params {
            w.emit_string(&p.name);
            encode_type(w, &p.ty);
            w.emit_u8(p.by_ref as u8);
        }
        w.emit_u32(m.body.len() as u32);
        for op in &m.body {
            encode_op(w, op);
        }
    }
}

fn decode_class(r: &mut ImageReader<'_>) -> Result<ClassDef, DecodeError> {
    let name = r.read_string()?;
    let kind = match r.read_u8()? {
        0 => ClassKind::Class,
        1 => ClassKind::Interface,
        tag => return Err(DecodeError::InvalidTag(tag, r.offset())),
    };

    let extends = if r.read_u8()? != 0 {
        Some(r.read_string()?)
    } else {
        None
    };
    let iface_count = r.read_u32()? as usize;
    let mut implements = Vec::with_capacity(iface_count);
    for _ in 0..iface_count {
        implements.push(r.read_string()?);
    }

    let field_count = r.read_u32()? as usize;
    let mut fields = Vec::with_capacity(field_count);
    for _ in 0..field_count {
        let name = r.read_string()?;
        let ty = decode_type(r)?;
        let flags = r.read_u8()?;
        let default = if flags & 4 != 0 {
            Some(decode_value(r)?)
        } else {
            None
        };
        fields.push(FieldDef {
            name,
            ty,
            is_static: flags & 1 != 0,
            readonly: flags & 2 != 0,
            default,
        });
    }

    let prop_count = r.read_u32()? as usize;
    let mut properties = Vec::with_capacity(prop_count);
    for _ in 0..prop_count {
        let name = r.read_string()?;
        let ty = decode_type(r)?;
        let flags = r.read_u8()?;
        let backing = r.read_string()?;
        properties.push(PropertyDef {
            name,
            ty,
            is_static: flags & 1 != 0,
            backing,
            can_read: flags & 2 != 0,
            can_write: flags & 4 != 0,
        });
    }

    let method_count = r.read_u32()? as usize;
    let mut methods = Vec::with_capacity(method_count);
    for _ in 0..method_count {
        let name = r.read_string()?;
        let is_static = r.read_u8()? != 0;
        let param_count = r.read_u32()? as usize;
        let mut params = Vec::with_capacity(param_count);
        for _ in 0..param_count {
            let name = r.read_string()?;
            let ty = decode_type(r)?;
            let by_ref = r.read_u8()? != 0;
            params.push(ParamDef { name, ty, by_ref });
        }
        let op_count = r.read_u32()? as usize;
        let mut body = Vec::with_capacity(op_count);
        for _ in 0..op_count {
            body.push(decode_op(r)?);
        }
        methods.push(MethodDef { name, is_static, params, body });
    }

    Ok(ClassDef {
        name,
        kind,
        extends,
        implements,
        fields,
        properties,
        methods,
    })
}

fn encode_type(w: &mut ImageWriter, ty: &TypeTag) {
    match ty {
        TypeTag::Bool => w.emit_u8(0),
        TypeTag::I8 => w.emit_u8(1),
        TypeTag::I16 => w.emit_u8(2),
        TypeTag::I32 => w.emit_u8(3),
        TypeTag::I64 => w.emit_u8(4),
        TypeTag::U8 => w.emit_u8(5),
        TypeTag::U16 => w.emit_u8(6),
        TypeTag::U32 => w.emit_u8(7),
        TypeTag::U64 => w.emit_u8(8),
        TypeTag::F32 => w.emit_u8(9),
        TypeTag::F64 => w.emit_u8(10),
        TypeTag::Str => w.emit_u8(11),
        TypeTag::Enum(name) => {
            w.emit_u8(12);
            w.emit_string(name);
        }
        TypeTag::Ref(name) => {
            w.emit_u8(13);
            w.emit_string(name);
        }
    }
}

fn decode_type(r: &mut ImageReader<'_>) -> Result<TypeTag, DecodeError> {
    Ok(match r.read_u8()? {
        0 => TypeTag::Bool,
        1 => TypeTag::I8,
        2 => TypeTag::I16,
        3 => TypeTag::I32,
        4 => TypeTag::I64,
        5 => TypeTag::U8,
        6 => TypeTag::U16,
        7 => TypeTag::U32,
        8 => TypeTag::U64,
        9 => TypeTag::F32,
        10 => TypeTag::F64,
        11 => TypeTag::Str,
        12 => TypeTag::Enum(r.read_string()?),
        13 => TypeTag::Ref(r.read_string()?),
        tag => return Err(DecodeError::InvalidTag(tag, r.offset())),
    })
}

fn encode_value(w: &mut ImageWriter, value: &Value) {
    match value {
        Value::Bool(v) => {
            w.emit_u8(1);
            w.emit_u8(*v as u8);
        }
        Value::I8(v) => {
            w.emit_u8(2);
            w.emit_i64(*v as i64);
        }
        Value::I16(v) => {
            w.emit_u8(3);
            w.emit_i64(*v as i64);
        }
        Value::I32(v) => {
            w.emit_u8(4);
            w.emit_i64(*v as i64);
        }
        Value::I64(v) => {
            w.emit_u8(5);
            w.emit_i64(*v);
        }
        Value::U8(v) => {
            w.emit_u8(6);
            w.emit_i64(*v as i64);
        }
        Value::U16(v) => {
            w.emit_u8(7);
            w.emit_i64(*v as i64);
        }
        Value::U32(v) => {
            w.emit_u8(8);
            w.emit_i64(*v as i64);
        }
        Value::U64(v) => {
            w.emit_u8(9);
            w.emit_i64(*v as i64);
        }
        Value::F32(v) => {
            w.emit_u8(10);
            w.emit_f64(*v as f64);
        }
        Value::F64(v) => {
            w.emit_u8(11);
            w.emit_f64(*v);
        }
        Value::Str(s) => {
            w.emit_u8(12);
            w.emit_string(s);
        }
        Value::Enum(inner) => {
            w.emit_u8(13);
            encode_value(w, inner);
        }
        // References are not encodable constants.
        Value::Null | Value::Ref(_) => w.emit_u8(0),
    }
}

fn decode_value(r: &mut ImageReader<'_>) -> Result<Value, DecodeError> {
    Ok(match r.read_u8()? {
        0 => Value::Null,
        1 => Value::Bool(r.read_u8()? != 0),
        2 => Value::I8(r.read_i64()? as i8),
        3 => Value::I16(r.read_i64()? as i16),
        4 => Value::I32(r.read_i64()? as i32),
        5 => Value::I64(r.read_i64()?),
        6 => Value::U8(r.read_i64()? as u8),
        7 => Value::U16(r.read_i64()? as u16),
        8 => Value::U32(r.read_i64()? as u32),
        9 => Value::U64(r.read_i64()? as u64),
        10 => Value::F32(r.read_f64()? as f32),
        11 => Value::F64(r.read_f64()?),
        12 => Value::Str(r.read_string()?),
        13 => Value::Enum(Box::new(decode_value(r)?)),
        tag => return Err(DecodeError::InvalidTag(tag, r.offset())),
    })
}

fn encode_op(w: &mut ImageWriter, op: &Op) {
    match op {
        Op::LoadArg(index) => {
            w.emit_u8(0);
            w.emit_u8(*index);
        }
        Op::LoadConst(value) => {
            w.emit_u8(1);
            encode_value(w, value);
        }
        Op::LoadField(name) => {
            w.emit_u8(2);
            w.emit_string(name);
        }
        Op::StoreField(name) => {
            w.emit_u8(3);
            w.emit_string(name);
        }
        Op::LoadStatic(name) => {
            w.emit_u8(4);
            w.emit_string(name);
        }
        Op::StoreStatic(name) => {
            w.emit_u8(5);
            w.emit_string(name);
        }
        Op::Add => w.emit_u8(6),
        Op::Sub => w.emit_u8(7),
        Op::Mul => w.emit_u8(8),
        Op::Ret => w.emit_u8(9),
    }
}

fn decode_op(r: &mut ImageReader<'_>) -> Result<Op, DecodeError> {
    Ok(match r.read_u8()? {
        0 => Op::LoadArg(r.read_u8()?),
        1 => Op::LoadConst(decode_value(r)?),
        2 => Op::LoadField(r.read_string()?),
        3 => Op::StoreField(r.read_string()?),
        4 => Op::LoadStatic(r.read_string()?),
        5 => Op::StoreStatic(r.read_string()?),
        6 => Op::Add,
        7 => Op::Sub,
        8 => Op::Mul,
        9 => Op::Ret,
        tag => return Err(DecodeError::InvalidTag(tag, r.offset())),
    })
}

// ===== Writer / reader =====

/// Little-endian image writer
pub struct ImageWriter {
    pub(crate) buffer: Vec<u8>,
}

impl ImageWriter {
    /// Create a new writer
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Consume the writer and return the encoded bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    /// Emit a raw byte
    pub fn emit_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Emit a 32-bit unsigned integer
    pub fn emit_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit signed integer
    pub fn emit_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a 64-bit float
    pub fn emit_f64(&mut self, value: f64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Emit a length-prefixed UTF-8 string
    pub fn emit_string(&mut self, value: &str) {
        self.emit_u32(value.len() as u32);
        self.buffer.extend_from_slice(value.as_bytes());
    }
}

impl Default for ImageWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Little-endian image reader
pub struct ImageReader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ImageReader<'a> {
    /// Create a reader over raw image bytes
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    /// Current read offset
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(DecodeError::UnexpectedEnd(self.offset))?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    /// Read a raw byte
    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    /// Read a fixed-size byte array
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Read a 32-bit unsigned integer
    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.read_array::<4>()?))
    }

    /// Read a 64-bit signed integer
    pub fn read_i64(&mut self) -> Result<i64, DecodeError> {
        Ok(i64::from_le_bytes(self.read_array::<8>()?))
    }

    /// Read a 64-bit float
    pub fn read_f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_le_bytes(self.read_array::<8>()?))
    }

    /// Read a length-prefixed UTF-8 string
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        let start = self.offset;
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8(start))
    }
}
