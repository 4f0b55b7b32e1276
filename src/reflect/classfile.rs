//! Bytecode backend: `.class` bytes to [`ClassInfo`].
//!
//! Only the parts of the class file the matcher needs are decoded: the constant
//! pool, access flags, the type hierarchy, fields, methods, `Exceptions` and the
//! runtime annotation attributes. Everything else is skipped by length.

use std::collections::HashMap;

use parking_lot::Mutex;
use thiserror::Error;

use super::descriptor::{self, internal_to_java};
use super::{AnnotationInfo, ClassInfo, ClassSource, ConstructorInfo, FieldInfo, MethodInfo, Modifiers, TypeKind};

const MAGIC: u32 = 0xCAFE_BABE;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassFileError {
    #[error("unexpected end of file")]
    UnexpectedEof,
    #[error("invalid magic: {0:#x}")]
    InvalidMagic(u32),
    #[error("invalid constant pool index: {0}")]
    InvalidConstantPoolIndex(u16),
    #[error("invalid constant pool tag: {0}")]
    InvalidConstantPoolTag(u8),
    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),
    #[error("invalid descriptor: {0}")]
    InvalidDescriptor(String),
}

struct ByteCursor<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> ByteCursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ClassFileError> {
        let end = self.offset.checked_add(len).ok_or(ClassFileError::UnexpectedEof)?;
        let slice = self.bytes.get(self.offset..end).ok_or(ClassFileError::UnexpectedEof)?;
        self.offset = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, ClassFileError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, ClassFileError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, ClassFileError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn is_empty(&self) -> bool {
        self.offset >= self.bytes.len()
    }
}

#[derive(Debug, Clone)]
enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    Other,
}

struct ConstantPool {
    entries: Vec<Option<Constant>>,
}

impl ConstantPool {
    fn read(cursor: &mut ByteCursor<'_>) -> Result<Self, ClassFileError> {
        let count = cursor.u16()? as usize;
        let mut entries = Vec::with_capacity(count);
        entries.push(None);
        while entries.len() < count {
            let tag = cursor.u8()?;
            let constant = match tag {
                1 => {
                    let len = cursor.u16()? as usize;
                    Constant::Utf8(String::from_utf8_lossy(cursor.take(len)?).into_owned())
                }
                3 => Constant::Integer(cursor.u32()? as i32),
                4 => Constant::Float(f32::from_bits(cursor.u32()?)),
                5 | 6 => {
                    let bits = ((cursor.u32()? as u64) << 32) | cursor.u32()? as u64;
                    let constant = if tag == 5 { Constant::Long(bits as i64) } else { Constant::Double(f64::from_bits(bits)) };
                    // long and double occupy two slots
                    entries.push(Some(constant));
                    entries.push(None);
                    continue;
                }
                7 => Constant::Class(cursor.u16()?),
                8 | 16 | 19 | 20 => {
                    cursor.u16()?;
                    Constant::Other
                }
                9 | 10 | 11 | 12 | 17 | 18 => {
                    cursor.u32()?;
                    Constant::Other
                }
                15 => {
                    cursor.take(3)?;
                    Constant::Other
                }
                _ => return Err(ClassFileError::InvalidConstantPoolTag(tag)),
            };
            entries.push(Some(constant));
        }
        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> Result<&Constant, ClassFileError> {
        self.entries
            .get(index as usize)
            .and_then(Option::as_ref)
            .ok_or(ClassFileError::InvalidConstantPoolIndex(index))
    }

    fn utf8(&self, index: u16) -> Result<&str, ClassFileError> {
        match self.get(index)? {
            Constant::Utf8(s) => Ok(s),
            _ => Err(ClassFileError::InvalidConstantPoolIndex(index)),
        }
    }

    fn class_name(&self, index: u16) -> Result<String, ClassFileError> {
        match self.get(index)? {
            Constant::Class(name_index) => Ok(internal_to_java(self.utf8(*name_index)?)),
            _ => Err(ClassFileError::InvalidConstantPoolIndex(index)),
        }
    }

    fn render(&self, index: u16) -> String {
        match self.get(index) {
            Ok(Constant::Utf8(s)) => s.clone(),
            Ok(Constant::Integer(v)) => v.to_string(),
            Ok(Constant::Float(v)) => v.to_string(),
            Ok(Constant::Long(v)) => v.to_string(),
            Ok(Constant::Double(v)) => v.to_string(),
            _ => String::new(),
        }
    }
}

#[derive(Default)]
struct MemberAttributes {
    exceptions: Vec<String>,
    annotations: Vec<AnnotationInfo>,
}

fn read_attributes(cursor: &mut ByteCursor<'_>, pool: &ConstantPool) -> Result<MemberAttributes, ClassFileError> {
    let mut out = MemberAttributes::default();
    let count = cursor.u16()?;
    for _ in 0..count {
        let name = pool.utf8(cursor.u16()?)?;
        let len = cursor.u32()? as usize;
        let mut body = ByteCursor::new(cursor.take(len)?);
        match name {
            "Exceptions" => {
                let n = body.u16()?;
                for _ in 0..n {
                    out.exceptions.push(pool.class_name(body.u16()?)?);
                }
            }
            "RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => {
                let n = body.u16()?;
                for _ in 0..n {
                    out.annotations.push(read_annotation(&mut body, pool)?);
                }
            }
            _ => continue,
        }
        if !body.is_empty() {
            return Err(ClassFileError::InvalidAttribute(name.to_string()));
        }
    }
    Ok(out)
}

fn read_annotation(cursor: &mut ByteCursor<'_>, pool: &ConstantPool) -> Result<AnnotationInfo, ClassFileError> {
    let type_name = descriptor::field_type(pool.utf8(cursor.u16()?)?)?;
    let mut annotation = AnnotationInfo::new(type_name);
    let pairs = cursor.u16()?;
    for _ in 0..pairs {
        let name = pool.utf8(cursor.u16()?)?.to_string();
        let value = read_element_value(cursor, pool)?;
        annotation.values.insert(name, value);
    }
    Ok(annotation)
}

fn read_element_value(cursor: &mut ByteCursor<'_>, pool: &ConstantPool) -> Result<String, ClassFileError> {
    let tag = cursor.u8()?;
    let value = match tag {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => pool.render(cursor.u16()?),
        b'e' => {
            let type_name = descriptor::field_type(pool.utf8(cursor.u16()?)?)?;
            let constant = pool.utf8(cursor.u16()?)?;
            format!("{type_name}.{constant}")
        }
        b'c' => pool.utf8(cursor.u16()?)?.to_string(),
        b'@' => format!("@{}", read_annotation(cursor, pool)?.type_name),
        b'[' => {
            let n = cursor.u16()?;
            let mut items = Vec::with_capacity(n as usize);
            for _ in 0..n {
                items.push(read_element_value(cursor, pool)?);
            }
            format!("[{}]", items.join(","))
        }
        _ => return Err(ClassFileError::InvalidAttribute("annotation".to_string())),
    };
    Ok(value)
}

impl ClassInfo {
    /// Describe a class from its class file bytes.
    pub fn from_class_bytes(bytes: &[u8]) -> Result<ClassInfo, ClassFileError> {
        let mut cursor = ByteCursor::new(bytes);
        let magic = cursor.u32()?;
        if magic != MAGIC {
            return Err(ClassFileError::InvalidMagic(magic));
        }
        let _minor = cursor.u16()?;
        let _major = cursor.u16()?;
        let pool = ConstantPool::read(&mut cursor)?;

        let access = cursor.u16()?;
        let name = pool.class_name(cursor.u16()?)?;
        let super_index = cursor.u16()?;
        let superclass = if super_index == 0 { None } else { Some(pool.class_name(super_index)?) };
        let interface_count = cursor.u16()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(pool.class_name(cursor.u16()?)?);
        }

        let kind = if access & Modifiers::ANNOTATION != 0 {
            TypeKind::Annotation
        } else if access & Modifiers::INTERFACE != 0 {
            TypeKind::Interface
        } else if access & Modifiers::ENUM != 0 {
            TypeKind::Enum
        } else {
            TypeKind::Class
        };
        let mut info = ClassInfo {
            name,
            kind,
            modifiers: Modifiers::from_bits(access),
            superclass,
            interfaces,
            ..Default::default()
        };

        let field_count = cursor.u16()?;
        for _ in 0..field_count {
            let access = cursor.u16()?;
            let field_name = pool.utf8(cursor.u16()?)?.to_string();
            let type_name = descriptor::field_type(pool.utf8(cursor.u16()?)?)?;
            let attrs = read_attributes(&mut cursor, &pool)?;
            let mut field = FieldInfo::new(info.name.clone(), type_name, field_name).with_modifiers(access);
            field.annotations = attrs.annotations;
            info.fields.push(field.into());
        }

        let method_count = cursor.u16()?;
        for _ in 0..method_count {
            let access = cursor.u16()?;
            let method_name = pool.utf8(cursor.u16()?)?.to_string();
            let (params, ret) = descriptor::method_types(pool.utf8(cursor.u16()?)?)?;
            let attrs = read_attributes(&mut cursor, &pool)?;
            match method_name.as_str() {
                "<clinit>" => {}
                "<init>" => {
                    let mut ctor = ConstructorInfo::new(info.name.clone()).with_parameters(params).with_modifiers(access);
                    ctor.exception_types = attrs.exceptions;
                    ctor.annotations = attrs.annotations;
                    info.constructors.push(ctor.into());
                }
                _ => {
                    let mut method = MethodInfo::new(info.name.clone(), method_name)
                        .returning(ret)
                        .with_parameters(params)
                        .with_modifiers(access)
                        .throwing(attrs.exceptions);
                    method.annotations = attrs.annotations;
                    info.methods.push(method.into());
                }
            }
        }

        info.annotations = read_attributes(&mut cursor, &pool)?.annotations;
        Ok(info)
    }
}

/// Source over raw class files, decoded on first lookup.
#[derive(Default)]
pub struct BytecodeSource {
    pending: Mutex<HashMap<String, Vec<u8>>>,
}

impl BytecodeSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register class file bytes under a Java or internal (`a/b/C`) name.
    pub fn add(&self, name: &str, bytes: Vec<u8>) {
        let name = internal_to_java(name.trim_end_matches(".class"));
        self.pending.lock().insert(name, bytes);
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ClassSource for BytecodeSource {
    fn describe(&self, name: &str) -> Option<ClassInfo> {
        let pending = self.pending.lock();
        let bytes = pending.get(name)?;
        match ClassInfo::from_class_bytes(bytes) {
            Ok(info) => Some(info),
            Err(err) => {
                tracing::warn!(class = name, error = %err, "failed to read class file");
                None
            }
        }
    }
}
