//! JVM descriptors to Java source type names.
//!
//! `(I[Ljava/lang/String;)J` becomes parameters `["int", "java.lang.String[]"]`
//! and return type `"long"`.

use super::classfile::ClassFileError;

/// `java/util/Map$Entry` to `java.util.Map$Entry`.
pub fn internal_to_java(name: &str) -> String {
    name.replace('/', ".")
}

pub fn field_type(descriptor: &str) -> Result<String, ClassFileError> {
    let bytes = descriptor.as_bytes();
    let mut pos = 0;
    let ty = read_type(bytes, &mut pos, descriptor)?;
    if pos != bytes.len() {
        return Err(ClassFileError::InvalidDescriptor(descriptor.to_string()));
    }
    Ok(ty)
}

/// Parameter types and return type of a method descriptor.
pub fn method_types(descriptor: &str) -> Result<(Vec<String>, String), ClassFileError> {
    let bytes = descriptor.as_bytes();
    if bytes.first() != Some(&b'(') {
        return Err(ClassFileError::InvalidDescriptor(descriptor.to_string()));
    }
    let mut pos = 1;
    let mut params = Vec::new();
    while bytes.get(pos) != Some(&b')') {
        if pos >= bytes.len() {
            return Err(ClassFileError::InvalidDescriptor(descriptor.to_string()));
        }
        params.push(read_type(bytes, &mut pos, descriptor)?);
    }
    pos += 1;
    let ret = read_type(bytes, &mut pos, descriptor)?;
    if pos != bytes.len() {
        return Err(ClassFileError::InvalidDescriptor(descriptor.to_string()));
    }
    Ok((params, ret))
}

fn read_type(bytes: &[u8], pos: &mut usize, descriptor: &str) -> Result<String, ClassFileError> {
    let invalid = || ClassFileError::InvalidDescriptor(descriptor.to_string());
    let mut dimensions = 0;
    while bytes.get(*pos) == Some(&b'[') {
        dimensions += 1;
        *pos += 1;
    }
    let tag = *bytes.get(*pos).ok_or_else(invalid)?;
    *pos += 1;
    let mut name = match tag {
        b'B' => "byte".to_string(),
        b'C' => "char".to_string(),
        b'D' => "double".to_string(),
        b'F' => "float".to_string(),
        b'I' => "int".to_string(),
        b'J' => "long".to_string(),
        b'S' => "short".to_string(),
        b'Z' => "boolean".to_string(),
        b'V' if dimensions == 0 => "void".to_string(),
        b'L' => {
            let start = *pos;
            let end = bytes[start..].iter().position(|&b| b == b';').ok_or_else(invalid)? + start;
            *pos = end + 1;
            let internal = std::str::from_utf8(&bytes[start..end]).map_err(|_| invalid())?;
            if internal.is_empty() {
                return Err(invalid());
            }
            internal_to_java(internal)
        }
        _ => return Err(invalid()),
    };
    for _ in 0..dimensions {
        name.push_str("[]");
    }
    Ok(name)
}
