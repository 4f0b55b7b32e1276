//! Backend-neutral reflective metadata.
//!
//! Classes, methods, constructors and fields are described by plain data types
//! that every backend (bytecode reader, live reflection bridge, source model)
//! can produce. Names are fully qualified Java source names (`java.lang.String`,
//! `int[]`). A [`ClassInfo`] owns its declared members but refers to its
//! superclass and interfaces by name only; resolution goes through a
//! [`ClassLookup`](repository::ClassLookup).

pub mod classfile;
pub mod descriptor;
pub mod repository;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

pub use repository::{ClassId, ClassInfoRepository, ClassLookup};

/// JVM access flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Modifiers(u16);

impl Modifiers {
    pub const PUBLIC: u16 = 0x0001;
    pub const PRIVATE: u16 = 0x0002;
    pub const PROTECTED: u16 = 0x0004;
    pub const STATIC: u16 = 0x0008;
    pub const FINAL: u16 = 0x0010;
    pub const SYNCHRONIZED: u16 = 0x0020;
    pub const VOLATILE: u16 = 0x0040;
    pub const TRANSIENT: u16 = 0x0080;
    pub const NATIVE: u16 = 0x0100;
    pub const INTERFACE: u16 = 0x0200;
    pub const ABSTRACT: u16 = 0x0400;
    pub const STRICT: u16 = 0x0800;
    pub const SYNTHETIC: u16 = 0x1000;
    pub const ANNOTATION: u16 = 0x2000;
    pub const ENUM: u16 = 0x4000;

    pub const fn from_bits(bits: u16) -> Self {
        Modifiers(bits)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn contains(self, flags: u16) -> bool {
        self.0 & flags == flags
    }

    pub fn is_public(self) -> bool {
        self.contains(Self::PUBLIC)
    }

    pub fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    pub fn is_abstract(self) -> bool {
        self.contains(Self::ABSTRACT)
    }

    /// Flag for a Java modifier keyword as written in a pattern.
    pub fn from_keyword(keyword: &str) -> Option<u16> {
        let flag = match keyword {
            "public" => Self::PUBLIC,
            "private" => Self::PRIVATE,
            "protected" => Self::PROTECTED,
            "static" => Self::STATIC,
            "final" => Self::FINAL,
            "synchronized" => Self::SYNCHRONIZED,
            "volatile" => Self::VOLATILE,
            "transient" => Self::TRANSIENT,
            "native" => Self::NATIVE,
            "abstract" => Self::ABSTRACT,
            "strictfp" => Self::STRICT,
            _ => return None,
        };
        Some(flag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TypeKind {
    #[default]
    Class,
    Interface,
    Annotation,
    Enum,
    Array,
    Primitive,
}

pub const PRIMITIVE_TYPES: [&str; 9] = ["boolean", "byte", "char", "short", "int", "long", "float", "double", "void"];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct AnnotationInfo {
    pub type_name: String,
    pub values: BTreeMap<String, String>,
}

impl AnnotationInfo {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self { type_name: type_name.into(), values: BTreeMap::new() }
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// `Name` matches both `Name` and `any.package.Name`.
    pub fn is(&self, name: &str) -> bool {
        let name = name.trim_start_matches('@');
        self.type_name == name
            || (!name.contains('.')
                && self.type_name.rsplit_once('.').map_or(false, |(_, simple)| simple == name))
    }
}

pub(crate) fn has_annotation(annotations: &[AnnotationInfo], name: &str) -> bool {
    annotations.iter().any(|a| a.is(name))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct MethodInfo {
    pub name: String,
    pub declaring_type: String,
    pub modifiers: Modifiers,
    pub return_type: String,
    pub parameter_types: Vec<String>,
    pub exception_types: Vec<String>,
    pub annotations: Vec<AnnotationInfo>,
}

impl MethodInfo {
    pub fn new(declaring_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declaring_type: declaring_type.into(),
            modifiers: Modifiers::from_bits(Modifiers::PUBLIC),
            return_type: "void".to_string(),
            ..Default::default()
        }
    }

    pub fn returning(mut self, return_type: impl Into<String>) -> Self {
        self.return_type = return_type.into();
        self
    }

    pub fn with_parameters<I, S>(mut self, parameter_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameter_types = parameter_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn throwing<I, S>(mut self, exception_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exception_types = exception_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_modifiers(mut self, bits: u16) -> Self {
        self.modifiers = Modifiers::from_bits(bits);
        self
    }

    pub fn with_annotation(mut self, annotation: AnnotationInfo) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn has_annotation(&self, name: &str) -> bool {
        has_annotation(&self.annotations, name)
    }

    /// `void foo.Bar.baz(int,java.lang.String)`
    pub fn signature(&self) -> String {
        format!(
            "{} {}.{}({})",
            self.return_type,
            self.declaring_type,
            self.name,
            self.parameter_types.join(",")
        )
    }

    /// Same name and parameter list: one overrides or hides the other.
    pub fn overrides(&self, other: &MethodInfo) -> bool {
        self.name == other.name && self.parameter_types == other.parameter_types
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ConstructorInfo {
    pub declaring_type: String,
    pub modifiers: Modifiers,
    pub parameter_types: Vec<String>,
    pub exception_types: Vec<String>,
    pub annotations: Vec<AnnotationInfo>,
}

impl ConstructorInfo {
    pub fn new(declaring_type: impl Into<String>) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            modifiers: Modifiers::from_bits(Modifiers::PUBLIC),
            ..Default::default()
        }
    }

    pub fn with_parameters<I, S>(mut self, parameter_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameter_types = parameter_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_modifiers(mut self, bits: u16) -> Self {
        self.modifiers = Modifiers::from_bits(bits);
        self
    }

    pub fn with_annotation(mut self, annotation: AnnotationInfo) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn has_annotation(&self, name: &str) -> bool {
        has_annotation(&self.annotations, name)
    }

    /// `foo.Bar.new(int)`
    pub fn signature(&self) -> String {
        format!("{}.new({})", self.declaring_type, self.parameter_types.join(","))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FieldInfo {
    pub name: String,
    pub declaring_type: String,
    pub modifiers: Modifiers,
    pub type_name: String,
    pub annotations: Vec<AnnotationInfo>,
}

impl FieldInfo {
    pub fn new(declaring_type: impl Into<String>, type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declaring_type: declaring_type.into(),
            modifiers: Modifiers::from_bits(Modifiers::PRIVATE),
            type_name: type_name.into(),
            annotations: Vec::new(),
        }
    }

    pub fn with_modifiers(mut self, bits: u16) -> Self {
        self.modifiers = Modifiers::from_bits(bits);
        self
    }

    pub fn with_annotation(mut self, annotation: AnnotationInfo) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn has_annotation(&self, name: &str) -> bool {
        has_annotation(&self.annotations, name)
    }

    /// `int foo.Bar.count`
    pub fn signature(&self) -> String {
        format!("{} {}.{}", self.type_name, self.declaring_type, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ClassInfo {
    pub name: String,
    pub kind: TypeKind,
    pub modifiers: Modifiers,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    /// Element type name for arrays.
    pub component_type: Option<String>,
    pub methods: Vec<Arc<MethodInfo>>,
    pub constructors: Vec<Arc<ConstructorInfo>>,
    pub fields: Vec<Arc<FieldInfo>>,
    pub annotations: Vec<AnnotationInfo>,
}

impl ClassInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            modifiers: Modifiers::from_bits(Modifiers::PUBLIC),
            ..Default::default()
        }
    }

    pub fn interface(name: impl Into<String>) -> Self {
        Self {
            kind: TypeKind::Interface,
            modifiers: Modifiers::from_bits(Modifiers::PUBLIC | Modifiers::INTERFACE | Modifiers::ABSTRACT),
            ..Self::new(name)
        }
    }

    pub fn primitive(name: &str) -> Self {
        Self {
            kind: TypeKind::Primitive,
            modifiers: Modifiers::from_bits(Modifiers::PUBLIC | Modifiers::FINAL),
            ..Self::new(name)
        }
    }

    pub fn array_of(component: &str) -> Self {
        Self {
            kind: TypeKind::Array,
            modifiers: Modifiers::from_bits(Modifiers::PUBLIC | Modifiers::FINAL),
            superclass: Some("java.lang.Object".to_string()),
            interfaces: vec!["java.lang.Cloneable".to_string(), "java.io.Serializable".to_string()],
            component_type: Some(component.to_string()),
            ..Self::new(format!("{component}[]"))
        }
    }

    pub fn extends(mut self, superclass: impl Into<String>) -> Self {
        self.superclass = Some(superclass.into());
        self
    }

    pub fn implements(mut self, interface: impl Into<String>) -> Self {
        self.interfaces.push(interface.into());
        self
    }

    pub fn with_kind(mut self, kind: TypeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_modifiers(mut self, bits: u16) -> Self {
        self.modifiers = Modifiers::from_bits(bits);
        self
    }

    pub fn with_annotation(mut self, annotation: AnnotationInfo) -> Self {
        self.annotations.push(annotation);
        self
    }

    /// Adds a method, rebinding its declaring type to this class.
    pub fn with_method(mut self, mut method: MethodInfo) -> Self {
        method.declaring_type = self.name.clone();
        self.methods.push(Arc::new(method));
        self
    }

    pub fn with_constructor(mut self, mut constructor: ConstructorInfo) -> Self {
        constructor.declaring_type = self.name.clone();
        self.constructors.push(Arc::new(constructor));
        self
    }

    pub fn with_field(mut self, mut field: FieldInfo) -> Self {
        field.declaring_type = self.name.clone();
        self.fields.push(Arc::new(field));
        self
    }

    pub fn is_interface(&self) -> bool {
        matches!(self.kind, TypeKind::Interface | TypeKind::Annotation)
    }

    pub fn is_array(&self) -> bool {
        self.kind == TypeKind::Array
    }

    pub fn is_primitive(&self) -> bool {
        self.kind == TypeKind::Primitive
    }

    pub fn has_annotation(&self, name: &str) -> bool {
        has_annotation(&self.annotations, name)
    }

    pub fn method(&self, name: &str, parameter_types: &[&str]) -> Option<&Arc<MethodInfo>> {
        self.methods.iter().find(|m| {
            m.name == name
                && m.parameter_types.len() == parameter_types.len()
                && m.parameter_types.iter().zip(parameter_types).all(|(a, b)| a == b)
        })
    }

    pub fn methods_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Arc<MethodInfo>> + 'a {
        self.methods.iter().filter(move |m| m.name == name)
    }

    pub fn field(&self, name: &str) -> Option<&Arc<FieldInfo>> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn constructor(&self, parameter_types: &[&str]) -> Option<&Arc<ConstructorInfo>> {
        self.constructors.iter().find(|c| {
            c.parameter_types.len() == parameter_types.len()
                && c.parameter_types.iter().zip(parameter_types).all(|(a, b)| a == b)
        })
    }

    /// Direct supertypes by name: superclass first, then interfaces.
    pub fn direct_supertypes(&self) -> impl Iterator<Item = &str> {
        self.superclass.as_deref().into_iter().chain(self.interfaces.iter().map(String::as_str))
    }

    pub fn package_name(&self) -> &str {
        self.name.rsplit_once('.').map_or("", |(package, _)| package)
    }
}

impl fmt::Display for ClassInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Backend able to describe classes by name, e.g. from bytecode or a live runtime.
pub trait ClassSource: Send + Sync {
    fn describe(&self, name: &str) -> Option<ClassInfo>;
}

/// Source over already-built descriptors.
#[derive(Debug, Default, Clone)]
pub struct StaticClassSource {
    classes: HashMap<String, ClassInfo>,
}

impl StaticClassSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_class(mut self, info: ClassInfo) -> Self {
        self.classes.insert(info.name.clone(), info);
        self
    }

    pub fn insert(&mut self, info: ClassInfo) {
        self.classes.insert(info.name.clone(), info);
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl FromIterator<ClassInfo> for StaticClassSource {
    fn from_iter<I: IntoIterator<Item = ClassInfo>>(iter: I) -> Self {
        Self { classes: iter.into_iter().map(|c| (c.name.clone(), c)).collect() }
    }
}

impl ClassSource for StaticClassSource {
    fn describe(&self, name: &str) -> Option<ClassInfo> {
        if let Some(info) = self.classes.get(name) {
            return Some(info.clone());
        }
        if PRIMITIVE_TYPES.contains(&name) {
            return Some(ClassInfo::primitive(name));
        }
        name.strip_suffix("[]").map(ClassInfo::array_of)
    }
}
