use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::reflect::{ClassInfo, ConstructorInfo, FieldInfo, MethodInfo};

/// Kind of join point an [`ExpressionContext`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PointcutType {
    Execution,
    Call,
    Get,
    Set,
    Handler,
    StaticInitialization,
    Within,
}

impl PointcutType {
    pub fn as_str(self) -> &'static str {
        match self {
            PointcutType::Execution => "execution",
            PointcutType::Call => "call",
            PointcutType::Get => "get",
            PointcutType::Set => "set",
            PointcutType::Handler => "handler",
            PointcutType::StaticInitialization => "staticinitialization",
            PointcutType::Within => "within",
        }
    }
}

impl fmt::Display for PointcutType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reflective subject of a join point.
#[derive(Debug, Clone)]
pub enum ReflectInfo {
    Class(Arc<ClassInfo>),
    Method(Arc<MethodInfo>),
    Constructor(Arc<ConstructorInfo>),
    Field(Arc<FieldInfo>),
}

impl ReflectInfo {
    /// Simple member name; the class name for classes and constructors.
    pub fn name(&self) -> &str {
        match self {
            ReflectInfo::Class(c) => &c.name,
            ReflectInfo::Method(m) => &m.name,
            ReflectInfo::Constructor(c) => &c.declaring_type,
            ReflectInfo::Field(f) => &f.name,
        }
    }

    /// The class itself, or the class declaring the member.
    pub fn declaring_type(&self) -> &str {
        match self {
            ReflectInfo::Class(c) => &c.name,
            ReflectInfo::Method(m) => &m.declaring_type,
            ReflectInfo::Constructor(c) => &c.declaring_type,
            ReflectInfo::Field(f) => &f.declaring_type,
        }
    }

    pub fn signature(&self) -> String {
        match self {
            ReflectInfo::Class(c) => c.name.clone(),
            ReflectInfo::Method(m) => m.signature(),
            ReflectInfo::Constructor(c) => c.signature(),
            ReflectInfo::Field(f) => f.signature(),
        }
    }

    pub fn parameter_types(&self) -> Option<&[String]> {
        match self {
            ReflectInfo::Method(m) => Some(&m.parameter_types),
            ReflectInfo::Constructor(c) => Some(&c.parameter_types),
            _ => None,
        }
    }

    pub fn is_member(&self) -> bool {
        matches!(self, ReflectInfo::Method(_) | ReflectInfo::Constructor(_))
    }

    fn discriminant(&self) -> u8 {
        match self {
            ReflectInfo::Class(_) => 0,
            ReflectInfo::Method(_) => 1,
            ReflectInfo::Constructor(_) => 2,
            ReflectInfo::Field(_) => 3,
        }
    }
}

impl PartialEq for ReflectInfo {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ReflectInfo::Class(a), ReflectInfo::Class(b)) => Arc::ptr_eq(a, b) || a == b,
            (ReflectInfo::Method(a), ReflectInfo::Method(b)) => Arc::ptr_eq(a, b) || a == b,
            (ReflectInfo::Constructor(a), ReflectInfo::Constructor(b)) => Arc::ptr_eq(a, b) || a == b,
            (ReflectInfo::Field(a), ReflectInfo::Field(b)) => Arc::ptr_eq(a, b) || a == b,
            _ => false,
        }
    }
}

impl Eq for ReflectInfo {}

impl Hash for ReflectInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.discriminant().hash(state);
        self.signature().hash(state);
    }
}

impl From<Arc<MethodInfo>> for ReflectInfo {
    fn from(value: Arc<MethodInfo>) -> Self {
        ReflectInfo::Method(value)
    }
}

impl From<Arc<ConstructorInfo>> for ReflectInfo {
    fn from(value: Arc<ConstructorInfo>) -> Self {
        ReflectInfo::Constructor(value)
    }
}

impl From<Arc<FieldInfo>> for ReflectInfo {
    fn from(value: Arc<FieldInfo>) -> Self {
        ReflectInfo::Field(value)
    }
}

impl From<Arc<ClassInfo>> for ReflectInfo {
    fn from(value: Arc<ClassInfo>) -> Self {
        ReflectInfo::Class(value)
    }
}

/// The (kind, subject, enclosing) triple an expression is evaluated against.
///
/// Equality is structural over all three parts; cflow frames rely on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExpressionContext {
    kind: PointcutType,
    reflect: ReflectInfo,
    within: Option<ReflectInfo>,
}

impl ExpressionContext {
    pub fn new(kind: PointcutType, reflect: ReflectInfo, within: Option<ReflectInfo>) -> Result<Self> {
        if reflect.name().trim().is_empty() {
            return Err(Error::InvalidArgument("join point subject must have a name"));
        }
        if let Some(within) = &within {
            if within.name().trim().is_empty() {
                return Err(Error::InvalidArgument("enclosing subject must have a name"));
            }
        }
        Ok(Self { kind, reflect, within })
    }

    /// Method execution, enclosed by the method itself.
    pub fn execution(method: Arc<MethodInfo>) -> Result<Self> {
        let reflect = ReflectInfo::Method(method);
        Self::new(PointcutType::Execution, reflect.clone(), Some(reflect))
    }

    pub fn constructor_execution(constructor: Arc<ConstructorInfo>) -> Result<Self> {
        let reflect = ReflectInfo::Constructor(constructor);
        Self::new(PointcutType::Execution, reflect.clone(), Some(reflect))
    }

    /// Call to `callee` from the `caller` site.
    pub fn call(callee: impl Into<ReflectInfo>, caller: Option<ReflectInfo>) -> Result<Self> {
        Self::new(PointcutType::Call, callee.into(), caller)
    }

    pub fn get(field: Arc<FieldInfo>, within: Option<ReflectInfo>) -> Result<Self> {
        Self::new(PointcutType::Get, ReflectInfo::Field(field), within)
    }

    pub fn set(field: Arc<FieldInfo>, within: Option<ReflectInfo>) -> Result<Self> {
        Self::new(PointcutType::Set, ReflectInfo::Field(field), within)
    }

    /// Catch of `exception` inside `within`.
    pub fn handler(exception: Arc<ClassInfo>, within: Option<ReflectInfo>) -> Result<Self> {
        Self::new(PointcutType::Handler, ReflectInfo::Class(exception), within)
    }

    pub fn static_initialization(class: Arc<ClassInfo>) -> Result<Self> {
        let reflect = ReflectInfo::Class(class);
        Self::new(PointcutType::StaticInitialization, reflect.clone(), Some(reflect))
    }

    pub fn kind(&self) -> PointcutType {
        self.kind
    }

    pub fn reflect(&self) -> &ReflectInfo {
        &self.reflect
    }

    pub fn within(&self) -> Option<&ReflectInfo> {
        self.within.as_ref()
    }

    /// Declared type of the value the join point produces: the return type of
    /// a method, the constructed class, the field read by `get`, else `void`.
    pub fn returned_type(&self) -> &str {
        match (&self.reflect, self.kind) {
            (ReflectInfo::Method(m), _) => &m.return_type,
            (ReflectInfo::Constructor(c), _) => &c.declaring_type,
            (ReflectInfo::Field(f), PointcutType::Get) => &f.type_name,
            _ => "void",
        }
    }

    /// Name of the type the join point occurs in.
    pub fn within_type(&self) -> &str {
        self.within.as_ref().unwrap_or(&self.reflect).declaring_type()
    }

    /// Method or constructor whose code contains the join point.
    pub fn enclosing_member(&self) -> Option<&ReflectInfo> {
        match &self.within {
            Some(within) if within.is_member() => Some(within),
            _ if self.kind == PointcutType::Execution && self.reflect.is_member() => Some(&self.reflect),
            _ => None,
        }
    }

    /// Types bound by `args(..)`.
    pub fn argument_types(&self) -> Option<Vec<String>> {
        match (&self.reflect, self.kind) {
            (ReflectInfo::Field(f), PointcutType::Set) => Some(vec![f.type_name.clone()]),
            (ReflectInfo::Class(c), PointcutType::Handler) => Some(vec![c.name.clone()]),
            (reflect, _) => reflect.parameter_types().map(<[String]>::to_vec),
        }
    }

    /// Diagnostic identity, e.g. `execution(void foo.Bar.baz())`.
    pub fn signature(&self) -> String {
        format!("{}({})", self.kind, self.reflect.signature())
    }
}

impl fmt::Display for ExpressionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}
