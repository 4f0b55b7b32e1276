//! Common imports for backends and advice code.
//!
//! Kept small: the types needed to describe classes, register definitions,
//! write advice and fire join points.

pub use crate::aspect::{AspectContainer, DeploymentScope, ObjectId, PrototypeContainer};
pub use crate::cflow::CflowStack;
pub use crate::config::WeaverConfig;
pub use crate::definition::{AdviceDefinition, AdviceType, AspectDefinition, DeploymentModel, SystemDefinition};
pub use crate::error::{Error, Result};
pub use crate::expression::{Expression, ExpressionContext, MatchEnv, PointcutType, ReflectInfo};
pub use crate::joinpoint::{Advice, JoinPoint, Throwable, Value};
pub use crate::loader::ClassLoader;
pub use crate::manager::AspectManager;
pub use crate::pattern::{ClassPattern, FieldPattern, MethodPattern};
pub use crate::reflect::{ClassInfo, ClassLookup, ConstructorInfo, FieldInfo, MethodInfo, StaticClassSource};
pub use crate::system::AspectSystem;
