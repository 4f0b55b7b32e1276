//! # aspectwerkz
//!
//! Join-point matching and advice dispatch for an aspect-oriented weaver.
//!
//! This crate is the core a weaving backend builds on:
//! - A backend-neutral metadata model for classes, methods, fields and constructors
//! - Glob-style patterns and a pointcut expression language to select join points
//! - Thread-local control-flow tracking for `cflow` / `cflowbelow`
//! - Aspect definitions with deployment models
//! - An advice chain controller with around/before/after semantics
//!
//! Bytecode rewriting is left to the backend: it describes classes, asks which
//! advice applies at a join point, and calls back into the crate when the join
//! point fires.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use aspectwerkz::prelude::*;
//!
//! # fn main() -> aspectwerkz::Result<()> {
//! let system = AspectSystem::default();
//! let loader = ClassLoader::new("app", None);
//!
//! let definition = SystemDefinition::new("demo").with_aspect(
//!     AspectDefinition::new("Tracing", "demo.TracingAspect")
//!         .with_pointcut("services", "execution(* demo.*Service.*(..))")
//!         .with_advice(AdviceDefinition::new("trace", AdviceType::Around, "services")),
//! );
//! system.register_definition(&loader, definition)?;
//!
//! let manager = system.aspect_manager(&loader, "demo")?;
//! manager.register_advice("Tracing", "trace", |jp: &mut JoinPoint<'_>| -> Result<Value> {
//!     let value = jp.proceed()?;
//!     Ok(Value::Int(value.as_int().unwrap_or(0) + 1))
//! })?;
//!
//! let method = Arc::new(MethodInfo::new("demo.OrderService", "count").returning("int"));
//! let ctx = ExpressionContext::execution(method)?;
//! let result = manager.invoke(&ctx, None, None, vec![], &|_jp: &mut JoinPoint<'_>| -> Result<Value> { Ok(Value::Int(41)) })?;
//! assert_eq!(result, Value::Int(42));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                 Weaving backend (external)               │
//! │     describes classes, embeds advice, fires join points  │
//! ├─────────────────────────────────────────────────────────┤
//! │        AspectSystem  (one per process, owns scopes)      │
//! │   per loader: repository, cflow stack, definitions,      │
//! │               aspect managers                            │
//! ├─────────────────────────────────────────────────────────┤
//! │   AspectManager → JoinPointController → JoinPoint        │
//! │   chain building, redundancy clearing, proceed()         │
//! ├─────────────────────────────────────────────────────────┤
//! │   Expression / patterns          CflowStack              │
//! │   execution, call, within, ...   thread-local frames     │
//! ├─────────────────────────────────────────────────────────┤
//! │   reflect: ClassInfo, MethodInfo, FieldInfo, ...         │
//! │   classfile backend, arena repository                    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`reflect`] | Metadata model, class file backend, per-loader repository |
//! | [`pattern`] | Class, method, constructor and field patterns |
//! | [`expression`] | Pointcut expression parser and evaluator |
//! | [`cflow`] | Control-flow stack |
//! | [`definition`] | Aspect, advice and system definitions |
//! | [`aspect`] | Aspect contexts and instance containers |
//! | [`joinpoint`] | Join points, advice chains, the controller |
//! | [`manager`] | Runtime for one system definition |
//! | [`system`] | Loader-scoped ownership of all of the above |
//!
//! ## Expression Syntax
//!
//! | Primitive | Selects |
//! |-----------|---------|
//! | `execution(<method or ctor>)` | method or constructor bodies |
//! | `call(<method or ctor>)` | call sites |
//! | `get(<field>)`, `set(<field>)` | field reads and writes |
//! | `within(<class>)` | join points lexically inside a class |
//! | `withincode(<method or ctor>)` | join points inside a member's code |
//! | `handler(<class>)` | exception handlers |
//! | `staticinitialization(<class>)` | class initializers |
//! | `args(<params>)` | argument types |
//! | `cflow(<expr>)`, `cflowbelow(<expr>)` | join points inside a control flow |
//!
//! Combine with `&&`, `||`, `!` (or `and`, `or`, `not`) and refer to named
//! pointcuts by name.

pub mod aspect;
pub mod cflow;
pub mod config;
pub mod definition;
pub mod error;
pub mod expression;
pub mod joinpoint;
pub mod loader;
pub mod manager;
pub mod pattern;
pub mod prelude;
pub mod reflect;
pub mod system;

pub use config::WeaverConfig;
pub use error::{Error, Result};
pub use expression::{Expression, ExpressionContext, PointcutType};
pub use joinpoint::{JoinPoint, Throwable, Value};
pub use system::AspectSystem;
