//! Join points and advice execution.
//!
//! A [`JoinPoint`] is built per intercepted call. It carries the call's
//! arguments and its own [`JoinPointController`]; advice bodies receive it
//! mutably and call [`JoinPoint::proceed`] to run the rest of the chain.
//! Errors raised by advice or by the original flow back unchanged.

pub mod chain;
pub mod controller;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub use chain::{AdviceIndex, AdviceRef, Pointcut};
pub use controller::{ChainState, ChainStrategy, ExecutionModel, JoinPointController, Step};

use crate::aspect::{AspectContext, AspectInstance, DeploymentScope, ObjectId};
use crate::cflow::{CflowStack, FrameId};
use crate::definition::AdviceType;
use crate::error::{Error, Result};
use crate::expression::{ExpressionContext, MatchEnv};
use crate::reflect::ClassLookup;

/// Argument or return value crossing a join point.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Void,
    Null,
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Str(String),
    Object(Arc<dyn Any + Send + Sync>),
}

impl Value {
    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        Value::Object(Arc::new(value))
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Value::Void)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            Value::Int(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Object(v) => v.downcast_ref(),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Void, Value::Void) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Void => f.write_str("Void"),
            Value::Null => f.write_str("Null"),
            Value::Bool(v) => write!(f, "Bool({v})"),
            Value::Int(v) => write!(f, "Int({v})"),
            Value::Long(v) => write!(f, "Long({v})"),
            Value::Double(v) => write!(f, "Double({v})"),
            Value::Str(v) => write!(f, "Str({v:?})"),
            Value::Object(_) => f.write_str("Object(..)"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Long(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

/// A business exception: raised by advice or the original, never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Throwable {
    pub class_name: String,
    pub message: String,
}

impl Throwable {
    pub fn new(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self { class_name: class_name.into(), message: message.into() }
    }
}

impl fmt::Display for Throwable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class_name, self.message)
    }
}

/// An advice body. Closures taking `&mut JoinPoint` implement it.
pub trait Advice: Send + Sync {
    fn invoke(&self, join_point: &mut JoinPoint<'_>) -> Result<Value>;
}

impl<F> Advice for F
where
    F: Fn(&mut JoinPoint<'_>) -> Result<Value> + Send + Sync,
{
    fn invoke(&self, join_point: &mut JoinPoint<'_>) -> Result<Value> {
        self(join_point)
    }
}

/// Maps chain entries to executable bodies and their aspect contexts.
pub trait AdviceResolver {
    fn resolve(&self, index: AdviceIndex) -> Option<Arc<dyn Advice>>;

    fn aspect_context(&self, _index: AdviceIndex) -> Option<Arc<AspectContext>> {
        None
    }
}

/// The intercepted code itself.
pub type Original<'a> = dyn Fn(&mut JoinPoint<'_>) -> Result<Value> + 'a;

pub struct JoinPoint<'a> {
    context: &'a ExpressionContext,
    this: Option<ObjectId>,
    target: Option<ObjectId>,
    args: Vec<Value>,
    controller: JoinPointController,
    resolver: &'a dyn AdviceResolver,
    cflow: Option<&'a CflowStack>,
    lookup: Option<&'a dyn ClassLookup>,
    original: &'a Original<'a>,
    returned: Option<Value>,
    thrown: Option<Throwable>,
    in_plain_advice: bool,
}

impl<'a> JoinPoint<'a> {
    pub fn new(
        context: &'a ExpressionContext,
        controller: JoinPointController,
        resolver: &'a dyn AdviceResolver,
        original: &'a Original<'a>,
    ) -> Self {
        Self {
            context,
            this: None,
            target: None,
            args: Vec::new(),
            controller,
            resolver,
            cflow: None,
            lookup: None,
            original,
            returned: None,
            thrown: None,
            in_plain_advice: false,
        }
    }

    pub fn with_this(mut self, this: Option<ObjectId>) -> Self {
        self.this = this;
        self
    }

    pub fn with_target(mut self, target: Option<ObjectId>) -> Self {
        self.target = target;
        self
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_cflow(mut self, cflow: &'a CflowStack) -> Self {
        self.cflow = Some(cflow);
        self
    }

    pub fn with_lookup(mut self, lookup: &'a dyn ClassLookup) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn context(&self) -> &ExpressionContext {
        self.context
    }

    pub fn signature(&self) -> String {
        self.context.signature()
    }

    pub fn this(&self) -> Option<ObjectId> {
        self.this
    }

    pub fn target(&self) -> Option<ObjectId> {
        self.target
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn args_mut(&mut self) -> &mut Vec<Value> {
        &mut self.args
    }

    /// Value returned by the rest of the chain, once known.
    pub fn returned(&self) -> Option<&Value> {
        self.returned.as_ref()
    }

    /// Exception raised by the rest of the chain, once known.
    pub fn thrown(&self) -> Option<&Throwable> {
        self.thrown.as_ref()
    }

    pub fn controller(&self) -> &JoinPointController {
        &self.controller
    }

    pub fn current_advice(&self) -> Option<&AdviceRef> {
        self.controller.current_advice()
    }

    /// Independent copy with its own cursor and arguments.
    pub fn deep_copy(&self) -> JoinPoint<'a> {
        JoinPoint {
            context: self.context,
            this: self.this,
            target: self.target,
            args: self.args.clone(),
            controller: self.controller.deep_copy(),
            resolver: self.resolver,
            cflow: self.cflow,
            lookup: self.lookup,
            original: self.original,
            returned: self.returned.clone(),
            thrown: self.thrown.clone(),
            in_plain_advice: self.in_plain_advice,
        }
    }

    /// Continue the chain under the controller's execution model.
    pub fn proceed(&mut self) -> Result<Value> {
        if self.in_plain_advice {
            return Err(Error::internal(self.signature(), "proceed() called from a non-around advice"));
        }
        match self.controller.model().clone() {
            ExecutionModel::Linear => self.proceed_linear(),
            ExecutionModel::Custom(strategy) => strategy.proceed(self),
        }
    }

    /// One step of the linear walk, whatever the configured model.
    pub fn proceed_linear(&mut self) -> Result<Value> {
        let ctx = self.context;
        let env = MatchEnv::new(self.lookup, self.cflow);
        let step = self.controller.advance(|pointcuts| controller::cflow_gate(pointcuts, ctx, &env))?;
        let outcome = match step {
            Step::Original => self.invoke_original(),
            Step::Advice(advice) => self.invoke_advice(&advice),
        };
        let restored = self.controller.retreat();
        let value = outcome?;
        restored?;
        Ok(value)
    }

    /// Run the intercepted code directly, without touching the cursor.
    pub fn invoke_original(&mut self) -> Result<Value> {
        let original = self.original;
        let outcome = original(self);
        self.record(&outcome);
        outcome
    }

    /// Run one advice, adapting non-around kinds to the chain.
    pub fn invoke_advice(&mut self, advice: &AdviceRef) -> Result<Value> {
        let body = self.resolver.resolve(advice.index).ok_or_else(|| {
            Error::internal(self.signature(), format!("advice {} ({}) has no registered body", advice.name, advice.index))
        })?;
        match advice.kind {
            AdviceType::Around => body.invoke(self),
            AdviceType::Before => {
                self.run_plain(body.as_ref())?;
                self.proceed()
            }
            AdviceType::After => {
                let outcome = self.proceed();
                self.record(&outcome);
                self.run_plain(body.as_ref())?;
                outcome
            }
            AdviceType::AfterReturning => {
                let value = self.proceed()?;
                self.returned = Some(value.clone());
                if self.accepts(advice, self.context.returned_type())? {
                    self.run_plain(body.as_ref())?;
                }
                Ok(value)
            }
            AdviceType::AfterThrowing => match self.proceed() {
                Err(Error::Thrown(throwable)) => {
                    if self.accepts(advice, &throwable.class_name)? {
                        self.thrown = Some(throwable.clone());
                        self.run_plain(body.as_ref())?;
                    }
                    Err(Error::Thrown(throwable))
                }
                other => other,
            },
        }
    }

    /// Instance of the aspect declaring the executing advice, per its deployment model.
    ///
    /// Per-cflow instances belong to the outermost active frame the advice's
    /// `cflow` bodies select (the innermost frame when it has none) and are
    /// released when that frame exits.
    pub fn aspect_instance(&self) -> Result<AspectInstance> {
        let advice = self.current_advice().ok_or(Error::InvalidArgument("no advice is executing"))?;
        let context = self
            .resolver
            .aspect_context(advice.index)
            .ok_or_else(|| Error::internal(self.signature(), format!("no aspect context for {}", advice.name)))?;
        let model = context.deployment_model();
        let region = if model.is_per_cflow() { self.cflow_region()? } else { None };
        let scope = DeploymentScope::resolve(model, self.context.within_type(), self.this, self.target, region)?;
        let instance = context.aspect_of(&scope)?;
        if let (Some(frame), Some(stack), Some(container)) = (region, self.cflow, context.container()) {
            let container = Arc::clone(container);
            let key = format!("{}/{}", context.system_id(), context.name());
            stack.on_exit(frame, &key, move || {
                container.release(&scope);
            });
        }
        Ok(instance)
    }

    fn cflow_region(&self) -> Result<Option<FrameId>> {
        let Some(stack) = self.cflow else {
            return Ok(None);
        };
        let expression = match self.controller.current_pointcut() {
            Some(pointcut) if pointcut.cflow => Arc::clone(&pointcut.expression),
            _ => return Ok(stack.innermost_frame()),
        };
        let env = MatchEnv::new(self.lookup, self.cflow);
        stack.outermost_frame(|frame| expression.selects_region(frame, &env))
    }

    fn run_plain(&mut self, body: &dyn Advice) -> Result<()> {
        let previous = std::mem::replace(&mut self.in_plain_advice, true);
        let outcome = body.invoke(self);
        self.in_plain_advice = previous;
        outcome.map(drop)
    }

    /// Whether the advice's type filter, if any, admits `type_name`.
    fn accepts(&self, advice: &AdviceRef, type_name: &str) -> Result<bool> {
        match &advice.type_filter {
            Some(filter) => filter.matches_type(type_name, self.lookup),
            None => Ok(true),
        }
    }

    fn record(&mut self, outcome: &Result<Value>) {
        match outcome {
            Ok(value) => self.returned = Some(value.clone()),
            Err(Error::Thrown(throwable)) => self.thrown = Some(throwable.clone()),
            Err(_) => {}
        }
    }
}

impl fmt::Debug for JoinPoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinPoint")
            .field("context", &self.context.signature())
            .field("this", &self.this)
            .field("target", &self.target)
            .field("args", &self.args)
            .field("state", &self.controller.state())
            .finish()
    }
}
