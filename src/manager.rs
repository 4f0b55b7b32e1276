//! Per-system runtime: advice bodies, aspect contexts and controllers.
//!
//! An [`AspectManager`] is created for one system definition in one loader. It
//! turns compiled advice into per-join-point chains, keeps one prototype
//! controller per join point, and drives invocations.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::aspect::{AspectContainer, AspectContext, ObjectId};
use crate::cflow::CflowStack;
use crate::config::WeaverConfig;
use crate::definition::{CompiledAdvice, SystemDefinition};
use crate::error::{Error, Result};
use crate::expression::ExpressionContext;
use crate::joinpoint::{
    Advice, AdviceIndex, AdviceRef, AdviceResolver, ExecutionModel, JoinPoint, JoinPointController, Original,
    Pointcut, Value,
};
use crate::loader::ClassLoader;
use crate::reflect::ClassLookup;

#[derive(Clone)]
struct Prototype {
    controller: JoinPointController,
    defines_cflow: bool,
}

pub struct AspectManager {
    definition: Arc<SystemDefinition>,
    cflow: Arc<CflowStack>,
    lookup: Arc<dyn ClassLookup>,
    advices: Vec<CompiledAdvice>,
    bodies: RwLock<HashMap<AdviceIndex, Arc<dyn Advice>>>,
    contexts: RwLock<Vec<Arc<AspectContext>>>,
    prototypes: Mutex<HashMap<ExpressionContext, Prototype>>,
    model: RwLock<ExecutionModel>,
    cache_controllers: bool,
}

impl fmt::Debug for AspectManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AspectManager").field("advices", &self.advices.len()).finish_non_exhaustive()
    }
}

impl AspectManager {
    pub fn new(
        definition: Arc<SystemDefinition>,
        loader: &ClassLoader,
        cflow: Arc<CflowStack>,
        lookup: Arc<dyn ClassLookup>,
        config: &WeaverConfig,
    ) -> Result<Self> {
        let advices = definition.compiled_advices()?;
        let contexts = definition
            .aspect_definitions()
            .iter()
            .map(|aspect| Arc::new(AspectContext::new(definition.id(), Arc::clone(aspect), loader)))
            .collect();
        tracing::debug!(
            system = definition.id(),
            loader = loader.name(),
            advices = advices.len(),
            "created aspect manager"
        );
        Ok(Self {
            definition,
            cflow,
            lookup,
            advices,
            bodies: RwLock::new(HashMap::new()),
            contexts: RwLock::new(contexts),
            prototypes: Mutex::new(HashMap::new()),
            model: RwLock::new(ExecutionModel::Linear),
            cache_controllers: config.cache_controllers,
        })
    }

    pub fn definition(&self) -> &Arc<SystemDefinition> {
        &self.definition
    }

    pub fn cflow_stack(&self) -> &Arc<CflowStack> {
        &self.cflow
    }

    pub fn compiled_advices(&self) -> &[CompiledAdvice] {
        &self.advices
    }

    /// Attach the body executed for every binding of `aspect.advice`.
    pub fn register_advice(&self, aspect: &str, advice: &str, body: impl Advice + 'static) -> Result<AdviceIndex> {
        let index = self
            .advices
            .iter()
            .find(|a| a.definition.aspect_name == aspect && a.definition.name == advice)
            .map(|a| a.index)
            .ok_or_else(|| Error::definition(format!("{aspect}.{advice}"), "no such advice in system"))?;
        self.bodies.write().insert(index, Arc::new(body));
        Ok(index)
    }

    pub fn register_container(&self, aspect: &str, container: Arc<dyn AspectContainer>) -> Result<()> {
        let mut contexts = self.contexts.write();
        let slot = contexts
            .iter_mut()
            .find(|c| c.name() == aspect)
            .ok_or_else(|| Error::definition(aspect, "no such aspect in system"))?;
        *slot = Arc::new(slot.as_ref().clone().with_container(container));
        Ok(())
    }

    pub fn aspect_context(&self, aspect: &str) -> Option<Arc<AspectContext>> {
        self.contexts.read().iter().find(|c| c.name() == aspect).cloned()
    }

    /// Model applied to controllers built from now on.
    pub fn set_execution_model(&self, model: ExecutionModel) {
        *self.model.write() = model;
        self.invalidate_controllers();
    }

    /// Matched pointcuts for `ctx`, grouped by expression, redundancies cleared.
    fn build_controller(&self, ctx: &ExpressionContext) -> Result<JoinPointController> {
        let lookup = Some(self.lookup.as_ref());
        let mut pointcuts: Vec<Pointcut> = Vec::new();
        for advice in &self.advices {
            if !advice.expression.may_match(ctx, lookup)?.is_possible() {
                continue;
            }
            let entry = AdviceRef::from(advice);
            match pointcuts.iter_mut().find(|p| p.source() == advice.expression.source()) {
                Some(pointcut) => pointcut.advices.push(entry),
                None => pointcuts.push(Pointcut::new(Arc::clone(&advice.expression)).with_advice(entry)),
            }
        }
        let mut controller = JoinPointController::new(ctx.signature(), pointcuts).with_model(self.model.read().clone());
        controller.clear_all_redundancies()?;
        Ok(controller)
    }

    fn prototype(&self, ctx: &ExpressionContext) -> Result<Prototype> {
        if self.cache_controllers {
            if let Some(prototype) = self.prototypes.lock().get(ctx) {
                return Ok(prototype.clone());
            }
        }
        let prototype = Prototype { controller: self.build_controller(ctx)?, defines_cflow: self.defines_cflow(ctx)? };
        if self.cache_controllers {
            self.prototypes.lock().insert(ctx.clone(), prototype.clone());
        }
        Ok(prototype)
    }

    fn defines_cflow(&self, ctx: &ExpressionContext) -> Result<bool> {
        for advice in &self.advices {
            if advice.expression.defines_cflow_for(ctx, Some(self.lookup.as_ref()))? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Fresh controller for one invocation at `ctx`.
    pub fn controller_for(&self, ctx: &ExpressionContext) -> Result<JoinPointController> {
        Ok(self.prototype(ctx)?.controller.deep_copy())
    }

    /// Ordered advice a weaver would embed at `ctx`.
    pub fn weave_plan(&self, ctx: &ExpressionContext) -> Result<Vec<AdviceIndex>> {
        let controller = self.prototype(ctx)?.controller;
        Ok(controller.pointcuts().iter().flat_map(|p| p.advices.iter().map(|a| a.index)).collect())
    }

    /// Whether any advice can apply at `ctx`.
    pub fn is_advised(&self, ctx: &ExpressionContext) -> Result<bool> {
        let lookup = Some(self.lookup.as_ref());
        for advice in &self.advices {
            if advice.expression.may_match(ctx, lookup)?.is_possible() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether `ctx` opens a control flow region some cflow pointcut watches.
    pub fn is_cflow_defining(&self, ctx: &ExpressionContext) -> Result<bool> {
        Ok(self.prototype(ctx)?.defines_cflow)
    }

    /// Run the join point at `ctx` through its advice chain.
    pub fn invoke(
        &self,
        ctx: &ExpressionContext,
        this: Option<ObjectId>,
        target: Option<ObjectId>,
        args: Vec<Value>,
        original: &Original<'_>,
    ) -> Result<Value> {
        let Prototype { controller, defines_cflow } = self.prototype(ctx)?;
        let _frame = defines_cflow.then(|| self.cflow.guard(ctx.clone()));
        let mut join_point = JoinPoint::new(ctx, controller, self, original)
            .with_this(this)
            .with_target(target)
            .with_args(args)
            .with_cflow(&self.cflow)
            .with_lookup(self.lookup.as_ref());
        join_point.proceed()
    }

    /// Drop cached controllers, e.g. after class metadata changed.
    pub fn invalidate_controllers(&self) {
        let dropped = {
            let mut prototypes = self.prototypes.lock();
            let count = prototypes.len();
            prototypes.clear();
            count
        };
        if dropped > 0 {
            tracing::debug!(system = self.definition.id(), dropped, "invalidated cached controllers");
        }
    }
}

impl AdviceResolver for AspectManager {
    fn resolve(&self, index: AdviceIndex) -> Option<Arc<dyn Advice>> {
        self.bodies.read().get(&index).cloned()
    }

    fn aspect_context(&self, index: AdviceIndex) -> Option<Arc<AspectContext>> {
        self.contexts.read().get(index.aspect).cloned()
    }
}
