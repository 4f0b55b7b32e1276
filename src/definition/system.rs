use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::aspect::{AdviceDefinition, AspectDefinition};
use super::deployment::{ConfigurationWarning, DeploymentModel};
use crate::error::{Error, Result};
use crate::expression::{Expression, ExpressionNamespace};
use crate::joinpoint::chain::AdviceIndex;
use crate::pattern::{Abbreviations, ClassPattern};

/// Where a system's definitions came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DefinitionKind {
    /// Declarative definition file; aspects must be named explicitly.
    #[default]
    Xml,
    /// Source annotations; an aspect is named after its class by default.
    Attribute,
}

/// An advice binding with its expression compiled and its chain index assigned.
#[derive(Debug, Clone)]
pub struct CompiledAdvice {
    pub index: AdviceIndex,
    pub definition: AdviceDefinition,
    pub expression: Arc<Expression>,
    pub type_filter: Option<Arc<ClassPattern>>,
}

/// All aspects, advices and system-wide pointcuts of one system id.
#[derive(Debug)]
pub struct SystemDefinition {
    id: String,
    kind: DefinitionKind,
    aspects: Vec<Arc<AspectDefinition>>,
    pointcuts: BTreeMap<String, String>,
    abbreviations: Abbreviations,
    warnings: Mutex<Vec<ConfigurationWarning>>,
}

impl SystemDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: DefinitionKind::default(),
            aspects: Vec::new(),
            pointcuts: BTreeMap::new(),
            abbreviations: Abbreviations::default(),
            warnings: Mutex::new(Vec::new()),
        }
    }

    pub fn with_kind(mut self, kind: DefinitionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_abbreviations(mut self, abbreviations: Abbreviations) -> Self {
        self.abbreviations = abbreviations;
        self
    }

    pub fn with_aspect(mut self, aspect: AspectDefinition) -> Self {
        self.add_aspect(aspect);
        self
    }

    pub fn with_pointcut(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
        self.pointcuts.insert(name.into(), expression.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> DefinitionKind {
        self.kind
    }

    pub fn abbreviations(&self) -> &Abbreviations {
        &self.abbreviations
    }

    /// Layer `base` underneath this system's own abbreviations.
    pub(crate) fn inherit_abbreviations(&mut self, base: &Abbreviations) {
        self.abbreviations = base.merged(&self.abbreviations);
    }

    /// Register an aspect. An aspect with the same class name is replaced in place.
    pub fn add_aspect(&mut self, aspect: AspectDefinition) {
        let aspect = Arc::new(aspect);
        match self.aspects.iter_mut().find(|a| a.class_name == aspect.class_name) {
            Some(existing) => {
                tracing::debug!(system = %self.id, aspect = %aspect.name, "replacing aspect definition");
                *existing = aspect;
            }
            None => self.aspects.push(aspect),
        }
    }

    pub fn add_pointcut(&mut self, name: impl Into<String>, expression: impl Into<String>) {
        self.pointcuts.insert(name.into(), expression.into());
    }

    /// Lookup by aspect name, then by class name.
    pub fn get_aspect_definition(&self, name: &str) -> Option<Arc<AspectDefinition>> {
        self.aspects
            .iter()
            .find(|a| a.name == name)
            .or_else(|| self.aspects.iter().find(|a| a.class_name == name))
            .cloned()
    }

    pub fn aspect_definitions(&self) -> &[Arc<AspectDefinition>] {
        &self.aspects
    }

    /// Every advice binding, in aspect order then declaration order.
    pub fn get_advice_definitions(&self) -> Vec<&AdviceDefinition> {
        self.aspects.iter().flat_map(|a| a.advices.iter()).collect()
    }

    /// Resolve a deployment model name, recording a warning for unknown names.
    pub fn deployment_model_for(&self, name: Option<&str>) -> DeploymentModel {
        let (model, warning) = DeploymentModel::for_name(name);
        if let Some(warning) = warning {
            self.warnings.lock().push(warning);
        }
        model
    }

    pub fn warnings(&self) -> Vec<ConfigurationWarning> {
        self.warnings.lock().clone()
    }

    /// System pointcuts plus every aspect pointcut under `Aspect.name`.
    fn system_namespace(&self) -> Result<ExpressionNamespace> {
        let mut namespace = ExpressionNamespace::new(&self.id).with_abbreviations(self.abbreviations.clone());
        for (name, expression) in &self.pointcuts {
            namespace.define(name, expression)?;
        }
        for aspect in &self.aspects {
            for pointcut in &aspect.pointcuts {
                namespace.define(&format!("{}.{}", aspect.name, pointcut.name), &pointcut.expression)?;
            }
        }
        Ok(namespace)
    }

    /// Namespace an aspect's expressions are compiled in.
    pub fn namespace_for(&self, aspect: &AspectDefinition) -> Result<ExpressionNamespace> {
        let mut namespace = ExpressionNamespace::new(&aspect.name).with_parent(Arc::new(self.system_namespace()?));
        for pointcut in &aspect.pointcuts {
            namespace.define(&pointcut.name, &pointcut.expression)?;
        }
        Ok(namespace)
    }

    /// Compile every expression; the first definition error wins.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::definition("<system>", "system id must not be empty"));
        }
        for aspect in &self.aspects {
            if aspect.name.trim().is_empty() || aspect.class_name.trim().is_empty() {
                return Err(Error::definition(&aspect.class_name, "aspect needs a name and a class"));
            }
            let namespace = self.namespace_for(aspect)?;
            for pointcut in &aspect.pointcuts {
                namespace.compile(&pointcut.expression)?;
            }
            for introduction in &aspect.introductions {
                Expression::compile_in(&introduction.expression, &namespace)?;
            }
        }
        self.compiled_advices().map(drop)
    }

    /// Compile every advice binding. Bindings sharing an advice name within
    /// one aspect share an [`AdviceIndex`].
    pub fn compiled_advices(&self) -> Result<Vec<CompiledAdvice>> {
        let mut out = Vec::new();
        for (aspect_index, aspect) in self.aspects.iter().enumerate() {
            let namespace = self.namespace_for(aspect)?;
            let mut names: Vec<&str> = Vec::new();
            for advice in &aspect.advices {
                let advice_index = match names.iter().position(|n| *n == advice.name) {
                    Some(i) => i,
                    None => {
                        names.push(&advice.name);
                        names.len() - 1
                    }
                };
                let expression = Expression::compile_in(&advice.expression, &namespace)
                    .map_err(|err| Error::definition(advice.qualified_name(), err.to_string()))?;
                let type_filter = advice
                    .type_filter
                    .as_deref()
                    .map(|f| ClassPattern::compile_with(f, &self.abbreviations).map(Arc::new))
                    .transpose()?;
                out.push(CompiledAdvice {
                    index: AdviceIndex::new(aspect_index, advice_index),
                    definition: advice.clone(),
                    expression: Arc::new(expression),
                    type_filter,
                });
            }
        }
        Ok(out)
    }
}
