use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::definition::{AdviceType, CompiledAdvice};
use crate::expression::Expression;
use crate::pattern::ClassPattern;

/// Position of an advice body: aspect within its system, advice within its aspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AdviceIndex {
    pub aspect: usize,
    pub advice: usize,
}

impl AdviceIndex {
    pub const fn new(aspect: usize, advice: usize) -> Self {
        Self { aspect, advice }
    }
}

impl fmt::Display for AdviceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.aspect, self.advice)
    }
}

/// An advice as it sits in a chain.
#[derive(Debug, Clone)]
pub struct AdviceRef {
    /// `aspect.advice`; duplicates are detected by this name.
    pub name: String,
    pub index: AdviceIndex,
    pub kind: AdviceType,
    pub type_filter: Option<Arc<ClassPattern>>,
}

impl AdviceRef {
    pub fn new(name: impl Into<String>, index: AdviceIndex, kind: AdviceType) -> Self {
        Self { name: name.into(), index, kind, type_filter: None }
    }

    pub fn with_type_filter(mut self, filter: Arc<ClassPattern>) -> Self {
        self.type_filter = Some(filter);
        self
    }
}

impl From<&CompiledAdvice> for AdviceRef {
    fn from(advice: &CompiledAdvice) -> Self {
        Self {
            name: advice.definition.qualified_name(),
            index: advice.index,
            kind: advice.definition.kind,
            type_filter: advice.type_filter.clone(),
        }
    }
}

/// A matched pointcut with its advices in declaration order.
#[derive(Debug, Clone)]
pub struct Pointcut {
    pub expression: Arc<Expression>,
    pub advices: Vec<AdviceRef>,
    /// Whether the expression has to consult the cflow stack at runtime.
    pub cflow: bool,
}

impl Pointcut {
    pub fn new(expression: Arc<Expression>) -> Self {
        let cflow = expression.has_cflow();
        Self { expression, advices: Vec::new(), cflow }
    }

    pub fn with_advice(mut self, advice: AdviceRef) -> Self {
        self.advices.push(advice);
        self
    }

    pub fn source(&self) -> &str {
        self.expression.source()
    }

    pub fn is_empty(&self) -> bool {
        self.advices.is_empty()
    }
}
