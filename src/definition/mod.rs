//! Aspect and advice definitions.
//!
//! Definitions are produced by an external parser (or built in code, or read
//! through [`document`]) and registered per class loader in a
//! [`DefinitionRegistry`]. A loader sees its own definitions plus those of its
//! ancestors.

pub mod aspect;
pub mod deployment;
pub mod document;
pub mod system;

use std::sync::Arc;

use parking_lot::RwLock;

pub use aspect::{AdviceDefinition, AdviceType, AspectDefinition, IntroductionDefinition, PointcutDefinition};
pub use deployment::{ConfigurationWarning, DeploymentModel};
pub use document::DefinitionDocument;
pub use system::{CompiledAdvice, DefinitionKind, SystemDefinition};

use crate::error::Result;
use crate::loader::{ClassLoader, ScopeMap};

/// Per-loader definition containers.
#[derive(Default)]
pub struct DefinitionRegistry {
    scopes: ScopeMap<RwLock<Vec<Arc<SystemDefinition>>>>,
}

impl DefinitionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register. A definition with the same id in the same loader
    /// is replaced and returned.
    pub fn register(&self, loader: &ClassLoader, definition: SystemDefinition) -> Result<Option<Arc<SystemDefinition>>> {
        definition.validate()?;
        let definition = Arc::new(definition);
        let container = self.scopes.get_or_insert_with(loader, || RwLock::new(Vec::new()));
        let mut systems = container.write();
        let previous = match systems.iter_mut().find(|s| s.id() == definition.id()) {
            Some(existing) => Some(std::mem::replace(existing, Arc::clone(&definition))),
            None => {
                systems.push(Arc::clone(&definition));
                None
            }
        };
        tracing::debug!(
            loader = loader.name(),
            system = definition.id(),
            replaced = previous.is_some(),
            "registered system definition"
        );
        Ok(previous)
    }

    /// Definitions registered directly on `loader`.
    pub fn local(&self, loader: &ClassLoader) -> Vec<Arc<SystemDefinition>> {
        self.scopes.get(loader).map(|c| c.read().clone()).unwrap_or_default()
    }

    /// Definitions visible from `loader`, ancestors first.
    pub fn visible(&self, loader: &ClassLoader) -> Vec<Arc<SystemDefinition>> {
        loader.delegation_order().iter().flat_map(|l| self.local(l)).collect()
    }

    /// Nearest definition named `id`, searching from `loader` up.
    pub fn find(&self, loader: &ClassLoader, id: &str) -> Option<Arc<SystemDefinition>> {
        loader.ancestry().find_map(|l| self.local(l).into_iter().find(|s| s.id() == id))
    }

    pub fn remove(&self, loader: &ClassLoader) -> Vec<Arc<SystemDefinition>> {
        self.scopes.remove(loader).map(|c| c.read().clone()).unwrap_or_default()
    }

    pub fn purge(&self) -> usize {
        self.scopes.purge()
    }
}
