//! Runtime aspect bindings.

pub mod container;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use container::{AspectContainer, AspectInstance, DeploymentScope, ObjectId, PrototypeContainer};

use crate::definition::{AspectDefinition, DeploymentModel};
use crate::error::{Error, Result};
use crate::loader::{ClassLoader, WeakLoader};
use crate::system::AspectSystem;

/// An aspect definition bound to a loader and, once registered, a container.
#[derive(Clone)]
pub struct AspectContext {
    system_id: String,
    definition: Arc<AspectDefinition>,
    container: Option<Arc<dyn AspectContainer>>,
    loader: WeakLoader,
}

impl AspectContext {
    pub fn new(system_id: impl Into<String>, definition: Arc<AspectDefinition>, loader: &ClassLoader) -> Self {
        Self { system_id: system_id.into(), definition, container: None, loader: loader.downgrade() }
    }

    pub fn with_container(mut self, container: Arc<dyn AspectContainer>) -> Self {
        self.container = Some(container);
        self
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn system_id(&self) -> &str {
        &self.system_id
    }

    pub fn definition(&self) -> &Arc<AspectDefinition> {
        &self.definition
    }

    pub fn deployment_model(&self) -> DeploymentModel {
        self.definition.deployment_model
    }

    pub fn container(&self) -> Option<&Arc<dyn AspectContainer>> {
        self.container.as_ref()
    }

    /// The owning loader, if it is still alive.
    pub fn loader(&self) -> Option<ClassLoader> {
        self.loader.upgrade()
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.definition.parameter(name)
    }

    pub fn aspect_of(&self, scope: &DeploymentScope) -> Result<AspectInstance> {
        match &self.container {
            Some(container) => container.aspect_of(scope),
            None => Err(Error::definition(self.name(), "no aspect container registered")),
        }
    }

    pub fn snapshot(&self) -> AspectContextSnapshot {
        AspectContextSnapshot {
            system_id: self.system_id.clone(),
            aspect_name: self.definition.name.clone(),
            class_name: self.definition.class_name.clone(),
            deployment_model: self.definition.deployment_model,
            parameters: self.definition.parameters.clone(),
        }
    }

    /// Rebuild a live context from a snapshot: the definition and container
    /// are looked up again in `system` for `loader`.
    pub fn rehydrate(snapshot: &AspectContextSnapshot, system: &AspectSystem, loader: &ClassLoader) -> Result<Arc<AspectContext>> {
        let manager = system.aspect_manager(loader, &snapshot.system_id)?;
        let context = manager
            .aspect_context(&snapshot.aspect_name)
            .ok_or_else(|| Error::definition(&snapshot.aspect_name, "aspect no longer defined"))?;
        if context.definition.class_name != snapshot.class_name {
            return Err(Error::definition(
                &snapshot.aspect_name,
                format!("aspect class changed from {} to {}", snapshot.class_name, context.definition.class_name),
            ));
        }
        if context.deployment_model() != snapshot.deployment_model {
            tracing::warn!(
                aspect = %snapshot.aspect_name,
                was = %snapshot.deployment_model,
                now = %context.deployment_model(),
                "deployment model changed since snapshot"
            );
        }
        Ok(context)
    }
}

impl fmt::Debug for AspectContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AspectContext")
            .field("system_id", &self.system_id)
            .field("aspect", &self.definition.name)
            .field("deployment_model", &self.definition.deployment_model)
            .field("has_container", &self.container.is_some())
            .field("loader", &self.loader)
            .finish()
    }
}

/// Serializable form of an [`AspectContext`]; the container and loader handle
/// are transient and restored by [`AspectContext::rehydrate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AspectContextSnapshot {
    pub system_id: String,
    pub aspect_name: String,
    pub class_name: String,
    pub deployment_model: DeploymentModel,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}
