use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::cflow::FrameId;
use crate::definition::DeploymentModel;
use crate::error::{Error, Result};

/// Identity of a target or `this` object at a join point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

/// Key an aspect instance is cached under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DeploymentScope {
    Jvm,
    Class(String),
    Instance(ObjectId),
    Thread(ThreadId),
    /// Control flow region, identified by the frame that opened it.
    Cflow(FrameId),
}

impl DeploymentScope {
    /// Scope of a join point under `model`.
    pub fn resolve(
        model: DeploymentModel,
        class_name: &str,
        this: Option<ObjectId>,
        target: Option<ObjectId>,
        region: Option<FrameId>,
    ) -> Result<Self> {
        let scope = match model {
            DeploymentModel::PerJvm => DeploymentScope::Jvm,
            DeploymentModel::PerClass => DeploymentScope::Class(class_name.to_string()),
            DeploymentModel::PerInstance | DeploymentModel::PerThis => {
                DeploymentScope::Instance(this.ok_or(Error::InvalidArgument("per-instance aspect needs a 'this' object"))?)
            }
            DeploymentModel::PerTarget => {
                DeploymentScope::Instance(target.ok_or(Error::InvalidArgument("per-target aspect needs a target object"))?)
            }
            DeploymentModel::PerThread => DeploymentScope::Thread(thread::current().id()),
            DeploymentModel::PerCflow | DeploymentModel::PerCflowBelow => {
                DeploymentScope::Cflow(region.ok_or(Error::InvalidArgument("per-cflow aspect outside its control flow"))?)
            }
        };
        Ok(scope)
    }
}

pub type AspectInstance = Arc<dyn Any + Send + Sync>;

/// Produces and caches aspect instances per deployment scope.
pub trait AspectContainer: Send + Sync {
    fn aspect_of(&self, scope: &DeploymentScope) -> Result<AspectInstance>;

    /// Forget the instance bound to `scope`. Returns whether one existed.
    fn release(&self, _scope: &DeploymentScope) -> bool {
        false
    }
}

type Factory = dyn Fn(&DeploymentScope) -> AspectInstance + Send + Sync;

/// Container that builds instances from a factory, once per scope.
pub struct PrototypeContainer {
    factory: Box<Factory>,
    instances: Mutex<HashMap<DeploymentScope, AspectInstance>>,
    created: AtomicUsize,
}

impl PrototypeContainer {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&DeploymentScope) -> AspectInstance + Send + Sync + 'static,
    {
        Self { factory: Box::new(factory), instances: Mutex::new(HashMap::new()), created: AtomicUsize::new(0) }
    }

    /// Number of instances the factory has built.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.instances.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AspectContainer for PrototypeContainer {
    fn aspect_of(&self, scope: &DeploymentScope) -> Result<AspectInstance> {
        // The factory runs under the lock: racing threads see one instance.
        let mut instances = self.instances.lock();
        if let Some(instance) = instances.get(scope) {
            return Ok(Arc::clone(instance));
        }
        let instance = (self.factory)(scope);
        self.created.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(?scope, "created aspect instance");
        instances.insert(scope.clone(), Arc::clone(&instance));
        Ok(instance)
    }

    fn release(&self, scope: &DeploymentScope) -> bool {
        self.instances.lock().remove(scope).is_some()
    }
}

impl fmt::Debug for PrototypeContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrototypeContainer").field("instances", &self.len()).field("created", &self.created()).finish()
    }
}
