//! The long-lived owner of every loader-scoped structure.
//!
//! Nothing in the crate is process-global: repositories, cflow stacks,
//! definitions and managers all hang off an [`AspectSystem`], keyed by class
//! loader and dropped with it.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::cflow::CflowStack;
use crate::config::WeaverConfig;
use crate::definition::{DefinitionDocument, DefinitionRegistry, SystemDefinition};
use crate::error::{Error, Result};
use crate::loader::{ClassLoader, ScopeMap, WeakLoader};
use crate::manager::AspectManager;
use crate::reflect::repository::{collect_fields, collect_methods};
use crate::reflect::{ClassId, ClassInfo, ClassInfoRepository, ClassLookup, ClassSource, FieldInfo, MethodInfo};

#[derive(Default)]
pub struct AspectSystem {
    config: WeaverConfig,
    repositories: ScopeMap<ClassInfoRepository>,
    cflow: ScopeMap<CflowStack>,
    definitions: DefinitionRegistry,
    managers: ScopeMap<RwLock<HashMap<String, Arc<AspectManager>>>>,
}

impl AspectSystem {
    pub fn new(config: WeaverConfig) -> Self {
        Self { config, ..Default::default() }
    }

    pub fn config(&self) -> &WeaverConfig {
        &self.config
    }

    /// The repository holding classes described by `loader` itself.
    pub fn repository(&self, loader: &ClassLoader) -> Arc<ClassInfoRepository> {
        self.repositories.get_or_insert_with(loader, ClassInfoRepository::new)
    }

    /// Register metadata for a class defined by `loader`.
    pub fn define_class(&self, loader: &ClassLoader, info: ClassInfo) -> ClassId {
        let id = self.repository(loader).insert(info);
        self.invalidate_managers(loader);
        id
    }

    /// Resolve `name` as `loader` sees it. A class already known to an ancestor
    /// is never described again.
    pub fn class_info(&self, loader: &ClassLoader, name: &str) -> Option<Arc<ClassInfo>> {
        self.lookup_for(loader).lookup(name)
    }

    pub fn lookup_for(&self, loader: &ClassLoader) -> Arc<LoaderLookup> {
        let chain = loader
            .delegation_order()
            .into_iter()
            .map(|l| LookupScope { loader: l.downgrade(), repository: self.repository(&l), source: l.source().cloned() })
            .collect();
        Arc::new(LoaderLookup { chain })
    }

    /// The cflow stack of `loader`, created on first use.
    pub fn cflow_stack(&self, loader: &ClassLoader) -> Arc<CflowStack> {
        self.cflow.get_or_insert_with(loader, CflowStack::new)
    }

    /// Validate and register `definition` for `loader`, replacing a previous
    /// definition with the same id.
    pub fn register_definition(&self, loader: &ClassLoader, mut definition: SystemDefinition) -> Result<Arc<SystemDefinition>> {
        definition.inherit_abbreviations(&self.config.abbreviations);
        let id = definition.id().to_string();
        self.definitions.register(loader, definition)?;
        if let Some(managers) = self.managers.get(loader) {
            managers.write().remove(&id);
        }
        self.definitions
            .find(loader, &id)
            .ok_or_else(|| Error::internal(id.as_str(), "definition vanished after registration"))
    }

    /// Register every system of a definition document.
    pub fn load_document(&self, loader: &ClassLoader, document: DefinitionDocument) -> Result<Vec<Arc<SystemDefinition>>> {
        document
            .into_definitions()?
            .into_iter()
            .map(|definition| self.register_definition(loader, definition))
            .collect()
    }

    /// Read a JSON definition document from `path` and register its systems.
    pub fn load_definition_file(&self, loader: &ClassLoader, path: &Path) -> Result<Vec<Arc<SystemDefinition>>> {
        let text = fs::read_to_string(path).map_err(|source| Error::Io { path: path.to_path_buf(), source: Arc::new(source) })?;
        let document = DefinitionDocument::from_json(&text).map_err(|err| match err {
            Error::Definition { reason, .. } => Error::definition(path.display().to_string(), reason),
            other => other,
        })?;
        let systems = self.load_document(loader, document)?;
        tracing::debug!(path = %path.display(), systems = systems.len(), loader = loader.name(), "loaded definition file");
        Ok(systems)
    }

    /// Load the definition file named by the configuration, if any.
    pub fn load_configured_definitions(&self, loader: &ClassLoader) -> Result<Vec<Arc<SystemDefinition>>> {
        match self.config.definition_path.clone() {
            Some(path) => self.load_definition_file(loader, &path),
            None => Ok(Vec::new()),
        }
    }

    /// Definitions visible from `loader`, ancestors first.
    pub fn definitions(&self, loader: &ClassLoader) -> Vec<Arc<SystemDefinition>> {
        self.definitions.visible(loader)
    }

    pub fn definition(&self, loader: &ClassLoader, id: &str) -> Option<Arc<SystemDefinition>> {
        self.definitions.find(loader, id)
    }

    /// Manager for system `id` as seen from `loader`, created on first use.
    pub fn aspect_manager(&self, loader: &ClassLoader, id: &str) -> Result<Arc<AspectManager>> {
        let managers = self.managers.get_or_insert_with(loader, || RwLock::new(HashMap::new()));
        if let Some(manager) = managers.read().get(id) {
            return Ok(Arc::clone(manager));
        }
        let definition = self
            .definitions
            .find(loader, id)
            .ok_or_else(|| Error::definition(id, format!("no system definition visible from loader {}", loader.name())))?;
        let mut managers = managers.write();
        if let Some(manager) = managers.get(id) {
            return Ok(Arc::clone(manager));
        }
        let lookup: Arc<dyn ClassLookup> = self.lookup_for(loader);
        let manager = Arc::new(AspectManager::new(definition, loader, self.cflow_stack(loader), lookup, &self.config)?);
        managers.insert(id.to_string(), Arc::clone(&manager));
        Ok(manager)
    }

    /// Managers of `loader` and of every loader delegating to it see the new
    /// class, so all of them drop their cached plans.
    fn invalidate_managers(&self, loader: &ClassLoader) {
        for (scope, managers) in self.managers.live() {
            if !scope.ancestry().any(|l| l == loader) {
                continue;
            }
            for manager in managers.read().values() {
                manager.invalidate_controllers();
            }
        }
    }

    /// Forget everything scoped to `loader`.
    pub fn unload(&self, loader: &ClassLoader) {
        self.repositories.remove(loader);
        self.cflow.remove(loader);
        self.definitions.remove(loader);
        self.managers.remove(loader);
        tracing::debug!(loader = loader.name(), "unloaded class loader scope");
    }

    /// Drop state of discarded loaders. Returns the number of dropped entries.
    pub fn purge(&self) -> usize {
        let dropped = self.repositories.purge() + self.cflow.purge() + self.definitions.purge() + self.managers.purge();
        if dropped > 0 {
            tracing::debug!(dropped, "purged discarded class loader scopes");
        }
        dropped
    }

    /// Loaders with live state in this system.
    pub fn scope_count(&self) -> usize {
        self.repositories.len()
    }
}

struct LookupScope {
    loader: WeakLoader,
    repository: Arc<ClassInfoRepository>,
    source: Option<Arc<dyn ClassSource>>,
}

/// [`ClassLookup`] through a loader and its ancestors, root first.
///
/// Known classes are found in the nearest-to-root repository that holds them.
/// Unknown classes are described by the first loader whose source knows them
/// and cached in that loader's repository.
pub struct LoaderLookup {
    chain: Vec<LookupScope>,
}

impl LoaderLookup {
    fn find(&self, name: &str) -> Option<(&ClassInfoRepository, ClassId)> {
        self.chain
            .iter()
            .find_map(|scope| scope.repository.id_of(name).map(|id| (scope.repository.as_ref(), id)))
    }

    /// Whether the loader this lookup was built for is still alive.
    pub fn is_alive(&self) -> bool {
        self.chain.last().map_or(false, |scope| scope.loader.is_alive())
    }
}

impl ClassLookup for LoaderLookup {
    fn lookup(&self, name: &str) -> Option<Arc<ClassInfo>> {
        if let Some(info) = self.chain.iter().find_map(|scope| scope.repository.get(name)) {
            return Some(info);
        }
        for scope in &self.chain {
            let Some(source) = &scope.source else { continue };
            if let Some(info) = source.describe(name) {
                tracing::trace!(class = name, "described class on first lookup");
                let id = scope.repository.insert(info);
                return scope.repository.by_id(id);
            }
        }
        None
    }

    fn all_methods(&self, name: &str) -> Vec<Arc<MethodInfo>> {
        if self.lookup(name).is_none() {
            return Vec::new();
        }
        match self.find(name) {
            Some((repository, id)) => repository.method_table(id, || collect_methods(self, name)).to_vec(),
            None => collect_methods(self, name),
        }
    }

    fn all_fields(&self, name: &str) -> Vec<Arc<FieldInfo>> {
        if self.lookup(name).is_none() {
            return Vec::new();
        }
        match self.find(name) {
            Some((repository, id)) => repository.field_table(id, || collect_fields(self, name)).to_vec(),
            None => collect_fields(self, name),
        }
    }
}
