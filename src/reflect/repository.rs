//! Per-loader metadata store and hierarchy traversal.
//!
//! A repository is an arena: each described class gets a [`ClassId`] and lives
//! in a `Vec`. Supertypes are stored by name and resolved through
//! [`ClassLookup`], so a repository never forces resolution of the whole graph.
//! Traversals are iterative and keep a visited set, so interface diamonds and
//! malformed cyclic hierarchies terminate.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;

use super::{ClassInfo, FieldInfo, MethodInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Resolves class names to descriptors and walks the type graph.
pub trait ClassLookup: Send + Sync {
    fn lookup(&self, name: &str) -> Option<Arc<ClassInfo>>;

    /// Every transitive supertype of `name`, nearest first, without duplicates.
    fn supertypes(&self, name: &str) -> Vec<String> {
        walk_supertypes(self, name)
    }

    fn is_subtype_of(&self, name: &str, ancestor: &str) -> bool {
        name == ancestor || self.supertypes(name).iter().any(|s| s == ancestor)
    }

    /// Declared and inherited methods; an override hides the inherited method.
    fn all_methods(&self, name: &str) -> Vec<Arc<MethodInfo>> {
        collect_methods(self, name)
    }

    /// Declared and inherited fields; a redeclared field hides the inherited one.
    fn all_fields(&self, name: &str) -> Vec<Arc<FieldInfo>> {
        collect_fields(self, name)
    }
}

pub(crate) fn walk_supertypes<L: ClassLookup + ?Sized>(lookup: &L, name: &str) -> Vec<String> {
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(name.to_string());
    let mut queue: VecDeque<String> = VecDeque::new();
    let mut out = Vec::new();
    if let Some(info) = lookup.lookup(name) {
        queue.extend(info.direct_supertypes().map(str::to_string));
    }
    while let Some(next) = queue.pop_front() {
        if !visited.insert(next.clone()) {
            continue;
        }
        if let Some(info) = lookup.lookup(&next) {
            queue.extend(info.direct_supertypes().filter(|s| !visited.contains(*s)).map(str::to_string));
        }
        out.push(next);
    }
    out
}

fn hierarchy_order<L: ClassLookup + ?Sized>(lookup: &L, name: &str) -> Vec<Arc<ClassInfo>> {
    std::iter::once(name.to_string())
        .chain(walk_supertypes(lookup, name))
        .filter_map(|n| lookup.lookup(&n))
        .collect()
}

pub(crate) fn collect_methods<L: ClassLookup + ?Sized>(lookup: &L, name: &str) -> Vec<Arc<MethodInfo>> {
    let mut out: Vec<Arc<MethodInfo>> = Vec::new();
    for class in hierarchy_order(lookup, name) {
        for method in &class.methods {
            if !out.iter().any(|seen| seen.overrides(method)) {
                out.push(Arc::clone(method));
            }
        }
    }
    out
}

pub(crate) fn collect_fields<L: ClassLookup + ?Sized>(lookup: &L, name: &str) -> Vec<Arc<FieldInfo>> {
    let mut out: Vec<Arc<FieldInfo>> = Vec::new();
    for class in hierarchy_order(lookup, name) {
        for field in &class.fields {
            if !out.iter().any(|seen| seen.name == field.name) {
                out.push(Arc::clone(field));
            }
        }
    }
    out
}

#[derive(Default)]
struct Arena {
    classes: Vec<Option<Arc<ClassInfo>>>,
    by_name: HashMap<String, ClassId>,
    method_tables: HashMap<ClassId, Arc<[Arc<MethodInfo>]>>,
    field_tables: HashMap<ClassId, Arc<[Arc<FieldInfo>]>>,
}

/// Metadata described for one class loader.
#[derive(Default)]
pub struct ClassInfoRepository {
    arena: RwLock<Arena>,
}

impl ClassInfoRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a descriptor. Redescribing a known name replaces it in place and
    /// drops every memoized table.
    pub fn insert(&self, info: ClassInfo) -> ClassId {
        let mut arena = self.arena.write();
        arena.method_tables.clear();
        arena.field_tables.clear();
        let info = Arc::new(info);
        if let Some(&id) = arena.by_name.get(&info.name) {
            tracing::debug!(class = %info.name, "redefining class metadata");
            arena.classes[id.index()] = Some(info);
            return id;
        }
        let id = ClassId(arena.classes.len() as u32);
        arena.by_name.insert(info.name.clone(), id);
        arena.classes.push(Some(info));
        id
    }

    pub fn get(&self, name: &str) -> Option<Arc<ClassInfo>> {
        let arena = self.arena.read();
        let id = arena.by_name.get(name)?;
        arena.classes[id.index()].clone()
    }

    pub fn by_id(&self, id: ClassId) -> Option<Arc<ClassInfo>> {
        self.arena.read().classes.get(id.index()).cloned().flatten()
    }

    pub fn id_of(&self, name: &str) -> Option<ClassId> {
        self.arena.read().by_name.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.arena.read().by_name.contains_key(name)
    }

    /// Forget a class. Its id is never handed out again.
    pub fn remove(&self, name: &str) -> Option<Arc<ClassInfo>> {
        let mut arena = self.arena.write();
        let id = arena.by_name.remove(name)?;
        arena.method_tables.clear();
        arena.field_tables.clear();
        arena.classes[id.index()].take()
    }

    pub fn len(&self) -> usize {
        self.arena.read().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn class_names(&self) -> Vec<String> {
        let arena = self.arena.read();
        let mut names: Vec<(ClassId, String)> = arena.by_name.iter().map(|(n, id)| (*id, n.clone())).collect();
        names.sort();
        names.into_iter().map(|(_, n)| n).collect()
    }

    /// Memoized method table for `id`, computed with `compute` on first use.
    pub(crate) fn method_table(&self, id: ClassId, compute: impl FnOnce() -> Vec<Arc<MethodInfo>>) -> Arc<[Arc<MethodInfo>]> {
        if let Some(table) = self.arena.read().method_tables.get(&id) {
            return Arc::clone(table);
        }
        let table: Arc<[Arc<MethodInfo>]> = compute().into();
        self.arena.write().method_tables.insert(id, Arc::clone(&table));
        table
    }

    pub(crate) fn field_table(&self, id: ClassId, compute: impl FnOnce() -> Vec<Arc<FieldInfo>>) -> Arc<[Arc<FieldInfo>]> {
        if let Some(table) = self.arena.read().field_tables.get(&id) {
            return Arc::clone(table);
        }
        let table: Arc<[Arc<FieldInfo>]> = compute().into();
        self.arena.write().field_tables.insert(id, Arc::clone(&table));
        table
    }
}

impl ClassLookup for ClassInfoRepository {
    fn lookup(&self, name: &str) -> Option<Arc<ClassInfo>> {
        self.get(name)
    }

    fn all_methods(&self, name: &str) -> Vec<Arc<MethodInfo>> {
        match self.id_of(name) {
            Some(id) => self.method_table(id, || collect_methods(self, name)).to_vec(),
            None => Vec::new(),
        }
    }

    fn all_fields(&self, name: &str) -> Vec<Arc<FieldInfo>> {
        match self.id_of(name) {
            Some(id) => self.field_table(id, || collect_fields(self, name)).to_vec(),
            None => Vec::new(),
        }
    }
}
