//! Class-loader scope identity.
//!
//! Metadata repositories, cflow stacks, definition containers and aspect managers
//! are all scoped to a class loader. A [`ClassLoader`] here is a cheap shared
//! handle with a parent link and an optional metadata backend; [`ScopeMap`] is the
//! map that associates per-loader state without keeping the loader alive.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::reflect::ClassSource;

static NEXT_LOADER_KEY: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a loader, never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoaderKey(u64);

impl LoaderKey {
    pub fn get(self) -> u64 {
        self.0
    }
}

struct LoaderData {
    key: LoaderKey,
    name: String,
    parent: Option<ClassLoader>,
    source: Option<Arc<dyn ClassSource>>,
}

/// Shared handle to a class-loader scope.
#[derive(Clone)]
pub struct ClassLoader {
    inner: Arc<LoaderData>,
}

impl ClassLoader {
    /// Root loader with no parent and no backend.
    pub fn bootstrap() -> Self {
        Self::build("bootstrap", None, None)
    }

    pub fn new(name: impl Into<String>, parent: Option<&ClassLoader>) -> Self {
        Self::build(name, parent.cloned(), None)
    }

    /// Loader that describes classes through `source` on first lookup.
    pub fn with_source(
        name: impl Into<String>,
        parent: Option<&ClassLoader>,
        source: Arc<dyn ClassSource>,
    ) -> Self {
        Self::build(name, parent.cloned(), Some(source))
    }

    fn build(name: impl Into<String>, parent: Option<ClassLoader>, source: Option<Arc<dyn ClassSource>>) -> Self {
        let key = LoaderKey(NEXT_LOADER_KEY.fetch_add(1, Ordering::Relaxed));
        ClassLoader { inner: Arc::new(LoaderData { key, name: name.into(), parent, source }) }
    }

    pub fn key(&self) -> LoaderKey {
        self.inner.key
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn parent(&self) -> Option<&ClassLoader> {
        self.inner.parent.as_ref()
    }

    pub fn source(&self) -> Option<&Arc<dyn ClassSource>> {
        self.inner.source.as_ref()
    }

    /// This loader followed by each ancestor, nearest first.
    pub fn ancestry(&self) -> Ancestry<'_> {
        Ancestry { next: Some(self) }
    }

    /// Ancestors first, this loader last: the delegation order.
    pub fn delegation_order(&self) -> Vec<ClassLoader> {
        let mut chain: Vec<ClassLoader> = self.ancestry().cloned().collect();
        chain.reverse();
        chain
    }

    pub fn downgrade(&self) -> WeakLoader {
        WeakLoader { key: self.inner.key, inner: Arc::downgrade(&self.inner) }
    }
}

impl PartialEq for ClassLoader {
    fn eq(&self, other: &Self) -> bool {
        self.inner.key == other.inner.key
    }
}

impl Eq for ClassLoader {}

impl fmt::Debug for ClassLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassLoader")
            .field("key", &self.inner.key.0)
            .field("name", &self.inner.name)
            .field("parent", &self.parent().map(|p| p.name().to_string()))
            .finish()
    }
}

pub struct Ancestry<'a> {
    next: Option<&'a ClassLoader>,
}

impl<'a> Iterator for Ancestry<'a> {
    type Item = &'a ClassLoader;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent();
        Some(current)
    }
}

/// Non-owning loader handle.
#[derive(Clone)]
pub struct WeakLoader {
    key: LoaderKey,
    inner: Weak<LoaderData>,
}

impl WeakLoader {
    pub fn key(&self) -> LoaderKey {
        self.key
    }

    pub fn upgrade(&self) -> Option<ClassLoader> {
        self.inner.upgrade().map(|inner| ClassLoader { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

impl fmt::Debug for WeakLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakLoader").field("key", &self.key.0).field("alive", &self.is_alive()).finish()
    }
}

/// Per-loader state, weakly keyed on the loader.
///
/// Entries whose loader has been dropped are purged on every mutation and can
/// never be returned by a lookup. Lookup-or-create runs under the map lock, so
/// two threads racing on an unseen loader observe a single value.
pub struct ScopeMap<T> {
    entries: Mutex<HashMap<LoaderKey, (WeakLoader, Arc<T>)>>,
}

impl<T> Default for ScopeMap<T> {
    fn default() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }
}

impl<T> ScopeMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, loader: &ClassLoader) -> Option<Arc<T>> {
        let entries = self.entries.lock();
        entries
            .get(&loader.key())
            .filter(|(weak, _)| weak.is_alive())
            .map(|(_, value)| Arc::clone(value))
    }

    pub fn get_or_insert_with(&self, loader: &ClassLoader, create: impl FnOnce() -> T) -> Arc<T> {
        let mut entries = self.entries.lock();
        entries.retain(|_, (weak, _)| weak.is_alive());
        let (_, value) = entries
            .entry(loader.key())
            .or_insert_with(|| (loader.downgrade(), Arc::new(create())));
        Arc::clone(value)
    }

    /// Replace the value for `loader`, returning the previous one.
    pub fn insert(&self, loader: &ClassLoader, value: T) -> Option<Arc<T>> {
        let mut entries = self.entries.lock();
        entries.retain(|_, (weak, _)| weak.is_alive());
        entries
            .insert(loader.key(), (loader.downgrade(), Arc::new(value)))
            .map(|(_, previous)| previous)
    }

    pub fn remove(&self, loader: &ClassLoader) -> Option<Arc<T>> {
        self.entries.lock().remove(&loader.key()).map(|(_, value)| value)
    }

    /// Drop entries of discarded loaders. Returns how many were dropped.
    pub fn purge(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, (weak, _)| weak.is_alive());
        before - entries.len()
    }

    /// Live loaders and their values, in no particular order.
    pub fn live(&self) -> Vec<(ClassLoader, Arc<T>)> {
        let entries = self.entries.lock();
        entries
            .values()
            .filter_map(|(weak, value)| weak.upgrade().map(|loader| (loader, Arc::clone(value))))
            .collect()
    }

    /// Number of entries whose loader is still alive.
    pub fn len(&self) -> usize {
        self.entries.lock().values().filter(|(weak, _)| weak.is_alive()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
