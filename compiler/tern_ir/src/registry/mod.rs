//! Session-wide function registries.
//!
//! - untyped functions by name, registered at definition time;
//! - typed functions by `(name, version)`, plus the latest version per name;
//! - the specialization cache from `(function, input types)` to its typed
//!   function.
//!
//! Entries are never replaced. Typed functions and specializations are
//! journaled so a failed compilation can [`roll back`](Registry::rollback)
//! to a [`Checkpoint`] taken under the compile lock. A reentrant compile
//! lock lets the specializer hold compilation exclusive while recursing
//! into callees.

use std::sync::Arc;

use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use tern_types::{Idx, Name};

use crate::{Fn, IrError, TypedFn};

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]

/// Key of the specialization cache.
pub type Signature = (Name, Box<[Idx]>);

/// A journaled registration, undone by [`Registry::rollback`].
#[derive(Debug)]
enum Entry {
    Typed(Name, u32),
    Specialization(Signature),
}

/// Journal position returned by [`Registry::checkpoint`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Checkpoint(usize);

#[derive(Default)]
pub struct Registry {
    untyped: RwLock<FxHashMap<Name, Arc<Fn>>>,
    typed: RwLock<FxHashMap<(Name, u32), Arc<TypedFn>>>,
    max_version: RwLock<FxHashMap<Name, u32>>,
    signatures: RwLock<FxHashMap<Signature, Arc<TypedFn>>>,
    in_progress: Mutex<FxHashSet<Signature>>,
    name_counters: Mutex<FxHashMap<Name, u32>>,
    journal: Mutex<Vec<Entry>>,
    compile_lock: ReentrantMutex<()>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Untyped ──

    pub fn define(&self, func: Fn) -> Result<Arc<Fn>, IrError> {
        let mut untyped = self.untyped.write();
        if untyped.contains_key(&func.name) {
            return Err(IrError::DuplicateFunction(func.name));
        }
        let func = Arc::new(func);
        untyped.insert(func.name, Arc::clone(&func));
        tracing::debug!(name = %func.name, "defined function");
        Ok(func)
    }

    pub fn untyped(&self, name: Name) -> Option<Arc<Fn>> {
        self.untyped.read().get(&name).cloned()
    }

    // ── Typed ──

    /// Register `func` under `(func.name, func.version)`.
    ///
    /// Versions of one name must be registered in order starting at 0.
    pub fn register(&self, func: TypedFn) -> Result<Arc<TypedFn>, IrError> {
        let key = (func.name, func.version);
        let mut typed = self.typed.write();
        if typed.contains_key(&key) {
            return Err(IrError::DuplicateVersion {
                name: func.name,
                version: func.version,
            });
        }
        let mut max_version = self.max_version.write();
        let expected = max_version.get(&func.name).map_or(0, |v| v + 1);
        if func.version != expected {
            return Err(IrError::malformed(
                func.name,
                format!(
                    "registered version {} but the next version is {expected}",
                    func.version
                ),
            ));
        }
        max_version.insert(func.name, func.version);
        let func = Arc::new(func);
        typed.insert(key, Arc::clone(&func));
        self.journal.lock().push(Entry::Typed(key.0, key.1));
        tracing::debug!(
            name = %func.name,
            version = func.version,
            pass = func.last_transform.unwrap_or("specialize"),
            "registered typed function"
        );
        Ok(func)
    }

    pub fn typed(&self, name: Name, version: u32) -> Option<Arc<TypedFn>> {
        self.typed.read().get(&(name, version)).cloned()
    }

    pub fn max_version(&self, name: Name) -> Option<u32> {
        self.max_version.read().get(&name).copied()
    }

    /// The version the next registration of `name` must carry.
    pub fn next_version(&self, name: Name) -> u32 {
        self.max_version(name).map_or(0, |v| v + 1)
    }

    /// The highest registered version of `name`.
    pub fn latest(&self, name: Name) -> Option<Arc<TypedFn>> {
        let version = self.max_version(name)?;
        self.typed(name, version)
    }

    /// A name no other specialization of `base` uses: `base_0`, `base_1`, ...
    pub fn fresh_name(&self, base: Name) -> Name {
        let mut counters = self.name_counters.lock();
        let counter = counters.entry(base).or_insert(0);
        let name = Name::intern(&format!("{base}_{counter}"));
        *counter += 1;
        name
    }

    // ── Specializations ──

    pub fn specialization(&self, func: Name, inputs: &[Idx]) -> Option<Arc<TypedFn>> {
        self.signatures.read().get(&(func, inputs.into())).cloned()
    }

    pub fn record_specialization(&self, func: Name, inputs: &[Idx], typed: Arc<TypedFn>) {
        let key: Signature = (func, inputs.into());
        if self.signatures.write().insert(key.clone(), typed).is_none() {
            self.journal.lock().push(Entry::Specialization(key));
        }
    }

    pub fn specialization_count(&self) -> usize {
        self.signatures.read().len()
    }

    /// Mark a signature as being specialized. Returns `false` if it already is,
    /// which means the function reached itself recursively.
    pub fn begin_specialization(&self, func: Name, inputs: &[Idx]) -> bool {
        self.in_progress.lock().insert((func, inputs.into()))
    }

    pub fn end_specialization(&self, func: Name, inputs: &[Idx]) {
        self.in_progress.lock().remove(&(func, inputs.into()));
    }

    // ── Rollback ──

    /// The current journal position. Take it while holding the compile lock.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.journal.lock().len())
    }

    /// Forget every typed function and specialization registered since
    /// `checkpoint`, newest first. Untyped definitions are kept.
    pub fn rollback(&self, checkpoint: Checkpoint) {
        let undone: Vec<Entry> = {
            let mut journal = self.journal.lock();
            let from = checkpoint.0.min(journal.len());
            journal.drain(from..).rev().collect()
        };
        let mut typed = self.typed.write();
        let mut max_version = self.max_version.write();
        let mut signatures = self.signatures.write();
        for entry in &undone {
            match entry {
                Entry::Typed(name, version) => {
                    typed.remove(&(*name, *version));
                    match version.checked_sub(1) {
                        Some(previous) => max_version.insert(*name, previous),
                        None => max_version.remove(name),
                    };
                }
                Entry::Specialization(key) => {
                    signatures.remove(key);
                }
            }
        }
        if !undone.is_empty() {
            tracing::debug!(entries = undone.len(), "rolled back registrations");
        }
    }

    /// Serialize compilation. Reentrant so nested specializations on the
    /// same thread proceed.
    pub fn compile_lock(&self) -> ReentrantMutexGuard<'_, ()> {
        self.compile_lock.lock()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("untyped", &self.untyped.read().len())
            .field("typed", &self.typed.read().len())
            .field("specializations", &self.signatures.read().len())
            .finish_non_exhaustive()
    }
}
