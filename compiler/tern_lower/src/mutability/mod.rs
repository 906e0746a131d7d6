//! Mutability classification.
//!
//! A type is mutable when some store writes through a value of that type,
//! or when it structurally contains a mutable type (a tuple holding a
//! mutated slice aliases the slice). Stores that initialize storage bound
//! straight from an `Alloc` do not count: nothing else can observe the
//! buffer before it is filled.

use std::cell::RefCell;

use rustc_hash::{FxHashMap, FxHashSet};
use tern_ir::{walk_exprs, walk_stmts, ExprKind, Name, Stmt, TypedFn};
use tern_types::{Idx, Tag, TypePool};

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;

/// Answers "does this type contain a mutable type?" with memoization.
///
/// Interned types cannot be cyclic, but the `visiting` set guards the walk
/// anyway so a malformed pool cannot recurse forever.
pub struct MutabilityClassifier<'pool> {
    pool: &'pool TypePool,
    roots: FxHashSet<Idx>,
    cache: RefCell<FxHashMap<Idx, bool>>,
    visiting: RefCell<FxHashSet<Idx>>,
}

impl<'pool> MutabilityClassifier<'pool> {
    /// Classifier seeded with the directly mutated types.
    pub fn new(pool: &'pool TypePool, roots: FxHashSet<Idx>) -> Self {
        MutabilityClassifier {
            pool,
            roots,
            cache: RefCell::new(FxHashMap::default()),
            visiting: RefCell::new(FxHashSet::default()),
        }
    }

    pub fn is_mutable(&self, idx: Idx) -> bool {
        if idx.is_primitive() || self.pool.tag(idx) == Tag::Function {
            return false;
        }
        if self.roots.contains(&idx) {
            return true;
        }
        if let Some(&cached) = self.cache.borrow().get(&idx) {
            return cached;
        }
        if !self.visiting.borrow_mut().insert(idx) {
            return false;
        }

        let result = self
            .pool
            .components(idx)
            .into_iter()
            .any(|child| self.is_mutable(child));

        self.visiting.borrow_mut().remove(&idx);
        self.cache.borrow_mut().insert(idx, result);
        result
    }
}

/// Types written through by a store in `func`, before alias closure.
fn direct_mutations(func: &TypedFn) -> FxHashSet<Idx> {
    let mut fresh: FxHashSet<Name> = FxHashSet::default();
    walk_stmts(&func.body, &mut |stmt| {
        if let Stmt::Assign { lhs, rhs } = stmt {
            if let (Some(name), ExprKind::Alloc { .. }) = (lhs.as_var(), &rhs.kind) {
                fresh.insert(name);
            }
        }
    });

    let mut roots = FxHashSet::default();
    walk_stmts(&func.body, &mut |stmt| {
        let Stmt::Assign { lhs, .. } = stmt else {
            return;
        };
        let base = match &lhs.kind {
            ExprKind::Attribute { value, .. } | ExprKind::Index { value, .. } => value,
            _ => return,
        };
        if base.as_var().is_some_and(|name| fresh.contains(&name)) {
            return;
        }
        if let Some(ty) = base.ty {
            roots.insert(ty);
        }
    });
    roots
}

/// Every type that occurs in `func`: signature, variables, expressions.
fn appearing_types(func: &TypedFn) -> FxHashSet<Idx> {
    let mut types: FxHashSet<Idx> = func.input_types.iter().copied().collect();
    types.insert(func.return_type);
    types.extend(func.type_env.values().copied());
    walk_exprs(&func.body, &mut |expr| {
        if let Some(ty) = expr.ty {
            types.insert(ty);
        }
    });
    types
}

/// The set of types in `func` that need reference semantics.
///
/// Idempotent, and stable across [`lower`](crate::lower): the lowered
/// version of a function reports the same set.
pub fn find_mutable_types(pool: &TypePool, func: &TypedFn) -> FxHashSet<Idx> {
    let classifier = MutabilityClassifier::new(pool, direct_mutations(func));
    let mutable: FxHashSet<Idx> = appearing_types(func)
        .into_iter()
        .filter(|&ty| classifier.is_mutable(ty))
        .collect();
    tracing::debug!(
        func = %func.name,
        version = func.version,
        count = mutable.len(),
        "mutable types"
    );
    mutable
}
