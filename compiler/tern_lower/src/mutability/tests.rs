use pretty_assertions::assert_eq;
use rustc_hash::FxHashSet;
use tern_infer::Specializer;
use tern_ir::{Expr, FormalArgs, Fn, Registry, Stmt};
use tern_types::{Idx, TypePool};

use super::{find_mutable_types, MutabilityClassifier};
use crate::lower;

fn mutate_slice() -> Fn {
    Fn::new(
        "mutate_slice",
        FormalArgs::positional(&[]),
        vec![
            Stmt::assign(
                Expr::var("x"),
                Expr::slice(Expr::int(1), Expr::int(2), Expr::none()),
            ),
            Stmt::assign(Expr::attr(Expr::var("x"), "start"), Expr::int(10)),
            Stmt::assign(Expr::attr(Expr::var("x"), "stop"), Expr::int(20)),
        ],
    )
    .unwrap()
}

// ── Classifier ──

#[test]
fn scalars_are_never_mutable() {
    let pool = TypePool::new();
    let classifier = MutabilityClassifier::new(&pool, FxHashSet::default());
    for idx in [Idx::BOOL, Idx::INT8, Idx::UINT64, Idx::FLOAT32, Idx::NONE] {
        assert!(!classifier.is_mutable(idx));
    }
}

#[test]
fn containers_of_mutable_types_are_mutable() {
    let pool = TypePool::new();
    let slice = pool.slice(Idx::INT64, Idx::INT64, Idx::NONE);
    let pair = pool.tuple(&[slice, Idx::FLOAT64]);
    let nested = pool.tuple(&[pair, Idx::INT8]);
    let unrelated = pool.tuple(&[Idx::INT64, Idx::INT64]);

    let classifier = MutabilityClassifier::new(&pool, [slice].into_iter().collect());
    assert!(classifier.is_mutable(slice));
    assert!(classifier.is_mutable(pair));
    assert!(classifier.is_mutable(nested));
    assert!(!classifier.is_mutable(unrelated));
}

#[test]
fn function_types_are_never_mutable() {
    let pool = TypePool::new();
    let slice = pool.slice(Idx::INT64, Idx::INT64, Idx::NONE);
    let func = pool.function(&[slice], Idx::NONE);
    let classifier = MutabilityClassifier::new(&pool, [slice].into_iter().collect());
    assert!(!classifier.is_mutable(func));
}

#[test]
fn array_is_mutable_through_its_buffer() {
    let pool = TypePool::new();
    let array = pool.array(Idx::FLOAT64, 1);
    let buffer = pool.pointer(Idx::FLOAT64);
    let classifier = MutabilityClassifier::new(&pool, [buffer].into_iter().collect());
    assert!(classifier.is_mutable(array));
}

// ── Per function ──

#[test]
fn mutated_slice_is_the_only_mutable_type() {
    let pool = TypePool::new();
    let registry = Registry::new();
    let typed = Specializer::new(&pool, &registry)
        .specialize_def(mutate_slice(), &[])
        .unwrap();
    let slice = pool.slice(Idx::INT64, Idx::INT64, Idx::NONE);

    let before = find_mutable_types(&pool, &typed);
    assert_eq!(before.len(), 1, "{before:?}");
    assert!(before.contains(&slice));

    let lowered = lower(&pool, &registry, &typed).unwrap();
    let after = find_mutable_types(&pool, &lowered);
    assert_eq!(after, before);
}

#[test]
fn analysis_is_idempotent() {
    let pool = TypePool::new();
    let registry = Registry::new();
    let typed = Specializer::new(&pool, &registry)
        .specialize_def(mutate_slice(), &[])
        .unwrap();
    assert_eq!(
        find_mutable_types(&pool, &typed),
        find_mutable_types(&pool, &typed)
    );
}

#[test]
fn initializing_fresh_storage_is_not_mutation() {
    let pool = TypePool::new();
    let registry = Registry::new();
    let func = Fn::new(
        "fill",
        FormalArgs::positional(&["n"]),
        vec![
            Stmt::assign(Expr::var("buf"), Expr::alloc(Idx::INT32, Expr::var("n"))),
            Stmt::assign(Expr::index(Expr::var("buf"), Expr::int(0)), Expr::int(7)),
            Stmt::ret(Expr::var("buf")),
        ],
    )
    .unwrap();
    let typed = Specializer::new(&pool, &registry)
        .specialize_def(func, &[Idx::INT64])
        .unwrap();
    assert!(find_mutable_types(&pool, &typed).is_empty());
}

#[test]
fn array_literals_are_immutable_until_stored_into() {
    let pool = TypePool::new();
    let registry = Registry::new();
    let specializer = Specializer::new(&pool, &registry);

    let read_only = specializer
        .specialize_def(
            Fn::new(
                "literal",
                FormalArgs::positional(&[]),
                vec![Stmt::ret(Expr::array(vec![Expr::int(1), Expr::int(2)]))],
            )
            .unwrap(),
            &[],
        )
        .unwrap();
    assert!(find_mutable_types(&pool, &read_only).is_empty());
    let lowered = lower(&pool, &registry, &read_only).unwrap();
    assert!(find_mutable_types(&pool, &lowered).is_empty());

    let written = specializer
        .specialize_def(
            Fn::new(
                "overwrite",
                FormalArgs::positional(&["a"]),
                vec![
                    Stmt::assign(Expr::index(Expr::var("a"), Expr::int(0)), Expr::int(5)),
                    Stmt::ret(Expr::var("a")),
                ],
            )
            .unwrap(),
            &[pool.array(Idx::INT64, 1)],
        )
        .unwrap();
    let before = find_mutable_types(&pool, &written);
    assert_eq!(before, [pool.array(Idx::INT64, 1)].into_iter().collect());
    let lowered = lower(&pool, &registry, &written).unwrap();
    assert_eq!(find_mutable_types(&pool, &lowered), before);
}
