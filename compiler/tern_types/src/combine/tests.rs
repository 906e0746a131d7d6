use pretty_assertions::assert_eq;
use proptest::prelude::*;

use super::combine_scalars;
use crate::{Idx, Name, Scalar, TypeError, TypePool};

// ── Scalars ──

#[test]
fn identical_types_combine_to_themselves() {
    let pool = TypePool::new();
    for scalar in Scalar::ALL {
        let idx = pool.scalar(scalar).unwrap();
        assert_eq!(pool.combine(idx, idx).unwrap(), idx);
    }
    assert_eq!(pool.combine(Idx::NONE, Idx::NONE).unwrap(), Idx::NONE);
}

#[test]
fn bool_yields_to_numeric() {
    let pool = TypePool::new();
    assert_eq!(pool.combine(Idx::BOOL, Idx::INT64).unwrap(), Idx::INT64);
    assert_eq!(pool.combine(Idx::UINT8, Idx::BOOL).unwrap(), Idx::UINT8);
    assert_eq!(pool.combine(Idx::BOOL, Idx::FLOAT32).unwrap(), Idx::FLOAT32);
}

#[test]
fn same_signedness_takes_wider() {
    let pool = TypePool::new();
    assert_eq!(pool.combine(Idx::INT32, Idx::INT64).unwrap(), Idx::INT64);
    assert_eq!(pool.combine(Idx::UINT16, Idx::UINT8).unwrap(), Idx::UINT16);
    assert_eq!(pool.combine(Idx::FLOAT32, Idx::FLOAT64).unwrap(), Idx::FLOAT64);
}

#[test]
fn mixed_signedness_widens_signed() {
    let pool = TypePool::new();
    assert_eq!(pool.combine(Idx::INT8, Idx::UINT8).unwrap(), Idx::INT16);
    assert_eq!(pool.combine(Idx::UINT16, Idx::INT64).unwrap(), Idx::INT64);
    assert_eq!(pool.combine(Idx::INT32, Idx::UINT64).unwrap(), Idx::INT64);
}

#[test]
fn float_with_int_widens_float() {
    let pool = TypePool::new();
    assert_eq!(pool.combine(Idx::FLOAT32, Idx::INT64).unwrap(), Idx::FLOAT64);
    assert_eq!(pool.combine(Idx::INT32, Idx::FLOAT32).unwrap(), Idx::FLOAT64);
    assert_eq!(pool.combine(Idx::FLOAT32, Idx::INT8).unwrap(), Idx::FLOAT32);
    assert_eq!(pool.combine(Idx::UINT16, Idx::FLOAT32).unwrap(), Idx::FLOAT32);
}

#[test]
fn none_only_with_none() {
    let pool = TypePool::new();
    assert!(matches!(
        pool.combine(Idx::NONE, Idx::INT64),
        Err(TypeError::IncompatibleTypes { .. })
    ));
}

// ── Composites ──

#[test]
fn tuples_combine_elementwise() {
    let pool = TypePool::new();
    let a = pool.tuple(&[Idx::INT32, Idx::FLOAT32]);
    let b = pool.tuple(&[Idx::INT64, Idx::INT64]);
    assert_eq!(
        pool.combine(a, b).unwrap(),
        pool.tuple(&[Idx::INT64, Idx::FLOAT64])
    );
}

#[test]
fn tuple_arity_mismatch_is_incompatible() {
    let pool = TypePool::new();
    let a = pool.tuple(&[Idx::INT64]);
    let b = pool.tuple(&[Idx::INT64, Idx::INT64]);
    let err = pool.combine(a, b).unwrap_err();
    assert_eq!(
        err.to_string(),
        "incompatible types: (int64,) and (int64, int64)"
    );
}

#[test]
fn tuple_with_incompatible_elements_reports_outer_types() {
    let pool = TypePool::new();
    let a = pool.tuple(&[Idx::NONE]);
    let b = pool.tuple(&[Idx::INT64]);
    match pool.combine(a, b) {
        Err(TypeError::IncompatibleTypes { left, right, .. }) => {
            assert_eq!((left, right), (a, b));
        }
        other => panic!("expected IncompatibleTypes, got {other:?}"),
    }
}

#[test]
fn slices_combine_fieldwise() {
    let pool = TypePool::new();
    let a = pool.slice(Idx::INT32, Idx::INT64, Idx::NONE);
    let b = pool.slice(Idx::INT64, Idx::INT8, Idx::NONE);
    assert_eq!(
        pool.combine(a, b).unwrap(),
        pool.slice(Idx::INT64, Idx::INT64, Idx::NONE)
    );
}

#[test]
fn closures_need_same_target() {
    let pool = TypePool::new();
    let f = Name::intern("f");
    let g = Name::intern("g");
    let a = pool.closure(f, &[Idx::INT32]);
    let b = pool.closure(f, &[Idx::INT64]);
    assert_eq!(pool.combine(a, b).unwrap(), pool.closure(f, &[Idx::INT64]));
    assert!(pool.combine(a, pool.closure(g, &[Idx::INT32])).is_err());
}

#[test]
fn arrays_and_pointers_combine_only_when_equal() {
    let pool = TypePool::new();
    let a = pool.array(Idx::INT64, 1);
    let b = pool.array(Idx::FLOAT64, 1);
    assert_eq!(pool.combine(a, a).unwrap(), a);
    assert!(pool.combine(a, b).is_err());
    assert!(pool
        .combine(pool.pointer(Idx::INT32), pool.pointer(Idx::INT64))
        .is_err());
}

#[test]
fn combine_all_folds() {
    let pool = TypePool::new();
    assert_eq!(pool.combine_all([]).unwrap(), None);
    assert_eq!(
        pool.combine_all([Idx::BOOL, Idx::INT8, Idx::FLOAT32]).unwrap(),
        Some(Idx::FLOAT32)
    );
}

// ── Casts ──

#[test]
fn castable_rules() {
    let pool = TypePool::new();
    assert!(pool.castable(Idx::FLOAT64, Idx::INT8));
    let a = pool.tuple(&[Idx::INT32, Idx::BOOL]);
    let b = pool.tuple(&[Idx::FLOAT64, Idx::INT64]);
    assert!(pool.castable(a, b));
    assert!(!pool.castable(a, pool.tuple(&[Idx::INT32])));
    assert!(!pool.castable(Idx::NONE, Idx::INT64));
}

// ── Properties ──

fn any_scalar() -> impl Strategy<Value = Scalar> {
    proptest::sample::select(Scalar::ALL.to_vec())
}

proptest! {
    #[test]
    fn scalar_combine_is_commutative(a in any_scalar(), b in any_scalar()) {
        prop_assert_eq!(combine_scalars(a, b), combine_scalars(b, a));
    }

    #[test]
    fn scalar_combine_is_an_upper_bound(a in any_scalar(), b in any_scalar()) {
        let c = combine_scalars(a, b);
        prop_assert_eq!(combine_scalars(a, c), c);
        prop_assert_eq!(combine_scalars(b, c), c);
    }

    #[test]
    fn scalar_combine_stays_in_set(a in any_scalar(), b in any_scalar()) {
        prop_assert!(combine_scalars(a, b).idx().is_some());
    }
}
