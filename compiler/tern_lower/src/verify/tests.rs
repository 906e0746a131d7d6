use tern_infer::Specializer;
use tern_ir::{Expr, FormalArgs, Fn, Registry, Stmt};
use tern_types::{Idx, TypePool};

use crate::{verify_lowered, LowerError};

#[test]
fn typed_tuples_are_rejected() {
    let pool = TypePool::new();
    let registry = Registry::new();
    let typed = Specializer::new(&pool, &registry)
        .specialize_def(
            Fn::new(
                "pair",
                FormalArgs::positional(&["x"]),
                vec![Stmt::ret(Expr::tuple(vec![Expr::var("x"), Expr::var("x")]))],
            )
            .unwrap(),
            &[Idx::INT64],
        )
        .unwrap();
    let err = verify_lowered(&pool, &typed).unwrap_err();
    let LowerError::Ice(ice) = err else {
        panic!("expected an internal error, got {err:?}");
    };
    assert!(ice.message.contains("Tuple survived lowering"), "{ice}");
    assert_eq!(ice.node.as_deref(), Some("(x, x)"));
}

#[test]
fn scalar_functions_are_already_lowered() {
    let pool = TypePool::new();
    let registry = Registry::new();
    let typed = Specializer::new(&pool, &registry)
        .specialize_def(
            Fn::new(
                "double",
                FormalArgs::positional(&["x"]),
                vec![Stmt::ret(Expr::prim(
                    tern_ir::Prim::Multiply,
                    vec![Expr::var("x"), Expr::int(2)],
                ))],
            )
            .unwrap(),
            &[Idx::INT32],
        )
        .unwrap();
    verify_lowered(&pool, &typed).unwrap();
}

#[test]
fn untyped_expressions_are_rejected() {
    let pool = TypePool::new();
    let x = tern_ir::Name::intern("x");
    let func = tern_ir::TypedFn::new(
        x,
        vec![],
        vec![Stmt::ret(Expr::int(1))],
        vec![],
        Idx::INT64,
        rustc_hash::FxHashMap::default(),
    )
    .unwrap();
    assert!(verify_lowered(&pool, &func).is_err());
}
