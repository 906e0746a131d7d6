use pretty_assertions::assert_eq;
use rustc_hash::FxHashMap;
use tern_types::{Idx, Name, TypePool};

use crate::{ActualArgs, Expr, FormalArgs, Fn, Phi, Prim, Stmt, TypedFn};

#[test]
fn expressions() {
    let cases = [
        (Expr::int(3), "3"),
        (Expr::float(1.5), "1.5"),
        (Expr::tuple(vec![Expr::int(1)]), "(1,)"),
        (
            Expr::prim(Prim::Add, vec![Expr::var("x"), Expr::int(1)]),
            "prim:add(x, 1)",
        ),
        (
            Expr::slice(Expr::int(1), Expr::int(2), Expr::none()),
            "slice(1, 2, None)",
        ),
        (
            Expr::call(
                Expr::fn_ref("g"),
                ActualArgs::positional(vec![Expr::var("a")]).with_keyword("b", Expr::int(2)),
            ),
            "&g(a, b=2)",
        ),
        (Expr::cast(Expr::var("x"), Idx::FLOAT64), "cast<float64>(x)"),
    ];
    for (expr, expected) in cases {
        assert_eq!(expr.to_string(), expected);
    }
}

#[test]
fn untyped_function_with_control_flow() {
    let func = Fn::new(
        "count",
        FormalArgs::positional(&["n"]),
        vec![
            Stmt::assign(Expr::var("i0"), Expr::int(0)),
            Stmt::while_(
                Expr::prim(Prim::Less, vec![Expr::var("i"), Expr::var("n")]),
                vec![Stmt::assign(
                    Expr::var("i1"),
                    Expr::prim(Prim::Add, vec![Expr::var("i"), Expr::int(1)]),
                )],
                vec![Phi::new("i", Expr::var("i0"), Expr::var("i1"))],
            ),
            Stmt::ret(Expr::var("i")),
        ],
    )
    .unwrap();
    assert_eq!(
        func.to_string(),
        "def count(n):\n  i0 = 0\n  i <- phi(i0, i1)\n  while prim:less(i, n):\n    i1 = prim:add(i, 1)\n  return i"
    );
}

#[test]
fn typed_function_header() {
    let pool = TypePool::new();
    let x = Name::intern("x");
    let pair = pool.tuple(&[Idx::INT64, Idx::FLOAT64]);
    let env: FxHashMap<_, _> = [(x, pair)].into_iter().collect();
    let func = TypedFn::new(
        Name::intern("first_0"),
        vec![x],
        vec![Stmt::ret(Expr::var("x"))],
        vec![pair],
        pair,
        env,
    )
    .unwrap();
    assert_eq!(
        func.display(&pool).to_string(),
        "def first_0#0(x: (int64, float64)) -> (int64, float64):\n  return x"
    );
}
