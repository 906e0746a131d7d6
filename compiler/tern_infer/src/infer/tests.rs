use pretty_assertions::assert_eq;
use tern_ir::{ActualArgs, Expr, ExprKind, FormalArgs, Fn, Name, Phi, Prim, Registry, Stmt};
use tern_types::{Idx, TypeError, TypePool};

use crate::{InferError, Specializer};

fn def(name: &str, params: &[&str], body: Vec<Stmt>) -> Fn {
    Fn::new(name, FormalArgs::positional(params), body).unwrap()
}

fn add(a: Expr, b: Expr) -> Expr {
    Expr::prim(Prim::Add, vec![a, b])
}

fn call(name: &str, args: Vec<Expr>) -> Expr {
    Expr::call(Expr::fn_ref(name), ActualArgs::positional(args))
}

fn add1() -> Fn {
    def(
        "add1",
        &["x"],
        vec![Stmt::ret(add(Expr::var("x"), Expr::int(1)))],
    )
}

fn session() -> (TypePool, Registry) {
    (TypePool::new(), Registry::new())
}

// ── Scalars ──

#[test]
fn add1_promotes_to_the_wider_operand() {
    let (pool, registry) = session();
    registry.define(add1()).unwrap();
    let specializer = Specializer::new(&pool, &registry);
    let add1 = Name::intern("add1");

    for (input, expected) in [
        (Idx::INT32, Idx::INT64),
        (Idx::BOOL, Idx::INT64),
        (Idx::INT64, Idx::INT64),
        (Idx::FLOAT32, Idx::FLOAT64),
    ] {
        let typed = specializer.specialize(add1, &[input]).unwrap();
        assert_eq!(typed.return_type, expected, "add1({})", pool.render(input));
        assert_eq!(typed.var_type(Name::intern("x")), Some(input));
    }
}

#[test]
fn narrow_operand_is_cast_explicitly() {
    let (pool, registry) = session();
    let typed = Specializer::new(&pool, &registry)
        .specialize_def(add1(), &[Idx::INT32])
        .unwrap();
    let Stmt::Return(ret) = &typed.body[0] else {
        panic!("expected return, got {:?}", typed.body[0]);
    };
    let ExprKind::Prim { args, .. } = &ret.kind else {
        panic!("expected prim, got {ret}");
    };
    assert!(matches!(args[0].kind, ExprKind::Cast(_)));
    assert_eq!(args[0].ty, Some(Idx::INT64));
    assert_eq!(args[1].ty, Some(Idx::INT64));
}

#[test]
fn literals_fold_instead_of_casting() {
    let (pool, registry) = session();
    let typed = Specializer::new(&pool, &registry)
        .specialize_def(
            def("halve", &["x"], vec![Stmt::ret(add(Expr::var("x"), Expr::int(1)))]),
            &[Idx::FLOAT64],
        )
        .unwrap();
    let Stmt::Return(ret) = &typed.body[0] else {
        panic!("expected return");
    };
    let ExprKind::Prim { args, .. } = &ret.kind else {
        panic!("expected prim");
    };
    assert_eq!(args[1].as_const(), Some(tern_ir::ConstValue::Float(1.0)));
    assert_eq!(args[1].ty, Some(Idx::FLOAT64));
}

#[test]
fn folded_literals_wrap_to_the_target_width() {
    let (pool, registry) = session();
    let specializer = Specializer::new(&pool, &registry);
    let cases = [
        ("wrap_u8", 300, Idx::UINT8, 44),
        ("wrap_i8", 200, Idx::INT8, -56),
        ("wrap_u16", -1, Idx::UINT16, 65535),
        ("wrap_i64", -5, Idx::INT64, -5),
    ];
    for (name, literal, to, expected) in cases {
        let typed = specializer
            .specialize_def(def(name, &[], vec![Stmt::ret(Expr::cast(Expr::int(literal), to))]), &[])
            .unwrap();
        let Stmt::Return(ret) = &typed.body[0] else {
            panic!("expected return");
        };
        assert_eq!(ret.as_const(), Some(tern_ir::ConstValue::Int(expected)), "{name}");
        assert_eq!(typed.return_type, to);
    }
}

#[test]
fn bool_arithmetic_promotes_to_int64() {
    let (pool, registry) = session();
    let typed = Specializer::new(&pool, &registry)
        .specialize_def(
            def("both", &["a", "b"], vec![Stmt::ret(add(Expr::var("a"), Expr::var("b")))]),
            &[Idx::BOOL, Idx::BOOL],
        )
        .unwrap();
    assert_eq!(typed.return_type, Idx::INT64);
}

#[test]
fn comparisons_and_logic_yield_bool() {
    let (pool, registry) = session();
    let body = vec![Stmt::ret(Expr::prim(
        Prim::LogicalAnd,
        vec![
            Expr::prim(Prim::Less, vec![Expr::var("x"), Expr::float(2.5)]),
            Expr::var("flag"),
        ],
    ))];
    let typed = Specializer::new(&pool, &registry)
        .specialize_def(def("check", &["x", "flag"], body), &[Idx::UINT8, Idx::INT32])
        .unwrap();
    assert_eq!(typed.return_type, Idx::BOOL);
}

#[test]
fn primitive_arity_is_checked() {
    let (pool, registry) = session();
    let err = Specializer::new(&pool, &registry)
        .specialize_def(
            def("bad", &["x"], vec![Stmt::ret(Expr::prim(Prim::Add, vec![Expr::var("x")]))]),
            &[Idx::INT64],
        )
        .unwrap_err();
    assert!(matches!(err, InferError::Ir(_)), "{err}");
}

// ── Calls ──

#[test]
fn specializations_are_cached() {
    let (pool, registry) = session();
    registry.define(add1()).unwrap();
    let specializer = Specializer::new(&pool, &registry);
    let add1 = Name::intern("add1");

    let first = specializer.specialize(add1, &[Idx::INT32]).unwrap();
    let again = specializer.specialize(add1, &[Idx::INT32]).unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &again));
    assert_eq!(registry.specialization_count(), 1);

    let other = specializer.specialize(add1, &[Idx::FLOAT32]).unwrap();
    assert_ne!(first.name, other.name);
    assert_eq!(registry.specialization_count(), 2);
}

#[test]
fn calls_specialize_their_callee() {
    let (pool, registry) = session();
    registry.define(add1()).unwrap();
    registry
        .define(def(
            "call_add1",
            &["x"],
            vec![Stmt::ret(call("add1", vec![Expr::var("x")]))],
        ))
        .unwrap();
    let specializer = Specializer::new(&pool, &registry);

    for (input, expected) in [
        (Idx::INT32, Idx::INT64),
        (Idx::BOOL, Idx::INT64),
        (Idx::INT64, Idx::INT64),
        (Idx::FLOAT32, Idx::FLOAT64),
    ] {
        let typed = specializer.specialize(Name::intern("call_add1"), &[input]).unwrap();
        assert_eq!(typed.return_type, expected);
    }

    let typed = specializer
        .specialize(Name::intern("call_add1"), &[Idx::INT32])
        .unwrap();
    let callee = specializer.specialize(Name::intern("add1"), &[Idx::INT32]).unwrap();
    let Stmt::Return(ret) = &typed.body[0] else {
        panic!("expected return");
    };
    let ExprKind::Call { target, .. } = &ret.kind else {
        panic!("expected call, got {ret}");
    };
    assert_eq!(*target, Some(callee.name));
}

#[test]
fn defaults_and_keywords_bind() {
    let (pool, registry) = session();
    let scale = Fn::new(
        "scale",
        FormalArgs::positional(&["x", "k"]).with_default("k", Expr::int(2)),
        vec![Stmt::ret(Expr::prim(
            Prim::Multiply,
            vec![Expr::var("x"), Expr::var("k")],
        ))],
    )
    .unwrap();
    registry.define(scale).unwrap();
    let caller = def(
        "use_scale",
        &["x"],
        vec![
            Stmt::assign(Expr::var("a"), call("scale", vec![Expr::var("x")])),
            Stmt::assign(
                Expr::var("b"),
                Expr::call(
                    Expr::fn_ref("scale"),
                    ActualArgs::positional(vec![Expr::var("x")]).with_keyword("k", Expr::float(0.5)),
                ),
            ),
            Stmt::ret(Expr::tuple(vec![Expr::var("a"), Expr::var("b")])),
        ],
    );
    let typed = Specializer::new(&pool, &registry)
        .specialize_def(caller, &[Idx::INT32])
        .unwrap();
    assert_eq!(
        pool.render(typed.return_type),
        "(int64, float64)".to_string()
    );
}

#[test]
fn closures_pass_partial_arguments() {
    let (pool, registry) = session();
    registry
        .define(
            Fn::new(
                "offset",
                FormalArgs::positional(&["x"]).with_nonlocals(&["base"]),
                vec![Stmt::ret(add(Expr::var("base"), Expr::var("x")))],
            )
            .unwrap(),
        )
        .unwrap();
    let caller = def(
        "apply",
        &["b", "x"],
        vec![
            Stmt::assign(Expr::var("f"), Expr::closure("offset", vec![Expr::var("b")])),
            Stmt::ret(Expr::call(Expr::var("f"), ActualArgs::positional(vec![Expr::var("x")]))),
        ],
    );
    let typed = Specializer::new(&pool, &registry)
        .specialize_def(caller, &[Idx::FLOAT32, Idx::INT8])
        .unwrap();
    assert_eq!(typed.return_type, Idx::FLOAT32);
    assert_eq!(
        pool.render(typed.var_type(Name::intern("f")).unwrap()),
        "closure<offset; float32>"
    );
}

#[test]
fn self_recursion_is_rejected() {
    let (pool, registry) = session();
    let err = Specializer::new(&pool, &registry)
        .specialize_def(
            def("forever", &["x"], vec![Stmt::ret(call("forever", vec![Expr::var("x")]))]),
            &[Idx::INT64],
        )
        .unwrap_err();
    assert_eq!(
        err,
        InferError::RecursiveSpecialization {
            func: Name::intern("forever")
        }
    );
}

#[test]
fn unknown_callee_is_reported() {
    let (pool, registry) = session();
    let err = Specializer::new(&pool, &registry)
        .specialize_def(
            def("caller", &[], vec![Stmt::ret(call("missing", vec![]))]),
            &[],
        )
        .unwrap_err();
    assert_eq!(err, InferError::UnknownFunction(Name::intern("missing")));
}

// ── Composites ──

#[test]
fn tuple_indexing_normalizes_negative_indices() {
    let (pool, registry) = session();
    registry
        .define(def(
            "last",
            &["t"],
            vec![Stmt::ret(Expr::index(Expr::var("t"), Expr::int(-1)))],
        ))
        .unwrap();
    let specializer = Specializer::new(&pool, &registry);
    let pair = pool.tuple(&[Idx::INT64, Idx::FLOAT64]);
    let typed = specializer.specialize(Name::intern("last"), &[pair]).unwrap();
    assert_eq!(typed.return_type, Idx::FLOAT64);
    let Stmt::Return(ret) = &typed.body[0] else {
        panic!("expected return");
    };
    let ExprKind::Index { index, .. } = &ret.kind else {
        panic!("expected index");
    };
    assert_eq!(index.as_const(), Some(tern_ir::ConstValue::Int(1)));
}

#[test]
fn tuple_index_out_of_range() {
    let (pool, registry) = session();
    let pair = pool.tuple(&[Idx::INT64, Idx::FLOAT64]);
    let err = Specializer::new(&pool, &registry)
        .specialize_def(
            def("third", &["t"], vec![Stmt::ret(Expr::index(Expr::var("t"), Expr::int(2)))]),
            &[pair],
        )
        .unwrap_err();
    assert!(matches!(err, InferError::InvalidIndex { .. }), "{err}");
}

#[test]
fn tuple_unpacking_binds_each_target() {
    let (pool, registry) = session();
    let pair = pool.tuple(&[Idx::INT8, Idx::FLOAT32]);
    let typed = Specializer::new(&pool, &registry)
        .specialize_def(
            def(
                "swap",
                &["t"],
                vec![
                    Stmt::assign(
                        Expr::tuple(vec![Expr::var("a"), Expr::var("b")]),
                        Expr::var("t"),
                    ),
                    Stmt::ret(Expr::tuple(vec![Expr::var("b"), Expr::var("a")])),
                ],
            ),
            &[pair],
        )
        .unwrap();
    assert_eq!(pool.render(typed.return_type), "(float32, int8)");
}

#[test]
fn array_literals_combine_elements() {
    let (pool, registry) = session();
    let typed = Specializer::new(&pool, &registry)
        .specialize_def(
            def(
                "make",
                &[],
                vec![Stmt::ret(Expr::array(vec![Expr::int(1), Expr::float(2.5)]))],
            ),
            &[],
        )
        .unwrap();
    assert_eq!(typed.return_type, pool.array(Idx::FLOAT64, 1));
}

#[test]
fn array_attributes_and_indexing() {
    let (pool, registry) = session();
    let grid = pool.array(Idx::FLOAT32, 2);
    let body = vec![
        Stmt::assign(Expr::var("s"), Expr::attr(Expr::var("a"), "shape")),
        Stmt::assign(
            Expr::index(Expr::var("a"), Expr::tuple(vec![Expr::int(0), Expr::int(1)])),
            Expr::int(3),
        ),
        Stmt::ret(Expr::index(
            Expr::var("a"),
            Expr::tuple(vec![Expr::int(1), Expr::int(0)]),
        )),
    ];
    let typed = Specializer::new(&pool, &registry)
        .specialize_def(def("poke", &["a"], body), &[grid])
        .unwrap();
    assert_eq!(typed.return_type, Idx::FLOAT32);
    assert_eq!(
        typed.var_type(Name::intern("s")),
        Some(pool.index_tuple(2))
    );
}

#[test]
fn single_index_into_matrix_is_unsupported() {
    let (pool, registry) = session();
    let grid = pool.array(Idx::INT64, 2);
    let err = Specializer::new(&pool, &registry)
        .specialize_def(
            def("row", &["a"], vec![Stmt::ret(Expr::index(Expr::var("a"), Expr::int(0)))]),
            &[grid],
        )
        .unwrap_err();
    assert!(matches!(err, InferError::Type(TypeError::UnsupportedType(_))), "{err}");
}

#[test]
fn slices_become_slice_structs() {
    let (pool, registry) = session();
    let typed = Specializer::new(&pool, &registry)
        .specialize_def(
            def(
                "window",
                &["n"],
                vec![Stmt::ret(Expr::slice(Expr::int(0), Expr::var("n"), Expr::none()))],
            ),
            &[Idx::INT32],
        )
        .unwrap();
    assert_eq!(
        typed.return_type,
        pool.slice(Idx::INT64, Idx::INT32, Idx::NONE)
    );
}

#[test]
fn missing_attribute() {
    let (pool, registry) = session();
    let err = Specializer::new(&pool, &registry)
        .specialize_def(
            def("bad", &["a"], vec![Stmt::ret(Expr::attr(Expr::var("a"), "size"))]),
            &[pool.array(Idx::INT64, 1)],
        )
        .unwrap_err();
    assert!(matches!(err, InferError::NoSuchAttribute { .. }), "{err}");
}

// ── Control flow ──

#[test]
fn if_merge_combines_branches() {
    let (pool, registry) = session();
    let body = vec![
        Stmt::if_(
            Expr::var("c"),
            vec![Stmt::assign(Expr::var("r1"), Expr::var("a"))],
            vec![Stmt::assign(Expr::var("r2"), Expr::var("b"))],
            vec![Phi::new("r", Expr::var("r1"), Expr::var("r2"))],
        ),
        Stmt::ret(Expr::var("r")),
    ];
    let typed = Specializer::new(&pool, &registry)
        .specialize_def(
            def("pick", &["c", "a", "b"], body),
            &[Idx::BOOL, Idx::INT32, Idx::FLOAT32],
        )
        .unwrap();
    assert_eq!(typed.return_type, Idx::FLOAT64);
    assert_eq!(typed.var_type(Name::intern("r1")), Some(Idx::INT32));
}

#[test]
fn branch_local_variables_do_not_escape() {
    let (pool, registry) = session();
    let body = vec![
        Stmt::if_(
            Expr::var("c"),
            vec![Stmt::assign(Expr::var("t"), Expr::int(1))],
            vec![],
            vec![],
        ),
        Stmt::ret(Expr::var("t")),
    ];
    let err = Specializer::new(&pool, &registry)
        .specialize_def(def("leak", &["c"], body), &[Idx::BOOL])
        .unwrap_err();
    assert_eq!(
        err,
        InferError::UnboundVariable {
            func: Name::intern("leak"),
            name: Name::intern("t")
        }
    );
}

#[test]
fn missing_return_on_one_path_conflicts_with_value() {
    let (pool, registry) = session();
    let body = vec![Stmt::if_(
        Expr::var("c"),
        vec![Stmt::ret(Expr::var("c"))],
        vec![],
        vec![],
    )];
    let err = Specializer::new(&pool, &registry)
        .specialize_def(def("maybe", &["c"], body), &[Idx::INT64])
        .unwrap_err();
    assert!(matches!(err, InferError::Type(TypeError::IncompatibleTypes { .. })), "{err}");
}

#[test]
fn no_return_yields_none() {
    let (pool, registry) = session();
    let typed = Specializer::new(&pool, &registry)
        .specialize_def(
            def("noop", &["x"], vec![Stmt::run(Expr::var("x"))]),
            &[Idx::INT8],
        )
        .unwrap();
    assert_eq!(typed.return_type, Idx::NONE);
    assert!(matches!(typed.body.last(), Some(Stmt::Return(_))));
}

fn accumulate() -> Fn {
    def(
        "accumulate",
        &["n"],
        vec![
            Stmt::assign(Expr::var("i"), Expr::int(0)),
            Stmt::assign(Expr::var("acc0"), Expr::int(0)),
            Stmt::while_(
                Expr::prim(Prim::Less, vec![Expr::var("i"), Expr::var("n")]),
                vec![
                    Stmt::assign(Expr::var("acc1"), add(Expr::var("acc"), Expr::float(0.5))),
                    Stmt::assign(Expr::var("i"), add(Expr::var("i"), Expr::int(1))),
                ],
                vec![Phi::new("acc", Expr::var("acc0"), Expr::var("acc1"))],
            ),
            Stmt::ret(Expr::var("acc")),
        ],
    )
}

#[test]
fn loop_types_widen_to_a_fixed_point() {
    let (pool, registry) = session();
    let typed = Specializer::new(&pool, &registry)
        .specialize_def(accumulate(), &[Idx::INT64])
        .unwrap();
    assert_eq!(typed.return_type, Idx::FLOAT64);
    assert_eq!(typed.var_type(Name::intern("acc")), Some(Idx::FLOAT64));
    assert_eq!(typed.var_type(Name::intern("i")), Some(Idx::INT64));
}

#[test]
fn loop_iteration_limit_is_an_internal_error() {
    let (pool, registry) = session();
    let err = Specializer::new(&pool, &registry)
        .with_max_fixpoint_iterations(1)
        .specialize_def(accumulate(), &[Idx::INT64])
        .unwrap_err();
    assert!(err.is_internal(), "{err}");
    assert!(err.to_string().contains("did not converge"), "{err}");
}

// ── Assignment ──

#[test]
fn reassignment_narrows_into_the_existing_type() {
    let (pool, registry) = session();
    let typed = Specializer::new(&pool, &registry)
        .specialize_def(
            def(
                "narrow",
                &["small"],
                vec![
                    Stmt::assign(Expr::var("x"), Expr::int(0)),
                    Stmt::assign(Expr::var("x"), Expr::var("small")),
                    Stmt::ret(Expr::var("x")),
                ],
            ),
            &[Idx::INT8],
        )
        .unwrap();
    assert_eq!(typed.return_type, Idx::INT64);
}

#[test]
fn reassignment_to_a_wider_type_is_rejected() {
    let (pool, registry) = session();
    let err = Specializer::new(&pool, &registry)
        .specialize_def(
            def(
                "widen",
                &["x"],
                vec![
                    Stmt::assign(Expr::var("x"), Expr::float(1.5)),
                    Stmt::ret(Expr::var("x")),
                ],
            ),
            &[Idx::INT32],
        )
        .unwrap_err();
    assert!(matches!(err, InferError::Type(TypeError::IncompatibleTypes { .. })), "{err}");
}

#[test]
fn argument_count_must_match() {
    let (pool, registry) = session();
    let err = Specializer::new(&pool, &registry)
        .specialize_def(add1(), &[Idx::INT32, Idx::INT32])
        .unwrap_err();
    assert!(matches!(err, InferError::Ir(_)), "{err}");
    assert!(!err.is_internal());
}
