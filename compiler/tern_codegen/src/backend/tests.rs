use pretty_assertions::assert_eq;
use tern_infer::Specializer;
use tern_ir::{ActualArgs, Expr, FormalArgs, Fn, Phi, Prim, Registry, Stmt};
use tern_rt::{codec_for, InvocationScope, Value};
use tern_types::{Idx, TypePool};

use super::{BackendOptions, JitBackend, OptLevel};

fn def(name: &str, params: &[&str], body: Vec<Stmt>) -> Fn {
    Fn::new(name, FormalArgs::positional(params), body).unwrap()
}

fn add(a: Expr, b: Expr) -> Expr {
    Expr::prim(Prim::Add, vec![a, b])
}

struct Fixture {
    pool: TypePool,
    registry: Registry,
    backend: JitBackend,
}

impl Fixture {
    fn new() -> Self {
        Self::with_options(BackendOptions {
            opt_level: OptLevel::Speed,
            verify: true,
        })
    }

    fn with_options(options: BackendOptions) -> Self {
        Fixture {
            pool: TypePool::new(),
            registry: Registry::new(),
            backend: JitBackend::new(options),
        }
    }

    /// Specialize, compile and run `func` on `args`.
    fn run(&self, func: Fn, args: &[Value]) -> Value {
        let types: Vec<Idx> = args
            .iter()
            .map(|v| tern_rt::typeof_value(&self.pool, v).unwrap())
            .collect();
        let typed = Specializer::new(&self.pool, &self.registry)
            .specialize_def(func, &types)
            .unwrap();
        let callable = self
            .backend
            .generate(&self.pool, &self.registry, &typed)
            .unwrap();
        let _scope = InvocationScope::enter(1);
        let words: Vec<u64> = args
            .iter()
            .zip(&types)
            .map(|(v, &t)| codec_for(&self.pool, t).unwrap().encode(v).unwrap())
            .collect();
        let codec = codec_for(&self.pool, callable.return_type()).unwrap();
        // SAFETY: the words encode the declared input types and the scope
        // keeps every record alive until the result is decoded.
        unsafe {
            let word = callable.call_words(&words).unwrap();
            codec.decode(word).unwrap()
        }
    }
}

fn add1() -> Fn {
    def("add1", &["x"], vec![Stmt::ret(add(Expr::var("x"), Expr::int(1)))])
}

#[test]
fn scalar_function_runs() {
    let fixture = Fixture::new();
    assert_eq!(fixture.run(add1(), &[Value::I64(41)]), Value::I64(42));
}

#[test]
fn narrow_and_float_inputs_widen() {
    let fixture = Fixture::new();
    assert_eq!(fixture.run(add1(), &[Value::I32(-3)]), Value::I64(-2));
    assert_eq!(fixture.run(add1(), &[Value::F32(0.5)]), Value::F64(1.5));
    assert_eq!(fixture.run(add1(), &[Value::Bool(true)]), Value::I64(2));
}

#[test]
fn compiled_code_is_cached() {
    let fixture = Fixture::new();
    let typed = Specializer::new(&fixture.pool, &fixture.registry)
        .specialize_def(add1(), &[Idx::INT64])
        .unwrap();
    let first = fixture
        .backend
        .generate(&fixture.pool, &fixture.registry, &typed)
        .unwrap();
    let count = fixture.backend.compiled_count();
    let second = fixture
        .backend
        .generate(&fixture.pool, &fixture.registry, &typed)
        .unwrap();
    assert_eq!(fixture.backend.compiled_count(), count);
    assert_eq!(first.version(), second.version());
    assert_eq!(first.version(), 1, "the lowered version is compiled");
}

#[test]
fn callees_are_compiled_and_linked() {
    let fixture = Fixture::new();
    let twice = def(
        "twice",
        &["y"],
        vec![Stmt::ret(Expr::call(
            Expr::fn_ref("add1"),
            ActualArgs::positional(vec![Expr::call(
                Expr::fn_ref("add1"),
                ActualArgs::positional(vec![Expr::var("y")]),
            )]),
        ))],
    );
    fixture.registry.define(add1()).unwrap();
    assert_eq!(fixture.run(twice, &[Value::I64(5)]), Value::I64(7));
    assert_eq!(fixture.backend.compiled_count(), 2);
}

#[test]
fn comparisons_return_bools() {
    let fixture = Fixture::new();
    let less = def(
        "less",
        &["a", "b"],
        vec![Stmt::ret(Expr::prim(
            Prim::Less,
            vec![Expr::var("a"), Expr::var("b")],
        ))],
    );
    assert_eq!(
        fixture.run(less, &[Value::U8(200), Value::U8(3)]),
        Value::Bool(false)
    );
    let less = def(
        "less_signed",
        &["a", "b"],
        vec![Stmt::ret(Expr::prim(
            Prim::Less,
            vec![Expr::var("a"), Expr::var("b")],
        ))],
    );
    assert_eq!(
        fixture.run(less, &[Value::I8(-56), Value::I8(3)]),
        Value::Bool(true)
    );
}

#[test]
fn loops_carry_phis() {
    let fixture = Fixture::new();
    let sum = def(
        "sum_to",
        &["n"],
        vec![
            Stmt::assign(Expr::var("i"), Expr::int(0)),
            Stmt::assign(Expr::var("acc0"), Expr::int(0)),
            Stmt::while_(
                Expr::prim(Prim::Less, vec![Expr::var("i"), Expr::var("n")]),
                vec![
                    Stmt::assign(Expr::var("acc1"), add(Expr::var("acc"), Expr::var("i"))),
                    Stmt::assign(Expr::var("i"), add(Expr::var("i"), Expr::int(1))),
                ],
                vec![Phi::new("acc", Expr::var("acc0"), Expr::var("acc1"))],
            ),
            Stmt::ret(Expr::var("acc")),
        ],
    );
    assert_eq!(fixture.run(sum, &[Value::I64(10)]), Value::I64(45));
}

#[test]
fn tuples_return_through_a_record() {
    let fixture = Fixture::new();
    let swap = def(
        "swap",
        &["a", "b"],
        vec![Stmt::ret(Expr::tuple(vec![Expr::var("b"), Expr::var("a")]))],
    );
    assert_eq!(
        fixture.run(swap, &[Value::I8(1), Value::F64(2.5)]),
        Value::Tuple(vec![Value::F64(2.5), Value::I8(1)])
    );
}

#[test]
fn unoptimized_code_agrees() {
    let fixture = Fixture::with_options(BackendOptions {
        opt_level: OptLevel::None,
        verify: true,
    });
    assert_eq!(fixture.run(add1(), &[Value::I64(-1)]), Value::I64(0));
}

#[test]
fn num_cores_reads_the_invocation_setting() {
    let fixture = Fixture::new();
    let cores = def("cores", &[], vec![Stmt::ret(Expr::num_cores())]);
    assert_eq!(fixture.run(cores, &[]), Value::I64(1));
}
