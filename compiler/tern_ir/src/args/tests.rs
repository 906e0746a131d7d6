use pretty_assertions::assert_eq;
use tern_types::Name;

use super::{Bound, FormalArgs};
use crate::{Expr, IrError};

fn f() -> Name {
    Name::intern("f")
}

fn kw(name: &str, value: i32) -> (Name, i32) {
    (Name::intern(name), value)
}

// ── Validation ──

#[test]
fn duplicate_parameter_is_malformed() {
    let formals = FormalArgs::positional(&["x", "x"]);
    assert!(matches!(
        formals.validate(f()),
        Err(IrError::Malformed { .. })
    ));
}

#[test]
fn default_must_be_trailing() {
    let formals = FormalArgs::positional(&["x", "y"]).with_default("x", Expr::int(1));
    assert!(formals.validate(f()).is_err());
    let formals = FormalArgs::positional(&["x", "y"]).with_default("y", Expr::int(1));
    assert!(formals.validate(f()).is_ok());
}

#[test]
fn default_for_unknown_parameter_is_malformed() {
    let formals = FormalArgs::positional(&["x"]).with_default("z", Expr::int(1));
    assert!(formals.validate(f()).is_err());
}

// ── Binding ──

#[test]
fn positional_binding() {
    let formals = FormalArgs::positional(&["x", "y"]);
    let bound = formals.bind(f(), vec![], vec![1, 2], vec![]).unwrap();
    assert_eq!(bound, vec![Bound::Value(1), Bound::Value(2)]);
}

#[test]
fn keywords_and_defaults() {
    let formals = FormalArgs::positional(&["x", "y", "z"]).with_default("z", Expr::int(7));
    let bound = formals
        .bind(f(), vec![], vec![1], vec![kw("y", 2)])
        .unwrap();
    assert_eq!(
        bound,
        vec![
            Bound::Value(1),
            Bound::Value(2),
            Bound::Default(Expr::int(7))
        ]
    );
}

#[test]
fn partials_fill_nonlocals_first() {
    let formals = FormalArgs::positional(&["x"]).with_nonlocals(&["captured"]);
    let bound = formals.bind(f(), vec![10], vec![1], vec![]).unwrap();
    assert_eq!(bound, vec![Bound::Value(10), Bound::Value(1)]);
    assert_eq!(formals.arity(), 2);
}

#[test]
fn surplus_goes_to_starargs() {
    let formals = FormalArgs::positional(&["x"]).with_starargs("rest");
    let bound = formals.bind(f(), vec![], vec![1, 2, 3], vec![]).unwrap();
    assert_eq!(bound, vec![Bound::Value(1), Bound::Packed(vec![2, 3])]);

    let bound = formals.bind(f(), vec![], vec![1], vec![]).unwrap();
    assert_eq!(bound, vec![Bound::Value(1), Bound::Packed(vec![])]);
}

#[test]
fn binding_errors() {
    let formals = FormalArgs::positional(&["x", "y"]);
    let too_many = formals.bind(f(), vec![], vec![1, 2, 3], vec![]);
    assert!(matches!(too_many, Err(IrError::ArgumentBinding { .. })));

    let missing = formals.bind(f(), vec![], vec![1], vec![]).unwrap_err();
    assert_eq!(missing.to_string(), "cannot call `f`: missing argument `y`");

    let twice = formals.bind(f(), vec![], vec![1, 2], vec![kw("x", 3)]);
    assert!(twice.is_err());

    let unknown = formals.bind(f(), vec![], vec![1, 2], vec![kw("w", 3)]);
    assert!(unknown.is_err());
}
