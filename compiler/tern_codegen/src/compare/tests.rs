use cranelift::prelude::{FloatCC, IntCC};
use pretty_assertions::assert_eq;
use tern_ir::Prim;
use tern_types::Scalar;

use super::{comparison_opcode, Comparison, OperandClass};

const COMPARISONS: [Prim; 6] = [
    Prim::Equal,
    Prim::NotEqual,
    Prim::Greater,
    Prim::GreaterEqual,
    Prim::Less,
    Prim::LessEqual,
];

#[test]
fn operand_class_follows_scalar_kind() {
    assert_eq!(OperandClass::of(Scalar::INT8), OperandClass::Signed);
    assert_eq!(OperandClass::of(Scalar::UINT64), OperandClass::Unsigned);
    assert_eq!(OperandClass::of(Scalar::BOOL), OperandClass::Unsigned);
    assert_eq!(OperandClass::of(Scalar::FLOAT32), OperandClass::Float);
}

#[test]
fn signed_table() {
    assert_eq!(
        comparison_opcode(Prim::Greater, OperandClass::Signed),
        Some(Comparison::Int(IntCC::SignedGreaterThan))
    );
    assert_eq!(
        comparison_opcode(Prim::LessEqual, OperandClass::Signed),
        Some(Comparison::Int(IntCC::SignedLessThanOrEqual))
    );
}

#[test]
fn unsigned_table() {
    assert_eq!(
        comparison_opcode(Prim::Less, OperandClass::Unsigned),
        Some(Comparison::Int(IntCC::UnsignedLessThan))
    );
    assert_eq!(
        comparison_opcode(Prim::GreaterEqual, OperandClass::Unsigned),
        Some(Comparison::Int(IntCC::UnsignedGreaterThanOrEqual))
    );
}

#[test]
fn float_table_is_ordered() {
    assert_eq!(
        comparison_opcode(Prim::NotEqual, OperandClass::Float),
        Some(Comparison::Float(FloatCC::OrderedNotEqual))
    );
    assert_eq!(
        comparison_opcode(Prim::Greater, OperandClass::Float),
        Some(Comparison::Float(FloatCC::GreaterThan))
    );
}

#[test]
fn equality_is_sign_agnostic() {
    for op in [Prim::Equal, Prim::NotEqual] {
        assert_eq!(
            comparison_opcode(op, OperandClass::Signed),
            comparison_opcode(op, OperandClass::Unsigned)
        );
    }
}

#[test]
fn ordering_differs_by_signedness() {
    for op in &COMPARISONS[2..] {
        assert_ne!(
            comparison_opcode(*op, OperandClass::Signed),
            comparison_opcode(*op, OperandClass::Unsigned),
            "{op:?}"
        );
    }
}

#[test]
fn every_class_covers_every_comparison() {
    for class in [OperandClass::Signed, OperandClass::Unsigned, OperandClass::Float] {
        for op in COMPARISONS {
            assert!(comparison_opcode(op, class).is_some(), "{op:?} on {class:?}");
        }
    }
}

#[test]
fn non_comparisons_have_no_opcode() {
    assert_eq!(comparison_opcode(Prim::Add, OperandClass::Signed), None);
    assert_eq!(comparison_opcode(Prim::LogicalAnd, OperandClass::Float), None);
}
