//! Comparison opcode selection.
//!
//! Three independent tables map the six comparison primitives to Cranelift
//! condition codes: signed integers, unsigned integers (which include
//! `bool`) and floats. Float comparisons are ordered, so any comparison
//! involving NaN is false.

use cranelift::prelude::{FloatCC, IntCC};
use tern_ir::Prim;
use tern_types::{Scalar, ScalarKind};

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;

/// Which table an operand type selects.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OperandClass {
    Signed,
    Unsigned,
    Float,
}

impl OperandClass {
    pub fn of(scalar: Scalar) -> Self {
        match scalar.kind {
            ScalarKind::Int => OperandClass::Signed,
            ScalarKind::UInt | ScalarKind::Bool => OperandClass::Unsigned,
            ScalarKind::Float => OperandClass::Float,
        }
    }
}

/// A condition code for `icmp` or `fcmp`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Comparison {
    Int(IntCC),
    Float(FloatCC),
}

const SIGNED: [(Prim, IntCC); 6] = [
    (Prim::Equal, IntCC::Equal),
    (Prim::NotEqual, IntCC::NotEqual),
    (Prim::Greater, IntCC::SignedGreaterThan),
    (Prim::GreaterEqual, IntCC::SignedGreaterThanOrEqual),
    (Prim::Less, IntCC::SignedLessThan),
    (Prim::LessEqual, IntCC::SignedLessThanOrEqual),
];

const UNSIGNED: [(Prim, IntCC); 6] = [
    (Prim::Equal, IntCC::Equal),
    (Prim::NotEqual, IntCC::NotEqual),
    (Prim::Greater, IntCC::UnsignedGreaterThan),
    (Prim::GreaterEqual, IntCC::UnsignedGreaterThanOrEqual),
    (Prim::Less, IntCC::UnsignedLessThan),
    (Prim::LessEqual, IntCC::UnsignedLessThanOrEqual),
];

const FLOAT: [(Prim, FloatCC); 6] = [
    (Prim::Equal, FloatCC::Equal),
    (Prim::NotEqual, FloatCC::OrderedNotEqual),
    (Prim::Greater, FloatCC::GreaterThan),
    (Prim::GreaterEqual, FloatCC::GreaterThanOrEqual),
    (Prim::Less, FloatCC::LessThan),
    (Prim::LessEqual, FloatCC::LessThanOrEqual),
];

fn lookup<C: Copy>(table: &[(Prim, C)], op: Prim) -> Option<C> {
    table.iter().find(|&&(p, _)| p == op).map(|&(_, cc)| cc)
}

/// The condition code for comparison `op` on operands of `class`, or
/// `None` if `op` is not a comparison.
pub fn comparison_opcode(op: Prim, class: OperandClass) -> Option<Comparison> {
    match class {
        OperandClass::Signed => lookup(&SIGNED, op).map(Comparison::Int),
        OperandClass::Unsigned => lookup(&UNSIGNED, op).map(Comparison::Int),
        OperandClass::Float => lookup(&FLOAT, op).map(Comparison::Float),
    }
}
