//! Scalar constants, conversions and primitive operators.
//!
//! `bool` is an `i8` holding 0 or 1 and behaves as an unsigned integer.
//! Integer division and remainder truncate toward zero.

use cranelift::prelude::*;
use tern_ir::{ConstValue, Prim};
use tern_types::{Scalar, ScalarKind};

use crate::compare::{comparison_opcode, Comparison, OperandClass};

pub(super) fn scalar_type(scalar: Scalar) -> Type {
    match (scalar.kind, scalar.bits) {
        (ScalarKind::Float, 32) => types::F32,
        (ScalarKind::Float, _) => types::F64,
        (_, 8) => types::I8,
        (_, 16) => types::I16,
        (_, 32) => types::I32,
        _ => types::I64,
    }
}

pub(super) fn zero(builder: &mut FunctionBuilder<'_>, ty: Type) -> Value {
    if ty == types::F32 {
        builder.ins().f32const(0.0)
    } else if ty == types::F64 {
        builder.ins().f64const(0.0)
    } else {
        builder.ins().iconst(ty, 0)
    }
}

/// `value` truncated to `bits` and zero-extended, as narrow immediates
/// must be.
fn immediate(value: i64, bits: u8) -> i64 {
    if bits >= 64 {
        value
    } else {
        value & ((1i64 << bits) - 1)
    }
}

#[expect(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    reason = "literals convert with the same semantics as runtime casts"
)]
pub(super) fn constant(builder: &mut FunctionBuilder<'_>, value: ConstValue, scalar: Scalar) -> Value {
    let ty = scalar_type(scalar);
    match (value, scalar.kind) {
        (ConstValue::Float(x), ScalarKind::Float) => float_const(builder, ty, x),
        (ConstValue::Int(i), ScalarKind::Float) => float_const(builder, ty, i as f64),
        (ConstValue::Bool(b), ScalarKind::Float) => float_const(builder, ty, f64::from(u8::from(b))),
        (ConstValue::Float(x), ScalarKind::Bool) => builder.ins().iconst(ty, i64::from(x != 0.0)),
        (ConstValue::Int(i), ScalarKind::Bool) => builder.ins().iconst(ty, i64::from(i != 0)),
        (ConstValue::Bool(b), _) => builder.ins().iconst(ty, i64::from(b)),
        (ConstValue::Int(i), _) => builder.ins().iconst(ty, immediate(i, scalar.bits)),
        (ConstValue::Float(x), _) => builder.ins().iconst(ty, immediate(x as i64, scalar.bits)),
        (ConstValue::None, _) => builder.ins().iconst(ty, 0),
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "float32 literals round to the nearest representable value"
)]
fn float_const(builder: &mut FunctionBuilder<'_>, ty: Type, x: f64) -> Value {
    if ty == types::F32 {
        builder.ins().f32const(x as f32)
    } else {
        builder.ins().f64const(x)
    }
}

/// Convert `value` from one scalar type to another.
///
/// Float-to-integer conversion saturates; NaN becomes zero.
pub(super) fn convert(builder: &mut FunctionBuilder<'_>, value: Value, from: Scalar, to: Scalar) -> Value {
    if from == to {
        return value;
    }
    let to_ty = scalar_type(to);
    match (from.kind, to.kind) {
        (ScalarKind::Float, ScalarKind::Bool) => {
            let zero = zero(builder, scalar_type(from));
            builder.ins().fcmp(FloatCC::NotEqual, value, zero)
        }
        (_, ScalarKind::Bool) => builder.ins().icmp_imm(IntCC::NotEqual, value, 0),
        (ScalarKind::Float, ScalarKind::Float) => {
            if to.bits > from.bits {
                builder.ins().fpromote(to_ty, value)
            } else {
                builder.ins().fdemote(to_ty, value)
            }
        }
        (ScalarKind::Float, _) => {
            // Saturating conversions only produce 32- and 64-bit integers.
            let wide = if to.bits < 32 { types::I32 } else { to_ty };
            let converted = if to.is_signed() {
                builder.ins().fcvt_to_sint_sat(wide, value)
            } else {
                builder.ins().fcvt_to_uint_sat(wide, value)
            };
            if wide == to_ty {
                converted
            } else {
                builder.ins().ireduce(to_ty, converted)
            }
        }
        (_, ScalarKind::Float) => {
            if from.is_signed() {
                builder.ins().fcvt_from_sint(to_ty, value)
            } else {
                builder.ins().fcvt_from_uint(to_ty, value)
            }
        }
        _ if to.bits > from.bits => {
            if from.is_signed() {
                builder.ins().sextend(to_ty, value)
            } else {
                builder.ins().uextend(to_ty, value)
            }
        }
        _ if to.bits < from.bits => builder.ins().ireduce(to_ty, value),
        // Same width, different signedness: the bits are reinterpreted.
        _ => value,
    }
}

/// Emit primitive `op` on `args`, all of scalar type `operand`.
///
/// Returns `None` for an operator or arity with no code.
pub(super) fn prim(builder: &mut FunctionBuilder<'_>, op: Prim, operand: Scalar, args: &[Value]) -> Option<Value> {
    let class = OperandClass::of(operand);
    if op.is_comparison() {
        let &[a, b] = args else { return None };
        return Some(match comparison_opcode(op, class)? {
            Comparison::Int(cc) => builder.ins().icmp(cc, a, b),
            Comparison::Float(cc) => builder.ins().fcmp(cc, a, b),
        });
    }
    if op.is_logical() {
        let truth: Vec<Value> = args
            .iter()
            .map(|&v| convert(builder, v, operand, Scalar::BOOL))
            .collect();
        return Some(match (op, truth.as_slice()) {
            (Prim::LogicalAnd, &[a, b]) => builder.ins().band(a, b),
            (Prim::LogicalOr, &[a, b]) => builder.ins().bor(a, b),
            (Prim::LogicalNot, &[a]) => builder.ins().icmp_imm(IntCC::Equal, a, 0),
            _ => return None,
        });
    }

    if let &[a] = args {
        return match (op, class) {
            (Prim::Negative, OperandClass::Float) => Some(builder.ins().fneg(a)),
            (Prim::Negative, _) => Some(builder.ins().ineg(a)),
            _ => None,
        };
    }
    let &[a, b] = args else { return None };
    if (op, class) == (Prim::Modulo, OperandClass::Float) {
        let quotient = builder.ins().fdiv(a, b);
        let whole = builder.ins().trunc(quotient);
        let product = builder.ins().fmul(whole, b);
        return Some(builder.ins().fsub(a, product));
    }
    let ins = builder.ins();
    Some(match (op, class) {
        (Prim::Add, OperandClass::Float) => ins.fadd(a, b),
        (Prim::Add, _) => ins.iadd(a, b),
        (Prim::Subtract, OperandClass::Float) => ins.fsub(a, b),
        (Prim::Subtract, _) => ins.isub(a, b),
        (Prim::Multiply, OperandClass::Float) => ins.fmul(a, b),
        (Prim::Multiply, _) => ins.imul(a, b),
        (Prim::Divide, OperandClass::Float) => ins.fdiv(a, b),
        (Prim::Divide, OperandClass::Signed) => ins.sdiv(a, b),
        (Prim::Divide, OperandClass::Unsigned) => ins.udiv(a, b),
        (Prim::Modulo, OperandClass::Signed) => ins.srem(a, b),
        (Prim::Modulo, OperandClass::Unsigned) => ins.urem(a, b),
        (Prim::Maximum, OperandClass::Float) => ins.fmax(a, b),
        (Prim::Maximum, OperandClass::Signed) => ins.smax(a, b),
        (Prim::Maximum, OperandClass::Unsigned) => ins.umax(a, b),
        (Prim::Minimum, OperandClass::Float) => ins.fmin(a, b),
        (Prim::Minimum, OperandClass::Signed) => ins.smin(a, b),
        (Prim::Minimum, OperandClass::Unsigned) => ins.umin(a, b),
        _ => return None,
    })
}
