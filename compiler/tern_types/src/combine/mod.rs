//! Least upper bound of two types.

use crate::{Idx, Scalar, ScalarKind, TypeData, TypeError, TypePool};

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;

impl TypePool {
    /// The smallest type both `left` and `right` convert to without loss,
    /// or `IncompatibleTypes`.
    pub fn combine(&self, left: Idx, right: Idx) -> Result<Idx, TypeError> {
        if left == right {
            return Ok(left);
        }

        if let (Some(a), Some(b)) = (self.as_scalar(left), self.as_scalar(right)) {
            return self.scalar(combine_scalars(a, b));
        }

        match (self.get(left), self.get(right)) {
            (TypeData::Tuple(a), TypeData::Tuple(b)) if a.len() == b.len() => {
                let elems = a
                    .iter()
                    .zip(b.iter())
                    .map(|(&x, &y)| self.combine(x, y))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|_| self.incompatible(left, right))?;
                Ok(self.tuple(&elems))
            }
            (
                TypeData::Struct {
                    name: name_a,
                    fields: fields_a,
                },
                TypeData::Struct {
                    name: name_b,
                    fields: fields_b,
                },
            ) if name_a == name_b
                && fields_a.len() == fields_b.len()
                && fields_a
                    .iter()
                    .zip(fields_b.iter())
                    .all(|((x, _), (y, _))| x == y) =>
            {
                let fields = fields_a
                    .iter()
                    .zip(fields_b.iter())
                    .map(|(&(field, x), &(_, y))| Ok((field, self.combine(x, y)?)))
                    .collect::<Result<Vec<_>, TypeError>>()
                    .map_err(|_| self.incompatible(left, right))?;
                Ok(self.struct_type(name_a, &fields))
            }
            (
                TypeData::Closure {
                    target: target_a,
                    partial: partial_a,
                },
                TypeData::Closure {
                    target: target_b,
                    partial: partial_b,
                },
            ) if target_a == target_b && partial_a.len() == partial_b.len() => {
                let partial = partial_a
                    .iter()
                    .zip(partial_b.iter())
                    .map(|(&x, &y)| self.combine(x, y))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|_| self.incompatible(left, right))?;
                Ok(self.closure(target_a, &partial))
            }
            _ => Err(self.incompatible(left, right)),
        }
    }

    /// Fold [`combine`](Self::combine) over a sequence; `None` when it is empty.
    pub fn combine_all(&self, types: impl IntoIterator<Item = Idx>) -> Result<Option<Idx>, TypeError> {
        let mut acc = None;
        for ty in types {
            acc = Some(match acc {
                None => ty,
                Some(prev) => self.combine(prev, ty)?,
            });
        }
        Ok(acc)
    }

    /// Whether a value of type `from` can be converted to `to`.
    ///
    /// Scalars convert freely; composites convert element-wise when their
    /// shapes agree; everything else converts only to itself.
    pub fn castable(&self, from: Idx, to: Idx) -> bool {
        if from == to {
            return true;
        }
        if self.as_scalar(from).is_some() && self.as_scalar(to).is_some() {
            return true;
        }
        match (self.get(from), self.get(to)) {
            (TypeData::Tuple(a), TypeData::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(&x, &y)| self.castable(x, y))
            }
            (
                TypeData::Struct {
                    name: name_a,
                    fields: fields_a,
                },
                TypeData::Struct {
                    name: name_b,
                    fields: fields_b,
                },
            ) => {
                name_a == name_b
                    && fields_a.len() == fields_b.len()
                    && fields_a
                        .iter()
                        .zip(fields_b.iter())
                        .all(|(&(x, tx), &(y, ty))| x == y && self.castable(tx, ty))
            }
            (
                TypeData::Closure {
                    target: target_a,
                    partial: partial_a,
                },
                TypeData::Closure {
                    target: target_b,
                    partial: partial_b,
                },
            ) => {
                target_a == target_b
                    && partial_a.len() == partial_b.len()
                    && partial_a
                        .iter()
                        .zip(partial_b.iter())
                        .all(|(&x, &y)| self.castable(x, y))
            }
            _ => false,
        }
    }

    /// An `IncompatibleTypes` error with both types rendered.
    pub fn incompatible(&self, left: Idx, right: Idx) -> TypeError {
        TypeError::IncompatibleTypes {
            left,
            right,
            left_name: self.render(left),
            right_name: self.render(right),
        }
    }
}

/// Numeric promotion between two scalars.
pub fn combine_scalars(a: Scalar, b: Scalar) -> Scalar {
    use ScalarKind::{Bool, Float, Int, UInt};

    if a == b {
        return a;
    }
    match (a.kind, b.kind) {
        (Bool, _) => b,
        (_, Bool) => a,
        (Float, Float) | (Int, Int) | (UInt, UInt) => Scalar::new(a.kind, a.bits.max(b.bits)),
        (Float, Int | UInt) => promote_to_float(a, b),
        (Int | UInt, Float) => promote_to_float(b, a),
        (Int, UInt) => mixed_sign(a, b),
        (UInt, Int) => mixed_sign(b, a),
    }
}

fn promote_to_float(float: Scalar, int: Scalar) -> Scalar {
    let needed = int.bits.saturating_mul(2).min(64);
    Scalar::new(ScalarKind::Float, float.bits.max(needed).max(32))
}

fn mixed_sign(signed: Scalar, unsigned: Scalar) -> Scalar {
    let needed = unsigned.bits.saturating_mul(2).min(64);
    Scalar::new(ScalarKind::Int, signed.bits.max(needed))
}
