//! Lowered-grammar check.
//!
//! After lowering, no `Tuple`, `Array`, `Slice` or `Closure` node remains,
//! `FnRef` only appears as the callee of a direct call, every expression is
//! typed, casts are scalar, and stores target variables, attributes or
//! indexed storage.

use tern_ir::{Expr, ExprKind, Ice, Stmt, TypedFn};
use tern_types::{Tag, TypePool};

use crate::LowerError;

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;

pub fn verify_lowered(pool: &TypePool, func: &TypedFn) -> Result<(), LowerError> {
    Verifier { pool, func }.block(&func.body)
}

struct Verifier<'a> {
    pool: &'a TypePool,
    func: &'a TypedFn,
}

impl Verifier<'_> {
    fn reject(&self, message: impl Into<String>, node: &dyn std::fmt::Display) -> LowerError {
        Ice::new(
            "verify_lowered",
            format!("`{}` version {}: {}", self.func.name, self.func.version, message.into()),
        )
        .with_node(node)
        .into()
    }

    fn block(&self, block: &[Stmt]) -> Result<(), LowerError> {
        for stmt in block {
            match stmt {
                Stmt::Assign { lhs, rhs } => {
                    match &lhs.kind {
                        ExprKind::Var(_) => {}
                        ExprKind::Attribute { value, .. } => self.expr(value)?,
                        ExprKind::Index { .. } => self.expr(lhs)?,
                        _ => return Err(self.reject("store target is not lowered", stmt)),
                    }
                    self.expr(rhs)?;
                }
                Stmt::RunExpr(value) | Stmt::Return(value) => self.expr(value)?,
                Stmt::If {
                    cond,
                    then_block,
                    else_block,
                    merge,
                } => {
                    self.expr(cond)?;
                    self.block(then_block)?;
                    self.block(else_block)?;
                    for phi in merge {
                        self.expr(&phi.left)?;
                        self.expr(&phi.right)?;
                    }
                }
                Stmt::While { cond, body, merge } => {
                    self.expr(cond)?;
                    self.block(body)?;
                    for phi in merge {
                        self.expr(&phi.left)?;
                        self.expr(&phi.right)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn expr(&self, expr: &Expr) -> Result<(), LowerError> {
        let Some(ty) = expr.ty else {
            return Err(self.reject("untyped expression", expr));
        };
        match &expr.kind {
            ExprKind::Tuple(_) | ExprKind::Array(_) | ExprKind::Slice { .. } | ExprKind::Closure { .. } => {
                return Err(self.reject(format!("{} survived lowering", expr.variant_name()), expr));
            }
            ExprKind::FnRef(_) => {
                return Err(self.reject("function reference outside a call", expr));
            }
            ExprKind::Call {
                callee,
                args,
                target,
            } => {
                if target.is_none() || !args.is_positional_only() {
                    return Err(self.reject("call is not direct", expr));
                }
                if !matches!(callee.kind, ExprKind::FnRef(_)) {
                    return Err(self.reject("callee is not a function reference", expr));
                }
                for arg in &args.positional {
                    self.expr(arg)?;
                }
                return Ok(());
            }
            ExprKind::Index { value, index } => {
                let base = value.ty.map(|t| self.pool.tag(t));
                if !matches!(base, Some(Tag::Array | Tag::Pointer)) {
                    return Err(self.reject("index into a value without storage", expr));
                }
                if index.ty.and_then(|t| self.pool.as_scalar(t)).is_none() {
                    return Err(self.reject("index is not a flat offset", expr));
                }
            }
            ExprKind::Cast(_) => {
                if self.pool.as_scalar(ty).is_none() {
                    return Err(self.reject("composite cast survived lowering", expr));
                }
            }
            _ => {}
        }
        for child in expr.children() {
            self.expr(child)?;
        }
        Ok(())
    }
}
