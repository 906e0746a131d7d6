//! Rewrite typed IR into explicit storage and projections.
//!
//! Composite values become `Struct` nodes, reads out of them become
//! `TupleProj`/`ClosureField` projections, array literals become an `Alloc`
//! plus element stores, and calls through closures become direct calls with
//! the captured arguments prepended. Expressions that need helper
//! statements push them to the output block ahead of the statement that
//! uses them, binding intermediate values to `$`-prefixed temporaries.

use std::sync::Arc;

use tern_ir::{
    ensure_sufficient_stack, ActualArgs, Block, ConstValue, Expr, ExprKind, Ice, Name, Phi,
    Registry, Stmt, TransformFlags, TypeEnv, TypedFn,
};
use tern_types::{Idx, Tag, TypeData, TypePool};

use crate::{verify_lowered, LowerError};

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]

/// Lower `func` and register the result as its next version.
///
/// A function whose latest version is already lowered is returned as is.
pub fn lower(pool: &TypePool, registry: &Registry, func: &TypedFn) -> Result<Arc<TypedFn>, LowerError> {
    let _compiling = registry.compile_lock();
    if let Some(latest) = registry.latest(func.name) {
        if latest.is_lowered() {
            tracing::debug!(func = %func.name, version = latest.version, "already lowered");
            return Ok(latest);
        }
    }

    let span = tracing::debug_span!("lower", func = %func.name, version = func.version);
    let _guard = span.enter();

    let mut lowerer = Lowerer {
        pool,
        registry,
        func: func.name,
        type_env: func.type_env.clone(),
        temps: 0,
    };
    let body = lowerer.block(&func.body)?;
    let version = registry.next_version(func.name);
    let mut lowered = func.next_version(version, body, lowerer.type_env, "lower");
    lowered.flags |= TransformFlags::LOWERED;
    verify_lowered(pool, &lowered)?;

    let lowered = registry.register(lowered)?;
    tracing::debug!(temps = lowerer.temps, "lowered");
    Ok(lowered)
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "field positions are bounded by the interned type's arity"
)]
fn field_index(i: usize) -> u32 {
    i as u32
}

fn int(value: usize) -> Expr {
    Expr::typed(
        ExprKind::Const(ConstValue::Int(i64::try_from(value).unwrap_or(i64::MAX))),
        Idx::INT64,
    )
}

struct Lowerer<'a> {
    pool: &'a TypePool,
    registry: &'a Registry,
    func: Name,
    type_env: TypeEnv,
    temps: u32,
}

impl Lowerer<'_> {
    fn ice(&self, message: impl Into<String>) -> Ice {
        Ice::new("lower", format!("in `{}`: {}", self.func, message.into())).with_type_env(
            self.type_env
                .iter()
                .map(|(&name, &ty)| (name, self.pool.render(ty))),
        )
    }

    fn ty(&self, expr: &Expr) -> Result<Idx, LowerError> {
        expr.ty
            .ok_or_else(|| self.ice("untyped expression").with_node(expr).into())
    }

    fn temp(&mut self, hint: &str, ty: Idx) -> Expr {
        let name = Name::intern(&format!("${hint}{}", self.temps));
        self.temps += 1;
        self.type_env.insert(name, ty);
        Expr::typed(ExprKind::Var(name), ty)
    }

    /// Bind `value` to a temporary unless it already is a variable.
    fn spill(&mut self, value: Expr, hint: &str, out: &mut Block) -> Result<Expr, LowerError> {
        if value.as_var().is_some() {
            return Ok(value);
        }
        let temp = self.temp(hint, self.ty(&value)?);
        out.push(Stmt::assign(temp.clone(), value));
        Ok(temp)
    }

    // ── Statements ──

    fn block(&mut self, block: &[Stmt]) -> Result<Block, LowerError> {
        let mut out = Vec::with_capacity(block.len());
        for stmt in block {
            self.stmt(stmt, &mut out)?;
        }
        Ok(out)
    }

    fn stmt(&mut self, stmt: &Stmt, out: &mut Block) -> Result<(), LowerError> {
        ensure_sufficient_stack(|| match stmt {
            Stmt::Assign { lhs, rhs } => {
                let rhs = self.expr(rhs, out)?;
                self.assign(lhs, rhs, out)
            }
            Stmt::RunExpr(value) => {
                let value = self.expr(value, out)?;
                out.push(Stmt::RunExpr(value));
                Ok(())
            }
            Stmt::Return(value) => {
                let value = self.expr(value, out)?;
                out.push(Stmt::Return(value));
                Ok(())
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
                merge,
            } => {
                let cond = self.expr(cond, out)?;
                let mut then_block = self.block(then_block)?;
                let mut else_block = self.block(else_block)?;
                let mut phis = Vec::with_capacity(merge.len());
                for phi in merge {
                    let left = self.expr(&phi.left, &mut then_block)?;
                    let right = self.expr(&phi.right, &mut else_block)?;
                    phis.push(Phi {
                        target: phi.target,
                        left,
                        right,
                    });
                }
                out.push(Stmt::If {
                    cond,
                    then_block,
                    else_block,
                    merge: phis,
                });
                Ok(())
            }
            Stmt::While { cond, body, merge } => {
                let lefts = merge
                    .iter()
                    .map(|phi| self.expr(&phi.left, out))
                    .collect::<Result<Vec<_>, _>>()?;

                let mut prelude = Vec::new();
                let lowered_cond = self.expr(cond, &mut prelude)?;

                let mut body = self.block(body)?;
                let rights = merge
                    .iter()
                    .map(|phi| self.expr(&phi.right, &mut body))
                    .collect::<Result<Vec<_>, _>>()?;

                if prelude.is_empty() {
                    let phis = merge
                        .iter()
                        .zip(lefts.into_iter().zip(rights))
                        .map(|(phi, (left, right))| Phi {
                            target: phi.target,
                            left,
                            right,
                        })
                        .collect();
                    out.push(Stmt::While {
                        cond: lowered_cond,
                        body,
                        merge: phis,
                    });
                    return Ok(());
                }

                // The condition's statements run before the first test and
                // after every iteration, once the carried values are updated.
                // The phis become explicit copies around them.
                self.copy_parallel(merge, lefts, out)?;
                let flag = self.temp("cond", self.ty(&lowered_cond)?);
                out.extend(prelude.iter().cloned());
                out.push(Stmt::assign(flag.clone(), lowered_cond.clone()));

                self.copy_parallel(merge, rights, &mut body)?;
                body.extend(prelude);
                body.push(Stmt::assign(flag.clone(), lowered_cond));

                out.push(Stmt::While {
                    cond: flag,
                    body,
                    merge: Vec::new(),
                });
                Ok(())
            }
        })
    }

    /// Assign `values` to the phi targets of `merge` as one parallel copy.
    fn copy_parallel(&mut self, merge: &[Phi], values: Vec<Expr>, out: &mut Block) -> Result<(), LowerError> {
        let mut staged = Vec::with_capacity(values.len());
        for value in values {
            let temp = self.temp("phi", self.ty(&value)?);
            out.push(Stmt::assign(temp.clone(), value));
            staged.push(temp);
        }
        for (phi, value) in merge.iter().zip(staged) {
            let ty = self
                .type_env
                .get(&phi.target)
                .copied()
                .ok_or_else(|| self.ice(format!("phi target `{}` has no type", phi.target)))?;
            out.push(Stmt::assign(Expr::typed(ExprKind::Var(phi.target), ty), value));
        }
        Ok(())
    }

    fn assign(&mut self, lhs: &Expr, rhs: Expr, out: &mut Block) -> Result<(), LowerError> {
        let ty = self.ty(lhs)?;
        match &lhs.kind {
            ExprKind::Var(_) => out.push(Stmt::assign(lhs.clone(), rhs)),
            ExprKind::Tuple(targets) => {
                let source = self.spill(rhs, "unpack", out)?;
                for (i, target) in targets.iter().enumerate() {
                    let projection = Expr::typed(
                        ExprKind::TupleProj {
                            tuple: Box::new(source.clone()),
                            index: field_index(i),
                        },
                        self.ty(target)?,
                    );
                    self.assign(target, projection, out)?;
                }
            }
            ExprKind::Attribute { value, name } => {
                let value = self.expr(value, out)?;
                let lhs = Expr::typed(
                    ExprKind::Attribute {
                        value: Box::new(value),
                        name: *name,
                    },
                    ty,
                );
                out.push(Stmt::assign(lhs, rhs));
            }
            ExprKind::Index { value, index } => {
                let lhs = self.index(value, index, ty, out)?;
                out.push(Stmt::assign(lhs, rhs));
            }
            _ => {
                return Err(self
                    .ice(format!("no lowering for a {} store", lhs.variant_name()))
                    .with_node(lhs)
                    .into())
            }
        }
        Ok(())
    }

    // ── Expressions ──

    fn expr(&mut self, expr: &Expr, out: &mut Block) -> Result<Expr, LowerError> {
        ensure_sufficient_stack(|| self.expr_inner(expr, out))
    }

    fn exprs(&mut self, exprs: &[Expr], out: &mut Block) -> Result<Vec<Expr>, LowerError> {
        exprs.iter().map(|e| self.expr(e, out)).collect()
    }

    fn expr_inner(&mut self, expr: &Expr, out: &mut Block) -> Result<Expr, LowerError> {
        let ty = self.ty(expr)?;
        let kind = match &expr.kind {
            ExprKind::Const(_) | ExprKind::Var(_) | ExprKind::NumCores => return Ok(expr.clone()),
            ExprKind::Tuple(elems) | ExprKind::Struct(elems) | ExprKind::Closure { args: elems, .. } => {
                ExprKind::Struct(self.exprs(elems, out)?)
            }
            ExprKind::Slice { start, stop, step } => ExprKind::Struct(vec![
                self.expr(start, out)?,
                self.expr(stop, out)?,
                self.expr(step, out)?,
            ]),
            ExprKind::FnRef(_) => ExprKind::Struct(Vec::new()),
            ExprKind::Array(elems) => return self.array_literal(elems, ty, out),
            ExprKind::Attribute { value, name } => ExprKind::Attribute {
                value: Box::new(self.expr(value, out)?),
                name: *name,
            },
            ExprKind::Index { value, index } => return self.index(value, index, ty, out),
            ExprKind::Call {
                callee,
                args,
                target,
            } => return self.call(callee, args, *target, ty, out),
            ExprKind::Prim { op, args } => ExprKind::Prim {
                op: *op,
                args: self.exprs(args, out)?,
            },
            ExprKind::Alloc { elem, count } => ExprKind::Alloc {
                elem: *elem,
                count: Box::new(self.expr(count, out)?),
            },
            ExprKind::TupleProj { tuple, index } => ExprKind::TupleProj {
                tuple: Box::new(self.expr(tuple, out)?),
                index: *index,
            },
            ExprKind::ClosureField { closure, index } => ExprKind::ClosureField {
                closure: Box::new(self.expr(closure, out)?),
                index: *index,
            },
            ExprKind::Cast(inner) => {
                let value = self.expr(inner, out)?;
                return self.cast(value, ty, out);
            }
        };
        Ok(Expr::typed(kind, ty))
    }

    fn array_literal(&mut self, elems: &[Expr], ty: Idx, out: &mut Block) -> Result<Expr, LowerError> {
        let Some((elem, 1)) = self.pool.array_parts(ty) else {
            return Err(self
                .ice(format!("array literal of type {}", self.pool.render(ty)))
                .into());
        };
        let data = self.temp("data", self.pool.pointer(elem));
        out.push(Stmt::assign(
            data.clone(),
            Expr::typed(
                ExprKind::Alloc {
                    elem,
                    count: Box::new(int(elems.len())),
                },
                self.pool.pointer(elem),
            ),
        ));
        for (i, value) in elems.iter().enumerate() {
            let value = self.expr(value, out)?;
            let slot = Expr::typed(
                ExprKind::Index {
                    value: Box::new(data.clone()),
                    index: Box::new(int(i)),
                },
                elem,
            );
            out.push(Stmt::assign(slot, value));
        }
        let dims = self.pool.index_tuple(1);
        let shape = Expr::typed(ExprKind::Struct(vec![int(elems.len())]), dims);
        let strides = Expr::typed(ExprKind::Struct(vec![int(1)]), dims);
        Ok(Expr::typed(ExprKind::Struct(vec![data, shape, strides]), ty))
    }

    fn index(&mut self, value: &Expr, index: &Expr, ty: Idx, out: &mut Block) -> Result<Expr, LowerError> {
        let base = self.expr(value, out)?;
        let base_ty = self.ty(&base)?;
        match self.pool.tag(base_ty) {
            Tag::Tuple => {
                let Some(ConstValue::Int(k)) = index.as_const() else {
                    return Err(self.ice("tuple index is not a constant").with_node(index).into());
                };
                let index = u32::try_from(k)
                    .map_err(|_| self.ice(format!("tuple index {k} out of range")))?;
                Ok(Expr::typed(
                    ExprKind::TupleProj {
                        tuple: Box::new(base),
                        index,
                    },
                    ty,
                ))
            }
            Tag::Array => {
                let rank = self.pool.array_parts(base_ty).map_or(0, |(_, rank)| rank);
                let base = self.spill(base, "array", out)?;
                let index = self.expr(index, out)?;
                let scalar_index = self.pool.as_scalar(self.ty(&index)?).is_some();
                let components = match index {
                    index if scalar_index => vec![index],
                    Expr {
                        kind: ExprKind::Struct(fields),
                        ..
                    } => fields,
                    index => {
                        let index = self.spill(index, "index", out)?;
                        (0..rank as usize)
                            .map(|k| {
                                Expr::typed(
                                    ExprKind::TupleProj {
                                        tuple: Box::new(index.clone()),
                                        index: field_index(k),
                                    },
                                    Idx::INT64,
                                )
                            })
                            .collect()
                    }
                };
                let offset = self.flat_offset(&base, rank, components)?;
                Ok(Expr::typed(
                    ExprKind::Index {
                        value: Box::new(base),
                        index: Box::new(offset),
                    },
                    ty,
                ))
            }
            Tag::Pointer => Ok(Expr::typed(
                ExprKind::Index {
                    value: Box::new(base),
                    index: Box::new(self.expr(index, out)?),
                },
                ty,
            )),
            _ => Err(self
                .ice(format!("no lowering for indexing into {}", self.pool.render(base_ty)))
                .with_node(value)
                .into()),
        }
    }

    /// `sum(index[k] * strides[k])`, in elements.
    fn flat_offset(&self, array: &Expr, rank: u32, components: Vec<Expr>) -> Result<Expr, LowerError> {
        if components.len() != rank as usize {
            return Err(self
                .ice(format!("{} indices for rank {rank}", components.len()))
                .with_node(array)
                .into());
        }
        let strides = Expr::typed(
            ExprKind::Attribute {
                value: Box::new(array.clone()),
                name: Name::intern("strides"),
            },
            self.pool.index_tuple(rank),
        );
        let mut offset: Option<Expr> = None;
        for (k, component) in components.into_iter().enumerate() {
            let stride = Expr::typed(
                ExprKind::TupleProj {
                    tuple: Box::new(strides.clone()),
                    index: field_index(k),
                },
                Idx::INT64,
            );
            let term = Expr::typed(
                ExprKind::Prim {
                    op: tern_ir::Prim::Multiply,
                    args: vec![component, stride],
                },
                Idx::INT64,
            );
            offset = Some(match offset {
                None => term,
                Some(acc) => Expr::typed(
                    ExprKind::Prim {
                        op: tern_ir::Prim::Add,
                        args: vec![acc, term],
                    },
                    Idx::INT64,
                ),
            });
        }
        Ok(offset.unwrap_or_else(|| int(0)))
    }

    fn call(
        &mut self,
        callee: &Expr,
        args: &ActualArgs,
        target: Option<Name>,
        ty: Idx,
        out: &mut Block,
    ) -> Result<Expr, LowerError> {
        let Some(target) = target else {
            return Err(self.ice("call without a specialized target").with_node(callee).into());
        };
        if !args.is_positional_only() {
            return Err(self.ice("call with unbound arguments").with_node(callee).into());
        }
        let typed = self
            .registry
            .typed(target, 0)
            .ok_or(LowerError::Unregistered(target))?;

        let callee_ty = self.ty(callee)?;
        let Some((_, partial)) = self.pool.closure_parts(callee_ty) else {
            return Err(self
                .ice(format!("calling a value of type {}", self.pool.render(callee_ty)))
                .with_node(callee)
                .into());
        };

        let mut values = Vec::with_capacity(partial.len() + args.positional.len());
        if !partial.is_empty() {
            let closure = self.expr(callee, out)?;
            let closure = self.spill(closure, "closure", out)?;
            for (i, &field_ty) in partial.iter().enumerate() {
                values.push(Expr::typed(
                    ExprKind::ClosureField {
                        closure: Box::new(closure.clone()),
                        index: field_index(i),
                    },
                    field_ty,
                ));
            }
        } else if !matches!(callee.kind, ExprKind::Var(_) | ExprKind::FnRef(_)) {
            let closure = self.expr(callee, out)?;
            out.push(Stmt::RunExpr(closure));
        }
        values.extend(self.exprs(&args.positional, out)?);

        let fn_ty = self.pool.function(&typed.input_types, typed.return_type);
        Ok(Expr::typed(
            ExprKind::Call {
                callee: Box::new(Expr::typed(ExprKind::FnRef(target), fn_ty)),
                args: ActualArgs::positional(values),
                target: Some(target),
            },
            ty,
        ))
    }

    fn bad_cast(&self, from: Idx, to: Idx, value: &Expr) -> LowerError {
        self.ice(format!(
            "no lowering for a cast from {} to {}",
            self.pool.render(from),
            self.pool.render(to)
        ))
        .with_node(value)
        .into()
    }

    /// Scalar casts stay; composite casts become element-wise `Struct`s.
    fn cast(&mut self, value: Expr, to: Idx, out: &mut Block) -> Result<Expr, LowerError> {
        let from = self.ty(&value)?;
        if from == to {
            return Ok(value);
        }
        if self.pool.as_scalar(to).is_some() {
            return Ok(Expr::cast(value, to));
        }

        let (from_parts, to_parts, closure): (Vec<Idx>, Vec<Idx>, bool) =
            match (self.pool.get(from), self.pool.get(to)) {
                (TypeData::Tuple(a), TypeData::Tuple(b)) => (a.to_vec(), b.to_vec(), false),
                (TypeData::Struct { fields: a, .. }, TypeData::Struct { fields: b, .. }) => (
                    a.iter().map(|&(_, t)| t).collect(),
                    b.iter().map(|&(_, t)| t).collect(),
                    false,
                ),
                (TypeData::Closure { partial: a, .. }, TypeData::Closure { partial: b, .. }) => {
                    (a.to_vec(), b.to_vec(), true)
                }
                _ => return Err(self.bad_cast(from, to, &value)),
            };
        if from_parts.len() != to_parts.len() {
            return Err(self.bad_cast(from, to, &value));
        }

        let source = self.spill(value, "cast", out)?;
        let mut fields = Vec::with_capacity(to_parts.len());
        for (i, (&field_from, &field_to)) in from_parts.iter().zip(&to_parts).enumerate() {
            let source = Box::new(source.clone());
            let index = field_index(i);
            let kind = if closure {
                ExprKind::ClosureField {
                    closure: source,
                    index,
                }
            } else {
                ExprKind::TupleProj {
                    tuple: source,
                    index,
                }
            };
            fields.push(self.cast(Expr::typed(kind, field_from), field_to, out)?);
        }
        Ok(Expr::typed(ExprKind::Struct(fields), to))
    }
}
