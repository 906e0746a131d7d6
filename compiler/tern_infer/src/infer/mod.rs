//! Forward type propagation over one function body.
//!
//! Types flow from the input signature through assignments. Every
//! expression of the result carries a type, and implicit conversions are
//! made explicit as `Cast` nodes (or folded into literals).

use rustc_hash::FxHashMap;
use tern_ir::{
    ensure_sufficient_stack, ActualArgs, Block, Bound, ConstValue, Expr, ExprKind, Fn, Ice,
    IrError, Name, Phi, Prim, Stmt, TypeEnv,
};
use tern_types::{Idx, Scalar, ScalarKind, Tag, TypeData, TypePool};

use crate::{InferError, Specializer};

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;

/// Argument names, body, return type and type environment of a typed function.
pub(crate) type Inferred = (Vec<Name>, Block, Idx, TypeEnv);

pub(crate) struct FnInferencer<'s, 'a> {
    specializer: &'s Specializer<'a>,
    pool: &'a TypePool,
    func: &'s Fn,
    /// Variables visible at the current point.
    env: TypeEnv,
    /// Every variable ever bound, for the function's type environment.
    all_types: TypeEnv,
    returns: Vec<Idx>,
}

impl<'s, 'a> FnInferencer<'s, 'a> {
    pub(crate) fn new(specializer: &'s Specializer<'a>, func: &'s Fn) -> Self {
        FnInferencer {
            specializer,
            pool: specializer.pool,
            func,
            env: FxHashMap::default(),
            all_types: FxHashMap::default(),
            returns: Vec::new(),
        }
    }

    pub(crate) fn infer_fn(mut self, inputs: &[Idx]) -> Result<Inferred, InferError> {
        let func = self.func;
        let arity = func.args.arity();
        if inputs.len() != arity {
            return Err(IrError::binding(
                func.name,
                format!("expects {arity} argument types, got {}", inputs.len()),
            )
            .into());
        }
        let arg_names: Vec<Name> = func.args.names().collect();
        for (&name, &ty) in arg_names.iter().zip(inputs) {
            self.define(name, ty);
        }

        let mut body = self.block(&func.body)?;
        if !always_returns(&body) {
            body.push(Stmt::Return(Expr::typed(
                ExprKind::Const(ConstValue::None),
                Idx::NONE,
            )));
            self.returns.push(Idx::NONE);
        }
        let ret = self
            .pool
            .combine_all(self.returns.iter().copied())?
            .unwrap_or(Idx::NONE);
        self.cast_returns(&mut body, ret)?;
        Ok((arg_names, body, ret, self.all_types))
    }

    // ── Environment ──

    fn define(&mut self, name: Name, ty: Idx) {
        self.env.insert(name, ty);
        self.all_types.insert(name, ty);
    }

    fn lookup(&self, name: Name) -> Option<Idx> {
        self.env
            .get(&name)
            .or_else(|| self.all_types.get(&name))
            .copied()
    }

    fn ice(&self, message: impl Into<String>) -> Ice {
        Ice::new("specialize", message).with_type_env(
            self.env
                .iter()
                .map(|(&name, &ty)| (name, self.pool.render(ty))),
        )
    }

    fn ty_of(&self, expr: &Expr) -> Result<Idx, InferError> {
        expr.ty
            .ok_or_else(|| self.ice("expression left untyped").with_node(expr).into())
    }

    fn render(&self, ty: Idx) -> String {
        self.pool.render(ty)
    }

    fn is_index_scalar(&self, ty: Idx) -> bool {
        self.pool
            .as_scalar(ty)
            .is_some_and(|s| matches!(s.kind, ScalarKind::Int | ScalarKind::UInt))
    }

    // ── Conversions ──

    /// Convert `expr` to `to`, folding literal conversions.
    fn cast(&self, expr: Expr, to: Idx) -> Result<Expr, InferError> {
        let from = self.ty_of(&expr)?;
        if from == to {
            return Ok(expr);
        }
        if !self.pool.castable(from, to) {
            return Err(self.pool.incompatible(from, to).into());
        }
        if let (Some(value), Some(scalar)) = (expr.as_const(), self.pool.as_scalar(to)) {
            if let Some(folded) = fold_const(value, scalar) {
                return Ok(Expr::typed(ExprKind::Const(folded), to));
            }
        }
        Ok(Expr::cast(expr, to))
    }

    fn condition(&mut self, cond: &Expr) -> Result<Expr, InferError> {
        let cond = self.expr(cond)?;
        let ty = self.ty_of(&cond)?;
        if self.pool.as_scalar(ty).is_none() {
            return Err(InferError::unsupported(format!(
                "condition of type {}",
                self.render(ty)
            )));
        }
        self.cast(cond, Idx::BOOL)
    }

    fn cast_returns(&self, block: &mut Block, ret: Idx) -> Result<(), InferError> {
        for stmt in block {
            match stmt {
                Stmt::Return(value) => {
                    let typed = std::mem::replace(value, Expr::none());
                    *value = self.cast(typed, ret)?;
                }
                Stmt::If {
                    then_block,
                    else_block,
                    ..
                } => {
                    self.cast_returns(then_block, ret)?;
                    self.cast_returns(else_block, ret)?;
                }
                Stmt::While { body, .. } => self.cast_returns(body, ret)?,
                Stmt::Assign { .. } | Stmt::RunExpr(_) => {}
            }
        }
        Ok(())
    }

    // ── Statements ──

    fn block(&mut self, block: &[Stmt]) -> Result<Block, InferError> {
        block.iter().map(|stmt| self.stmt(stmt)).collect()
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<Stmt, InferError> {
        ensure_sufficient_stack(|| match stmt {
            Stmt::Assign { lhs, rhs } => self.assign(lhs, rhs),
            Stmt::RunExpr(value) => Ok(Stmt::RunExpr(self.expr(value)?)),
            Stmt::Return(value) => {
                let value = self.expr(value)?;
                self.returns.push(self.ty_of(&value)?);
                Ok(Stmt::Return(value))
            }
            Stmt::If {
                cond,
                then_block,
                else_block,
                merge,
            } => self.if_(cond, then_block, else_block, merge),
            Stmt::While { cond, body, merge } => self.while_(cond, body, merge),
        })
    }

    fn assign(&mut self, lhs: &Expr, rhs: &Expr) -> Result<Stmt, InferError> {
        let rhs = self.expr(rhs)?;
        match &lhs.kind {
            ExprKind::Var(name) => {
                let rhs = self.assign_var(*name, rhs)?;
                let ty = self.ty_of(&rhs)?;
                Ok(Stmt::assign(Expr::typed(ExprKind::Var(*name), ty), rhs))
            }
            ExprKind::Tuple(_) => {
                let ty = self.ty_of(&rhs)?;
                let lhs = self.assign_pattern(lhs, ty)?;
                Ok(Stmt::assign(lhs, rhs))
            }
            ExprKind::Attribute { value, name } => {
                let value = self.expr(value)?;
                let base = self.ty_of(&value)?;
                let Some((_, field_ty)) = self.pool.field(base, *name) else {
                    return Err(InferError::NoSuchAttribute {
                        ty: self.render(base),
                        attr: *name,
                    });
                };
                let rhs = self.cast(rhs, field_ty)?;
                let lhs = Expr::typed(
                    ExprKind::Attribute {
                        value: Box::new(value),
                        name: *name,
                    },
                    field_ty,
                );
                Ok(Stmt::assign(lhs, rhs))
            }
            ExprKind::Index { value, index } => {
                let lhs = self.index(value, index)?;
                if let ExprKind::Index { value, .. } = &lhs.kind {
                    let base = self.ty_of(value)?;
                    if self.pool.tag(base) == Tag::Tuple {
                        return Err(InferError::unsupported(format!(
                            "item assignment into {}",
                            self.render(base)
                        )));
                    }
                }
                let elem = self.ty_of(&lhs)?;
                let rhs = self.cast(rhs, elem)?;
                Ok(Stmt::assign(lhs, rhs))
            }
            _ => Err(IrError::malformed(self.func.name, format!("cannot assign to `{lhs}`")).into()),
        }
    }

    /// Bind `name` to `rhs`, converting to the type `name` already has.
    fn assign_var(&mut self, name: Name, rhs: Expr) -> Result<Expr, InferError> {
        let rhs_ty = self.ty_of(&rhs)?;
        match self.lookup(name) {
            None => {
                self.define(name, rhs_ty);
                Ok(rhs)
            }
            Some(existing) => {
                if existing != rhs_ty && self.pool.combine(existing, rhs_ty).ok() != Some(existing) {
                    return Err(self.pool.incompatible(existing, rhs_ty).into());
                }
                self.define(name, existing);
                self.cast(rhs, existing)
            }
        }
    }

    fn assign_pattern(&mut self, pattern: &Expr, ty: Idx) -> Result<Expr, InferError> {
        match &pattern.kind {
            ExprKind::Var(name) => {
                match self.lookup(*name) {
                    Some(existing) if existing != ty => {
                        return Err(self.pool.incompatible(existing, ty).into());
                    }
                    _ => self.define(*name, ty),
                }
                Ok(Expr::typed(ExprKind::Var(*name), ty))
            }
            ExprKind::Tuple(targets) => {
                let elems = self
                    .pool
                    .tuple_elems(ty)
                    .filter(|elems| elems.len() == targets.len())
                    .ok_or_else(|| {
                        InferError::unsupported(format!(
                            "unpacking {} into {} targets",
                            self.render(ty),
                            targets.len()
                        ))
                    })?;
                let targets = targets
                    .iter()
                    .zip(elems.iter())
                    .map(|(target, &elem)| self.assign_pattern(target, elem))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Expr::typed(ExprKind::Tuple(targets), ty))
            }
            _ => Err(
                IrError::malformed(self.func.name, format!("cannot unpack into `{pattern}`")).into(),
            ),
        }
    }

    fn if_(
        &mut self,
        cond: &Expr,
        then_block: &[Stmt],
        else_block: &[Stmt],
        merge: &[Phi],
    ) -> Result<Stmt, InferError> {
        let cond = self.condition(cond)?;
        let outer = self.env.clone();

        let then_block = self.block(then_block)?;
        let then_env = std::mem::replace(&mut self.env, outer.clone());
        let else_block = self.block(else_block)?;
        let else_env = std::mem::replace(&mut self.env, then_env.clone());

        let lefts = merge
            .iter()
            .map(|phi| self.expr(&phi.left))
            .collect::<Result<Vec<_>, _>>()?;
        self.env = else_env.clone();
        let rights = merge
            .iter()
            .map(|phi| self.expr(&phi.right))
            .collect::<Result<Vec<_>, _>>()?;

        self.env = outer.clone();
        for (name, ty) in &then_env {
            if !outer.contains_key(name) && else_env.get(name) == Some(ty) {
                self.env.insert(*name, *ty);
            }
        }

        let mut phis = Vec::with_capacity(merge.len());
        for ((phi, left), right) in merge.iter().zip(lefts).zip(rights) {
            let ty = self
                .pool
                .combine(self.ty_of(&left)?, self.ty_of(&right)?)?;
            phis.push(Phi {
                target: phi.target,
                left: self.cast(left, ty)?,
                right: self.cast(right, ty)?,
            });
            self.define(phi.target, ty);
        }

        Ok(Stmt::If {
            cond,
            then_block,
            else_block,
            merge: phis,
        })
    }

    /// Re-infer the loop until the phi types stop widening.
    fn while_(&mut self, cond: &Expr, body: &[Stmt], merge: &[Phi]) -> Result<Stmt, InferError> {
        let outer = self.env.clone();
        let lefts = merge
            .iter()
            .map(|phi| self.expr(&phi.left))
            .collect::<Result<Vec<_>, _>>()?;
        let mut types = lefts
            .iter()
            .map(|left| self.ty_of(left))
            .collect::<Result<Vec<_>, _>>()?;
        let snapshot = self.all_types.clone();

        for iteration in 0..self.specializer.max_fixpoint_iterations {
            self.env = outer.clone();
            self.all_types = snapshot.clone();
            for (phi, &ty) in merge.iter().zip(&types) {
                self.define(phi.target, ty);
            }

            let cond = self.condition(cond)?;
            let body = self.block(body)?;
            let rights = merge
                .iter()
                .map(|phi| self.expr(&phi.right))
                .collect::<Result<Vec<_>, _>>()?;

            let mut widened = Vec::with_capacity(types.len());
            for (right, &ty) in rights.iter().zip(&types) {
                widened.push(self.pool.combine(ty, self.ty_of(right)?)?);
            }
            tracing::trace!(iteration, func = %self.func.name, "loop fixed-point step");

            if widened == types {
                let mut phis = Vec::with_capacity(merge.len());
                for (((phi, left), right), &ty) in merge.iter().zip(lefts).zip(rights).zip(&types) {
                    phis.push(Phi {
                        target: phi.target,
                        left: self.cast(left, ty)?,
                        right: self.cast(right, ty)?,
                    });
                }
                self.env = outer;
                for (phi, &ty) in merge.iter().zip(&types) {
                    self.define(phi.target, ty);
                }
                return Ok(Stmt::While {
                    cond,
                    body,
                    merge: phis,
                });
            }
            types = widened;
        }

        Err(self
            .ice(format!(
                "loop types in `{}` did not converge after {} iterations",
                self.func.name, self.specializer.max_fixpoint_iterations
            ))
            .with_node(cond)
            .into())
    }

    // ── Expressions ──

    fn expr(&mut self, expr: &Expr) -> Result<Expr, InferError> {
        ensure_sufficient_stack(|| self.expr_inner(expr))
    }

    fn exprs(&mut self, exprs: &[Expr]) -> Result<Vec<Expr>, InferError> {
        exprs.iter().map(|e| self.expr(e)).collect()
    }

    fn types(&self, exprs: &[Expr]) -> Result<Vec<Idx>, InferError> {
        exprs.iter().map(|e| self.ty_of(e)).collect()
    }

    fn expr_inner(&mut self, expr: &Expr) -> Result<Expr, InferError> {
        match &expr.kind {
            ExprKind::Const(value) => Ok(Expr::typed(
                ExprKind::Const(*value),
                expr.ty.unwrap_or_else(|| value.default_type()),
            )),
            ExprKind::Var(name) => {
                let ty = self.env.get(name).copied().ok_or(InferError::UnboundVariable {
                    func: self.func.name,
                    name: *name,
                })?;
                Ok(Expr::typed(ExprKind::Var(*name), ty))
            }
            ExprKind::Tuple(elems) => {
                let elems = self.exprs(elems)?;
                let ty = self.pool.tuple(&self.types(&elems)?);
                Ok(Expr::typed(ExprKind::Tuple(elems), ty))
            }
            ExprKind::Array(elems) => self.array(elems),
            ExprKind::Attribute { value, name } => self.attribute(value, *name),
            ExprKind::Index { value, index } => self.index(value, index),
            ExprKind::Slice { start, stop, step } => {
                let parts = self.exprs(&[(**start).clone(), (**stop).clone(), (**step).clone()])?;
                let types = self.types(&parts)?;
                for &ty in &types {
                    if !self.is_index_scalar(ty) && ty != Idx::NONE {
                        return Err(InferError::unsupported(format!(
                            "slice bound of type {}",
                            self.render(ty)
                        )));
                    }
                }
                let ty = self.pool.slice(types[0], types[1], types[2]);
                let mut parts = parts.into_iter().map(Box::new);
                let (Some(start), Some(stop), Some(step)) = (parts.next(), parts.next(), parts.next())
                else {
                    return Err(self.ice("slice lost a bound").with_node(expr).into());
                };
                Ok(Expr::typed(ExprKind::Slice { start, stop, step }, ty))
            }
            ExprKind::Call { callee, args, .. } => self.call(callee, args),
            ExprKind::Prim { op, args } => self.prim(*op, args),
            ExprKind::Closure { func, args } => {
                self.require_defined(*func)?;
                let args = self.exprs(args)?;
                let ty = self.pool.closure(*func, &self.types(&args)?);
                Ok(Expr::typed(
                    ExprKind::Closure { func: *func, args },
                    ty,
                ))
            }
            ExprKind::FnRef(func) => {
                self.require_defined(*func)?;
                Ok(Expr::typed(
                    ExprKind::FnRef(*func),
                    self.pool.closure(*func, &[]),
                ))
            }
            ExprKind::Cast(inner) => {
                let Some(to) = expr.ty else {
                    return Err(IrError::malformed(self.func.name, format!("cast without a target type: `{expr}`")).into());
                };
                let inner = self.expr(inner)?;
                self.cast(inner, to)
            }
            ExprKind::Alloc { elem, count } => {
                let count = self.expr(count)?;
                let count_ty = self.ty_of(&count)?;
                if !self.is_index_scalar(count_ty) {
                    return Err(InferError::unsupported(format!(
                        "allocation count of type {}",
                        self.render(count_ty)
                    )));
                }
                let count = self.cast(count, Idx::INT64)?;
                Ok(Expr::typed(
                    ExprKind::Alloc {
                        elem: *elem,
                        count: Box::new(count),
                    },
                    self.pool.pointer(*elem),
                ))
            }
            ExprKind::NumCores => Ok(Expr::typed(ExprKind::NumCores, Idx::INT64)),
            ExprKind::Struct(_) | ExprKind::TupleProj { .. } | ExprKind::ClosureField { .. } => {
                Err(self
                    .ice(format!("{} node before lowering", expr.variant_name()))
                    .with_node(expr)
                    .into())
            }
        }
    }

    fn require_defined(&self, func: Name) -> Result<(), InferError> {
        match self.specializer.registry.untyped(func) {
            Some(_) => Ok(()),
            None => Err(InferError::UnknownFunction(func)),
        }
    }

    fn array(&mut self, elems: &[Expr]) -> Result<Expr, InferError> {
        if elems.is_empty() {
            return Err(InferError::unsupported("empty array literal"));
        }
        let elems = self.exprs(elems)?;
        let types = self.types(&elems)?;
        if let Some(&bad) = types.iter().find(|&&t| self.pool.as_scalar(t).is_none()) {
            return Err(InferError::unsupported(format!(
                "array of {}",
                self.render(bad)
            )));
        }
        let elem = self
            .pool
            .combine_all(types)?
            .ok_or_else(|| self.ice("array literal without elements"))?;
        let elems = elems
            .into_iter()
            .map(|e| self.cast(e, elem))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Expr::typed(ExprKind::Array(elems), self.pool.array(elem, 1)))
    }

    fn attribute(&mut self, value: &Expr, name: Name) -> Result<Expr, InferError> {
        let value = self.expr(value)?;
        let base = self.ty_of(&value)?;
        let ty = match self.pool.get(base) {
            TypeData::Struct { .. } => self.pool.field(base, name).map(|(_, ty)| ty),
            TypeData::Array { elem, rank } => match name.as_str() {
                "shape" | "strides" => Some(self.pool.index_tuple(rank)),
                "data" => Some(self.pool.pointer(elem)),
                _ => None,
            },
            _ => None,
        };
        let Some(ty) = ty else {
            return Err(InferError::NoSuchAttribute {
                ty: self.render(base),
                attr: name,
            });
        };
        Ok(Expr::typed(
            ExprKind::Attribute {
                value: Box::new(value),
                name,
            },
            ty,
        ))
    }

    fn index(&mut self, value: &Expr, index: &Expr) -> Result<Expr, InferError> {
        let value = self.expr(value)?;
        let index = self.expr(index)?;
        let base = self.ty_of(&value)?;
        let index_ty = self.ty_of(&index)?;
        let invalid = |reason: String| InferError::InvalidIndex {
            ty: self.render(base),
            reason,
        };

        let (index, ty) = match self.pool.get(base) {
            TypeData::Tuple(elems) => {
                let Some(ConstValue::Int(k)) = index.as_const() else {
                    return Err(invalid("tuple index must be an integer constant".into()));
                };
                let len = i64::try_from(elems.len()).unwrap_or(i64::MAX);
                let pos = if k < 0 { k + len } else { k };
                let Ok(slot) = usize::try_from(pos) else {
                    return Err(invalid(format!("index {k} out of range for length {len}")));
                };
                let Some(&elem) = elems.get(slot) else {
                    return Err(invalid(format!("index {k} out of range for length {len}")));
                };
                (Expr::typed(ExprKind::Const(ConstValue::Int(pos)), Idx::INT64), elem)
            }
            TypeData::Array { elem, rank } => {
                if self.is_index_scalar(index_ty) {
                    if rank != 1 {
                        return Err(InferError::unsupported(format!(
                            "indexing {} with one integer",
                            self.render(base)
                        )));
                    }
                    (self.cast(index, Idx::INT64)?, elem)
                } else {
                    let fits = self.pool.tuple_elems(index_ty).is_some_and(|parts| {
                        parts.len() == rank as usize
                            && parts.iter().all(|&p| self.is_index_scalar(p))
                    });
                    if !fits {
                        return Err(invalid(format!(
                            "expected {rank} integer indices, got {}",
                            self.render(index_ty)
                        )));
                    }
                    (self.cast(index, self.pool.index_tuple(rank))?, elem)
                }
            }
            TypeData::Pointer(pointee) => {
                if !self.is_index_scalar(index_ty) {
                    return Err(invalid(format!(
                        "pointer offset of type {}",
                        self.render(index_ty)
                    )));
                }
                (self.cast(index, Idx::INT64)?, pointee)
            }
            _ => {
                return Err(InferError::unsupported(format!(
                    "indexing into {}",
                    self.render(base)
                )))
            }
        };
        Ok(Expr::typed(
            ExprKind::Index {
                value: Box::new(value),
                index: Box::new(index),
            },
            ty,
        ))
    }

    fn call(&mut self, callee: &Expr, args: &ActualArgs) -> Result<Expr, InferError> {
        let callee = self.expr(callee)?;
        let callee_ty = self.ty_of(&callee)?;
        let Some((target, partial_types)) = self.pool.closure_parts(callee_ty) else {
            return Err(InferError::unsupported(format!(
                "calling a value of type {}",
                self.render(callee_ty)
            )));
        };
        let untyped = self
            .specializer
            .registry
            .untyped(target)
            .ok_or(InferError::UnknownFunction(target))?;

        let partials: Vec<Expr> = partial_types
            .iter()
            .enumerate()
            .map(|(i, &ty)| {
                Expr::typed(
                    ExprKind::ClosureField {
                        closure: Box::new(callee.clone()),
                        index: u32::try_from(i).unwrap_or(u32::MAX),
                    },
                    ty,
                )
            })
            .collect();

        let mut positional = self.exprs(&args.positional)?;
        if let Some(star) = &args.starargs {
            let star = self.expr(star)?;
            let star_ty = self.ty_of(&star)?;
            let Some(elems) = self.pool.tuple_elems(star_ty) else {
                return Err(InferError::unsupported(format!(
                    "splatting a value of type {}",
                    self.render(star_ty)
                )));
            };
            for (i, &elem) in elems.iter().enumerate() {
                let pos = i64::try_from(i).unwrap_or(i64::MAX);
                positional.push(Expr::typed(
                    ExprKind::Index {
                        value: Box::new(star.clone()),
                        index: Box::new(Expr::typed(
                            ExprKind::Const(ConstValue::Int(pos)),
                            Idx::INT64,
                        )),
                    },
                    elem,
                ));
            }
        }
        let keywords = args
            .keywords
            .iter()
            .map(|(name, value)| Ok((*name, self.expr(value)?)))
            .collect::<Result<Vec<_>, InferError>>()?;

        let skip = partials.len();
        let bound = untyped.args.bind(target, partials, positional, keywords)?;
        let mut values = Vec::with_capacity(bound.len());
        for slot in bound {
            values.push(match slot {
                Bound::Value(value) => value,
                Bound::Default(default) => self.default_value(&default)?,
                Bound::Packed(values) => {
                    let ty = self.pool.tuple(&self.types(&values)?);
                    Expr::typed(ExprKind::Tuple(values), ty)
                }
            });
        }

        let inputs = self.types(&values)?;
        let typed = self.specializer.specialize(target, &inputs)?;
        let args = ActualArgs::positional(values.split_off(skip));
        Ok(Expr::typed(
            ExprKind::Call {
                callee: Box::new(callee),
                args,
                target: Some(typed.name),
            },
            typed.return_type,
        ))
    }

    /// Defaults are evaluated without access to the caller's variables.
    fn default_value(&mut self, default: &Expr) -> Result<Expr, InferError> {
        let saved = std::mem::take(&mut self.env);
        let result = self.expr(default);
        self.env = saved;
        result
    }

    fn prim(&mut self, op: Prim, args: &[Expr]) -> Result<Expr, InferError> {
        if args.len() != op.arity() {
            return Err(IrError::malformed(
                self.func.name,
                format!(
                    "{} takes {} operands, got {}",
                    op.name(),
                    op.arity(),
                    args.len()
                ),
            )
            .into());
        }
        let args = self.exprs(args)?;
        let types = self.types(&args)?;
        if let Some(&bad) = types.iter().find(|&&t| self.pool.as_scalar(t).is_none()) {
            return Err(InferError::unsupported(format!(
                "{} on {}",
                op.name(),
                self.render(bad)
            )));
        }

        let (operand, result) = if op.is_logical() {
            (Idx::BOOL, Idx::BOOL)
        } else {
            let mut operand = self
                .pool
                .combine_all(types)?
                .ok_or_else(|| self.ice("primitive without operands"))?;
            if operand == Idx::BOOL && op.is_arithmetic() && !matches!(op, Prim::Maximum | Prim::Minimum) {
                operand = Idx::INT64;
            }
            let result = if op.is_comparison() { Idx::BOOL } else { operand };
            (operand, result)
        };
        let args = args
            .into_iter()
            .map(|a| self.cast(a, operand))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Expr::typed(ExprKind::Prim { op, args }, result))
    }
}

/// Literal conversion done at compile time; `None` leaves a runtime cast.
///
/// Folded values carry the target's width: integers wrap the way the
/// runtime conversion truncates, and `float32` literals are rounded.
#[expect(
    clippy::cast_precision_loss,
    reason = "literal conversion matches the runtime int-to-float cast"
)]
fn fold_const(value: ConstValue, to: Scalar) -> Option<ConstValue> {
    Some(match (value, to.kind) {
        (ConstValue::Int(i), ScalarKind::Int | ScalarKind::UInt) => ConstValue::Int(wrap_int(i, to)),
        (ConstValue::Int(i), ScalarKind::Float) => ConstValue::Float(round_float(i as f64, to)),
        (ConstValue::Int(i), ScalarKind::Bool) => ConstValue::Bool(i != 0),
        (ConstValue::Bool(b), ScalarKind::Int | ScalarKind::UInt) => ConstValue::Int(i64::from(b)),
        (ConstValue::Bool(b), ScalarKind::Float) => ConstValue::Float(if b { 1.0 } else { 0.0 }),
        (ConstValue::Float(x), ScalarKind::Float) => ConstValue::Float(round_float(x, to)),
        (ConstValue::Float(x), ScalarKind::Bool) => ConstValue::Bool(x != 0.0),
        _ => return None,
    })
}

/// The low `to.bits` bits of `value`, sign- or zero-extended back to 64.
#[expect(
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    reason = "reinterpreting the bit pattern is the conversion"
)]
fn wrap_int(value: i64, to: Scalar) -> i64 {
    let shift = 64 - u32::from(to.bits.min(64));
    if shift == 0 {
        return value;
    }
    match to.kind {
        ScalarKind::UInt => ((value as u64) << shift >> shift) as i64,
        _ => value << shift >> shift,
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "rounding to float32 is the conversion"
)]
fn round_float(value: f64, to: Scalar) -> f64 {
    if to.bits == 32 {
        f64::from(value as f32)
    } else {
        value
    }
}

/// Every path through `block` ends in a `Return`.
fn always_returns(block: &[Stmt]) -> bool {
    match block.last() {
        Some(Stmt::Return(_)) => true,
        Some(Stmt::If {
            then_block,
            else_block,
            ..
        }) => always_returns(then_block) && always_returns(else_block),
        _ => false,
    }
}
