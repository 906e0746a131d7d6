//! Cranelift IR for one lowered function.
//!
//! Every tern variable becomes a frontend [`Variable`], so control-flow
//! joins only need `def_var` on each incoming edge and the frontend builds
//! the block parameters. Composite values are pointers to records laid out
//! by [`tern_rt::layout`]; field reads and writes are loads and stores at
//! static offsets.

mod scalar;
#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]

use cranelift::prelude::*;
use cranelift_jit::JITModule;
use cranelift_module::{FuncId, Module};
use rustc_hash::FxHashMap;
use tern_ir::{ensure_sufficient_stack, Expr, ExprKind, Ice, Name, Phi, Stmt, TypedFn};
use tern_rt::layout::{field_position, slot_of, struct_layout};
use tern_rt::{Slot, StructLayout};
use tern_types::{Idx, Scalar, Tag, TypePool};

use crate::{trap_codes, CodegenError};

/// Stop with [`trap_codes::OUT_OF_MEMORY`] when an allocation returned null.
pub(crate) fn trap_if_null(builder: &mut FunctionBuilder<'_>, ptr: Value) {
    builder.ins().trapz(ptr, trap_codes::OUT_OF_MEMORY);
}

/// Storage type of a slot.
pub(crate) fn clif_type(slot: Slot, ptr_ty: Type) -> Type {
    match slot {
        Slot::I8 => types::I8,
        Slot::I16 => types::I16,
        Slot::I32 => types::I32,
        Slot::I64 => types::I64,
        Slot::F32 => types::F32,
        Slot::F64 => types::F64,
        Slot::Ptr => ptr_ty,
    }
}

/// Results of these types are written through a caller-allocated record.
pub(crate) fn returns_through_record(pool: &TypePool, ty: Idx) -> bool {
    matches!(
        pool.tag(ty),
        Tag::Tuple | Tag::Struct | Tag::Closure | Tag::Array
    )
}

/// Native signature of a function, and the layout of its out-record if the
/// result is returned through one.
pub(crate) fn signature(
    module: &JITModule,
    pool: &TypePool,
    inputs: &[Idx],
    ret: Idx,
) -> Result<(Signature, Option<StructLayout>), CodegenError> {
    let ptr_ty = module.target_config().pointer_type();
    let mut sig = module.make_signature();
    let out_record = if returns_through_record(pool, ret) {
        sig.params.push(AbiParam::new(ptr_ty));
        Some(struct_layout(pool, ret)?)
    } else {
        sig.returns
            .push(AbiParam::new(clif_type(slot_of(pool, ret)?, ptr_ty)));
        None
    };
    for &input in inputs {
        sig.params
            .push(AbiParam::new(clif_type(slot_of(pool, input)?, ptr_ty)));
    }
    Ok((sig, out_record))
}

/// A function body can call.
#[derive(Clone, Debug)]
pub(crate) struct Callee {
    pub id: FuncId,
    pub out_record: Option<StructLayout>,
}

/// Module-level functions a body refers to.
pub(crate) struct Imports<'a> {
    pub alloc: FuncId,
    pub num_cores: FuncId,
    pub callees: &'a FxHashMap<Name, Callee>,
}

pub(crate) struct FunctionCompiler<'a, 'f> {
    pool: &'a TypePool,
    func: &'a TypedFn,
    module: &'a mut JITModule,
    imports: &'a Imports<'a>,
    builder: FunctionBuilder<'f>,
    ptr_ty: Type,
    vars: FxHashMap<Name, Variable>,
    func_refs: FxHashMap<FuncId, codegen::ir::FuncRef>,
    out_ptr: Option<Value>,
    out_record: Option<StructLayout>,
}

impl<'a, 'f> FunctionCompiler<'a, 'f> {
    pub fn new(
        pool: &'a TypePool,
        func: &'a TypedFn,
        module: &'a mut JITModule,
        imports: &'a Imports<'a>,
        builder: FunctionBuilder<'f>,
        out_record: Option<StructLayout>,
    ) -> Self {
        let ptr_ty = module.target_config().pointer_type();
        FunctionCompiler {
            pool,
            func,
            module,
            imports,
            builder,
            ptr_ty,
            vars: FxHashMap::default(),
            func_refs: FxHashMap::default(),
            out_ptr: None,
            out_record,
        }
    }

    /// Emit the whole body into the builder's function.
    pub fn compile(mut self) -> Result<(), CodegenError> {
        let entry = self.builder.create_block();
        self.builder.append_block_params_for_function_params(entry);
        self.builder.switch_to_block(entry);
        self.builder.seal_block(entry);

        let func = self.func;
        let mut params = self.builder.block_params(entry).to_vec().into_iter();
        if self.out_record.is_some() {
            self.out_ptr = params.next();
        }
        for (&arg, value) in func.arg_names.iter().zip(params) {
            let var = self.var(arg)?;
            self.builder.def_var(var, value);
        }

        self.block(&func.body)?;

        // Reached only by falling off the end, which inference rules out.
        self.default_return()?;
        self.builder.seal_all_blocks();
        self.builder.finalize();
        Ok(())
    }

    fn ice(&self, message: impl Into<String>) -> Ice {
        Ice::new(
            "generate",
            format!(
                "`{}` version {}: {}",
                self.func.name,
                self.func.version,
                message.into()
            ),
        )
    }

    fn ty(&self, expr: &Expr) -> Result<Idx, CodegenError> {
        expr.ty
            .ok_or_else(|| self.ice("untyped expression").with_node(expr).into())
    }

    fn clif(&self, ty: Idx) -> Result<Type, CodegenError> {
        Ok(clif_type(slot_of(self.pool, ty)?, self.ptr_ty))
    }

    fn scalar(&self, expr: &Expr) -> Result<Scalar, CodegenError> {
        let ty = self.ty(expr)?;
        self.pool.as_scalar(ty).ok_or_else(|| {
            self.ice(format!("expected a scalar, found {}", self.pool.render(ty)))
                .with_node(expr)
                .into()
        })
    }

    fn var(&mut self, name: Name) -> Result<Variable, CodegenError> {
        if let Some(&var) = self.vars.get(&name) {
            return Ok(var);
        }
        let ty = self
            .func
            .var_type(name)
            .ok_or_else(|| self.ice(format!("`{name}` has no type")))?;
        let clif = self.clif(ty)?;
        let var = self.builder.declare_var(clif);
        self.vars.insert(name, var);
        Ok(var)
    }

    fn func_ref(&mut self, id: FuncId) -> codegen::ir::FuncRef {
        if let Some(&func_ref) = self.func_refs.get(&id) {
            return func_ref;
        }
        let func_ref = self.module.declare_func_in_func(id, self.builder.func);
        self.func_refs.insert(id, func_ref);
        func_ref
    }

    fn offset(&self, bytes: usize) -> Result<i32, CodegenError> {
        i32::try_from(bytes).map_err(|_| self.ice(format!("offset {bytes} out of range")).into())
    }

    fn iconst_usize(&mut self, ty: Type, value: usize) -> Result<Value, CodegenError> {
        let value = i64::try_from(value)
            .map_err(|_| self.ice(format!("constant {value} out of range")))?;
        Ok(self.builder.ins().iconst(ty, value))
    }

    // ── Statements ──

    fn block(&mut self, block: &[Stmt]) -> Result<(), CodegenError> {
        for stmt in block {
            ensure_sufficient_stack(|| self.stmt(stmt))?;
        }
        Ok(())
    }

    fn stmt(&mut self, stmt: &Stmt) -> Result<(), CodegenError> {
        match stmt {
            Stmt::Assign { lhs, rhs } => self.assign(lhs, rhs),
            Stmt::RunExpr(value) => self.expr(value).map(drop),
            Stmt::Return(value) => self.ret(value),
            Stmt::If {
                cond,
                then_block,
                else_block,
                merge,
            } => {
                let cond = self.expr(cond)?;
                let then_entry = self.builder.create_block();
                let else_entry = self.builder.create_block();
                let join = self.builder.create_block();
                self.builder
                    .ins()
                    .brif(cond, then_entry, &[], else_entry, &[]);

                self.builder.switch_to_block(then_entry);
                self.builder.seal_block(then_entry);
                self.block(then_block)?;
                self.merge(merge, |phi| &phi.left)?;
                self.builder.ins().jump(join, &[]);

                self.builder.switch_to_block(else_entry);
                self.builder.seal_block(else_entry);
                self.block(else_block)?;
                self.merge(merge, |phi| &phi.right)?;
                self.builder.ins().jump(join, &[]);

                self.builder.switch_to_block(join);
                self.builder.seal_block(join);
                Ok(())
            }
            Stmt::While { cond, body, merge } => {
                self.merge(merge, |phi| &phi.left)?;
                let header = self.builder.create_block();
                let body_entry = self.builder.create_block();
                let exit = self.builder.create_block();
                self.builder.ins().jump(header, &[]);

                // The back edge is still missing, so the header stays unsealed.
                self.builder.switch_to_block(header);
                let cond = self.expr(cond)?;
                self.builder.ins().brif(cond, body_entry, &[], exit, &[]);

                self.builder.switch_to_block(body_entry);
                self.builder.seal_block(body_entry);
                self.block(body)?;
                self.merge(merge, |phi| &phi.right)?;
                self.builder.ins().jump(header, &[]);
                self.builder.seal_block(header);

                self.builder.switch_to_block(exit);
                self.builder.seal_block(exit);
                Ok(())
            }
        }
    }

    /// Define every phi target from one side of its merge.
    ///
    /// All incoming values are read before any target is written, since a
    /// phi may read another phi's target.
    fn merge(&mut self, merge: &[Phi], side: impl Fn(&Phi) -> &Expr) -> Result<(), CodegenError> {
        let values = merge
            .iter()
            .map(|phi| self.expr(side(phi)))
            .collect::<Result<Vec<_>, _>>()?;
        for (phi, value) in merge.iter().zip(values) {
            let var = self.var(phi.target)?;
            self.builder.def_var(var, value);
        }
        Ok(())
    }

    fn assign(&mut self, lhs: &Expr, rhs: &Expr) -> Result<(), CodegenError> {
        match &lhs.kind {
            ExprKind::Var(name) => {
                let value = self.expr(rhs)?;
                let value = self.coerce(value, self.ty(rhs)?, self.ty(lhs)?)?;
                let var = self.var(*name)?;
                self.builder.def_var(var, value);
                Ok(())
            }
            ExprKind::Attribute { value: record, name } => {
                let record_ty = self.ty(record)?;
                let position = self.attribute_position(record_ty, *name, lhs)?;
                let base = self.expr(record)?;
                let value = self.expr(rhs)?;
                let value = self.coerce(value, self.ty(rhs)?, self.ty(lhs)?)?;
                self.store_field(base, record_ty, position, value)
            }
            ExprKind::Index { value: base, index } => {
                let (addr, _) = self.element_address(base, index)?;
                let value = self.expr(rhs)?;
                let value = self.coerce(value, self.ty(rhs)?, self.ty(lhs)?)?;
                self.builder.ins().store(MemFlags::trusted(), value, addr, 0);
                Ok(())
            }
            _ => Err(self
                .ice(format!("no code for a {} store", lhs.variant_name()))
                .with_node(lhs)
                .into()),
        }
    }

    fn ret(&mut self, value: &Expr) -> Result<(), CodegenError> {
        let result = self.expr(value)?;
        match (self.out_ptr, self.out_record.clone()) {
            (Some(out), Some(layout)) => {
                for field in &layout.fields {
                    let ty = clif_type(field.slot, self.ptr_ty);
                    let offset = self.offset(field.offset)?;
                    let word = self
                        .builder
                        .ins()
                        .load(ty, MemFlags::trusted(), result, offset);
                    self.builder
                        .ins()
                        .store(MemFlags::trusted(), word, out, offset);
                }
                self.builder.ins().return_(&[]);
            }
            _ => {
                let result = self.coerce(result, self.ty(value)?, self.func.return_type)?;
                self.builder.ins().return_(&[result]);
            }
        }
        // Statements after a return are unreachable but still need a block.
        let rest = self.builder.create_block();
        self.builder.switch_to_block(rest);
        self.builder.seal_block(rest);
        Ok(())
    }

    fn default_return(&mut self) -> Result<(), CodegenError> {
        if self.out_record.is_some() {
            self.builder.ins().return_(&[]);
            return Ok(());
        }
        let ty = self.clif(self.func.return_type)?;
        let zero = scalar::zero(&mut self.builder, ty);
        self.builder.ins().return_(&[zero]);
        Ok(())
    }

    // ── Expressions ──

    fn expr(&mut self, expr: &Expr) -> Result<Value, CodegenError> {
        ensure_sufficient_stack(|| self.expr_inner(expr))
    }

    fn expr_inner(&mut self, expr: &Expr) -> Result<Value, CodegenError> {
        let ty = self.ty(expr)?;
        match &expr.kind {
            ExprKind::Const(value) => {
                if ty == Idx::NONE {
                    return Ok(self.builder.ins().iconst(types::I64, 0));
                }
                let scalar = self.scalar(expr)?;
                Ok(scalar::constant(&mut self.builder, *value, scalar))
            }
            ExprKind::Var(name) => {
                let var = self.var(*name)?;
                Ok(self.builder.use_var(var))
            }
            ExprKind::Attribute { value, name } => {
                let record_ty = self.ty(value)?;
                let position = self.attribute_position(record_ty, *name, expr)?;
                let base = self.expr(value)?;
                self.load_field(base, record_ty, position)
            }
            ExprKind::Index { value, index } => {
                let (addr, elem) = self.element_address(value, index)?;
                let ty = self.clif(elem)?;
                Ok(self.builder.ins().load(ty, MemFlags::trusted(), addr, 0))
            }
            ExprKind::Call { callee, args, .. } => {
                let ExprKind::FnRef(target) = callee.kind else {
                    return Err(self.ice("indirect call").with_node(expr).into());
                };
                self.call(target, &args.positional)
            }
            ExprKind::Prim { op, args } => {
                let values = args
                    .iter()
                    .map(|arg| self.expr(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                let operand = match args.first() {
                    Some(first) => self.scalar(first)?,
                    None => return Err(self.ice("primitive without operands").with_node(expr).into()),
                };
                scalar::prim(&mut self.builder, *op, operand, &values)
                    .ok_or_else(|| self.ice(format!("no code for {}", op.name())).with_node(expr).into())
            }
            ExprKind::Struct(fields) => {
                let layout = struct_layout(self.pool, ty)?;
                if layout.fields.len() != fields.len() {
                    return Err(self
                        .ice(format!(
                            "{} fields for {}",
                            fields.len(),
                            self.pool.render(ty)
                        ))
                        .with_node(expr)
                        .into());
                }
                let record = self.alloc_bytes(layout.size, layout.align)?;
                for (field, layout_field) in fields.iter().zip(&layout.fields) {
                    let value = self.expr(field)?;
                    let offset = self.offset(layout_field.offset)?;
                    self.builder
                        .ins()
                        .store(MemFlags::trusted(), value, record, offset);
                }
                Ok(record)
            }
            ExprKind::Alloc { elem, count } => {
                let slot = slot_of(self.pool, *elem)?;
                let count_ty = self.scalar(count)?;
                let count = self.expr(count)?;
                let count = scalar::convert(&mut self.builder, count, count_ty, Scalar::INT64);
                let size = i64::try_from(slot.size()).unwrap_or(8);
                let bytes = self.builder.ins().imul_imm(count, size);
                let align = self.iconst_usize(types::I64, slot.align())?;
                self.call_alloc(bytes, align)
            }
            ExprKind::TupleProj { tuple: record, index }
            | ExprKind::ClosureField {
                closure: record,
                index,
            } => {
                let record_ty = self.ty(record)?;
                let base = self.expr(record)?;
                self.load_field(base, record_ty, *index as usize)
            }
            ExprKind::Cast(inner) => {
                let from = self.ty(inner)?;
                let value = self.expr(inner)?;
                self.coerce(value, from, ty)
            }
            ExprKind::NumCores => {
                let func_ref = self.func_ref(self.imports.num_cores);
                let call = self.builder.ins().call(func_ref, &[]);
                Ok(self.builder.inst_results(call)[0])
            }
            ExprKind::Tuple(_)
            | ExprKind::Array(_)
            | ExprKind::Slice { .. }
            | ExprKind::Closure { .. }
            | ExprKind::FnRef(_) => Err(self
                .ice(format!("{} survived lowering", expr.variant_name()))
                .with_node(expr)
                .into()),
        }
    }

    /// Convert between scalar types; identical types pass through.
    fn coerce(&mut self, value: Value, from: Idx, to: Idx) -> Result<Value, CodegenError> {
        if from == to {
            return Ok(value);
        }
        match (self.pool.as_scalar(from), self.pool.as_scalar(to)) {
            (Some(from), Some(to)) => Ok(scalar::convert(&mut self.builder, value, from, to)),
            _ => Err(self
                .ice(format!(
                    "no code for a cast from {} to {}",
                    self.pool.render(from),
                    self.pool.render(to)
                ))
                .into()),
        }
    }

    fn call(&mut self, target: Name, args: &[Expr]) -> Result<Value, CodegenError> {
        let callee = self
            .imports
            .callees
            .get(&target)
            .cloned()
            .ok_or(CodegenError::Unregistered(target))?;
        let mut values = Vec::with_capacity(args.len() + 1);
        let out = match &callee.out_record {
            Some(layout) => {
                let out = self.alloc_bytes(layout.size, layout.align)?;
                values.push(out);
                Some(out)
            }
            None => None,
        };
        for arg in args {
            values.push(self.expr(arg)?);
        }
        let func_ref = self.func_ref(callee.id);
        let call = self.builder.ins().call(func_ref, &values);
        Ok(match out {
            Some(out) => out,
            None => self.builder.inst_results(call)[0],
        })
    }

    // ── Storage ──

    fn attribute_position(&self, record_ty: Idx, name: Name, node: &Expr) -> Result<usize, CodegenError> {
        field_position(self.pool, record_ty, name).ok_or_else(|| {
            self.ice(format!(
                "{} has no field `{name}`",
                self.pool.render(record_ty)
            ))
            .with_node(node)
            .into()
        })
    }

    fn load_field(&mut self, record: Value, record_ty: Idx, position: usize) -> Result<Value, CodegenError> {
        let layout = struct_layout(self.pool, record_ty)?;
        let field = layout.field(position).ok_or_else(|| {
            self.ice(format!(
                "field {position} of {}",
                self.pool.render(record_ty)
            ))
        })?;
        let offset = self.offset(field.offset)?;
        let ty = clif_type(field.slot, self.ptr_ty);
        Ok(self
            .builder
            .ins()
            .load(ty, MemFlags::trusted(), record, offset))
    }

    fn store_field(
        &mut self,
        record: Value,
        record_ty: Idx,
        position: usize,
        value: Value,
    ) -> Result<(), CodegenError> {
        let layout = struct_layout(self.pool, record_ty)?;
        let field = layout.field(position).ok_or_else(|| {
            self.ice(format!(
                "field {position} of {}",
                self.pool.render(record_ty)
            ))
        })?;
        let offset = self.offset(field.offset)?;
        self.builder
            .ins()
            .store(MemFlags::trusted(), value, record, offset);
        Ok(())
    }

    /// Address of an array or pointer element, and the element type.
    ///
    /// Array indices are flat element offsets already scaled by the strides.
    fn element_address(&mut self, base: &Expr, index: &Expr) -> Result<(Value, Idx), CodegenError> {
        let base_ty = self.ty(base)?;
        let record = self.expr(base)?;
        let (data, elem) = if let Some((elem, _)) = self.pool.array_parts(base_ty) {
            (self.load_field(record, base_ty, 0)?, elem)
        } else if let Some(elem) = self.pool.pointee(base_ty) {
            (record, elem)
        } else {
            return Err(self
                .ice(format!("indexing into {}", self.pool.render(base_ty)))
                .with_node(base)
                .into());
        };
        let index_ty = self.scalar(index)?;
        let offset = self.expr(index)?;
        let offset = scalar::convert(&mut self.builder, offset, index_ty, Scalar::INT64);
        let offset = if self.ptr_ty == types::I64 {
            offset
        } else {
            self.builder.ins().ireduce(self.ptr_ty, offset)
        };
        let size = i64::try_from(slot_of(self.pool, elem)?.size()).unwrap_or(8);
        let scaled = self.builder.ins().imul_imm(offset, size);
        Ok((self.builder.ins().iadd(data, scaled), elem))
    }

    fn alloc_bytes(&mut self, size: usize, align: usize) -> Result<Value, CodegenError> {
        let size = self.iconst_usize(types::I64, size)?;
        let align = self.iconst_usize(types::I64, align)?;
        self.call_alloc(size, align)
    }

    fn call_alloc(&mut self, size: Value, align: Value) -> Result<Value, CodegenError> {
        let func_ref = self.func_ref(self.imports.alloc);
        let call = self.builder.ins().call(func_ref, &[size, align]);
        let ptr = self.builder.inst_results(call)[0];
        trap_if_null(&mut self.builder, ptr);
        Ok(ptr)
    }
}
