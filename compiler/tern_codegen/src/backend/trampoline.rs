//! Uniform entry points.
//!
//! `entry(args: *const u64, ret: *mut u64)` reads one 64-bit word per
//! input, narrows it to the native parameter type, calls the function and
//! widens the result back into `*ret`. Results returned through an
//! out-record get a fresh arena record, whose address is the result word.

use cranelift::prelude::*;
use cranelift_jit::JITModule;
use cranelift_module::{FuncId, Module};
use tern_ir::Ice;
use tern_rt::StructLayout;

use crate::CodegenError;

/// Narrow a 64-bit word to a parameter of type `ty`.
fn from_word(builder: &mut FunctionBuilder<'_>, word: Value, ty: Type) -> Value {
    if ty == types::I64 {
        word
    } else if ty == types::F64 {
        builder.ins().bitcast(types::F64, MemFlags::new(), word)
    } else if ty == types::F32 {
        let bits = builder.ins().ireduce(types::I32, word);
        builder.ins().bitcast(types::F32, MemFlags::new(), bits)
    } else {
        builder.ins().ireduce(ty, word)
    }
}

/// Widen a result of type `ty` to a 64-bit word.
fn to_word(builder: &mut FunctionBuilder<'_>, value: Value, ty: Type) -> Value {
    if ty == types::I64 {
        value
    } else if ty == types::F64 {
        builder.ins().bitcast(types::I64, MemFlags::new(), value)
    } else if ty == types::F32 {
        let bits = builder.ins().bitcast(types::I32, MemFlags::new(), value);
        builder.ins().uextend(types::I64, bits)
    } else {
        builder.ins().uextend(types::I64, value)
    }
}

pub(super) struct Trampoline<'a> {
    pub target: FuncId,
    pub target_sig: &'a Signature,
    pub out_record: Option<&'a StructLayout>,
    pub alloc: FuncId,
}

impl Trampoline<'_> {
    pub fn signature(module: &JITModule) -> Signature {
        let ptr_ty = module.target_config().pointer_type();
        let mut sig = module.make_signature();
        sig.params.push(AbiParam::new(ptr_ty));
        sig.params.push(AbiParam::new(ptr_ty));
        sig
    }

    /// Build the trampoline body into `ctx.func`.
    pub fn build(
        &self,
        module: &mut JITModule,
        func: &mut codegen::ir::Function,
        builder_ctx: &mut FunctionBuilderContext,
    ) -> Result<(), CodegenError> {
        let ptr_ty = module.target_config().pointer_type();
        let mut builder = FunctionBuilder::new(func, builder_ctx);
        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);
        builder.seal_block(entry);
        let (args, ret) = match *builder.block_params(entry) {
            [args, ret] => (args, ret),
            _ => return Err(Ice::new("generate", "entry trampoline takes two parameters").into()),
        };

        let target = module.declare_func_in_func(self.target, builder.func);
        let mut values = Vec::with_capacity(self.target_sig.params.len());
        let out = match self.out_record {
            Some(layout) => {
                let alloc = module.declare_func_in_func(self.alloc, builder.func);
                let size = builder.ins().iconst(types::I64, i64::try_from(layout.size).unwrap_or(0));
                let align = builder.ins().iconst(types::I64, i64::try_from(layout.align).unwrap_or(8));
                let call = builder.ins().call(alloc, &[size, align]);
                let out = builder.inst_results(call)[0];
                values.push(out);
                Some(out)
            }
            None => None,
        };
        let inputs = &self.target_sig.params[values.len()..];
        for (i, param) in inputs.iter().enumerate() {
            let offset = i32::try_from(i * 8)
                .map_err(|_| Ice::new("generate", format!("{i} entry arguments")))?;
            let word = builder
                .ins()
                .load(types::I64, MemFlags::trusted(), args, offset);
            values.push(from_word(&mut builder, word, param.value_type));
        }

        let call = builder.ins().call(target, &values);
        let word = match out {
            Some(out) if ptr_ty == types::I64 => out,
            Some(out) => builder.ins().uextend(types::I64, out),
            None => {
                let result = builder.inst_results(call)[0];
                let ty = builder.func.dfg.value_type(result);
                to_word(&mut builder, result, ty)
            }
        };
        builder.ins().store(MemFlags::trusted(), word, ret, 0);
        builder.ins().return_(&[]);
        builder.finalize();
        Ok(())
    }
}
