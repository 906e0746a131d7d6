//! JIT module management and the compiled-function cache.

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
mod trampoline;

use std::fmt;
use std::sync::Arc;

use cranelift::prelude::*;
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{default_libcall_names, FuncId, Linkage, Module};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tern_ir::{walk_exprs, ExprKind, Name, Registry, TypedFn};
use tern_lower::lower;
use tern_rt::{runtime_symbols, BridgeError};
use tern_types::{Idx, TypePool};

use crate::function::{signature, Callee, FunctionCompiler, Imports};
use crate::CodegenError;
use trampoline::Trampoline;

/// Cranelift optimization level.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum OptLevel {
    None,
    #[default]
    Speed,
    SpeedAndSize,
}

impl OptLevel {
    fn setting(self) -> &'static str {
        match self {
            OptLevel::None => "none",
            OptLevel::Speed => "speed",
            OptLevel::SpeedAndSize => "speed_and_size",
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BackendOptions {
    pub opt_level: OptLevel,
    /// Run the Cranelift IR verifier on every function.
    pub verify: bool,
}

impl Default for BackendOptions {
    fn default() -> Self {
        BackendOptions {
            opt_level: OptLevel::Speed,
            verify: cfg!(debug_assertions),
        }
    }
}

/// Uniform entry point of a compiled function.
///
/// `args` points at one encoded word per input; the encoded result is
/// written to `ret`.
pub type EntryFn = unsafe extern "C" fn(args: *const u64, ret: *mut u64);

/// A finalized module. Its code lives as long as this does.
struct LoadedModule {
    _module: JITModule,
}

// SAFETY: finalized code is immutable and the module is never touched again
// after finalization.
unsafe impl Send for LoadedModule {}
// SAFETY: as above.
unsafe impl Sync for LoadedModule {}

/// A compiled function, callable through its entry trampoline.
#[derive(Clone)]
pub struct NativeCallable {
    name: Name,
    version: u32,
    input_types: Arc<[Idx]>,
    return_type: Idx,
    entry: EntryFn,
    _code: Arc<LoadedModule>,
}

impl NativeCallable {
    pub fn name(&self) -> Name {
        self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn input_types(&self) -> &[Idx] {
        &self.input_types
    }

    pub fn return_type(&self) -> Idx {
        self.return_type
    }

    /// Call through the entry trampoline with encoded argument words.
    ///
    /// # Safety
    /// Each word must be a valid encoding of the corresponding input type,
    /// and every record it points to must stay live for the call. The call
    /// must happen inside a [`tern_rt::InvocationScope`].
    pub unsafe fn call_words(&self, args: &[u64]) -> Result<u64, BridgeError> {
        if args.len() != self.input_types.len() {
            return Err(BridgeError::ArityMismatch {
                expected: self.input_types.len(),
                actual: args.len(),
            });
        }
        let mut ret = 0u64;
        (self.entry)(args.as_ptr(), &mut ret);
        Ok(ret)
    }
}

impl fmt::Debug for NativeCallable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeCallable")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("input_types", &self.input_types)
            .field("return_type", &self.return_type)
            .finish_non_exhaustive()
    }
}

/// Code address of a compiled function, for linking later modules.
#[derive(Copy, Clone)]
struct CodePtr(*const u8);

// SAFETY: points into immutable finalized code kept alive by `LoadedModule`.
unsafe impl Send for CodePtr {}
// SAFETY: as above.
unsafe impl Sync for CodePtr {}

struct Compiled {
    callable: NativeCallable,
    code: CodePtr,
    callee: CalleeShape,
}

/// What a caller in another module needs to declare an import.
#[derive(Clone)]
struct CalleeShape {
    inputs: Vec<Idx>,
    ret: Idx,
}

#[derive(Default)]
struct BackendState {
    compiled: FxHashMap<Name, Compiled>,
}

/// Compiles lowered functions with Cranelift and caches the results.
pub struct JitBackend {
    options: BackendOptions,
    state: Mutex<BackendState>,
}

impl Default for JitBackend {
    fn default() -> Self {
        Self::new(BackendOptions::default())
    }
}

impl JitBackend {
    pub fn new(options: BackendOptions) -> Self {
        JitBackend {
            options,
            state: Mutex::new(BackendState::default()),
        }
    }

    pub fn options(&self) -> BackendOptions {
        self.options
    }

    /// Number of functions compiled so far.
    pub fn compiled_count(&self) -> usize {
        self.state.lock().compiled.len()
    }

    /// Lower `func` if needed and compile it along with every callee not
    /// compiled yet.
    pub fn generate(
        &self,
        pool: &TypePool,
        registry: &Registry,
        func: &TypedFn,
    ) -> Result<NativeCallable, CodegenError> {
        // Callees lower while the state lock is held; the compile lock comes first.
        let _compiling = registry.compile_lock();
        let lowered = lower(pool, registry, func)?;
        let mut state = self.state.lock();
        if let Some(hit) = state.compiled.get(&lowered.name) {
            if hit.callable.version == lowered.version {
                tracing::debug!(func = %lowered.name, version = lowered.version, "native cache hit");
                return Ok(hit.callable.clone());
            }
        }

        let span = tracing::debug_span!("generate", func = %lowered.name, version = lowered.version);
        let _guard = span.enter();

        let pending = collect_pending(pool, registry, &lowered, &state)?;
        let compiled = self.compile_module(pool, &pending, &state)?;
        for entry in compiled {
            state.compiled.insert(entry.callable.name, entry);
        }
        state
            .compiled
            .get(&lowered.name)
            .map(|c| c.callable.clone())
            .ok_or(CodegenError::Unregistered(lowered.name))
    }

    fn isa_flags(&self) -> Result<settings::Flags, CodegenError> {
        let mut flags = settings::builder();
        let set = |flags: &mut settings::Builder, name: &str, value: &str| {
            flags
                .set(name, value)
                .map_err(|e| CodegenError::Isa(format!("{name}={value}: {e}")))
        };
        set(&mut flags, "use_colocated_libcalls", "false")?;
        set(&mut flags, "is_pic", "false")?;
        set(&mut flags, "opt_level", self.options.opt_level.setting())?;
        set(
            &mut flags,
            "enable_verifier",
            if self.options.verify { "true" } else { "false" },
        )?;
        Ok(settings::Flags::new(flags))
    }

    fn new_module(&self, state: &BackendState) -> Result<JITModule, CodegenError> {
        let isa = cranelift_native::builder()
            .map_err(|msg| CodegenError::Isa(msg.to_string()))?
            .finish(self.isa_flags()?)
            .map_err(|e| CodegenError::Isa(e.to_string()))?;
        let mut builder = JITBuilder::with_isa(isa, default_libcall_names());
        for (symbol, ptr) in runtime_symbols() {
            builder.symbol(symbol, ptr);
        }
        for compiled in state.compiled.values() {
            builder.symbol(symbol_name(&compiled.callable), compiled.code.0);
        }
        Ok(JITModule::new(builder))
    }

    fn compile_module(
        &self,
        pool: &TypePool,
        pending: &[Arc<TypedFn>],
        state: &BackendState,
    ) -> Result<Vec<Compiled>, CodegenError> {
        let mut module = self.new_module(state)?;
        let ptr_ty = module.target_config().pointer_type();

        let mut alloc_sig = module.make_signature();
        alloc_sig.params.push(AbiParam::new(types::I64));
        alloc_sig.params.push(AbiParam::new(types::I64));
        alloc_sig.returns.push(AbiParam::new(ptr_ty));
        let alloc = module.declare_function("tern_rt_alloc", Linkage::Import, &alloc_sig)?;
        let mut cores_sig = module.make_signature();
        cores_sig.returns.push(AbiParam::new(types::I64));
        let num_cores = module.declare_function("tern_rt_num_cores", Linkage::Import, &cores_sig)?;

        // Everything already compiled is importable; pending functions are
        // defined here.
        let mut callees = FxHashMap::default();
        for compiled in state.compiled.values() {
            let shape = &compiled.callee;
            let (sig, out_record) = signature(&module, pool, &shape.inputs, shape.ret)?;
            let id = module.declare_function(&symbol_name(&compiled.callable), Linkage::Import, &sig)?;
            callees.insert(compiled.callable.name, Callee { id, out_record });
        }
        let mut defined: Vec<(Arc<TypedFn>, FuncId, Signature)> = Vec::with_capacity(pending.len());
        for func in pending {
            let (sig, out_record) =
                signature(&module, pool, &func.input_types, func.return_type)?;
            let id = module.declare_function(
                &format!("{}.{}", func.name, func.version),
                Linkage::Export,
                &sig,
            )?;
            callees.insert(func.name, Callee { id, out_record });
            defined.push((Arc::clone(func), id, sig));
        }
        let imports = Imports {
            alloc,
            num_cores,
            callees: &callees,
        };

        let mut ctx = module.make_context();
        let mut builder_ctx = FunctionBuilderContext::new();
        let mut entries = Vec::with_capacity(defined.len());
        for (func, id, sig) in &defined {
            let out_record = callees.get(&func.name).and_then(|c| c.out_record.clone());
            ctx.func.signature = sig.clone();
            let builder = FunctionBuilder::new(&mut ctx.func, &mut builder_ctx);
            FunctionCompiler::new(pool, func, &mut module, &imports, builder, out_record.clone())
                .compile()?;
            module.define_function(*id, &mut ctx)?;
            module.clear_context(&mut ctx);

            let entry_sig = Trampoline::signature(&module);
            let entry_id = module.declare_function(
                &format!("{}.{}.entry", func.name, func.version),
                Linkage::Local,
                &entry_sig,
            )?;
            ctx.func.signature = entry_sig;
            Trampoline {
                target: *id,
                target_sig: sig,
                out_record: out_record.as_ref(),
                alloc,
            }
            .build(&mut module, &mut ctx.func, &mut builder_ctx)?;
            module.define_function(entry_id, &mut ctx)?;
            module.clear_context(&mut ctx);
            entries.push(entry_id);
            tracing::debug!(func = %func.name, version = func.version, "compiled");
        }

        module.finalize_definitions()?;
        let mut code = Vec::with_capacity(defined.len());
        for ((func, id, _), entry_id) in defined.iter().zip(&entries) {
            code.push((
                Arc::clone(func),
                module.get_finalized_function(*id),
                module.get_finalized_function(*entry_id),
            ));
        }
        let loaded = Arc::new(LoadedModule { _module: module });

        Ok(code
            .into_iter()
            .map(|(func, ptr, entry)| {
                // SAFETY: `entry` was built by `Trampoline::build` with the
                // `EntryFn` signature and stays valid while `loaded` lives.
                let entry = unsafe { std::mem::transmute::<*const u8, EntryFn>(entry) };
                Compiled {
                    callable: NativeCallable {
                        name: func.name,
                        version: func.version,
                        input_types: func.input_types.as_slice().into(),
                        return_type: func.return_type,
                        entry,
                        _code: Arc::clone(&loaded),
                    },
                    code: CodePtr(ptr),
                    callee: CalleeShape {
                        inputs: func.input_types.clone(),
                        ret: func.return_type,
                    },
                }
            })
            .collect())
    }
}

impl fmt::Debug for JitBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JitBackend")
            .field("options", &self.options)
            .field("compiled", &self.compiled_count())
            .finish()
    }
}

fn symbol_name(callable: &NativeCallable) -> String {
    format!("{}.{}", callable.name, callable.version)
}

/// `root` and every function it transitively calls that is not compiled
/// yet, lowered.
fn collect_pending(
    pool: &TypePool,
    registry: &Registry,
    root: &Arc<TypedFn>,
    state: &BackendState,
) -> Result<Vec<Arc<TypedFn>>, CodegenError> {
    let mut pending = Vec::new();
    let mut seen = FxHashSet::default();
    let mut stack = vec![Arc::clone(root)];
    seen.insert(root.name);
    while let Some(func) = stack.pop() {
        let mut targets = Vec::new();
        walk_exprs(&func.body, &mut |expr| {
            if let ExprKind::Call {
                target: Some(target),
                ..
            } = expr.kind
            {
                targets.push(target);
            }
        });
        for target in targets {
            if state.compiled.contains_key(&target) || !seen.insert(target) {
                continue;
            }
            let latest = registry
                .latest(target)
                .ok_or(CodegenError::Unregistered(target))?;
            stack.push(lower(pool, registry, &latest)?);
        }
        pending.push(func);
    }
    Ok(pending)
}
