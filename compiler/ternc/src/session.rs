//! The compilation session facade.

use std::sync::Arc;

use tern_codegen::{JitBackend, NativeCallable};
use tern_infer::Specializer;
use tern_ir::{Fn, IrError, Registry};
use tern_rt::{typeof_value, Value};
use tern_types::{Idx, SharedTypePool, TypePool};

use crate::{bridge, CompileError, SessionConfig};

/// One compilation session: a type pool, the function registry and the
/// native code compiled so far.
///
/// Compilation is serialized on the registry's compile lock. Invocation is
/// not; compiled callables may be called from any thread.
pub struct Session {
    config: SessionConfig,
    pool: SharedTypePool,
    registry: Registry,
    backend: JitBackend,
}

impl Default for Session {
    fn default() -> Self {
        Session::new(SessionConfig::default())
    }
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Session {
            backend: JitBackend::new(config.backend_options()),
            config,
            pool: TypePool::shared(),
            registry: Registry::new(),
        }
    }

    /// A session configured from the `TERN_*` environment variables.
    pub fn from_env() -> Result<Self, CompileError> {
        Ok(Session::new(SessionConfig::from_env()?))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn pool(&self) -> &TypePool {
        &self.pool
    }

    pub fn shared_pool(&self) -> SharedTypePool {
        Arc::clone(&self.pool)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Register an untyped function so other functions can call it.
    pub fn define(&self, func: Fn) -> Result<(), CompileError> {
        self.registry.define(func)?;
        Ok(())
    }

    /// Specialize `func` for `inputs` and compile it with its callees.
    ///
    /// `func` is defined on first use. A different function under an
    /// already defined name is rejected. On failure every typed function
    /// and specialization registered by this attempt is rolled back.
    pub fn specialize_and_compile(&self, func: &Fn, inputs: &[Idx]) -> Result<NativeCallable, CompileError> {
        let _compiling = self.registry.compile_lock();
        match self.registry.untyped(func.name) {
            Some(known) if *known != *func => {
                return Err(IrError::DuplicateFunction(func.name).into());
            }
            Some(_) => {}
            None => {
                self.registry.define(func.clone())?;
            }
        }

        let checkpoint = self.registry.checkpoint();
        let callable = match self.compile(func, inputs) {
            Ok(callable) => callable,
            Err(err) => {
                self.registry.rollback(checkpoint);
                tracing::debug!(func = %func.name, error = %err, "compilation failed");
                return Err(err);
            }
        };
        tracing::debug!(
            func = %func.name,
            typed = %callable.name(),
            version = callable.version(),
            "compiled"
        );
        Ok(callable)
    }

    fn compile(&self, func: &Fn, inputs: &[Idx]) -> Result<NativeCallable, CompileError> {
        let typed = Specializer::new(&self.pool, &self.registry)
            .with_max_fixpoint_iterations(self.config.max_fixpoint_iterations)
            .specialize(func.name, inputs)?;
        Ok(self.backend.generate(&self.pool, &self.registry, &typed)?)
    }

    /// Call a compiled function on host values.
    pub fn invoke(&self, callable: &NativeCallable, args: &[Value]) -> Result<Value, CompileError> {
        Ok(bridge::invoke(
            &self.pool,
            callable,
            args,
            self.config.effective_num_cores(),
        )?)
    }

    /// Specialize `func` for the runtime types of `args`, compile it and
    /// call it.
    pub fn call(&self, func: &Fn, args: &[Value]) -> Result<Value, CompileError> {
        let inputs = args
            .iter()
            .map(|arg| typeof_value(&self.pool, arg))
            .collect::<Result<Vec<_>, _>>()?;
        let callable = self.specialize_and_compile(func, &inputs)?;
        self.invoke(&callable, args)
    }

    /// Number of functions with native code.
    pub fn compiled_count(&self) -> usize {
        self.backend.compiled_count()
    }
}
