//! Specialization entry point and cache.

use std::sync::Arc;

use tern_ir::{Fn, Name, Registry, TypedFn};
use tern_types::{Idx, TypePool};

use crate::infer::FnInferencer;
use crate::InferError;

/// Iteration bound for loop type fixed points.
pub const DEFAULT_MAX_FIXPOINT_ITERATIONS: u32 = 16;

/// Monomorphizes untyped functions for concrete argument types.
///
/// Results are cached per `(function, input types)` in the [`Registry`], so
/// a signature is inferred at most once per session.
pub struct Specializer<'a> {
    pub(crate) pool: &'a TypePool,
    pub(crate) registry: &'a Registry,
    pub(crate) max_fixpoint_iterations: u32,
}

impl<'a> Specializer<'a> {
    pub fn new(pool: &'a TypePool, registry: &'a Registry) -> Self {
        Specializer {
            pool,
            registry,
            max_fixpoint_iterations: DEFAULT_MAX_FIXPOINT_ITERATIONS,
        }
    }

    #[must_use]
    pub fn with_max_fixpoint_iterations(mut self, limit: u32) -> Self {
        self.max_fixpoint_iterations = limit.max(1);
        self
    }

    /// Specialize a definition, registering it first if the registry does
    /// not know it yet.
    pub fn specialize_def(&self, func: Fn, inputs: &[Idx]) -> Result<Arc<TypedFn>, InferError> {
        let name = func.name;
        if self.registry.untyped(name).is_none() {
            self.registry.define(func)?;
        }
        self.specialize(name, inputs)
    }

    /// The typed version of `func` for `inputs`, one per formal slot.
    pub fn specialize(&self, func: Name, inputs: &[Idx]) -> Result<Arc<TypedFn>, InferError> {
        if let Some(hit) = self.registry.specialization(func, inputs) {
            tracing::debug!(func = %func, typed = %hit.name, "specialization cache hit");
            return Ok(hit);
        }

        let _compiling = self.registry.compile_lock();
        if let Some(hit) = self.registry.specialization(func, inputs) {
            return Ok(hit);
        }

        let untyped = self
            .registry
            .untyped(func)
            .ok_or(InferError::UnknownFunction(func))?;

        if !self.registry.begin_specialization(func, inputs) {
            return Err(InferError::RecursiveSpecialization { func });
        }
        let span = tracing::debug_span!("specialize", func = %func, arity = inputs.len());
        let inferred = span.in_scope(|| FnInferencer::new(self, &untyped).infer_fn(inputs));
        self.registry.end_specialization(func, inputs);
        let (arg_names, body, return_type, type_env) = inferred?;

        let name = self.registry.fresh_name(func);
        let typed = TypedFn::new(
            name,
            arg_names,
            body,
            inputs.to_vec(),
            return_type,
            type_env,
        )?;
        let typed = self.registry.register(typed)?;
        self.registry
            .record_specialization(func, inputs, Arc::clone(&typed));
        tracing::debug!(
            func = %func,
            typed = %typed.name,
            ret = %self.pool.display(typed.return_type),
            "specialized"
        );
        Ok(typed)
    }
}
