//! Type inference and specialization.
//!
//! [`Specializer::specialize`] turns an untyped [`tern_ir::Fn`] plus concrete
//! input types into a registered [`tern_ir::TypedFn`]. Callees are
//! specialized on demand, and every signature is inferred once per session.

mod error;
mod infer;
mod specialize;

pub use error::InferError;
pub use specialize::{Specializer, DEFAULT_MAX_FIXPOINT_ITERATIONS};
