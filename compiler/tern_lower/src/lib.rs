//! Lowering of typed IR toward the machine.
//!
//! - [`find_mutable_types`] decides which composite types need
//!   reference semantics because some store writes through them.
//! - [`lower`] rewrites tuples, slices, closures and array literals into
//!   explicit `Struct`, `Alloc` and projection nodes, and registers the
//!   result as the next version of the function.
//! - [`verify_lowered`] checks the output grammar.

mod error;
mod lower;
mod mutability;
mod verify;

pub use error::LowerError;
pub use lower::lower;
pub use mutability::{find_mutable_types, MutabilityClassifier};
pub use verify::verify_lowered;
