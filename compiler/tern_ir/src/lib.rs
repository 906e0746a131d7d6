//! Tree IR for tern.
//!
//! Untyped functions ([`Fn`]) arrive from the front end. The specializer
//! produces [`TypedFn`]s whose every expression carries a type; later passes
//! register rewritten copies as new versions in the [`Registry`].

mod args;
mod display;
mod error;
mod expr;
mod func;
mod registry;
mod stack;
mod stmt;

pub use args::{ActualArgs, Bound, FormalArgs};
pub use display::FnDisplay;
pub use error::{Ice, IrError};
pub use expr::{ConstValue, Expr, ExprKind, Prim};
pub use func::{Fn, TransformFlags, TypeEnv, TypedFn};
pub use registry::{Checkpoint, Registry, Signature};
pub use stack::ensure_sufficient_stack;
pub use stmt::{walk_exprs, walk_stmts, Block, Phi, Stmt};

pub use tern_types::Name;
