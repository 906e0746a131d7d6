//! Native code generation for lowered tern functions.
//!
//! [`JitBackend::generate`] lowers a typed function if needed, compiles it
//! and every callee it reaches with Cranelift, and hands back a
//! [`NativeCallable`]. Each `(name, version)` is compiled once; later
//! modules link against earlier code by symbol.
//!
//! Every compiled function also gets a uniform entry trampoline,
//! `extern "C" fn(args: *const u64, ret: *mut u64)`, so the bridge can
//! call any signature through one pointer type. Argument and result words
//! use the encodings of [`tern_rt::Codec`].

#![allow(
    unsafe_code,
    reason = "finalized JIT code is entered through transmuted function pointers"
)]

mod backend;
mod compare;
mod error;
mod function;

/// Trap codes raised by compiled code.
pub(crate) mod trap_codes {
    use cranelift::prelude::TrapCode;

    /// The runtime arena could not satisfy an allocation.
    pub const OUT_OF_MEMORY: TrapCode = TrapCode::unwrap_user(1);
}

pub use backend::{BackendOptions, EntryFn, JitBackend, NativeCallable, OptLevel};
pub use compare::{comparison_opcode, Comparison, OperandClass};
pub use error::CodegenError;
