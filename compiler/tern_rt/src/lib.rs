//! Runtime support for tern's compiled code.
//!
//! - [`Value`]: host-side values and their types ([`typeof_value`]).
//! - [`layout`]: native storage of every type. Scalars travel in their
//!   own width; composites are pointers to field-ordered, naturally
//!   aligned records.
//! - [`Codec`]: per-type conversion between host values and native words.
//! - [`arena`]: the per-invocation allocation arena and the C-ABI entry
//!   points compiled code calls (`tern_rt_alloc`, `tern_rt_num_cores`).
//!
//! # Safety
//!
//! Entry points take and return raw pointers produced by compiled code or
//! by the codecs below. They are `extern "C"` functions, not Rust API, so
//! they are not marked `unsafe`.

#![allow(
    unsafe_code,
    reason = "marshaling reads and writes native records through raw pointers"
)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    reason = "native words are reinterpreted at their declared width"
)]

pub mod arena;
mod codec;
mod error;
pub mod layout;
mod value;

pub use arena::{tern_rt_alloc, tern_rt_num_cores, InvocationScope};
pub use codec::{codec_for, Codec};
pub use error::BridgeError;
pub use layout::{Slot, StructLayout};
pub use value::{typeof_value, ArrayValue, Value};

/// Symbols compiled code links against, for registration with the JIT.
pub fn runtime_symbols() -> [(&'static str, *const u8); 2] {
    [
        ("tern_rt_alloc", tern_rt_alloc as *const u8),
        ("tern_rt_num_cores", tern_rt_num_cores as *const u8),
    ]
}
