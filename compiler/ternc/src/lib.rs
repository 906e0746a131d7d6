//! Compilation sessions for tern.
//!
//! A [`Session`] owns the type pool, the function registry and the native
//! backend. Untyped functions go in, native callables come out:
//!
//! ```text
//! Fn + argument types
//!   -> specialize (tern_infer)   typed IR, version 0
//!   -> lower      (tern_lower)   explicit storage, version 1
//!   -> generate   (tern_codegen) native code + entry trampoline
//!   -> invoke     (bridge)       host values in, host value out
//! ```
//!
//! Set `RUST_LOG` and call [`init_tracing`] to see each stage.

mod config;
mod error;
mod session;

#[allow(
    unsafe_code,
    reason = "invocation enters native code through its entry trampoline"
)]
mod bridge;

use std::sync::Once;

pub use bridge::invoke;
pub use config::{ConfigError, SessionConfig};
pub use error::CompileError;
pub use session::Session;

pub use tern_codegen::{NativeCallable, OptLevel};
pub use tern_ir::{ActualArgs, Expr, FormalArgs, Fn, Name, Phi, Prim, Stmt};
pub use tern_rt::{ArrayValue, Value};
pub use tern_types::{Idx, Scalar};

static TRACING_INIT: Once = Once::new();

/// Install a `tracing` subscriber filtered by `RUST_LOG`.
///
/// Does nothing when `RUST_LOG` is unset, and only the first call has an
/// effect.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
