//! Host-side invocation of compiled functions.
//!
//! Arguments are checked against the callable's exact input types, encoded
//! into native words inside a fresh [`InvocationScope`], passed through the
//! entry trampoline, and the result is decoded before the scope frees the
//! records it points to.

use tern_codegen::NativeCallable;
use tern_rt::{codec_for, typeof_value, BridgeError, InvocationScope, Value};
use tern_types::TypePool;

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]

/// Call `callable` with host `args`, with `num_cores` visible to the
/// compiled code as its degree of parallelism.
pub fn invoke(
    pool: &TypePool,
    callable: &NativeCallable,
    args: &[Value],
    num_cores: usize,
) -> Result<Value, BridgeError> {
    let _span = tracing::debug_span!("invoke", func = %callable.name(), version = callable.version())
        .entered();

    let inputs = callable.input_types();
    if args.len() != inputs.len() {
        return Err(BridgeError::ArityMismatch {
            expected: inputs.len(),
            actual: args.len(),
        });
    }
    for (index, (arg, &expected)) in args.iter().zip(inputs).enumerate() {
        let actual = typeof_value(pool, arg)?;
        if actual != expected {
            return Err(BridgeError::ArgumentMismatch {
                index,
                expected: pool.render(expected),
                actual: pool.render(actual),
            });
        }
    }

    let codecs = inputs
        .iter()
        .map(|&ty| codec_for(pool, ty))
        .collect::<Result<Vec<_>, _>>()?;
    let result = codec_for(pool, callable.return_type())?;

    let _scope = InvocationScope::enter(num_cores);
    let words = args
        .iter()
        .zip(&codecs)
        .map(|(arg, codec)| codec.encode(arg))
        .collect::<Result<Vec<_>, _>>()?;
    // SAFETY: every word encodes a value whose type was checked against the
    // declared input type, and `_scope` keeps the argument records and any
    // records the callee allocates alive until the result is decoded.
    let value = unsafe {
        let word = callable.call_words(&words)?;
        result.decode(word)?
    };
    tracing::debug!(result = %value, "invocation finished");
    Ok(value)
}
