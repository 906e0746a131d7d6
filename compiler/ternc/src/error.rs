use tern_codegen::CodegenError;
use tern_infer::InferError;
use tern_ir::IrError;
use tern_lower::LowerError;
use tern_rt::BridgeError;
use tern_types::TypeError;

use crate::ConfigError;

/// Any failure between an untyped function and its result.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Ir(#[from] IrError),

    #[error(transparent)]
    Infer(#[from] InferError),

    #[error(transparent)]
    Lower(#[from] LowerError),

    #[error(transparent)]
    Codegen(#[from] CodegenError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CompileError {
    /// Compiler defects, as opposed to errors the caller can fix by
    /// changing the program or its arguments.
    pub fn is_internal(&self) -> bool {
        match self {
            CompileError::Ir(err) => err.is_internal(),
            CompileError::Infer(err) => err.is_internal(),
            CompileError::Lower(_) => true,
            CompileError::Codegen(err) => err.is_internal(),
            CompileError::Type(_) | CompileError::Bridge(_) | CompileError::Config(_) => false,
        }
    }
}
