use cranelift_module::ModuleError;
use tern_ir::{Ice, Name};
use tern_lower::LowerError;
use tern_rt::BridgeError;

/// Native compilation failures.
#[derive(Debug, thiserror::Error)]
pub enum CodegenError {
    #[error(transparent)]
    Lower(#[from] LowerError),

    /// A type has no native layout.
    #[error(transparent)]
    Layout(#[from] BridgeError),

    /// A call names a function that was never specialized.
    #[error("call to unregistered function `{0}`")]
    Unregistered(Name),

    /// Cranelift rejected a function or failed to finalize the module.
    #[error("cranelift: {0}")]
    Module(#[from] Box<ModuleError>),

    /// The host ISA could not be configured.
    #[error("native target unavailable: {0}")]
    Isa(String),

    #[error("{0}")]
    Ice(Box<Ice>),
}

impl CodegenError {
    pub fn is_internal(&self) -> bool {
        match self {
            CodegenError::Lower(_)
            | CodegenError::Module(_)
            | CodegenError::Unregistered(_)
            | CodegenError::Ice(_) => true,
            CodegenError::Layout(_) | CodegenError::Isa(_) => false,
        }
    }
}

impl From<Ice> for CodegenError {
    fn from(ice: Ice) -> Self {
        CodegenError::Ice(Box::new(ice))
    }
}

impl From<ModuleError> for CodegenError {
    fn from(err: ModuleError) -> Self {
        CodegenError::Module(Box::new(err))
    }
}
