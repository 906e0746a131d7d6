use tern_ir::{Ice, IrError, Name};
use tern_types::TypeError;

/// Specialization failures.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InferError {
    #[error(transparent)]
    Type(#[from] TypeError),

    #[error(transparent)]
    Ir(#[from] IrError),

    #[error("unknown function `{0}`")]
    UnknownFunction(Name),

    #[error("`{name}` is not bound in `{func}`")]
    UnboundVariable { func: Name, name: Name },

    /// A function needs its own specialization to finish specializing.
    #[error("`{func}` calls itself with the same argument types")]
    RecursiveSpecialization { func: Name },

    #[error("{ty} has no attribute `{attr}`")]
    NoSuchAttribute { ty: String, attr: Name },

    #[error("invalid index into {ty}: {reason}")]
    InvalidIndex { ty: String, reason: String },

    #[error("{0}")]
    Ice(Box<Ice>),
}

impl InferError {
    pub(crate) fn unsupported(what: impl Into<String>) -> Self {
        InferError::Type(TypeError::UnsupportedType(what.into()))
    }

    /// Compiler defects, as opposed to errors in the program being compiled.
    pub fn is_internal(&self) -> bool {
        match self {
            InferError::Ice(_) => true,
            InferError::Ir(err) => err.is_internal(),
            _ => false,
        }
    }
}

impl From<Ice> for InferError {
    fn from(ice: Ice) -> Self {
        InferError::Ice(Box::new(ice))
    }
}
