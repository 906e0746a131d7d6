use tern_ir::{Ice, IrError, Name};

/// Lowering failures. All of them are compiler defects: typed IR that
/// passed inference always lowers.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LowerError {
    #[error(transparent)]
    Ir(#[from] IrError),

    #[error("`{0}` has no registered typed version")]
    Unregistered(Name),

    #[error("{0}")]
    Ice(Box<Ice>),
}

impl From<Ice> for LowerError {
    fn from(ice: Ice) -> Self {
        LowerError::Ice(Box::new(ice))
    }
}
