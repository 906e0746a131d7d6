use tern_types::TypeError;

/// Host/native boundary failures.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// A host argument's runtime type differs from the declared input type.
    #[error("argument {index}: expected {expected}, got {actual}")]
    ArgumentMismatch {
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("expected {expected} arguments, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    /// The type has no host representation.
    #[error("unsupported type at the native boundary: {0}")]
    UnsupportedType(String),

    /// A host value is internally inconsistent (e.g. array data that does
    /// not fill its shape).
    #[error("malformed value: {0}")]
    Malformed(String),

    #[error("native allocation of {size} bytes failed")]
    OutOfMemory { size: usize },

    #[error(transparent)]
    Type(#[from] TypeError),
}
