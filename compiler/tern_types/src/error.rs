use crate::Idx;

/// Type system failures.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TypeError {
    /// No least upper bound exists for the two types.
    #[error("incompatible types: {left_name} and {right_name}")]
    IncompatibleTypes {
        left: Idx,
        right: Idx,
        left_name: String,
        right_name: String,
    },

    /// The type has no representation for the requested use.
    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    /// A pool shard ran out of local indices.
    #[error("type pool shard {shard} exceeded {max} types", max = Idx::MAX_LOCAL)]
    PoolOverflow { shard: usize },

    /// The index was not produced by this pool.
    #[error("type index {0:?} does not belong to this pool")]
    ForeignIdx(Idx),
}
