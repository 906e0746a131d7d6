//! Type system for tern.
//!
//! Every type is interned in a [`TypePool`] and referenced by an [`Idx`].
//! Scalars and `None` sit at fixed indices, so the common types are
//! constants (`Idx::INT64`, `Idx::FLOAT32`, ...), and structural equality
//! of composite types is index equality.
//!
//! [`TypePool::combine`] computes the least upper bound used for numeric
//! promotion and for merging control-flow joins.

mod combine;
mod data;
mod error;
mod idx;
mod name;
mod pool;

pub use combine::combine_scalars;
pub use data::{Scalar, ScalarKind, Tag, TypeData};
pub use error::TypeError;
pub use idx::Idx;
pub use name::Name;
pub use pool::{SharedTypePool, TypeDisplay, TypePool};
