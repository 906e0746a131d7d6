//! Type index handle.
//!
//! `Idx` is the canonical type representation. Every type lives in a
//! [`TypePool`](crate::TypePool) and is referenced by a 32-bit index, so
//! equality and hashing are index comparisons.
//!
//! Layout: bits 31-28 hold the pool shard, bits 27-0 the local index.
//! Scalars and `None` are pre-interned in shard 0, so their indices are
//! the fixed constants below.

use std::fmt;

/// A 32-bit index into the type pool.
#[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Idx(u32);

impl Idx {
    // === Pre-interned types (shard 0, locals 0-11) ===

    /// `bool`.
    pub const BOOL: Self = Self(0);
    /// `int8`.
    pub const INT8: Self = Self(1);
    /// `int16`.
    pub const INT16: Self = Self(2);
    /// `int32`.
    pub const INT32: Self = Self(3);
    /// `int64`.
    pub const INT64: Self = Self(4);
    /// `uint8`.
    pub const UINT8: Self = Self(5);
    /// `uint16`.
    pub const UINT16: Self = Self(6);
    /// `uint32`.
    pub const UINT32: Self = Self(7);
    /// `uint64`.
    pub const UINT64: Self = Self(8);
    /// `float32`.
    pub const FLOAT32: Self = Self(9);
    /// `float64`.
    pub const FLOAT64: Self = Self(10);
    /// The `None` type.
    pub const NONE: Self = Self(11);

    /// Number of pre-interned types.
    pub const PRIMITIVE_COUNT: u32 = 12;

    /// Maximum local index per shard.
    pub const MAX_LOCAL: u32 = 0x0FFF_FFFF;

    /// Number of pool shards.
    pub const NUM_SHARDS: usize = 16;

    #[inline]
    pub(crate) const fn from_shard_local(shard: u32, local: u32) -> Self {
        debug_assert!(shard < 16);
        debug_assert!(local <= Self::MAX_LOCAL);
        Self((shard << 28) | local)
    }

    /// Shard index (bits 31-28).
    #[inline]
    pub(crate) const fn shard(self) -> usize {
        (self.0 >> 28) as usize
    }

    /// Local index within the shard (bits 27-0).
    #[inline]
    pub(crate) const fn local(self) -> usize {
        (self.0 & Self::MAX_LOCAL) as usize
    }

    /// Raw u32 value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// True for the pre-interned scalars and `None`.
    #[inline]
    pub const fn is_primitive(self) -> bool {
        self.0 < Self::PRIMITIVE_COUNT
    }

    /// Name of a pre-interned type, if this is one.
    pub const fn primitive_name(self) -> Option<&'static str> {
        match self.0 {
            0 => Some("bool"),
            1 => Some("int8"),
            2 => Some("int16"),
            3 => Some("int32"),
            4 => Some("int64"),
            5 => Some("uint8"),
            6 => Some("uint16"),
            7 => Some("uint32"),
            8 => Some("uint64"),
            9 => Some("float32"),
            10 => Some("float64"),
            11 => Some("none"),
            _ => None,
        }
    }
}

impl fmt::Debug for Idx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.primitive_name() {
            Some(name) => write!(f, "Idx::{name}"),
            None => write!(f, "Idx({}:{})", self.shard(), self.local()),
        }
    }
}

impl fmt::Display for Idx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.primitive_name() {
            Some(name) => f.write_str(name),
            None => write!(f, "#{}", self.0),
        }
    }
}

const _: () = assert!(std::mem::size_of::<Idx>() == 4);
