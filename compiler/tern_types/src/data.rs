//! Interned type payloads.

use std::fmt;

use crate::{Idx, Name};

/// Scalar family.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    Int,
    UInt,
    Float,
}

/// A machine scalar: family plus bit width.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Scalar {
    pub kind: ScalarKind,
    pub bits: u8,
}

impl Scalar {
    pub const BOOL: Scalar = Scalar::new(ScalarKind::Bool, 8);
    pub const INT8: Scalar = Scalar::new(ScalarKind::Int, 8);
    pub const INT16: Scalar = Scalar::new(ScalarKind::Int, 16);
    pub const INT32: Scalar = Scalar::new(ScalarKind::Int, 32);
    pub const INT64: Scalar = Scalar::new(ScalarKind::Int, 64);
    pub const UINT8: Scalar = Scalar::new(ScalarKind::UInt, 8);
    pub const UINT16: Scalar = Scalar::new(ScalarKind::UInt, 16);
    pub const UINT32: Scalar = Scalar::new(ScalarKind::UInt, 32);
    pub const UINT64: Scalar = Scalar::new(ScalarKind::UInt, 64);
    pub const FLOAT32: Scalar = Scalar::new(ScalarKind::Float, 32);
    pub const FLOAT64: Scalar = Scalar::new(ScalarKind::Float, 64);

    /// All scalars in pre-interned order.
    pub const ALL: [Scalar; 11] = [
        Self::BOOL,
        Self::INT8,
        Self::INT16,
        Self::INT32,
        Self::INT64,
        Self::UINT8,
        Self::UINT16,
        Self::UINT32,
        Self::UINT64,
        Self::FLOAT32,
        Self::FLOAT64,
    ];

    pub const fn new(kind: ScalarKind, bits: u8) -> Self {
        Scalar { kind, bits }
    }

    /// The fixed pool index of this scalar.
    ///
    /// Returns `None` for widths outside the scalar set.
    pub const fn idx(self) -> Option<Idx> {
        Some(match (self.kind, self.bits) {
            (ScalarKind::Bool, _) => Idx::BOOL,
            (ScalarKind::Int, 8) => Idx::INT8,
            (ScalarKind::Int, 16) => Idx::INT16,
            (ScalarKind::Int, 32) => Idx::INT32,
            (ScalarKind::Int, 64) => Idx::INT64,
            (ScalarKind::UInt, 8) => Idx::UINT8,
            (ScalarKind::UInt, 16) => Idx::UINT16,
            (ScalarKind::UInt, 32) => Idx::UINT32,
            (ScalarKind::UInt, 64) => Idx::UINT64,
            (ScalarKind::Float, 32) => Idx::FLOAT32,
            (ScalarKind::Float, 64) => Idx::FLOAT64,
            _ => return None,
        })
    }

    pub const fn is_bool(self) -> bool {
        matches!(self.kind, ScalarKind::Bool)
    }

    pub const fn is_float(self) -> bool {
        matches!(self.kind, ScalarKind::Float)
    }

    /// Only `Int` is signed; `Bool` and `UInt` compare unsigned.
    pub const fn is_signed(self) -> bool {
        matches!(self.kind, ScalarKind::Int)
    }

    /// Integer-like: bool, signed or unsigned integer.
    pub const fn is_integer(self) -> bool {
        !self.is_float()
    }

    /// Storage size in bytes.
    pub const fn size(self) -> u32 {
        self.bits as u32 / 8
    }

    pub const fn name(self) -> &'static str {
        match self.idx() {
            Some(idx) => match idx.primitive_name() {
                Some(name) => name,
                None => "?",
            },
            None => "?",
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Interned type payload.
///
/// Children are `Idx` handles, so hashing and equality are shallow.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeData {
    Scalar(Scalar),
    None,
    Tuple(Box<[Idx]>),
    Struct {
        name: Name,
        fields: Box<[(Name, Idx)]>,
    },
    Array {
        elem: Idx,
        rank: u32,
    },
    Closure {
        target: Name,
        partial: Box<[Idx]>,
    },
    Function {
        inputs: Box<[Idx]>,
        ret: Idx,
    },
    Pointer(Idx),
}

impl TypeData {
    pub fn tag(&self) -> Tag {
        match self {
            TypeData::Scalar(_) => Tag::Scalar,
            TypeData::None => Tag::None,
            TypeData::Tuple(_) => Tag::Tuple,
            TypeData::Struct { .. } => Tag::Struct,
            TypeData::Array { .. } => Tag::Array,
            TypeData::Closure { .. } => Tag::Closure,
            TypeData::Function { .. } => Tag::Function,
            TypeData::Pointer(_) => Tag::Pointer,
        }
    }
}

/// Type variant discriminant.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Tag {
    Scalar,
    None,
    Tuple,
    Struct,
    Array,
    Closure,
    Function,
    Pointer,
}

impl Tag {
    pub const fn name(self) -> &'static str {
        match self {
            Tag::Scalar => "scalar",
            Tag::None => "none",
            Tag::Tuple => "tuple",
            Tag::Struct => "struct",
            Tag::Array => "array",
            Tag::Closure => "closure",
            Tag::Function => "function",
            Tag::Pointer => "pointer",
        }
    }

    /// Values of this kind live behind a pointer in native code.
    pub const fn is_boxed(self) -> bool {
        matches!(
            self,
            Tag::Tuple | Tag::Struct | Tag::Array | Tag::Closure | Tag::Pointer
        )
    }
}
