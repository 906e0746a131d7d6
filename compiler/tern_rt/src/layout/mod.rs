//! Native storage of tern types.
//!
//! Every value occupies one [`Slot`]. Scalars use their own width (`bool`
//! is one byte holding 0 or 1), `None` is an `i64` zero, and tuples,
//! structs, closures, arrays and pointers are a pointer to a record.
//! Records lay their fields out in declaration order, each aligned to its
//! own size, with the total padded to the largest alignment. An array's
//! record is `{data, shape, strides}`.

use tern_types::{Idx, Name, ScalarKind, Tag, TypeData, TypePool};

use crate::BridgeError;

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;

const PTR_SIZE: usize = std::mem::size_of::<usize>();

/// Storage class of one value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
    Ptr,
}

impl Slot {
    pub const fn size(self) -> usize {
        match self {
            Slot::I8 => 1,
            Slot::I16 => 2,
            Slot::I32 | Slot::F32 => 4,
            Slot::I64 | Slot::F64 => 8,
            Slot::Ptr => PTR_SIZE,
        }
    }

    pub const fn align(self) -> usize {
        self.size()
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Slot::F32 | Slot::F64)
    }

    /// Read a slot-sized value from `ptr` into the low bits of a word.
    ///
    /// # Safety
    /// `ptr` must be valid for reads of `self.size()` bytes.
    pub unsafe fn load(self, ptr: *const u8) -> u64 {
        match self {
            Slot::I8 => u64::from(ptr.read()),
            Slot::I16 => u64::from(ptr.cast::<u16>().read_unaligned()),
            Slot::I32 | Slot::F32 => u64::from(ptr.cast::<u32>().read_unaligned()),
            Slot::I64 | Slot::F64 => ptr.cast::<u64>().read_unaligned(),
            Slot::Ptr => ptr.cast::<usize>().read_unaligned() as u64,
        }
    }

    /// Write the low `self.size()` bytes of `word` to `ptr`.
    ///
    /// # Safety
    /// `ptr` must be valid for writes of `self.size()` bytes.
    pub unsafe fn store(self, ptr: *mut u8, word: u64) {
        match self {
            Slot::I8 => ptr.write(word as u8),
            Slot::I16 => ptr.cast::<u16>().write_unaligned(word as u16),
            Slot::I32 | Slot::F32 => ptr.cast::<u32>().write_unaligned(word as u32),
            Slot::I64 | Slot::F64 => ptr.cast::<u64>().write_unaligned(word),
            Slot::Ptr => ptr.cast::<usize>().write_unaligned(word as usize),
        }
    }
}

/// The slot a value of type `ty` occupies.
pub fn slot_of(pool: &TypePool, ty: Idx) -> Result<Slot, BridgeError> {
    if let Some(scalar) = pool.as_scalar(ty) {
        return Ok(match (scalar.kind, scalar.bits) {
            (ScalarKind::Float, 32) => Slot::F32,
            (ScalarKind::Float, _) => Slot::F64,
            (_, 8) => Slot::I8,
            (_, 16) => Slot::I16,
            (_, 32) => Slot::I32,
            _ => Slot::I64,
        });
    }
    match pool.tag(ty) {
        Tag::None => Ok(Slot::I64),
        Tag::Function => Err(BridgeError::UnsupportedType(pool.render(ty))),
        _ => Ok(Slot::Ptr),
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FieldLayout {
    pub offset: usize,
    pub slot: Slot,
}

/// Field offsets of a record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StructLayout {
    pub fields: Vec<FieldLayout>,
    pub size: usize,
    pub align: usize,
}

impl StructLayout {
    pub fn from_slots(slots: impl IntoIterator<Item = Slot>) -> Self {
        let mut fields = Vec::new();
        let mut offset: usize = 0;
        let mut align = 1;
        for slot in slots {
            offset = offset.next_multiple_of(slot.align());
            fields.push(FieldLayout { offset, slot });
            offset += slot.size();
            align = align.max(slot.align());
        }
        StructLayout {
            fields,
            size: offset.next_multiple_of(align),
            align,
        }
    }

    pub fn field(&self, index: usize) -> Option<FieldLayout> {
        self.fields.get(index).copied()
    }
}

/// Layout of the record a pointer-slot value of type `ty` points to.
///
/// Pointers point at a single slot of their pointee type.
pub fn struct_layout(pool: &TypePool, ty: Idx) -> Result<StructLayout, BridgeError> {
    match pool.tag(ty) {
        Tag::Tuple | Tag::Struct | Tag::Closure | Tag::Array | Tag::Pointer => {
            let slots = pool
                .components(ty)
                .into_iter()
                .map(|child| slot_of(pool, child))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(StructLayout::from_slots(slots))
        }
        _ => Err(BridgeError::UnsupportedType(format!(
            "{} has no record layout",
            pool.render(ty)
        ))),
    }
}

/// Position of field `name` in the record of `ty`.
pub fn field_position(pool: &TypePool, ty: Idx, name: Name) -> Option<usize> {
    match pool.get(ty) {
        TypeData::Struct { .. } => pool.field(ty, name).map(|(pos, _)| pos),
        TypeData::Array { .. } => match name.as_str() {
            "data" => Some(0),
            "shape" => Some(1),
            "strides" => Some(2),
            _ => None,
        },
        _ => None,
    }
}
