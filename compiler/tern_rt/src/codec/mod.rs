//! Conversion between host [`Value`]s and native words.
//!
//! A native word is the 64-bit cell a value travels in across the entry
//! trampoline: scalars in their low bits, everything else as a pointer to
//! an arena-allocated record (see [`crate::layout`]).

use tern_types::{Idx, Name, Scalar, ScalarKind, TypeData, TypePool};

use crate::arena;
use crate::layout::{slot_of, struct_layout, Slot, StructLayout};
use crate::{ArrayValue, BridgeError, Value};

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;

/// Encodes and decodes values of one type.
pub trait Codec {
    /// Encode `value` into a native word, allocating records in the
    /// current invocation arena.
    fn encode(&self, value: &Value) -> Result<u64, BridgeError>;

    /// Decode a native word of this codec's type.
    ///
    /// # Safety
    /// `word` must come from [`encode`](Codec::encode) or from compiled code
    /// for the same type, and any records it points to must still be live.
    unsafe fn decode(&self, word: u64) -> Result<Value, BridgeError>;
}

/// The codec for values of type `ty`.
pub fn codec_for(pool: &TypePool, ty: Idx) -> Result<Box<dyn Codec>, BridgeError> {
    Ok(match pool.get(ty) {
        TypeData::Scalar(scalar) => Box::new(ScalarCodec { scalar }),
        TypeData::None => Box::new(NoneCodec),
        TypeData::Tuple(_) => Box::new(TupleCodec {
            fields: FieldsCodec::new(pool, ty)?,
        }),
        TypeData::Struct { name, fields } => Box::new(StructCodec {
            name,
            names: fields.iter().map(|&(field, _)| field).collect(),
            fields: FieldsCodec::new(pool, ty)?,
        }),
        TypeData::Closure { target, .. } => Box::new(ClosureCodec {
            target,
            fields: FieldsCodec::new(pool, ty)?,
        }),
        TypeData::Pointer(_) => Box::new(PointerCodec {
            fields: FieldsCodec::new(pool, ty)?,
        }),
        TypeData::Array { elem, rank } => {
            let scalar = pool
                .as_scalar(elem)
                .ok_or_else(|| BridgeError::UnsupportedType(pool.render(ty)))?;
            Box::new(ArrayCodec {
                elem: scalar,
                slot: slot_of(pool, elem)?,
                rank: rank as usize,
            })
        }
        TypeData::Function { .. } => return Err(BridgeError::UnsupportedType(pool.render(ty))),
    })
}

fn mismatch(expected: &str, value: &Value) -> BridgeError {
    BridgeError::Malformed(format!("expected {expected}, got {value}"))
}

// ── Scalars ──

struct ScalarCodec {
    scalar: Scalar,
}

impl Codec for ScalarCodec {
    fn encode(&self, value: &Value) -> Result<u64, BridgeError> {
        if value.scalar() != Some(self.scalar) {
            return Err(mismatch(self.scalar.name(), value));
        }
        Ok(match *value {
            Value::Bool(b) => u64::from(b),
            Value::I8(v) => u64::from(v as u8),
            Value::I16(v) => u64::from(v as u16),
            Value::I32(v) => u64::from(v as u32),
            Value::I64(v) => v as u64,
            Value::U8(v) => u64::from(v),
            Value::U16(v) => u64::from(v),
            Value::U32(v) => u64::from(v),
            Value::U64(v) => v,
            Value::F32(v) => u64::from(v.to_bits()),
            Value::F64(v) => v.to_bits(),
            _ => return Err(mismatch(self.scalar.name(), value)),
        })
    }

    unsafe fn decode(&self, word: u64) -> Result<Value, BridgeError> {
        Ok(match (self.scalar.kind, self.scalar.bits) {
            (ScalarKind::Bool, _) => Value::Bool(word as u8 != 0),
            (ScalarKind::Int, 8) => Value::I8(word as u8 as i8),
            (ScalarKind::Int, 16) => Value::I16(word as u16 as i16),
            (ScalarKind::Int, 32) => Value::I32(word as u32 as i32),
            (ScalarKind::Int, _) => Value::I64(word as i64),
            (ScalarKind::UInt, 8) => Value::U8(word as u8),
            (ScalarKind::UInt, 16) => Value::U16(word as u16),
            (ScalarKind::UInt, 32) => Value::U32(word as u32),
            (ScalarKind::UInt, _) => Value::U64(word),
            (ScalarKind::Float, 32) => Value::F32(f32::from_bits(word as u32)),
            (ScalarKind::Float, _) => Value::F64(f64::from_bits(word)),
        })
    }
}

struct NoneCodec;

impl Codec for NoneCodec {
    fn encode(&self, value: &Value) -> Result<u64, BridgeError> {
        match value {
            Value::None => Ok(0),
            other => Err(mismatch("None", other)),
        }
    }

    unsafe fn decode(&self, _word: u64) -> Result<Value, BridgeError> {
        Ok(Value::None)
    }
}

// ── Records ──

/// Reads and writes the fields of one record type.
struct FieldsCodec {
    layout: StructLayout,
    codecs: Vec<Box<dyn Codec>>,
}

impl FieldsCodec {
    fn new(pool: &TypePool, ty: Idx) -> Result<Self, BridgeError> {
        let codecs = pool
            .components(ty)
            .into_iter()
            .map(|child| codec_for(pool, child))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(FieldsCodec {
            layout: struct_layout(pool, ty)?,
            codecs,
        })
    }

    fn write<'v>(&self, values: impl ExactSizeIterator<Item = &'v Value>) -> Result<u64, BridgeError> {
        if values.len() != self.codecs.len() {
            return Err(BridgeError::Malformed(format!(
                "record of {} fields given {} values",
                self.codecs.len(),
                values.len()
            )));
        }
        let record = arena::alloc(self.layout.size, self.layout.align)?;
        for ((value, codec), field) in values.zip(&self.codecs).zip(&self.layout.fields) {
            let word = codec.encode(value)?;
            // SAFETY: the record spans `layout.size` bytes and every field
            // lies inside it.
            unsafe { field.slot.store(record.as_ptr().add(field.offset), word) };
        }
        Ok(record.as_ptr() as u64)
    }

    unsafe fn read(&self, word: u64) -> Result<Vec<Value>, BridgeError> {
        let record = word as usize as *const u8;
        if record.is_null() {
            return Err(BridgeError::Malformed("null record".into()));
        }
        self.codecs
            .iter()
            .zip(&self.layout.fields)
            .map(|(codec, field)| codec.decode(field.slot.load(record.add(field.offset))))
            .collect()
    }
}

struct TupleCodec {
    fields: FieldsCodec,
}

impl Codec for TupleCodec {
    fn encode(&self, value: &Value) -> Result<u64, BridgeError> {
        match value {
            Value::Tuple(elems) => self.fields.write(elems.iter()),
            other => Err(mismatch("a tuple", other)),
        }
    }

    unsafe fn decode(&self, word: u64) -> Result<Value, BridgeError> {
        Ok(Value::Tuple(self.fields.read(word)?))
    }
}

struct StructCodec {
    name: Name,
    names: Vec<Name>,
    fields: FieldsCodec,
}

impl Codec for StructCodec {
    fn encode(&self, value: &Value) -> Result<u64, BridgeError> {
        match value {
            Value::Struct { name, fields }
                if *name == self.name
                    && fields.iter().map(|(f, _)| *f).eq(self.names.iter().copied()) =>
            {
                self.fields.write(fields.iter().map(|(_, v)| v))
            }
            other => Err(mismatch(self.name.as_str(), other)),
        }
    }

    unsafe fn decode(&self, word: u64) -> Result<Value, BridgeError> {
        let values = self.fields.read(word)?;
        Ok(Value::Struct {
            name: self.name,
            fields: self.names.iter().copied().zip(values).collect(),
        })
    }
}

struct ClosureCodec {
    target: Name,
    fields: FieldsCodec,
}

impl Codec for ClosureCodec {
    fn encode(&self, value: &Value) -> Result<u64, BridgeError> {
        match value {
            Value::Closure { target, args } if *target == self.target => self.fields.write(args.iter()),
            other => Err(mismatch("a closure", other)),
        }
    }

    unsafe fn decode(&self, word: u64) -> Result<Value, BridgeError> {
        Ok(Value::Closure {
            target: self.target,
            args: self.fields.read(word)?,
        })
    }
}

/// One slot of native storage; decodes to its single pointee.
struct PointerCodec {
    fields: FieldsCodec,
}

impl Codec for PointerCodec {
    fn encode(&self, value: &Value) -> Result<u64, BridgeError> {
        match value {
            Value::Pointer(pointee) => self.fields.write(std::iter::once(&**pointee)),
            other => Err(mismatch("a pointer", other)),
        }
    }

    unsafe fn decode(&self, word: u64) -> Result<Value, BridgeError> {
        let mut values = self.fields.read(word)?;
        let pointee = values
            .pop()
            .ok_or_else(|| BridgeError::Malformed("empty pointer record".into()))?;
        Ok(Value::Pointer(Box::new(pointee)))
    }
}

// ── Arrays ──

/// `{data, shape, strides}` with strides counted in elements.
struct ArrayCodec {
    elem: Scalar,
    slot: Slot,
    rank: usize,
}

impl ArrayCodec {
    fn index_record(values: &[usize]) -> Result<u64, BridgeError> {
        let record = arena::alloc(values.len() * 8, 8)?;
        for (k, &v) in values.iter().enumerate() {
            // SAFETY: the record holds `values.len()` i64 slots.
            unsafe { Slot::I64.store(record.as_ptr().add(k * 8), v as u64) };
        }
        Ok(record.as_ptr() as u64)
    }

    unsafe fn read_index_record(&self, word: u64) -> Result<Vec<i64>, BridgeError> {
        let record = word as usize as *const u8;
        if record.is_null() {
            return Err(BridgeError::Malformed("null shape record".into()));
        }
        Ok((0..self.rank)
            .map(|k| Slot::I64.load(record.add(k * 8)) as i64)
            .collect())
    }
}

impl Codec for ArrayCodec {
    fn encode(&self, value: &Value) -> Result<u64, BridgeError> {
        let Value::Array(array) = value else {
            return Err(mismatch("an array", value));
        };
        if array.elem != self.elem || array.shape.len() != self.rank {
            return Err(mismatch("an array of matching element type and rank", value));
        }
        let scalar = ScalarCodec { scalar: self.elem };
        let size = self.slot.size();
        let data = arena::alloc(array.data.len() * size, self.slot.align())?;
        for (i, elem) in array.data.iter().enumerate() {
            let word = scalar.encode(elem)?;
            // SAFETY: the buffer holds `data.len()` elements.
            unsafe { self.slot.store(data.as_ptr().add(i * size), word) };
        }

        let layout = StructLayout::from_slots([Slot::Ptr, Slot::Ptr, Slot::Ptr]);
        let record = arena::alloc(layout.size, layout.align)?;
        let parts = [
            data.as_ptr() as u64,
            Self::index_record(&array.shape)?,
            Self::index_record(&array.strides())?,
        ];
        for (field, word) in layout.fields.iter().zip(parts) {
            // SAFETY: three pointer slots inside the record.
            unsafe { field.slot.store(record.as_ptr().add(field.offset), word) };
        }
        Ok(record.as_ptr() as u64)
    }

    unsafe fn decode(&self, word: u64) -> Result<Value, BridgeError> {
        let record = word as usize as *const u8;
        if record.is_null() {
            return Err(BridgeError::Malformed("null array record".into()));
        }
        let layout = StructLayout::from_slots([Slot::Ptr, Slot::Ptr, Slot::Ptr]);
        let [data, shape, strides] =
            [0, 1, 2].map(|k| Slot::Ptr.load(record.add(layout.fields[k].offset)));
        let data = data as usize as *const u8;
        let shape = self.read_index_record(shape)?;
        let strides = self.read_index_record(strides)?;

        let shape: Vec<usize> = shape
            .iter()
            .map(|&n| usize::try_from(n))
            .collect::<Result<_, _>>()
            .map_err(|_| BridgeError::Malformed(format!("negative extent in {shape:?}")))?;
        let total: usize = shape.iter().product();
        let scalar = ScalarCodec { scalar: self.elem };
        let mut values = Vec::with_capacity(total);
        let mut index = vec![0usize; self.rank];
        for _ in 0..total {
            let offset: i64 = index
                .iter()
                .zip(&strides)
                .map(|(&i, &s)| i as i64 * s)
                .sum();
            let elem = data.offset(offset as isize * self.slot.size() as isize);
            values.push(scalar.decode(self.slot.load(elem))?);
            for k in (0..self.rank).rev() {
                index[k] += 1;
                if index[k] < shape[k] {
                    break;
                }
                index[k] = 0;
            }
        }
        Ok(Value::Array(ArrayValue {
            elem: self.elem,
            shape,
            data: values,
        }))
    }
}
