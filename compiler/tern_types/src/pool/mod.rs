//! Sharded type pool.
//!
//! Structurally identical types intern to one `Idx`. Interning takes `&self`
//! so a single pool can be shared by every pass of a session through
//! [`SharedTypePool`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::{Idx, Name, Scalar, Tag, TypeData, TypeError};

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap to panic on unexpected state"
)]

/// Per-shard storage.
struct PoolShard {
    map: FxHashMap<TypeData, u32>,
    types: Vec<TypeData>,
}

impl PoolShard {
    fn new() -> Self {
        Self {
            map: FxHashMap::default(),
            types: Vec::with_capacity(128),
        }
    }

    /// Shard 0 carries the scalars and `None` at the fixed `Idx` constants.
    fn with_primitives() -> Self {
        let mut shard = Self::new();
        let primitives = Scalar::ALL
            .into_iter()
            .map(TypeData::Scalar)
            .chain(std::iter::once(TypeData::None));
        for (local, data) in primitives.enumerate() {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "primitive count is fixed and small"
            )]
            let local = local as u32;
            shard.map.insert(data.clone(), local);
            shard.types.push(data);
        }
        shard
    }
}

/// Interning table for all types of a session.
///
/// The infallible constructors ([`tuple`](Self::tuple), [`array`](Self::array)
/// and the rest) and queries wrap [`intern`](Self::intern) and
/// [`get`](Self::get) and panic under the same conditions. Use
/// [`try_intern`](Self::try_intern) and [`try_get`](Self::try_get) where a
/// shard overflow or an index from another pool is recoverable.
pub struct TypePool {
    shards: [RwLock<PoolShard>; Idx::NUM_SHARDS],
}

/// A pool shared across passes.
pub type SharedTypePool = Arc<TypePool>;

impl Default for TypePool {
    fn default() -> Self {
        Self::new()
    }
}

impl TypePool {
    pub fn new() -> Self {
        let shards = std::array::from_fn(|i| {
            if i == 0 {
                RwLock::new(PoolShard::with_primitives())
            } else {
                RwLock::new(PoolShard::new())
            }
        });
        Self { shards }
    }

    pub fn shared() -> SharedTypePool {
        Arc::new(Self::new())
    }

    #[inline]
    fn shard_for(data: &TypeData) -> usize {
        let mut hasher = rustc_hash::FxHasher::default();
        data.hash(&mut hasher);
        #[expect(
            clippy::cast_possible_truncation,
            reason = "truncation is fine for hash-based shard selection"
        )]
        let hash = hasher.finish() as usize;
        // Shard 0 is reserved for primitives so their indices stay fixed.
        1 + hash % (Idx::NUM_SHARDS - 1)
    }

    /// Intern `data`, returning its canonical index.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "shard index is bounded by NUM_SHARDS"
    )]
    pub fn try_intern(&self, data: TypeData) -> Result<Idx, TypeError> {
        match &data {
            TypeData::Scalar(scalar) => {
                return scalar.idx().ok_or_else(|| {
                    TypeError::UnsupportedType(format!("{:?}{}", scalar.kind, scalar.bits))
                });
            }
            TypeData::None => return Ok(Idx::NONE),
            _ => {}
        }

        let shard_idx = Self::shard_for(&data);
        let shard = &self.shards[shard_idx];

        if let Some(&local) = shard.read().map.get(&data) {
            return Ok(Idx::from_shard_local(shard_idx as u32, local));
        }

        let mut guard = shard.write();
        if let Some(&local) = guard.map.get(&data) {
            return Ok(Idx::from_shard_local(shard_idx as u32, local));
        }

        let local = u32::try_from(guard.types.len())
            .ok()
            .filter(|&local| local <= Idx::MAX_LOCAL)
            .ok_or(TypeError::PoolOverflow { shard: shard_idx })?;
        guard.types.push(data.clone());
        guard.map.insert(data, local);
        tracing::trace!(shard = shard_idx, local, "interned type");

        Ok(Idx::from_shard_local(shard_idx as u32, local))
    }

    /// Intern `data`.
    ///
    /// # Panics
    /// Panics if a shard overflows or the payload is an out-of-set scalar.
    pub fn intern(&self, data: TypeData) -> Idx {
        self.try_intern(data).unwrap_or_else(|e| panic!("{e}"))
    }

    /// The payload behind `idx`.
    ///
    /// # Panics
    /// Panics if `idx` was not produced by this pool.
    pub fn get(&self, idx: Idx) -> TypeData {
        self.try_get(idx).unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn try_get(&self, idx: Idx) -> Result<TypeData, TypeError> {
        self.shards
            .get(idx.shard())
            .and_then(|shard| shard.read().types.get(idx.local()).cloned())
            .ok_or(TypeError::ForeignIdx(idx))
    }

    /// Total number of interned types, primitives included.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().types.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    // ── Constructors ──

    pub fn scalar(&self, scalar: Scalar) -> Result<Idx, TypeError> {
        self.try_intern(TypeData::Scalar(scalar))
    }

    pub fn tuple(&self, elems: &[Idx]) -> Idx {
        self.intern(TypeData::Tuple(elems.into()))
    }

    /// A tuple of `count` copies of `elem`.
    pub fn repeat_tuple(&self, elem: Idx, count: usize) -> Idx {
        self.intern(TypeData::Tuple(vec![elem; count].into_boxed_slice()))
    }

    pub fn struct_type(&self, name: Name, fields: &[(Name, Idx)]) -> Idx {
        self.intern(TypeData::Struct {
            name,
            fields: fields.into(),
        })
    }

    /// The slice object: a struct named `slice` with `start`, `stop`, `step`.
    pub fn slice(&self, start: Idx, stop: Idx, step: Idx) -> Idx {
        self.struct_type(
            Name::intern("slice"),
            &[
                (Name::intern("start"), start),
                (Name::intern("stop"), stop),
                (Name::intern("step"), step),
            ],
        )
    }

    pub fn array(&self, elem: Idx, rank: u32) -> Idx {
        self.intern(TypeData::Array { elem, rank })
    }

    pub fn closure(&self, target: Name, partial: &[Idx]) -> Idx {
        self.intern(TypeData::Closure {
            target,
            partial: partial.into(),
        })
    }

    pub fn function(&self, inputs: &[Idx], ret: Idx) -> Idx {
        self.intern(TypeData::Function {
            inputs: inputs.into(),
            ret,
        })
    }

    pub fn pointer(&self, pointee: Idx) -> Idx {
        self.intern(TypeData::Pointer(pointee))
    }

    // ── Queries ──

    pub fn tag(&self, idx: Idx) -> Tag {
        if idx == Idx::NONE {
            return Tag::None;
        }
        if idx.is_primitive() {
            return Tag::Scalar;
        }
        self.get(idx).tag()
    }

    pub fn as_scalar(&self, idx: Idx) -> Option<Scalar> {
        if idx.is_primitive() && idx != Idx::NONE {
            return Some(Scalar::ALL[idx.local()]);
        }
        None
    }

    pub fn tuple_elems(&self, idx: Idx) -> Option<Box<[Idx]>> {
        match self.get(idx) {
            TypeData::Tuple(elems) => Some(elems),
            _ => None,
        }
    }

    pub fn struct_fields(&self, idx: Idx) -> Option<(Name, Box<[(Name, Idx)]>)> {
        match self.get(idx) {
            TypeData::Struct { name, fields } => Some((name, fields)),
            _ => None,
        }
    }

    /// Type and position of a named struct field.
    pub fn field(&self, idx: Idx, field: Name) -> Option<(usize, Idx)> {
        let (_, fields) = self.struct_fields(idx)?;
        fields
            .iter()
            .position(|&(name, _)| name == field)
            .map(|pos| (pos, fields[pos].1))
    }

    /// Element type and rank of an array.
    pub fn array_parts(&self, idx: Idx) -> Option<(Idx, u32)> {
        match self.get(idx) {
            TypeData::Array { elem, rank } => Some((elem, rank)),
            _ => None,
        }
    }

    pub fn closure_parts(&self, idx: Idx) -> Option<(Name, Box<[Idx]>)> {
        match self.get(idx) {
            TypeData::Closure { target, partial } => Some((target, partial)),
            _ => None,
        }
    }

    pub fn function_parts(&self, idx: Idx) -> Option<(Box<[Idx]>, Idx)> {
        match self.get(idx) {
            TypeData::Function { inputs, ret } => Some((inputs, ret)),
            _ => None,
        }
    }

    pub fn pointee(&self, idx: Idx) -> Option<Idx> {
        match self.get(idx) {
            TypeData::Pointer(pointee) => Some(pointee),
            _ => None,
        }
    }

    /// Immediate child types, in field order.
    pub fn components(&self, idx: Idx) -> SmallVec<[Idx; 4]> {
        if idx.is_primitive() {
            return SmallVec::new();
        }
        match self.get(idx) {
            TypeData::Scalar(_) | TypeData::None => SmallVec::new(),
            TypeData::Tuple(elems) => elems.iter().copied().collect(),
            TypeData::Struct { fields, .. } => fields.iter().map(|&(_, t)| t).collect(),
            TypeData::Array { elem, rank } => {
                let index = self.repeat_tuple(Idx::INT64, rank as usize);
                smallvec::smallvec![self.pointer(elem), index, index]
            }
            TypeData::Closure { partial, .. } => partial.iter().copied().collect(),
            TypeData::Function { inputs, ret } => {
                inputs.iter().copied().chain(std::iter::once(ret)).collect()
            }
            TypeData::Pointer(pointee) => smallvec::smallvec![pointee],
        }
    }

    /// Shape/strides tuple type of an array of the given rank.
    pub fn index_tuple(&self, rank: u32) -> Idx {
        self.repeat_tuple(Idx::INT64, rank as usize)
    }

    /// Render a type for diagnostics.
    pub fn display(&self, idx: Idx) -> TypeDisplay<'_> {
        TypeDisplay { pool: self, idx }
    }

    /// Render a type to an owned string.
    pub fn render(&self, idx: Idx) -> String {
        self.display(idx).to_string()
    }
}

impl fmt::Debug for TypePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypePool").field("len", &self.len()).finish()
    }
}

/// Display adapter returned by [`TypePool::display`].
pub struct TypeDisplay<'a> {
    pool: &'a TypePool,
    idx: Idx,
}

impl fmt::Display for TypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = self.idx.primitive_name() {
            return f.write_str(name);
        }
        let pool = self.pool;
        let list = |f: &mut fmt::Formatter<'_>, items: &[Idx]| -> fmt::Result {
            for (i, &item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", pool.display(item))?;
            }
            Ok(())
        };
        match pool.get(self.idx) {
            TypeData::Scalar(scalar) => write!(f, "{scalar}"),
            TypeData::None => f.write_str("none"),
            TypeData::Tuple(elems) => {
                f.write_str("(")?;
                list(f, &elems)?;
                if elems.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            TypeData::Struct { name, fields } => {
                write!(f, "{name}{{")?;
                for (i, (field, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{field}: {}", pool.display(*ty))?;
                }
                f.write_str("}")
            }
            TypeData::Array { elem, rank } => write!(f, "array{rank}<{}>", pool.display(elem)),
            TypeData::Closure { target, partial } => {
                write!(f, "closure<{target}")?;
                if !partial.is_empty() {
                    f.write_str("; ")?;
                    list(f, &partial)?;
                }
                f.write_str(">")
            }
            TypeData::Function { inputs, ret } => {
                f.write_str("fn(")?;
                list(f, &inputs)?;
                write!(f, ") -> {}", pool.display(ret))
            }
            TypeData::Pointer(pointee) => write!(f, "ptr<{}>", pool.display(pointee)),
        }
    }
}
