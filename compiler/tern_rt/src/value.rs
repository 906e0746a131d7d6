//! Host-side values.

use std::fmt;

use tern_types::{Idx, Name, Scalar, TypePool};

use crate::BridgeError;

/// A dense, row-major array of scalars.
#[derive(Clone, Debug, PartialEq)]
pub struct ArrayValue {
    pub elem: Scalar,
    pub shape: Vec<usize>,
    /// `shape.iter().product()` elements, each of type `elem`.
    pub data: Vec<Value>,
}

impl ArrayValue {
    pub fn new(elem: Scalar, shape: Vec<usize>, data: Vec<Value>) -> Result<Self, BridgeError> {
        let array = ArrayValue { elem, shape, data };
        array.validate()?;
        Ok(array)
    }

    /// One-dimensional array of `data`.
    pub fn vector(elem: Scalar, data: Vec<Value>) -> Result<Self, BridgeError> {
        Self::new(elem, vec![data.len()], data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Row-major strides, in elements.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.shape.len()];
        for k in (0..self.shape.len().saturating_sub(1)).rev() {
            strides[k] = strides[k + 1] * self.shape[k + 1];
        }
        strides
    }

    fn validate(&self) -> Result<(), BridgeError> {
        if self.shape.is_empty() {
            return Err(BridgeError::Malformed("array of rank 0".into()));
        }
        let expected: usize = self.shape.iter().product();
        if expected != self.data.len() {
            return Err(BridgeError::Malformed(format!(
                "array of shape {:?} holds {} elements",
                self.shape,
                self.data.len()
            )));
        }
        if let Some(bad) = self.data.iter().find(|v| v.scalar() != Some(self.elem)) {
            return Err(BridgeError::Malformed(format!(
                "{bad} in an array of {}",
                self.elem
            )));
        }
        Ok(())
    }
}

/// A value on the host side of the native boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    None,
    Tuple(Vec<Value>),
    Struct {
        name: Name,
        fields: Vec<(Name, Value)>,
    },
    Array(ArrayValue),
    Closure {
        target: Name,
        args: Vec<Value>,
    },
    /// Native storage holding one value.
    Pointer(Box<Value>),
}

impl Value {
    /// The scalar type of a scalar value.
    pub fn scalar(&self) -> Option<Scalar> {
        Some(match self {
            Value::Bool(_) => Scalar::BOOL,
            Value::I8(_) => Scalar::INT8,
            Value::I16(_) => Scalar::INT16,
            Value::I32(_) => Scalar::INT32,
            Value::I64(_) => Scalar::INT64,
            Value::U8(_) => Scalar::UINT8,
            Value::U16(_) => Scalar::UINT16,
            Value::U32(_) => Scalar::UINT32,
            Value::U64(_) => Scalar::UINT64,
            Value::F32(_) => Scalar::FLOAT32,
            Value::F64(_) => Scalar::FLOAT64,
            _ => return None,
        })
    }

    pub fn is_scalar(&self) -> bool {
        self.scalar().is_some()
    }

    pub fn slice(start: Value, stop: Value, step: Value) -> Value {
        Value::Struct {
            name: Name::intern("slice"),
            fields: vec![
                (Name::intern("start"), start),
                (Name::intern("stop"), stop),
                (Name::intern("step"), step),
            ],
        }
    }
}

/// The type of `value`, interned in `pool`.
pub fn typeof_value(pool: &TypePool, value: &Value) -> Result<Idx, BridgeError> {
    Ok(match value {
        Value::None => Idx::NONE,
        Value::Tuple(elems) => {
            let elems = elems
                .iter()
                .map(|v| typeof_value(pool, v))
                .collect::<Result<Vec<_>, _>>()?;
            pool.tuple(&elems)
        }
        Value::Struct { name, fields } => {
            let fields = fields
                .iter()
                .map(|(field, v)| Ok((*field, typeof_value(pool, v)?)))
                .collect::<Result<Vec<_>, BridgeError>>()?;
            pool.struct_type(*name, &fields)
        }
        Value::Array(array) => {
            array.validate()?;
            let rank = u32::try_from(array.shape.len())
                .map_err(|_| BridgeError::Malformed("array rank overflows".into()))?;
            pool.array(pool.scalar(array.elem)?, rank)
        }
        Value::Closure { target, args } => {
            let args = args
                .iter()
                .map(|v| typeof_value(pool, v))
                .collect::<Result<Vec<_>, _>>()?;
            pool.closure(*target, &args)
        }
        Value::Pointer(pointee) => pool.pointer(typeof_value(pool, pointee)?),
        scalar => match scalar.scalar() {
            Some(scalar) => pool.scalar(scalar)?,
            None => return Err(BridgeError::Malformed(format!("untyped value {scalar}"))),
        },
    })
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, values: &[Value]) -> fmt::Result {
            for (i, v) in values.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{v}")?;
            }
            Ok(())
        }
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::I8(v) => write!(f, "{v}i8"),
            Value::I16(v) => write!(f, "{v}i16"),
            Value::I32(v) => write!(f, "{v}i32"),
            Value::I64(v) => write!(f, "{v}"),
            Value::U8(v) => write!(f, "{v}u8"),
            Value::U16(v) => write!(f, "{v}u16"),
            Value::U32(v) => write!(f, "{v}u32"),
            Value::U64(v) => write!(f, "{v}u64"),
            Value::F32(v) => write!(f, "{v:?}f32"),
            Value::F64(v) => write!(f, "{v:?}"),
            Value::None => f.write_str("None"),
            Value::Tuple(elems) => {
                f.write_str("(")?;
                list(f, elems)?;
                if elems.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Value::Struct { name, fields } => {
                write!(f, "{name}{{")?;
                for (i, (field, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{field}: {v}")?;
                }
                f.write_str("}")
            }
            Value::Array(array) => {
                write!(f, "array{:?}<{}>[", array.shape, array.elem)?;
                list(f, &array.data)?;
                f.write_str("]")
            }
            Value::Closure { target, args } => {
                write!(f, "closure({target}")?;
                for arg in args {
                    write!(f, ", {arg}")?;
                }
                f.write_str(")")
            }
            Value::Pointer(pointee) => write!(f, "&{pointee}"),
        }
    }
}
