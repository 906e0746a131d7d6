use pretty_assertions::assert_eq;
use proptest::prelude::*;
use tern_types::{Idx, Name, Scalar, TypePool};

use super::codec_for;
use crate::{typeof_value, ArrayValue, BridgeError, InvocationScope, Value};

/// Encode `value` with the codec of its own type and decode it again.
fn round_trip(value: &Value) -> Value {
    let pool = TypePool::new();
    let ty = typeof_value(&pool, value).unwrap();
    let codec = codec_for(&pool, ty).unwrap();
    let _scope = InvocationScope::enter(1);
    let word = codec.encode(value).unwrap();
    // SAFETY: the word was just encoded and the scope is still live.
    unsafe { codec.decode(word) }.unwrap()
}

fn scalar_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i8>().prop_map(Value::I8),
        any::<i16>().prop_map(Value::I16),
        any::<i32>().prop_map(Value::I32),
        any::<i64>().prop_map(Value::I64),
        any::<u8>().prop_map(Value::U8),
        any::<u16>().prop_map(Value::U16),
        any::<u32>().prop_map(Value::U32),
        any::<u64>().prop_map(Value::U64),
        (-1.0e6f32..1.0e6).prop_map(Value::F32),
        (-1.0e12f64..1.0e12).prop_map(Value::F64),
    ]
}

fn nested_value() -> impl Strategy<Value = Value> {
    scalar_value().prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Tuple),
            inner.prop_map(|v| Value::Pointer(Box::new(v))),
        ]
    })
}

// ── Scalars ──

proptest! {
    #[test]
    fn scalars_survive_the_boundary(value in scalar_value()) {
        prop_assert_eq!(round_trip(&value), value);
    }

    #[test]
    fn nested_records_survive_the_boundary(value in nested_value()) {
        prop_assert_eq!(round_trip(&value), value);
    }
}

#[test]
fn none_is_a_zero_word() {
    let pool = TypePool::new();
    let codec = codec_for(&pool, Idx::NONE).unwrap();
    assert_eq!(codec.encode(&Value::None).unwrap(), 0);
    assert_eq!(round_trip(&Value::None), Value::None);
}

#[test]
fn bool_is_zero_or_one() {
    let pool = TypePool::new();
    let codec = codec_for(&pool, Idx::BOOL).unwrap();
    assert_eq!(codec.encode(&Value::Bool(true)).unwrap(), 1);
    // SAFETY: scalar words carry no pointers.
    let decoded = unsafe { codec.decode(0x100) }.unwrap();
    assert_eq!(decoded, Value::Bool(false));
}

#[test]
fn negative_narrow_ints_keep_their_sign() {
    assert_eq!(round_trip(&Value::I8(-3)), Value::I8(-3));
    assert_eq!(round_trip(&Value::I16(i16::MIN)), Value::I16(i16::MIN));
}

#[test]
fn scalar_type_mismatch() {
    let pool = TypePool::new();
    let codec = codec_for(&pool, Idx::INT32).unwrap();
    assert!(matches!(
        codec.encode(&Value::I64(1)),
        Err(BridgeError::Malformed(_))
    ));
}

// ── Records ──

#[test]
fn struct_keeps_names_and_order() {
    let value = Value::slice(Value::I64(1), Value::I32(2), Value::None);
    assert_eq!(round_trip(&value), value);
}

#[test]
fn struct_field_names_must_match() {
    let pool = TypePool::new();
    let value = Value::slice(Value::I64(1), Value::I64(2), Value::None);
    let codec = codec_for(&pool, typeof_value(&pool, &value).unwrap()).unwrap();
    let renamed = Value::Struct {
        name: Name::intern("slice"),
        fields: vec![
            (Name::intern("stop"), Value::I64(1)),
            (Name::intern("start"), Value::I64(2)),
            (Name::intern("step"), Value::None),
        ],
    };
    let _scope = InvocationScope::enter(1);
    assert!(codec.encode(&renamed).is_err());
}

#[test]
fn closure_carries_partial_args() {
    let value = Value::Closure {
        target: Name::intern("offset"),
        args: vec![Value::F32(0.5), Value::Tuple(vec![Value::I8(1)])],
    };
    assert_eq!(round_trip(&value), value);
}

#[test]
fn tuple_arity_mismatch() {
    let pool = TypePool::new();
    let codec = codec_for(&pool, pool.tuple(&[Idx::INT64, Idx::INT64])).unwrap();
    let _scope = InvocationScope::enter(1);
    assert!(matches!(
        codec.encode(&Value::Tuple(vec![Value::I64(1)])),
        Err(BridgeError::Malformed(_))
    ));
}

#[test]
fn functions_have_no_codec() {
    let pool = TypePool::new();
    let func = pool.function(&[], Idx::NONE);
    assert!(matches!(
        codec_for(&pool, func),
        Err(BridgeError::UnsupportedType(_))
    ));
}

// ── Arrays ──

#[test]
fn vector_round_trip() {
    let array = ArrayValue::vector(
        Scalar::FLOAT64,
        vec![Value::F64(1.0), Value::F64(-2.5), Value::F64(3.25)],
    )
    .unwrap();
    let value = Value::Array(array);
    assert_eq!(round_trip(&value), value);
}

#[test]
fn matrix_round_trip_is_row_major() {
    let data = (0..6).map(Value::I32).collect();
    let value = Value::Array(ArrayValue::new(Scalar::INT32, vec![2, 3], data).unwrap());
    assert_eq!(round_trip(&value), value);
}

#[test]
fn empty_array_round_trip() {
    let value = Value::Array(ArrayValue::vector(Scalar::UINT8, vec![]).unwrap());
    assert_eq!(round_trip(&value), value);
}

#[test]
fn array_rank_must_match() {
    let pool = TypePool::new();
    let codec = codec_for(&pool, pool.array(Idx::INT64, 2)).unwrap();
    let vector = Value::Array(ArrayValue::vector(Scalar::INT64, vec![Value::I64(1)]).unwrap());
    let _scope = InvocationScope::enter(1);
    assert!(codec.encode(&vector).is_err());
}

#[test]
fn ragged_array_is_rejected() {
    let result = ArrayValue::new(Scalar::INT8, vec![2, 2], vec![Value::I8(1)]);
    assert!(matches!(result, Err(BridgeError::Malformed(_))));
}

#[test]
fn array_of_mixed_scalars_is_rejected() {
    let result = ArrayValue::vector(Scalar::INT8, vec![Value::I8(1), Value::I16(2)]);
    assert!(matches!(result, Err(BridgeError::Malformed(_))));
}

#[test]
fn encoded_records_are_freed_with_the_scope() {
    let pool = TypePool::new();
    let value = Value::Tuple(vec![Value::I64(1), Value::Pointer(Box::new(Value::U8(2)))]);
    let codec = codec_for(&pool, typeof_value(&pool, &value).unwrap()).unwrap();
    let before = crate::arena::live_blocks();
    {
        let _scope = InvocationScope::enter(1);
        codec.encode(&value).unwrap();
        assert_eq!(crate::arena::live_blocks(), before + 2);
    }
    assert_eq!(crate::arena::live_blocks(), before);
}
