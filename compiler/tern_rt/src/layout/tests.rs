use pretty_assertions::assert_eq;
use tern_types::{Idx, Name, TypePool};

use super::{field_position, slot_of, struct_layout, FieldLayout, Slot, StructLayout};
use crate::BridgeError;

#[test]
fn scalar_slots_follow_width() {
    let pool = TypePool::new();
    assert_eq!(slot_of(&pool, Idx::BOOL).unwrap(), Slot::I8);
    assert_eq!(slot_of(&pool, Idx::UINT16).unwrap(), Slot::I16);
    assert_eq!(slot_of(&pool, Idx::INT32).unwrap(), Slot::I32);
    assert_eq!(slot_of(&pool, Idx::UINT64).unwrap(), Slot::I64);
    assert_eq!(slot_of(&pool, Idx::FLOAT32).unwrap(), Slot::F32);
    assert_eq!(slot_of(&pool, Idx::FLOAT64).unwrap(), Slot::F64);
    assert_eq!(slot_of(&pool, Idx::NONE).unwrap(), Slot::I64);
}

#[test]
fn composites_are_pointers() {
    let pool = TypePool::new();
    let pair = pool.tuple(&[Idx::INT8, Idx::INT8]);
    assert_eq!(slot_of(&pool, pair).unwrap(), Slot::Ptr);
    assert_eq!(slot_of(&pool, pool.array(Idx::FLOAT64, 2)).unwrap(), Slot::Ptr);
    assert_eq!(slot_of(&pool, pool.pointer(Idx::INT32)).unwrap(), Slot::Ptr);
}

#[test]
fn functions_have_no_slot() {
    let pool = TypePool::new();
    let func = pool.function(&[Idx::INT64], Idx::INT64);
    assert!(matches!(
        slot_of(&pool, func),
        Err(BridgeError::UnsupportedType(_))
    ));
}

#[test]
fn fields_are_naturally_aligned() {
    let layout = StructLayout::from_slots([Slot::I8, Slot::F64, Slot::I16, Slot::I32]);
    assert_eq!(
        layout.fields,
        vec![
            FieldLayout { offset: 0, slot: Slot::I8 },
            FieldLayout { offset: 8, slot: Slot::F64 },
            FieldLayout { offset: 16, slot: Slot::I16 },
            FieldLayout { offset: 20, slot: Slot::I32 },
        ]
    );
    assert_eq!(layout.size, 24);
    assert_eq!(layout.align, 8);
}

#[test]
fn empty_record() {
    let layout = StructLayout::from_slots(Vec::<Slot>::new());
    assert_eq!(layout.size, 0);
    assert_eq!(layout.align, 1);
}

#[test]
fn array_record_is_three_pointers() {
    let pool = TypePool::new();
    let layout = struct_layout(&pool, pool.array(Idx::INT8, 3)).unwrap();
    assert_eq!(layout.fields.len(), 3);
    assert!(layout.fields.iter().all(|f| f.slot == Slot::Ptr));
    let strides = Name::intern("strides");
    assert_eq!(field_position(&pool, pool.array(Idx::INT8, 3), strides), Some(2));
}

#[test]
fn struct_fields_by_name() {
    let pool = TypePool::new();
    let slice = pool.slice(Idx::INT64, Idx::INT32, Idx::NONE);
    assert_eq!(field_position(&pool, slice, Name::intern("stop")), Some(1));
    assert_eq!(field_position(&pool, slice, Name::intern("size")), None);
    let layout = struct_layout(&pool, slice).unwrap();
    assert_eq!(layout.fields[1], FieldLayout { offset: 8, slot: Slot::I32 });
}

#[test]
fn slot_load_store() {
    let mut buf = [0u8; 8];
    for (slot, word) in [
        (Slot::I8, 0xAB),
        (Slot::I16, 0xBEEF),
        (Slot::I32, 0xDEAD_BEEF),
        (Slot::F64, 1.5f64.to_bits()),
    ] {
        // SAFETY: `buf` holds eight bytes.
        let loaded = unsafe {
            slot.store(buf.as_mut_ptr(), word);
            slot.load(buf.as_ptr())
        };
        assert_eq!(loaded, word);
    }
}
