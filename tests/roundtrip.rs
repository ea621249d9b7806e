//! Property tests: decode(encode(v)) == v and byte counts agree, for
//! generated values that satisfy each field's strict shape contract.

use std::io::Cursor;

use bytestruct::{ByteOrder, CodecError, Context, Field, StructType, Value};
use proptest::prelude::*;

fn read_field(field: &Field, input: &[u8]) -> Result<(Value, u64), CodecError> {
    let mut ctx = Context::new();
    let mut cursor = Cursor::new(input.to_vec());
    field.read(&mut cursor, &mut ctx)
}

fn write_field(field: &Field, value: Value) -> Result<Vec<u8>, CodecError> {
    let mut ctx = Context::new();
    let mut cursor = Cursor::new(Vec::new());
    field.write(&mut cursor, &value, &mut ctx)?;
    Ok(cursor.into_inner())
}

proptest! {
    #[test]
    fn length_prefixed_bytes_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..200)) {
        let ty = StructType::builder("S")
            .field(Field::uint("len", 1))
            .field(Field::bytes("data").length_ref("len"))
            .build()
            .unwrap();
        let record = ty
            .instantiate([("data", Value::Bytes(data.clone()))].into_iter().collect())
            .unwrap();
        let bytes = record.to_bytes().unwrap();
        prop_assert_eq!(bytes.len(), 1 + data.len());

        let back = ty.decode(&bytes).unwrap();
        prop_assert_eq!(back.get("data"), Some(&Value::Bytes(data)));
    }

    #[test]
    fn varint_roundtrip(v in any::<u64>()) {
        let field = Field::varint("v");
        let bytes = write_field(&field, Value::Uint(v)).unwrap();
        let (decoded, consumed) = read_field(&field, &bytes).unwrap();
        prop_assert_eq!(decoded, Value::Uint(v));
        prop_assert_eq!(consumed, bytes.len() as u64);
    }

    #[test]
    fn integer_roundtrip(v in any::<u64>(), width in 1i64..=8, little in any::<bool>()) {
        let mask = if width == 8 { u64::MAX } else { (1u64 << (width * 8)) - 1 };
        let v = v & mask;
        let order = if little { ByteOrder::Little } else { ByteOrder::Big };
        let field = Field::uint("x", width).byte_order(order);
        let bytes = write_field(&field, Value::Uint(v)).unwrap();
        prop_assert_eq!(bytes.len() as i64, width);
        let (decoded, consumed) = read_field(&field, &bytes).unwrap();
        prop_assert_eq!(decoded, Value::Uint(v));
        prop_assert_eq!(consumed as i64, width);
    }

    #[test]
    fn terminated_roundtrip(data in proptest::collection::vec(1u8..=255, 0..64)) {
        // Values free of the terminator byte satisfy the strict contract.
        let field = Field::terminated("s", b"\0");
        let bytes = write_field(&field, Value::Bytes(data.clone())).unwrap();
        let (decoded, consumed) = read_field(&field, &bytes).unwrap();
        prop_assert_eq!(decoded, Value::Bytes(data));
        prop_assert_eq!(consumed, bytes.len() as u64);
    }

    #[test]
    fn bit_run_roundtrip(a in 0u64..8, b in 0u64..256) {
        let ty = StructType::builder("B")
            .field(Field::bits("a", 3))
            .field(Field::bits("b", 8))
            .build()
            .unwrap();
        let record = ty
            .instantiate([("a", Value::Uint(a)), ("b", Value::Uint(b))].into_iter().collect())
            .unwrap();
        let bytes = record.to_bytes().unwrap();
        prop_assert_eq!(bytes.len(), 2);

        let back = ty.decode(&bytes).unwrap();
        prop_assert_eq!(back.get("a"), Some(&Value::Uint(a)));
        prop_assert_eq!(back.get("b"), Some(&Value::Uint(b)));
    }

    #[test]
    fn padded_roundtrip(data in proptest::collection::vec(1u8..=255, 0..8)) {
        let field = Field::fixed("s", 8).padding(b"\0");
        let bytes = write_field(&field, Value::Bytes(data.clone())).unwrap();
        prop_assert_eq!(bytes.len(), 8);
        let (decoded, _) = read_field(&field, &bytes).unwrap();
        prop_assert_eq!(decoded, Value::Bytes(data));
    }
}
