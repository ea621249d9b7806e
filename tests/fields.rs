//! Field-level tests: byte runs (fixed, terminated, padded), bit packing,
//! integers, variable-length quantities, markers, and text.

use std::io::Cursor;

use bytestruct::{
    ByteOrder, CodecError, Context, DefinitionError, Encoding, Field, Prop, StructType,
    TerminatorHandler, Value,
};

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

// ==================== byte runs: definition ====================

#[test]
fn bytes_requires_length_or_terminator() {
    let err = StructType::builder("S").field(Field::bytes("x")).build().unwrap_err();
    assert!(matches!(err, DefinitionError::MissingLengthOrTerminator(_)));
}

#[test]
fn bytes_padding_requires_length() {
    let err = StructType::builder("S")
        .field(Field::bytes("x").terminator(b"\0").padding(b"\0"))
        .build()
        .unwrap_err();
    assert!(matches!(err, DefinitionError::PaddingWithoutLength(_)));
}

#[test]
fn bytes_terminator_and_padding_conflict() {
    let err = StructType::builder("S")
        .field(Field::fixed("x", 4).terminator(b"\0").padding(b"\0"))
        .build()
        .unwrap_err();
    assert!(matches!(err, DefinitionError::TerminatorWithPadding(_)));
}

#[test]
fn bytes_until_with_length_conflict() {
    let err = StructType::builder("S")
        .field(Field::fixed("x", 4).terminator(b"\0").handler(TerminatorHandler::Until))
        .build()
        .unwrap_err();
    assert!(matches!(err, DefinitionError::UntilWithLength(_)));
}

#[test]
fn option_on_wrong_kind_is_rejected() {
    let err = StructType::builder("S")
        .field(Field::uint("x", 1).terminator(b"\0"))
        .build()
        .unwrap_err();
    assert!(matches!(err, DefinitionError::InvalidOption(_, "terminator")));
}

// ==================== byte runs: fixed length ====================

#[test]
fn fixed_length_read_write() {
    let field = Field::fixed("x", 3);
    let (value, consumed) = read_field(&field, b"abc").unwrap();
    assert_eq!(value, Value::Bytes(b"abc".to_vec()));
    assert_eq!(consumed, 3);
    assert_eq!(write_field(&field, Value::Bytes(b"abc".to_vec())).unwrap(), b"abc");

    let (value, _) = read_field(&Field::fixed("x", 0), b"").unwrap();
    assert_eq!(value, Value::Bytes(Vec::new()));

    // Extra input is left in the stream.
    let (value, consumed) = read_field(&field, b"abcdef").unwrap();
    assert_eq!(value, Value::Bytes(b"abc".to_vec()));
    assert_eq!(consumed, 3);
}

#[test]
fn fixed_length_insufficient_bytes() {
    let err = read_field(&Field::fixed("x", 8), b"abc").unwrap_err();
    assert!(matches!(err, CodecError::StreamExhausted(_)));

    let (value, consumed) = read_field(&Field::fixed("x", 8).non_strict(), b"abc").unwrap();
    assert_eq!(value, Value::Bytes(b"abc".to_vec()));
    assert_eq!(consumed, 3);
}

#[test]
fn fixed_length_write_length_mismatch() {
    let err = write_field(&Field::fixed("x", 7), Value::Bytes(b"ab".to_vec())).unwrap_err();
    assert!(matches!(err, CodecError::Write(_)));
    let err = write_field(&Field::fixed("x", 2), Value::Bytes(b"abcdefg".to_vec())).unwrap_err();
    assert!(matches!(err, CodecError::Write(_)));

    // Non-strict accepts short content unpadded and truncates long content.
    assert_eq!(
        write_field(&Field::fixed("x", 7).non_strict(), Value::Bytes(b"ab".to_vec())).unwrap(),
        b"ab"
    );
    assert_eq!(
        write_field(&Field::fixed("x", 2).non_strict(), Value::Bytes(b"abcdefg".to_vec())).unwrap(),
        b"ab"
    );
}

#[test]
fn negative_length_reads_to_end() {
    let (value, consumed) = read_field(&Field::fixed("x", -1), b"abc").unwrap();
    assert_eq!(value, Value::Bytes(b"abc".to_vec()));
    assert_eq!(consumed, 3);

    let (value, consumed) = read_field(&Field::fixed("x", -1), b"").unwrap();
    assert_eq!(value, Value::Bytes(Vec::new()));
    assert_eq!(consumed, 0);

    let (value, consumed) = read_field(&Field::fixed("x", -1).terminator(b"\0"), b"asd\0").unwrap();
    assert_eq!(value, Value::Bytes(b"asd".to_vec()));
    assert_eq!(consumed, 4);
}

// ==================== byte runs: padding ====================

#[test]
fn padding_roundtrip() {
    let field = Field::fixed("x", 8).padding(b"\0");
    assert_eq!(
        write_field(&field, Value::Bytes(b"a".to_vec())).unwrap(),
        b"a\0\0\0\0\0\0\0"
    );
    let (value, consumed) = read_field(&field, b"a\0\0\0\0\0\0\0").unwrap();
    assert_eq!(value, Value::Bytes(b"a".to_vec()));
    assert_eq!(consumed, 8);
}

#[test]
fn multibyte_padding() {
    let field = Field::fixed("x", 9).padding(b"XPAD");
    assert_eq!(write_field(&field, Value::Bytes(b"a".to_vec())).unwrap(), b"aXPADXPAD");
    let (value, _) = read_field(&field, b"aXPADXPAD").unwrap();
    assert_eq!(value, Value::Bytes(b"a".to_vec()));

    // Only whole trailing copies are stripped.
    let field = Field::fixed("x", 6).padding(b"\0\0");
    let (value, _) = read_field(&field, b"abc\0\0\0").unwrap();
    assert_eq!(value, Value::Bytes(b"abc\0".to_vec()));
    let (value, _) = read_field(&Field::fixed("x", 7).padding(b"\0\0"), b"abc\0\0\0\0").unwrap();
    assert_eq!(value, Value::Bytes(b"abc".to_vec()));
}

#[test]
fn misaligned_padding_write() {
    let err = write_field(&Field::fixed("x", 7).padding(b"\0\0"), Value::Bytes(b"ab".to_vec()))
        .unwrap_err();
    assert!(matches!(err, CodecError::Write(_)));

    // Non-strict truncates the final partial copy to fit.
    assert_eq!(
        write_field(
            &Field::fixed("x", 7).padding(b"\0\0").non_strict(),
            Value::Bytes(b"ab".to_vec())
        )
        .unwrap(),
        b"ab\0\0\0\0\0"
    );
}

// ==================== byte runs: terminators ====================

#[test]
fn terminator_consume() {
    let field = Field::terminated("x", b"\0");
    let mut cursor = Cursor::new(b"abcdef\0gh".to_vec());
    let (value, consumed) = field.read(&mut cursor, &mut Context::new()).unwrap();
    assert_eq!(value, Value::Bytes(b"abcdef".to_vec()));
    assert_eq!(consumed, 7);
    assert_eq!(cursor.position(), 7);

    assert_eq!(write_field(&field, Value::Bytes(b"abcdef".to_vec())).unwrap(), b"abcdef\0");
}

#[test]
fn terminator_include() {
    let field = Field::terminated("x", b"\0").handler(TerminatorHandler::Include);
    let (value, consumed) = read_field(&field, b"abcdef\0gh").unwrap();
    assert_eq!(value, Value::Bytes(b"abcdef\0".to_vec()));
    assert_eq!(consumed, 7);

    assert_eq!(write_field(&field, Value::Bytes(b"abcdef\0".to_vec())).unwrap(), b"abcdef\0");
    let err = write_field(&field, Value::Bytes(b"abcdef".to_vec())).unwrap_err();
    assert!(matches!(err, CodecError::Write(_)));
}

#[test]
fn terminator_until() {
    let field = Field::terminated("x", b"\0").handler(TerminatorHandler::Until);
    let mut cursor = Cursor::new(b"abcdef\0gh".to_vec());
    let (value, consumed) = field.read(&mut cursor, &mut Context::new()).unwrap();
    assert_eq!(value, Value::Bytes(b"abcdef".to_vec()));
    assert_eq!(consumed, 6);
    // The terminator is left unconsumed in the stream.
    assert_eq!(cursor.position(), 6);

    assert_eq!(write_field(&field, Value::Bytes(b"abcdef".to_vec())).unwrap(), b"abcdef");
}

#[test]
fn terminator_not_found() {
    let err = read_field(&Field::terminated("x", b"\0"), b"abcdef").unwrap_err();
    assert!(matches!(err, CodecError::StreamExhausted(_)));

    let (value, consumed) = read_field(&Field::terminated("x", b"\0").non_strict(), b"abcdef").unwrap();
    assert_eq!(value, Value::Bytes(b"abcdef".to_vec()));
    assert_eq!(consumed, 6);
}

#[test]
fn multibyte_terminator_with_step() {
    let field = Field::terminated("x", b"\0\0").step(2);
    let (value, consumed) = read_field(&field, b"ab\0\0cd").unwrap();
    assert_eq!(value, Value::Bytes(b"ab".to_vec()));
    assert_eq!(consumed, 4);

    // A step-misaligned occurrence is not a terminator.
    let (value, consumed) = read_field(&field, b"abc\0\0\0cd").unwrap();
    assert_eq!(value, Value::Bytes(b"abc\0".to_vec()));
    assert_eq!(consumed, 6);
}

#[test]
fn terminator_within_fixed_length() {
    let field = Field::fixed("x", 5).terminator(b"\0");
    let (value, consumed) = read_field(&field, b"ab\0de").unwrap();
    assert_eq!(value, Value::Bytes(b"ab".to_vec()));
    // The full declared run is consumed even though the value stops early.
    assert_eq!(consumed, 5);

    // Write appends the terminator, then length rules apply.
    let padded = Field::fixed("x", 5).terminator(b"\0").non_strict();
    assert_eq!(write_field(&padded, Value::Bytes(b"ab".to_vec())).unwrap(), b"ab\0");
}

// ==================== bit packing ====================

#[test]
fn bit_pair_decode_encode() {
    let ty = StructType::builder("B")
        .field(Field::bits("a", 3))
        .field(Field::bits("b", 8))
        .build()
        .unwrap();
    let (record, spanned) = ty.read(&mut Cursor::new(vec![0xFF, 0xFF])).unwrap();
    assert_eq!(record.get("a"), Some(&Value::Uint(0b111)));
    assert_eq!(record.get("b"), Some(&Value::Uint(0b1111_1111)));
    assert_eq!(spanned, 2);

    let record = ty
        .instantiate([("a", Value::Uint(0b111)), ("b", Value::Uint(0b1111_1111))].into_iter().collect())
        .unwrap();
    // 11 bits round up to 16; the final byte is zero padded.
    assert_eq!(record.to_bytes().unwrap(), vec![0xFF, 0xE0]);
}

#[test]
fn misaligned_non_bit_field_fails() {
    let ty = StructType::builder("B")
        .field(Field::bits("a", 1))
        .field(Field::bits("b", 1))
        .field(Field::uint("c", 1))
        .build()
        .unwrap();
    let err = ty.decode(&[0xFF, 0x01]).unwrap_err();
    assert!(matches!(err, CodecError::MisalignedField(_)));

    let record = ty
        .instantiate(
            [("a", Value::Uint(1)), ("b", Value::Uint(1)), ("c", Value::Uint(1))]
                .into_iter()
                .collect(),
        )
        .unwrap();
    let err = record.to_bytes().unwrap_err();
    assert!(matches!(err, CodecError::MisalignedField(_)));
}

#[test]
fn whole_byte_bit_run_flushes_before_next_field() {
    let ty = StructType::builder("B")
        .field(Field::bits("a", 3))
        .field(Field::bits("b", 5))
        .field(Field::uint("c", 1))
        .build()
        .unwrap();
    let record = ty.decode(&[0b1010_1010, 0x07]).unwrap();
    assert_eq!(record.get("a"), Some(&Value::Uint(0b101)));
    assert_eq!(record.get("b"), Some(&Value::Uint(0b01010)));
    assert_eq!(record.get("c"), Some(&Value::Uint(7)));
    assert_eq!(record.to_bytes().unwrap(), vec![0b1010_1010, 0x07]);
}

#[test]
fn realign_discards_and_pads() {
    let ty = StructType::builder("B")
        .field(Field::bits("a", 5).realign())
        .field(Field::fixed("s", 1))
        .build()
        .unwrap();
    let (record, spanned) = ty.read(&mut Cursor::new(vec![0xA8, 0xAB])).unwrap();
    assert_eq!(record.get("a"), Some(&Value::Uint(0b10101)));
    assert_eq!(record.get("s"), Some(&Value::Bytes(vec![0xAB])));
    assert_eq!(spanned, 2);
    assert_eq!(record.to_bytes().unwrap(), vec![0xA8, 0xAB]);
}

#[test]
fn bit_width_out_of_range() {
    let err = StructType::builder("B").field(Field::bits("a", 65)).build().unwrap_err();
    assert!(matches!(err, DefinitionError::BadBitWidth(_, 65)));
}

// ==================== integers ====================

#[test]
fn integer_endianness() {
    let be = Field::uint("x", 2).byte_order(ByteOrder::Big);
    let le = Field::uint("x", 2).byte_order(ByteOrder::Little);
    assert_eq!(read_field(&be, b"\x01\x02").unwrap().0, Value::Uint(0x0102));
    assert_eq!(read_field(&le, b"\x01\x02").unwrap().0, Value::Uint(0x0201));
    assert_eq!(write_field(&be, Value::Uint(0x0102)).unwrap(), b"\x01\x02");
    assert_eq!(write_field(&le, Value::Uint(0x0102)).unwrap(), b"\x02\x01");
}

#[test]
fn integer_signed() {
    let field = Field::int("x", 2).byte_order(ByteOrder::Big);
    assert_eq!(read_field(&field, b"\xFF\xFE").unwrap().0, Value::Int(-2));
    assert_eq!(write_field(&field, Value::Int(-2)).unwrap(), b"\xFF\xFE");
}

#[test]
fn integer_odd_width() {
    let field = Field::uint("x", 3).byte_order(ByteOrder::Little);
    assert_eq!(read_field(&field, b"\x01\x02\x03").unwrap().0, Value::Uint(0x030201));
    assert_eq!(write_field(&field, Value::Uint(0x030201)).unwrap(), b"\x01\x02\x03");
}

#[test]
fn one_byte_integer_needs_no_byte_order() {
    let ty = StructType::builder("S").field(Field::uint("x", 1)).build().unwrap();
    assert_eq!(ty.decode(&[0x7F]).unwrap().get("x"), Some(&Value::Uint(0x7F)));
}

#[test]
fn wider_integer_requires_byte_order() {
    let err = StructType::builder("S").field(Field::uint("x", 2)).build().unwrap_err();
    assert!(matches!(err, DefinitionError::MissingByteOrder(_)));

    // Inherited from the structure.
    let ty = StructType::builder("S")
        .byte_order(ByteOrder::Little)
        .field(Field::uint("x", 2))
        .build()
        .unwrap();
    assert_eq!(ty.decode(&[0x01, 0x02]).unwrap().get("x"), Some(&Value::Uint(0x0201)));
}

#[test]
fn integer_write_overflow() {
    let err = write_field(&Field::uint("x", 1), Value::Uint(256)).unwrap_err();
    assert!(matches!(err, CodecError::Overflow(_)));
    let err = write_field(&Field::int("x", 1).byte_order(ByteOrder::Big), Value::Int(128)).unwrap_err();
    assert!(matches!(err, CodecError::Overflow(_)));
}

#[test]
fn integer_short_read() {
    let err = read_field(&Field::uint("x", 4).byte_order(ByteOrder::Big), b"\x01").unwrap_err();
    assert!(matches!(err, CodecError::StreamExhausted(_)));
}

// ==================== variable-length quantities ====================

#[test]
fn varint_table() {
    let field = Field::varint("v");
    for (value, bytes) in [
        (0x00u64, vec![0x00u8]),
        (0x7F, vec![0x7F]),
        (0x80, vec![0x81, 0x00]),
        (0x2000, vec![0xC0, 0x00]),
        (16383, vec![0xFF, 0x7F]),
    ] {
        assert_eq!(write_field(&field, Value::Uint(value)).unwrap(), bytes, "encode {:#x}", value);
        let (decoded, consumed) = read_field(&field, &bytes).unwrap();
        assert_eq!(decoded, Value::Uint(value), "decode {:#x}", value);
        assert_eq!(consumed, bytes.len() as u64);
    }
}

#[test]
fn varint_negative_is_overflow() {
    let err = write_field(&Field::varint("v"), Value::Int(-1)).unwrap_err();
    assert!(matches!(err, CodecError::Overflow(_)));
}

#[test]
fn varint_stops_at_clear_top_bit() {
    let (value, consumed) = read_field(&Field::varint("v"), b"\x81\x00\x7F").unwrap();
    assert_eq!(value, Value::Uint(0x80));
    assert_eq!(consumed, 2);
}

#[test]
fn varint_max_roundtrip() {
    let bytes = write_field(&Field::varint("v"), Value::Uint(u64::MAX)).unwrap();
    assert_eq!(bytes.len(), 10);
    assert_eq!(read_field(&Field::varint("v"), &bytes).unwrap().0, Value::Uint(u64::MAX));
}

#[test]
fn varint_oversized_input_is_overflow() {
    let err = read_field(&Field::varint("v"), &[0xFF; 11]).unwrap_err();
    assert!(matches!(err, CodecError::Overflow(_)));
}

// ==================== markers ====================

#[test]
fn magic_roundtrip_and_default() {
    let ty = StructType::builder("S").field(Field::magic("magic", b"\x89PNG")).build().unwrap();
    let record = ty.decode(b"\x89PNG").unwrap();
    assert_eq!(record.get("magic"), Some(&Value::Bytes(b"\x89PNG".to_vec())));

    // The default is the expected constant.
    let record = ty.instantiate(bytestruct::ValueMap::new()).unwrap();
    assert_eq!(record.to_bytes().unwrap(), b"\x89PNG");
}

#[test]
fn magic_mismatch() {
    let field = Field::magic("magic", b"\x89PNG");
    let err = read_field(&field, b"\x89PNX").unwrap_err();
    assert!(matches!(err, CodecError::WrongMagic(_)));

    let err = write_field(&field, Value::Bytes(b"derp".to_vec())).unwrap_err();
    assert!(matches!(err, CodecError::Write(_)));
}

// ==================== text ====================

#[test]
fn text_fixed_length() {
    let field = Field::text("s").length(5).encoding(Encoding::Utf8);
    assert_eq!(read_field(&field, b"hello").unwrap().0, Value::Text("hello".to_string()));
    assert_eq!(write_field(&field, Value::Text("hello".to_string())).unwrap(), b"hello");
}

#[test]
fn text_encoding_inherited_from_structure() {
    let ty = StructType::builder("S")
        .encoding(Encoding::Utf8)
        .field(Field::text("s").length(8).padding(b"\0"))
        .build()
        .unwrap();
    let record = ty.decode(b"a\0\0\0\0\0\0\0").unwrap();
    assert_eq!(record.get("s"), Some(&Value::Text("a".to_string())));
    let record = ty.instantiate([("s", Value::Text("a".to_string()))].into_iter().collect()).unwrap();
    assert_eq!(record.to_bytes().unwrap(), b"a\0\0\0\0\0\0\0");
}

#[test]
fn text_missing_encoding() {
    let err = StructType::builder("S").field(Field::text("s").length(3)).build().unwrap_err();
    assert!(matches!(err, DefinitionError::MissingEncoding(_)));
}

#[test]
fn text_invalid_input() {
    let field = Field::text("s").length(2).encoding(Encoding::Ascii);
    let err = read_field(&field, &[0xC3, 0xA9]).unwrap_err();
    assert!(matches!(err, CodecError::Encoding(_)));

    let err = write_field(&field, Value::Text("é!".to_string())).unwrap_err();
    assert!(matches!(err, CodecError::Encoding(_)));
}

#[test]
fn text_latin1() {
    let field = Field::text("s").length(2).encoding(Encoding::Latin1);
    assert_eq!(read_field(&field, &[0xE9, 0x21]).unwrap().0, Value::Text("é!".to_string()));
    assert_eq!(write_field(&field, Value::Text("é!".to_string())).unwrap(), vec![0xE9, 0x21]);
}

#[test]
fn text_terminated() {
    let field = Field::text("s").terminator(b"\0").encoding(Encoding::Utf8);
    let (value, consumed) = read_field(&field, b"hi\0rest").unwrap();
    assert_eq!(value, Value::Text("hi".to_string()));
    assert_eq!(consumed, 3);
}

// ==================== switch ====================

#[test]
fn switch_dispatch() {
    let field = Field::switch("body", Prop::literal(2u32))
        .case(1, Field::uint("v", 1))
        .case(2, Field::uint("v", 2).byte_order(ByteOrder::Little));
    let (value, consumed) = read_field(&field, &[0x01, 0x01]).unwrap();
    assert_eq!(value, Value::Uint(0x0101));
    assert_eq!(consumed, 2);
}

#[test]
fn switch_unmatched_without_fallback() {
    let field = Field::switch("body", Prop::literal(3u32)).case(1, Field::uint("v", 1));
    let err = read_field(&field, &[0x01]).unwrap_err();
    assert!(matches!(err, CodecError::Parse(_)));
    let err = write_field(&field, Value::Uint(1)).unwrap_err();
    assert!(matches!(err, CodecError::Write(_)));
}

#[test]
fn switch_fallback() {
    let field = Field::switch("body", Prop::literal(9u32))
        .case(1, Field::uint("v", 1))
        .fallback(Field::fixed("rest", -1));
    let (value, consumed) = read_field(&field, &[0xAA, 0xBB]).unwrap();
    assert_eq!(value, Value::Bytes(vec![0xAA, 0xBB]));
    assert_eq!(consumed, 2);
}

#[test]
fn switch_case_fields_are_validated() {
    let err = StructType::builder("S")
        .field(Field::switch("body", Prop::literal(1u32)).case(1, Field::uint("v", 2)))
        .build()
        .unwrap_err();
    assert!(matches!(err, DefinitionError::MissingByteOrder(_)));
}
