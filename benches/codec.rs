//! Benchmark: decode and round-trip a length-prefixed message with a
//! magic marker, a payload, and a trailing checksum field.

use std::sync::Arc;

use bytestruct::{ByteOrder, Field, StructType, Value};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn message_type() -> Arc<StructType> {
    StructType::builder("Message")
        .byte_order(ByteOrder::Big)
        .field(Field::magic("magic", b"\x89MSG"))
        .field(Field::uint("len", 2))
        .field(Field::bytes("payload").length_ref("len"))
        .field(Field::uint("crc", 4))
        .build()
        .expect("definition")
}

fn encoded_message(ty: &Arc<StructType>) -> Vec<u8> {
    let record = ty
        .instantiate(
            [
                ("payload", Value::Bytes(vec![0xAB; 256])),
                ("crc", Value::Uint(0xDEAD_BEEF)),
            ]
            .into_iter()
            .collect(),
        )
        .expect("instantiate");
    record.to_bytes().expect("encode")
}

fn bench_decode(c: &mut Criterion) {
    let ty = message_type();
    let bytes = encoded_message(&ty);
    c.bench_function("decode_message", |b| {
        b.iter(|| ty.decode(black_box(&bytes)).expect("decode"))
    });
}

fn bench_roundtrip(c: &mut Criterion) {
    let ty = message_type();
    let bytes = encoded_message(&ty);
    c.bench_function("roundtrip_message", |b| {
        b.iter(|| {
            let record = ty.decode(black_box(&bytes)).expect("decode");
            record.to_bytes().expect("encode")
        })
    });
}

criterion_group!(benches, bench_decode, bench_roundtrip);
criterion_main!(benches);
