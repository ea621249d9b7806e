//! Fixed-width integer and variable-length-quantity fields.

use byteorder::{BigEndian, ByteOrder as _, LittleEndian};

use crate::context::Context;
use crate::error::{CodecError, DefinitionError};
use crate::prop::Prop;
use crate::stream::{ReadSeek, WriteSeek};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
}

/// A fixed-width integer of 1 to 8 bytes. A 1-byte field defaults to
/// big-endian; any wider field must declare a byte order or inherit one
/// from the structure.
#[derive(Debug, Clone)]
pub struct FixedInt {
    pub width: Prop,
    pub byte_order: Option<ByteOrder>,
    pub signed: bool,
}

impl FixedInt {
    pub(crate) fn validate(&self, name: &str) -> Result<(), DefinitionError> {
        let literal = self.width.as_literal().and_then(|v| v.as_i64());
        if let Some(w) = literal {
            if !(1..=8).contains(&w) {
                return Err(DefinitionError::BadIntegerWidth(name.to_string(), w));
            }
        }
        if self.byte_order.is_none() && literal != Some(1) {
            return Err(DefinitionError::MissingByteOrder(name.to_string()));
        }
        Ok(())
    }

    pub(crate) fn read(
        &self,
        name: &str,
        stream: &mut dyn ReadSeek,
        ctx: &mut Context,
    ) -> Result<(Value, u64), CodecError> {
        let width = self.resolve_width(name, ctx)?;
        let buf = ctx.read_bytes(stream, width)?;
        if buf.len() < width {
            return Err(CodecError::StreamExhausted(format!(
                "could not parse field {}, trying to read {} bytes, but only {} read",
                name,
                width,
                buf.len()
            )));
        }
        let value = match self.effective_order() {
            ByteOrder::Big => {
                if self.signed {
                    Value::Int(BigEndian::read_int(&buf, width))
                } else {
                    Value::Uint(BigEndian::read_uint(&buf, width))
                }
            }
            ByteOrder::Little => {
                if self.signed {
                    Value::Int(LittleEndian::read_int(&buf, width))
                } else {
                    Value::Uint(LittleEndian::read_uint(&buf, width))
                }
            }
        };
        Ok((value, width as u64))
    }

    pub(crate) fn write(
        &self,
        name: &str,
        stream: &mut dyn WriteSeek,
        ctx: &mut Context,
        value: &Value,
    ) -> Result<u64, CodecError> {
        let width = self.resolve_width(name, ctx)?;
        let mut buf = vec![0u8; width];
        if self.signed {
            let v = value.as_i64().ok_or_else(|| {
                CodecError::Write(format!("field {}: expected an integer value, got {:?}", name, value))
            })?;
            let bits = width as u32 * 8;
            if bits < 64 && (v < -(1i64 << (bits - 1)) || v >= (1i64 << (bits - 1))) {
                return Err(CodecError::Overflow(format!(
                    "field {}: value {} does not fit in {} signed bytes",
                    name, v, width
                )));
            }
            match self.effective_order() {
                ByteOrder::Big => BigEndian::write_int(&mut buf, v, width),
                ByteOrder::Little => LittleEndian::write_int(&mut buf, v, width),
            }
        } else {
            let v = value.as_u64().ok_or_else(|| {
                CodecError::Write(format!("field {}: expected an unsigned value, got {:?}", name, value))
            })?;
            let bits = width as u32 * 8;
            if bits < 64 && v >= (1u64 << bits) {
                return Err(CodecError::Overflow(format!(
                    "field {}: value {} does not fit in {} bytes",
                    name, v, width
                )));
            }
            match self.effective_order() {
                ByteOrder::Big => BigEndian::write_uint(&mut buf, v, width),
                ByteOrder::Little => LittleEndian::write_uint(&mut buf, v, width),
            }
        }
        ctx.write_bytes(stream, &buf)
    }

    fn resolve_width(&self, name: &str, ctx: &Context) -> Result<usize, CodecError> {
        let width = self.width.resolve_i64(ctx, name)?;
        if !(1..=8).contains(&width) {
            return Err(CodecError::Parse(format!(
                "field {}: integer width must be 1 to 8 bytes, got {}",
                name, width
            )));
        }
        Ok(width as usize)
    }

    fn effective_order(&self) -> ByteOrder {
        // Width 1 has no order; Big keeps the arithmetic uniform.
        self.byte_order.unwrap_or(ByteOrder::Big)
    }

    pub(crate) fn static_size(&self, name: &str) -> Result<u64, CodecError> {
        match self.width.as_literal().and_then(|v| v.as_i64()) {
            Some(w) if w > 0 => Ok(w as u64),
            _ => Err(CodecError::SizeUnknown(name.to_string())),
        }
    }
}

/// Base-128 variable-length quantity: big-endian groups of 7 value bits,
/// continuation in the top bit. Reading stops at the first byte with the
/// top bit clear; writing emits the minimum number of bytes.
pub(crate) fn read_varint(
    name: &str,
    stream: &mut dyn ReadSeek,
    ctx: &mut Context,
) -> Result<(Value, u64), CodecError> {
    let mut result: u64 = 0;
    let mut count: u64 = 0;
    loop {
        let byte = ctx.read_bytes(stream, 1)?;
        if byte.is_empty() {
            return Err(CodecError::StreamExhausted(format!(
                "could not read 1 byte while parsing field {}",
                name
            )));
        }
        count += 1;
        let c = byte[0];
        if result > (u64::MAX >> 7) {
            return Err(CodecError::Overflow(format!(
                "field {}: variable-length quantity wider than 64 bits",
                name
            )));
        }
        result = (result << 7) | (c & 0x7f) as u64;
        if c & 0x80 == 0 {
            break;
        }
    }
    Ok((Value::Uint(result), count))
}

pub(crate) fn write_varint(
    name: &str,
    stream: &mut dyn WriteSeek,
    ctx: &mut Context,
    value: &Value,
) -> Result<u64, CodecError> {
    let v = match value {
        Value::Uint(v) => *v,
        Value::Int(v) if *v >= 0 => *v as u64,
        Value::Int(v) => {
            return Err(CodecError::Overflow(format!(
                "field {}: cannot encode negative value {}",
                name, v
            )))
        }
        other => {
            return Err(CodecError::Write(format!(
                "field {}: expected an unsigned value, got {:?}",
                name, other
            )))
        }
    };
    let mut out = vec![(v & 0x7f) as u8];
    let mut rest = v >> 7;
    while rest > 0 {
        out.insert(0, (rest & 0x7f) as u8 | 0x80);
        rest >>= 7;
    }
    ctx.write_bytes(stream, &out)
}
