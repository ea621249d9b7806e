//! Bit-packed fields over the context's leftover-bits buffer.

use crate::context::Context;
use crate::error::{CodecError, DefinitionError};
use crate::prop::Prop;
use crate::stream::{ReadSeek, WriteSeek};
use crate::value::Value;

/// A field of `count` bits, packed most-significant-bit first. On read it
/// drains the shared bit buffer, pulling a source byte only when the
/// buffer is empty; on write it appends to the buffer without touching the
/// stream. `realign` flushes (write) or discards (read) the residue so
/// the next field starts on a byte boundary.
#[derive(Debug, Clone)]
pub struct BitPacked {
    pub count: Prop,
    pub realign: bool,
}

impl BitPacked {
    pub(crate) fn validate(&self, name: &str) -> Result<(), DefinitionError> {
        if let Some(n) = self.count.as_literal().and_then(|v| v.as_i64()) {
            if !(1..=64).contains(&n) {
                return Err(DefinitionError::BadBitWidth(name.to_string(), n));
            }
        }
        Ok(())
    }

    pub(crate) fn read(
        &self,
        name: &str,
        stream: &mut dyn ReadSeek,
        ctx: &mut Context,
    ) -> Result<(Value, u64), CodecError> {
        let count = self.resolve_count(name, ctx)?;
        let (value, consumed) = ctx.read_bits(stream, count)?;
        if self.realign {
            ctx.discard_bits();
        }
        Ok((Value::Uint(value), consumed))
    }

    pub(crate) fn write(
        &self,
        name: &str,
        stream: &mut dyn WriteSeek,
        ctx: &mut Context,
        value: &Value,
    ) -> Result<u64, CodecError> {
        let count = self.resolve_count(name, ctx)?;
        let raw = value.as_u64().ok_or_else(|| {
            CodecError::Write(format!("field {}: expected an unsigned value, got {:?}", name, value))
        })?;
        ctx.push_bits(raw, count);
        if self.realign {
            ctx.flush_bits(stream)
        } else {
            Ok(0)
        }
    }

    fn resolve_count(&self, name: &str, ctx: &Context) -> Result<u32, CodecError> {
        let count = self.count.resolve_i64(ctx, name)?;
        if !(1..=64).contains(&count) {
            return Err(CodecError::Parse(format!(
                "field {}: bit width must be 1 to 64, got {}",
                name, count
            )));
        }
        Ok(count as u32)
    }

    pub(crate) fn static_size(&self, name: &str) -> Result<u64, CodecError> {
        match self.count.as_literal().and_then(|v| v.as_i64()) {
            Some(n) if self.realign => Ok((n as u64).div_ceil(8)),
            Some(n) if n % 8 == 0 => Ok(n as u64 / 8),
            _ => Err(CodecError::SizeUnknown(name.to_string())),
        }
    }

    /// Literal bit width, for structure-level bit-run accounting.
    pub(crate) fn literal_bits(&self) -> Option<u64> {
        self.count.as_literal().and_then(|v| v.as_u64())
    }
}
