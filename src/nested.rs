//! Compound fields: nested structures, discriminated switches, arrays,
//! and conditionals.

use std::io::SeekFrom;
use std::sync::Arc;

use crate::context::Context;
use crate::error::{CodecError, DefinitionError};
use crate::field::{Field, ReadOutcome};
use crate::prop::Prop;
use crate::stream::{ReadSeek, Substream, WriteSeek};
use crate::structure::StructType;
use crate::value::{Value, ValueMap};

/// A nested structure. With a declared length the nested parse is confined
/// to a substream window and any unread remainder is skipped, never
/// interpreted; without one the nested structure parses until it naturally
/// stops.
#[derive(Debug, Clone)]
pub struct Nested {
    pub ty: Arc<StructType>,
    pub length: Option<Prop>,
}

impl Nested {
    pub(crate) fn read(
        &self,
        name: &str,
        stream: &mut dyn ReadSeek,
        ctx: &mut Context,
    ) -> Result<ReadOutcome, CodecError> {
        if ctx.bits_pending() != 0 {
            return Err(CodecError::MisalignedField(format!(
                "a field following a bit field is misaligned, {} bits are still buffered",
                ctx.bits_pending()
            )));
        }
        let length = match &self.length {
            Some(prop) => {
                let l = prop.resolve_i64(ctx, name)?;
                if l < 0 {
                    return Err(CodecError::Parse(format!(
                        "field {}: nested structure length cannot be negative, got {}",
                        name, l
                    )));
                }
                Some(l as u64)
            }
            None => None,
        };

        let child = Context::child_of(&*ctx);
        let (record, consumed, children) = {
            let mut child = child;
            let (record, consumed) = match length {
                Some(l) => {
                    let pos = stream.stream_position()?;
                    let mut sub = Substream::bounded(stream, pos + l)?;
                    self.ty.read_from(&mut sub, &mut child)?
                }
                None => self.ty.read_from(stream, &mut child)?,
            };
            (record, consumed, child.take_entries())
        };

        let mut consumed = consumed;
        if let Some(l) = length {
            if consumed < l {
                // Skip the unread remainder of the declared window.
                stream.seek(SeekFrom::Current((l - consumed) as i64))?;
                consumed = l;
            }
        }
        Ok(ReadOutcome {
            value: Value::Struct(record.to_values()),
            length: consumed,
            children: Some(children),
        })
    }

    pub(crate) fn write(
        &self,
        name: &str,
        stream: &mut dyn WriteSeek,
        ctx: &mut Context,
        value: &Value,
    ) -> Result<u64, CodecError> {
        let length = match &self.length {
            Some(prop) => Some(prop.resolve_i64(ctx, name)?),
            None => None,
        };
        let map = match value {
            Value::Struct(m) => m.clone(),
            Value::Null => ValueMap::new(),
            other => {
                return Err(CodecError::Write(format!(
                    "field {}: expected a struct value, got {:?}",
                    name, other
                )))
            }
        };
        let record = self.ty.instantiate(map)?;
        // Settle the outer bit buffer before the nested fields take over.
        let flushed = ctx.write_bytes(stream, &[])?;
        let mut child = Context::for_record(&record);
        let written = self.ty.write_fields(stream, &record, &mut child)?;
        if let Some(l) = length {
            if written > l as u64 {
                return Err(CodecError::Write(format!(
                    "field {}: nested content is {} bytes, exceeding the declared length {}",
                    name, written, l
                )));
            }
        }
        Ok(flushed + written)
    }

    pub(crate) fn static_size(&self, name: &str) -> Result<u64, CodecError> {
        match &self.length {
            Some(prop) => match prop.as_literal().and_then(|v| v.as_i64()) {
                Some(l) if l >= 0 => Ok(l as u64),
                _ => Err(CodecError::SizeUnknown(name.to_string())),
            },
            None => self.ty.static_size(),
        }
    }
}

/// A discriminated switch: evaluates the discriminant and delegates fully
/// to the matching case field, propagating its byte count and any failure
/// unchanged.
#[derive(Debug, Clone)]
pub struct Discriminated {
    pub on: Prop,
    pub cases: Vec<(Value, Field)>,
    pub fallback: Option<Box<Field>>,
}

impl Discriminated {
    fn select(&self, discriminant: &Value) -> Option<&Field> {
        self.cases
            .iter()
            .find(|(key, _)| key.same_scalar(discriminant))
            .map(|(_, field)| field)
            .or(self.fallback.as_deref())
    }

    pub(crate) fn read(
        &self,
        name: &str,
        stream: &mut dyn ReadSeek,
        ctx: &mut Context,
    ) -> Result<ReadOutcome, CodecError> {
        let discriminant = self.on.resolve(ctx)?;
        match self.select(&discriminant) {
            Some(field) => field.read_full(stream, ctx),
            None => Err(CodecError::Parse(format!(
                "the case {:?} is not specified for {} and no fallback is set",
                discriminant, name
            ))),
        }
    }

    pub(crate) fn write(
        &self,
        name: &str,
        stream: &mut dyn WriteSeek,
        ctx: &mut Context,
        value: &Value,
    ) -> Result<u64, CodecError> {
        let discriminant = self.on.resolve(ctx)?;
        match self.select(&discriminant) {
            Some(field) => field.write(stream, value, ctx),
            None => Err(CodecError::Write(format!(
                "the case {:?} is not specified for {} and no fallback is set",
                discriminant, name
            ))),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), DefinitionError> {
        for (_, field) in &self.cases {
            field.validate()?;
        }
        if let Some(fallback) = &self.fallback {
            fallback.validate()?;
        }
        Ok(())
    }
}

/// Repeats an inner field, bounded by an element count or a byte length
/// (negative length repeats until the stream is exhausted).
#[derive(Debug, Clone)]
pub struct Repeat {
    pub inner: Box<Field>,
    pub count: Option<Prop>,
    pub length: Option<Prop>,
}

impl Repeat {
    pub(crate) fn validate(&self, name: &str) -> Result<(), DefinitionError> {
        if self.count.is_some() == self.length.is_some() {
            return Err(DefinitionError::BadArrayBounds(name.to_string()));
        }
        self.inner.validate()
    }

    pub(crate) fn read(
        &self,
        name: &str,
        stream: &mut dyn ReadSeek,
        ctx: &mut Context,
    ) -> Result<ReadOutcome, CodecError> {
        let mut items = Vec::new();
        let mut total = 0u64;
        if let Some(count) = &self.count {
            let n = self.count_of(count, name, ctx)?;
            for _ in 0..n {
                let outcome = self.inner.read_full(stream, ctx)?;
                total += outcome.length;
                items.push(outcome.value);
            }
        } else {
            let Some(length) = self.length.as_ref() else {
                return Err(CodecError::Parse(format!(
                    "field {}: an array requires a count or a length",
                    name
                )));
            };
            let length = length.resolve_i64(ctx, name)?;
            let field_start = stream.stream_position()?;
            if length >= 0 {
                let stop = field_start + length as u64;
                while total < length as u64 {
                    let outcome = {
                        let mut sub = Substream::bounded(stream, stop)?;
                        self.inner.read_full(&mut sub, ctx)?
                    };
                    if outcome.length == 0 {
                        break;
                    }
                    total += outcome.length;
                    items.push(outcome.value);
                }
            } else {
                loop {
                    match self.inner.read_full(stream, ctx) {
                        Ok(outcome) if outcome.length == 0 => break,
                        Ok(outcome) => {
                            total += outcome.length;
                            items.push(outcome.value);
                        }
                        Err(CodecError::StreamExhausted(_)) => {
                            stream.seek(SeekFrom::Start(field_start + total))?;
                            break;
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }
        Ok(ReadOutcome { value: Value::List(items), length: total, children: None })
    }

    pub(crate) fn write(
        &self,
        name: &str,
        stream: &mut dyn WriteSeek,
        ctx: &mut Context,
        value: &Value,
    ) -> Result<u64, CodecError> {
        let items = match value {
            Value::List(items) => items.as_slice(),
            Value::Null => &[],
            other => {
                return Err(CodecError::Write(format!(
                    "field {}: expected a list value, got {:?}",
                    name, other
                )))
            }
        };
        let mut total = 0u64;
        for item in items {
            total += self.inner.write(stream, item, ctx)?;
        }
        Ok(total)
    }

    fn count_of(&self, count: &Prop, name: &str, ctx: &Context) -> Result<u64, CodecError> {
        Ok(count.resolve_i64(ctx, name)?.max(0) as u64)
    }

    pub(crate) fn static_size(&self, name: &str) -> Result<u64, CodecError> {
        if let Some(count) = &self.count {
            if let Some(n) = count.as_literal().and_then(|v| v.as_u64()) {
                return Ok(n * self.inner.static_size()?);
            }
        } else if let Some(length) = &self.length {
            if let Some(l) = length.as_literal().and_then(|v| v.as_i64()) {
                if l >= 0 {
                    return Ok(l as u64);
                }
            }
        }
        Err(CodecError::SizeUnknown(name.to_string()))
    }
}

/// Parses or writes the inner field only when the condition holds;
/// otherwise the value is `Null` and zero bytes are spanned.
#[derive(Debug, Clone)]
pub struct Guarded {
    pub inner: Box<Field>,
    pub condition: Prop,
}

impl Guarded {
    pub(crate) fn read(
        &self,
        _name: &str,
        stream: &mut dyn ReadSeek,
        ctx: &mut Context,
    ) -> Result<ReadOutcome, CodecError> {
        if self.condition.resolve(ctx)?.is_truthy() {
            self.inner.read_full(stream, ctx)
        } else {
            Ok(ReadOutcome { value: Value::Null, length: 0, children: None })
        }
    }

    pub(crate) fn write(
        &self,
        _name: &str,
        stream: &mut dyn WriteSeek,
        ctx: &mut Context,
        value: &Value,
    ) -> Result<u64, CodecError> {
        if self.condition.resolve(ctx)?.is_truthy() {
            self.inner.write(stream, value, ctx)
        } else {
            Ok(0)
        }
    }
}
