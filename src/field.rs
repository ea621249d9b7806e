//! Field declarations and the uniform field contract.
//!
//! A `Field` is an immutable declaration: name, optional default and
//! write-time override, optional stream positioning, and a kind-specific
//! configuration from a closed set of variants. Declarations are built
//! once, validated eagerly when the structure type is built, and shared
//! read-only across all calls.

use std::io::{Seek, SeekFrom};
use std::sync::Arc;

use crate::bits::BitPacked;
use crate::bytes::{ByteRun, Encoding, Marker, TerminatorHandler, TextRun};
use crate::context::{Context, FieldResult};
use crate::error::{CodecError, DefinitionError};
use crate::nested::{Discriminated, Guarded, Nested, Repeat};
use crate::numeric::{self, ByteOrder, FixedInt};
use crate::prop::{FieldDefault, OverrideSpec, Prop};
use crate::stream::{ReadSeek, WriteSeek};
use crate::structure::StructType;
use crate::value::Value;

/// The closed set of field kinds.
#[derive(Debug, Clone)]
pub enum FieldKind {
    Bytes(ByteRun),
    Bits(BitPacked),
    Int(FixedInt),
    VarInt,
    Text(TextRun),
    Struct(Nested),
    Switch(Discriminated),
    Magic(Marker),
    Array(Repeat),
    Conditional(Guarded),
}

/// Outcome of a single field read: the value, the bytes spanned, and for
/// nested fields the child context's entries.
#[derive(Debug)]
pub(crate) struct ReadOutcome {
    pub(crate) value: Value,
    pub(crate) length: u64,
    pub(crate) children: Option<Vec<(String, FieldResult)>>,
}

#[derive(Debug, Clone)]
pub struct Field {
    pub(crate) name: String,
    pub(crate) kind: FieldKind,
    pub(crate) default: Option<FieldDefault>,
    pub(crate) override_spec: Option<OverrideSpec>,
    pub(crate) skip: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) misuse: Option<DefinitionError>,
}

impl Field {
    fn new(name: &str, kind: FieldKind) -> Self {
        Field {
            name: name.to_string(),
            kind,
            default: None,
            override_spec: None,
            skip: None,
            offset: None,
            misuse: None,
        }
    }

    // ---- constructors ----

    /// A byte run; configure a length, a terminator, or both.
    pub fn bytes(name: &str) -> Self {
        Field::new(name, FieldKind::Bytes(ByteRun::default()))
    }

    /// A byte run of a fixed length (negative means "to end of stream").
    pub fn fixed(name: &str, length: i64) -> Self {
        Field::bytes(name).length(length)
    }

    /// A byte run read until the terminator.
    pub fn terminated(name: &str, terminator: &[u8]) -> Self {
        Field::bytes(name).terminator(terminator)
    }

    /// A bit-packed field of `count` bits.
    pub fn bits(name: &str, count: i64) -> Self {
        Field::new(name, FieldKind::Bits(BitPacked { count: Prop::literal(count), realign: false }))
    }

    /// An unsigned fixed-width integer of `width` bytes.
    pub fn uint(name: &str, width: i64) -> Self {
        Field::new(
            name,
            FieldKind::Int(FixedInt { width: Prop::literal(width), byte_order: None, signed: false }),
        )
    }

    /// A signed fixed-width integer of `width` bytes.
    pub fn int(name: &str, width: i64) -> Self {
        Field::new(
            name,
            FieldKind::Int(FixedInt { width: Prop::literal(width), byte_order: None, signed: true }),
        )
    }

    /// A base-128 variable-length quantity.
    pub fn varint(name: &str) -> Self {
        Field::new(name, FieldKind::VarInt)
    }

    /// A text run; configure a length or terminator, and an encoding if
    /// the structure does not provide one.
    pub fn text(name: &str) -> Self {
        Field::new(name, FieldKind::Text(TextRun { run: ByteRun::default(), encoding: None }))
    }

    /// A nested structure.
    pub fn nested(name: &str, ty: &Arc<StructType>) -> Self {
        Field::new(name, FieldKind::Struct(Nested { ty: Arc::clone(ty), length: None }))
    }

    /// A discriminated switch over `on`; add cases with [`Field::case`].
    pub fn switch(name: &str, on: Prop) -> Self {
        Field::new(name, FieldKind::Switch(Discriminated { on, cases: Vec::new(), fallback: None }))
    }

    /// A fixed marker that must match `expected` exactly. Its default is
    /// the expected constant.
    pub fn magic(name: &str, expected: &[u8]) -> Self {
        Field::new(name, FieldKind::Magic(Marker { expected: expected.to_vec() }))
    }

    /// An array of `inner`; bound it with [`Field::count`] or
    /// [`Field::length`].
    pub fn array(name: &str, inner: Field) -> Self {
        Field::new(name, FieldKind::Array(Repeat { inner: Box::new(inner), count: None, length: None }))
    }

    /// A conditional wrapper: `inner` is parsed and written only when the
    /// condition is truthy.
    pub fn conditional(name: &str, inner: Field, condition: Prop) -> Self {
        Field::new(name, FieldKind::Conditional(Guarded { inner: Box::new(inner), condition }))
    }

    // ---- kind-specific options ----

    pub fn length(self, length: i64) -> Self {
        self.length_prop(Prop::literal(length))
    }

    /// Length taken from another field's resolved value. When the named
    /// field has no explicit override, the builder installs one that
    /// yields this field's actual value length at write time.
    pub fn length_ref(self, path: &str) -> Self {
        self.length_prop(Prop::reference(path))
    }

    pub fn length_prop(mut self, length: Prop) -> Self {
        match &mut self.kind {
            FieldKind::Bytes(run) => run.length = Some(length),
            FieldKind::Text(t) => t.run.length = Some(length),
            FieldKind::Bits(b) => b.count = length,
            FieldKind::Struct(n) => n.length = Some(length),
            FieldKind::Array(a) => a.length = Some(length),
            _ => self.record_misuse("length"),
        }
        self
    }

    pub fn terminator(mut self, terminator: &[u8]) -> Self {
        match &mut self.kind {
            FieldKind::Bytes(run) => run.terminator = Some(terminator.to_vec()),
            FieldKind::Text(t) => t.run.terminator = Some(terminator.to_vec()),
            _ => self.record_misuse("terminator"),
        }
        self
    }

    pub fn handler(mut self, handler: TerminatorHandler) -> Self {
        match &mut self.kind {
            FieldKind::Bytes(run) => run.handler = handler,
            FieldKind::Text(t) => t.run.handler = handler,
            _ => self.record_misuse("handler"),
        }
        self
    }

    /// Chunk size for terminator scanning.
    pub fn step(mut self, step: usize) -> Self {
        match &mut self.kind {
            FieldKind::Bytes(run) => run.step = step,
            FieldKind::Text(t) => t.run.step = step,
            _ => self.record_misuse("step"),
        }
        self
    }

    pub fn padding(mut self, padding: &[u8]) -> Self {
        match &mut self.kind {
            FieldKind::Bytes(run) => run.padding = Some(padding.to_vec()),
            FieldKind::Text(t) => t.run.padding = Some(padding.to_vec()),
            _ => self.record_misuse("padding"),
        }
        self
    }

    /// Downgrades this field's shape errors to best-effort short reads,
    /// truncation, or unpadded writes.
    pub fn non_strict(mut self) -> Self {
        match &mut self.kind {
            FieldKind::Bytes(run) => run.strict = false,
            FieldKind::Text(t) => t.run.strict = false,
            _ => self.record_misuse("non_strict"),
        }
        self
    }

    pub fn byte_order(mut self, order: ByteOrder) -> Self {
        match &mut self.kind {
            FieldKind::Int(i) => i.byte_order = Some(order),
            _ => self.record_misuse("byte_order"),
        }
        self
    }

    pub fn encoding(mut self, encoding: Encoding) -> Self {
        match &mut self.kind {
            FieldKind::Text(t) => t.encoding = Some(encoding),
            _ => self.record_misuse("encoding"),
        }
        self
    }

    /// Flush (write) or discard (read) the leftover bits after this field,
    /// realigning the stream to a byte boundary.
    pub fn realign(mut self) -> Self {
        match &mut self.kind {
            FieldKind::Bits(b) => b.realign = true,
            _ => self.record_misuse("realign"),
        }
        self
    }

    pub fn count(self, count: i64) -> Self {
        self.count_prop(Prop::literal(count))
    }

    pub fn count_ref(self, path: &str) -> Self {
        self.count_prop(Prop::reference(path))
    }

    pub fn count_prop(mut self, count: Prop) -> Self {
        match &mut self.kind {
            FieldKind::Array(a) => a.count = Some(count),
            _ => self.record_misuse("count"),
        }
        self
    }

    pub fn case(mut self, key: impl Into<Value>, field: Field) -> Self {
        match &mut self.kind {
            FieldKind::Switch(sw) => sw.cases.push((key.into(), field)),
            _ => self.record_misuse("case"),
        }
        self
    }

    pub fn fallback(mut self, field: Field) -> Self {
        match &mut self.kind {
            FieldKind::Switch(sw) => sw.fallback = Some(Box::new(field)),
            _ => self.record_misuse("fallback"),
        }
        self
    }

    // ---- common options ----

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(FieldDefault::Literal(value.into()));
        self
    }

    pub fn default_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context) -> Result<Value, CodecError> + Send + Sync + 'static,
    {
        self.default = Some(FieldDefault::Computed(Arc::new(f)));
        self
    }

    pub fn override_value(mut self, value: impl Into<Value>) -> Self {
        self.override_spec = Some(OverrideSpec::Literal(value.into()));
        self
    }

    pub fn override_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Context, Value) -> Result<Value, CodecError> + Send + Sync + 'static,
    {
        self.override_spec = Some(OverrideSpec::Computed(Arc::new(f)));
        self
    }

    /// Skip this many bytes from the current position before the field.
    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Position the field at an absolute offset from the structure start.
    pub fn at_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    fn record_misuse(&mut self, option: &'static str) {
        if self.misuse.is_none() {
            self.misuse = Some(DefinitionError::InvalidOption(self.name.clone(), option));
        }
    }

    // ---- the field contract ----

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &FieldKind {
        &self.kind
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            FieldKind::Bytes(_) => "bytes",
            FieldKind::Bits(_) => "bits",
            FieldKind::Int(_) => "int",
            FieldKind::VarInt => "varint",
            FieldKind::Text(_) => "text",
            FieldKind::Struct(_) => "struct",
            FieldKind::Switch(_) => "switch",
            FieldKind::Magic(_) => "magic",
            FieldKind::Array(_) => "array",
            FieldKind::Conditional(_) => "conditional",
        }
    }

    /// Reads the field from the stream: the parsed value and the bytes
    /// consumed.
    pub fn read(&self, stream: &mut dyn ReadSeek, ctx: &mut Context) -> Result<(Value, u64), CodecError> {
        let outcome = self.read_full(stream, ctx)?;
        Ok((outcome.value, outcome.length))
    }

    pub(crate) fn read_full(&self, stream: &mut dyn ReadSeek, ctx: &mut Context) -> Result<ReadOutcome, CodecError> {
        match &self.kind {
            FieldKind::Bytes(run) => {
                let (bytes, length) = run.read(&self.name, stream, ctx)?;
                Ok(ReadOutcome { value: Value::Bytes(bytes), length, children: None })
            }
            FieldKind::Bits(b) => {
                let (value, length) = b.read(&self.name, stream, ctx)?;
                Ok(ReadOutcome { value, length, children: None })
            }
            FieldKind::Int(i) => {
                let (value, length) = i.read(&self.name, stream, ctx)?;
                Ok(ReadOutcome { value, length, children: None })
            }
            FieldKind::VarInt => {
                let (value, length) = numeric::read_varint(&self.name, stream, ctx)?;
                Ok(ReadOutcome { value, length, children: None })
            }
            FieldKind::Text(t) => {
                let (bytes, length) = t.run.read(&self.name, stream, ctx)?;
                let text = t.encoding_of(&self.name)?.decode(&self.name, &bytes)?;
                Ok(ReadOutcome { value: Value::Text(text), length, children: None })
            }
            FieldKind::Struct(n) => n.read(&self.name, stream, ctx),
            FieldKind::Switch(sw) => sw.read(&self.name, stream, ctx),
            FieldKind::Magic(m) => {
                let (bytes, length) = m.read(&self.name, stream, ctx)?;
                Ok(ReadOutcome { value: Value::Bytes(bytes), length, children: None })
            }
            FieldKind::Array(a) => a.read(&self.name, stream, ctx),
            FieldKind::Conditional(c) => c.read(&self.name, stream, ctx),
        }
    }

    /// Writes a value to the stream, returning the bytes written.
    pub fn write(&self, stream: &mut dyn WriteSeek, value: &Value, ctx: &mut Context) -> Result<u64, CodecError> {
        match &self.kind {
            FieldKind::Bytes(run) => {
                let raw = value.as_bytes().ok_or_else(|| {
                    CodecError::Write(format!("field {}: expected a bytes value, got {:?}", self.name, value))
                })?;
                run.write(&self.name, stream, ctx, raw)
            }
            FieldKind::Bits(b) => b.write(&self.name, stream, ctx, value),
            FieldKind::Int(i) => i.write(&self.name, stream, ctx, value),
            FieldKind::VarInt => numeric::write_varint(&self.name, stream, ctx, value),
            FieldKind::Text(t) => {
                let text = value.as_text().ok_or_else(|| {
                    CodecError::Write(format!("field {}: expected a text value, got {:?}", self.name, value))
                })?;
                let raw = t.encoding_of(&self.name)?.encode(&self.name, text)?;
                t.run.write(&self.name, stream, ctx, &raw)
            }
            FieldKind::Struct(n) => n.write(&self.name, stream, ctx, value),
            FieldKind::Switch(sw) => sw.write(&self.name, stream, ctx, value),
            FieldKind::Magic(m) => m.write(&self.name, stream, ctx, value),
            FieldKind::Array(a) => a.write(&self.name, stream, ctx, value),
            FieldKind::Conditional(c) => c.write(&self.name, stream, ctx, value),
        }
    }

    /// Evaluates the field's default against the context. A field with no
    /// default yields `Null`; magic fields default to their constant and
    /// nested fields to an instance built from the nested defaults.
    pub fn default_value(&self, ctx: &Context) -> Result<Value, CodecError> {
        match &self.default {
            Some(default) => default.resolve(ctx),
            None => match &self.kind {
                FieldKind::Magic(m) => Ok(Value::Bytes(m.expected.clone())),
                FieldKind::Struct(n) => {
                    let record = n.ty.instantiate(crate::value::ValueMap::new())?;
                    Ok(Value::Struct(record.to_values()))
                }
                _ => Ok(Value::Null),
            },
        }
    }

    /// Applies the write-time override, if any.
    pub fn overridden_value(&self, value: Value, ctx: &Context) -> Result<Value, CodecError> {
        match &self.override_spec {
            Some(spec) => spec.apply(ctx, value),
            None => Ok(value),
        }
    }

    /// The field's size in bytes when it does not depend on context.
    pub fn static_size(&self) -> Result<u64, CodecError> {
        match &self.kind {
            FieldKind::Bytes(run) => run.static_size(&self.name),
            FieldKind::Bits(b) => b.static_size(&self.name),
            FieldKind::Int(i) => i.static_size(&self.name),
            FieldKind::VarInt => Err(CodecError::SizeUnknown(self.name.clone())),
            FieldKind::Text(t) => t.run.static_size(&self.name),
            FieldKind::Struct(n) => n.static_size(&self.name),
            FieldKind::Switch(_) => Err(CodecError::SizeUnknown(self.name.clone())),
            FieldKind::Magic(m) => Ok(m.expected.len() as u64),
            FieldKind::Array(a) => a.static_size(&self.name),
            FieldKind::Conditional(_) => Err(CodecError::SizeUnknown(self.name.clone())),
        }
    }

    /// Seeks to the field's start position; plain fields stay where the
    /// stream is.
    pub(crate) fn seek_start<S: Seek + ?Sized>(&self, stream: &mut S, struct_start: u64) -> Result<u64, CodecError> {
        match (self.offset, self.skip) {
            (Some(offset), _) => Ok(stream.seek(SeekFrom::Start(struct_start + offset))?),
            (None, Some(skip)) => Ok(stream.seek(SeekFrom::Current(skip as i64))?),
            (None, None) => Ok(stream.stream_position()?),
        }
    }

    // ---- definition-time checks ----

    pub(crate) fn bind(&mut self, byte_order: Option<ByteOrder>, encoding: Option<Encoding>) {
        match &mut self.kind {
            FieldKind::Int(i) => {
                if i.byte_order.is_none() {
                    i.byte_order = byte_order;
                }
            }
            FieldKind::Text(t) => {
                if t.encoding.is_none() {
                    t.encoding = encoding;
                }
            }
            FieldKind::Switch(sw) => {
                for (_, field) in &mut sw.cases {
                    field.bind(byte_order, encoding);
                }
                if let Some(fallback) = &mut sw.fallback {
                    fallback.bind(byte_order, encoding);
                }
            }
            FieldKind::Array(a) => a.inner.bind(byte_order, encoding),
            FieldKind::Conditional(c) => c.inner.bind(byte_order, encoding),
            _ => {}
        }
    }

    pub(crate) fn validate(&self) -> Result<(), DefinitionError> {
        if let Some(err) = &self.misuse {
            return Err(err.clone());
        }
        if self.offset.is_some() && self.skip.is_some() {
            return Err(DefinitionError::OffsetConflict(self.name.clone()));
        }
        match &self.kind {
            FieldKind::Bytes(run) => run.validate(&self.name),
            FieldKind::Bits(b) => b.validate(&self.name),
            FieldKind::Int(i) => i.validate(&self.name),
            FieldKind::VarInt | FieldKind::Struct(_) => Ok(()),
            FieldKind::Text(t) => t.validate(&self.name),
            FieldKind::Switch(sw) => sw.validate(),
            FieldKind::Magic(m) => {
                if m.expected.is_empty() {
                    Err(DefinitionError::InvalidOption(self.name.clone(), "magic"))
                } else {
                    Ok(())
                }
            }
            FieldKind::Array(a) => a.validate(&self.name),
            FieldKind::Conditional(c) => c.inner.validate(),
        }
    }
}
