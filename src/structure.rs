//! Structure types, instances, and the read/write drivers.
//!
//! A `StructType` is the immutable, shared schema: an ordered field list
//! plus structure-level options and the optional write-time `finalize`
//! hook. It is built once through `StructTypeBuilder`, which assigns the
//! stable field order and performs all definition-time validation. A
//! `Record` is one instance: the type plus a value per field.

use std::fmt;
use std::io::{Cursor, Read, Seek, Write};
use std::sync::Arc;

use crate::bytes::Encoding;
use crate::context::{Context, FieldResult};
use crate::error::{CodecError, DefinitionError};
use crate::field::{Field, FieldKind};
use crate::numeric::ByteOrder;
use crate::prop::{OverrideFn, OverrideSpec, Prop};
use crate::stream::{ReadSeek, WriteSeek};
use crate::value::{Value, ValueMap};

/// Structure-level hook run between the override pass and the first byte
/// written: sees the whole finalized value map, so derived fields such as
/// checksums can be injected as a batch.
pub type FinalizeFn = Arc<dyn Fn(&mut ValueMap) -> Result<(), CodecError> + Send + Sync>;

pub struct StructType {
    name: String,
    fields: Vec<Field>,
    finalize: Option<FinalizeFn>,
}

/// One entry of the layout descriptor consumed by pretty-printers.
#[derive(Debug, Clone)]
pub struct FieldLayout {
    pub name: String,
    pub kind: &'static str,
    pub size: Option<u64>,
}

impl StructType {
    pub fn builder(name: &str) -> StructTypeBuilder {
        StructTypeBuilder {
            name: name.to_string(),
            fields: Vec::new(),
            byte_order: None,
            encoding: None,
            finalize: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name() == name)
    }

    pub fn layout(&self) -> Vec<FieldLayout> {
        self.fields
            .iter()
            .map(|f| FieldLayout {
                name: f.name().to_string(),
                kind: f.kind_name(),
                size: f.static_size().ok(),
            })
            .collect()
    }

    /// Total size in bytes when every field is statically sized.
    /// Consecutive bit fields are summed as a run; a run that does not end
    /// on a byte boundary has no static size.
    pub fn static_size(&self) -> Result<u64, CodecError> {
        let mut total = 0u64;
        let mut run_bits = 0u64;
        for field in &self.fields {
            if field.offset.is_some() {
                return Err(CodecError::SizeUnknown(self.name.clone()));
            }
            total += field.skip.unwrap_or(0);
            if let FieldKind::Bits(b) = field.kind() {
                let bits = b
                    .literal_bits()
                    .ok_or_else(|| CodecError::SizeUnknown(field.name().to_string()))?;
                run_bits += bits;
                if b.realign {
                    total += run_bits.div_ceil(8);
                    run_bits = 0;
                }
            } else {
                if run_bits % 8 != 0 {
                    return Err(CodecError::SizeUnknown(self.name.clone()));
                }
                total += run_bits / 8;
                run_bits = 0;
                total += field.static_size()?;
            }
        }
        if run_bits % 8 != 0 {
            return Err(CodecError::SizeUnknown(self.name.clone()));
        }
        Ok(total + run_bits / 8)
    }

    /// Constructs a record: caller-supplied values where given, otherwise
    /// each field's default, resolved in declaration order. Defaults may
    /// reference fields resolved earlier through the context.
    pub fn instantiate(self: &Arc<Self>, mut values: ValueMap) -> Result<Record, CodecError> {
        let mut ctx = Context::new();
        let mut resolved = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let value = match values.remove(field.name()) {
                Some(v) => v,
                None => field.default_value(&ctx)?,
            };
            ctx.insert(field.name(), FieldResult::bare(value.clone()));
            resolved.push(value);
        }
        if let Some(name) = values.names().next() {
            return Err(CodecError::UnknownField(format!("{}.{}", self.name, name)));
        }
        Ok(Record { ty: Arc::clone(self), values: resolved })
    }

    /// Reads one record from the stream. Returns the record and the bytes
    /// spanned, defined as the maximum offset reached minus the start
    /// offset (fields may seek independently).
    pub fn read<R: Read + Seek>(self: &Arc<Self>, stream: &mut R) -> Result<(Record, u64), CodecError> {
        let mut ctx = Context::new();
        self.read_from(stream, &mut ctx)
    }

    /// Reads one record using an explicitly provided context.
    pub fn read_from(self: &Arc<Self>, stream: &mut dyn ReadSeek, ctx: &mut Context) -> Result<(Record, u64), CodecError> {
        let start_offset = stream.stream_position()?;
        let mut max_offset = start_offset;
        for field in &self.fields {
            let offset = field.seek_start(stream, start_offset)?;
            let outcome = field.read_full(stream, ctx)?;
            ctx.insert(
                field.name(),
                FieldResult {
                    value: outcome.value,
                    start: offset,
                    length: outcome.length,
                    children: outcome.children,
                },
            );
            max_offset = max_offset.max(offset + outcome.length);
        }
        let mut map = ValueMap::new();
        for field in &self.fields {
            if let Some(result) = ctx.result(field.name()) {
                map.set(field.name(), result.value.clone());
            }
        }
        let record = self.instantiate(map)?;
        Ok((record, max_offset - start_offset))
    }

    /// Decodes one record from a buffer.
    pub fn decode(self: &Arc<Self>, bytes: &[u8]) -> Result<Record, CodecError> {
        let mut cursor = Cursor::new(bytes);
        let (record, _) = self.read(&mut cursor)?;
        Ok(record)
    }

    /// The two-pass write pipeline. Pass 1 computes every field's on-wire
    /// value through its override and runs the whole map through the
    /// `finalize` hook; pass 2 writes in declaration order and flushes any
    /// pending bit buffer at the very end.
    pub(crate) fn write_fields(&self, stream: &mut dyn WriteSeek, record: &Record, ctx: &mut Context) -> Result<u64, CodecError> {
        let mut finalized = ValueMap::new();
        for (field, value) in self.fields.iter().zip(record.values.iter()) {
            let on_wire = field.overridden_value(value.clone(), ctx)?;
            finalized.set(field.name(), on_wire);
        }
        if let Some(finalize) = &self.finalize {
            finalize(&mut finalized)?;
        }
        for (name, value) in finalized.iter() {
            ctx.insert(name, FieldResult::bare(value.clone()));
        }

        let start_offset = stream.stream_position()?;
        let mut max_offset = start_offset;
        for field in &self.fields {
            let value = ctx.get(field.name())?.clone();
            let offset = field.seek_start(stream, start_offset)?;
            let written = field.write(stream, &value, ctx)?;
            ctx.update_span(field.name(), offset, written);
            max_offset = max_offset.max(offset + written);
        }
        ctx.flush_bits(stream)?;
        max_offset = max_offset.max(stream.stream_position()?);
        Ok(max_offset - start_offset)
    }
}

impl fmt::Debug for StructType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructType")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .finish()
    }
}

pub struct StructTypeBuilder {
    name: String,
    fields: Vec<Field>,
    byte_order: Option<ByteOrder>,
    encoding: Option<Encoding>,
    finalize: Option<FinalizeFn>,
}

impl StructTypeBuilder {
    /// Default byte order inherited by integer fields that declare none.
    pub fn byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = Some(order);
        self
    }

    /// Default encoding inherited by text fields that declare none.
    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    /// Appends a field; the append order is the declaration order.
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn finalize<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut ValueMap) -> Result<(), CodecError> + Send + Sync + 'static,
    {
        self.finalize = Some(Arc::new(f));
        self
    }

    /// Validates the whole definition eagerly and freezes it.
    pub fn build(self) -> Result<Arc<StructType>, DefinitionError> {
        let StructTypeBuilder { name, mut fields, byte_order, encoding, finalize } = self;
        for i in 0..fields.len() {
            for j in i + 1..fields.len() {
                if fields[i].name() == fields[j].name() {
                    return Err(DefinitionError::DuplicateField(name.clone(), fields[i].name().to_string()));
                }
            }
        }
        for field in &mut fields {
            field.bind(byte_order, encoding);
        }
        for field in &fields {
            field.validate()?;
        }
        install_length_overrides(&mut fields)?;
        Ok(Arc::new(StructType { name, fields, finalize }))
    }
}

enum LengthSource {
    Run,
    Text(Encoding),
    Bits,
}

/// When a field's length is a plain reference to a sibling field that has
/// no explicit override, that sibling gets an override resolving to this
/// field's actual value length at write time (unless a value was assigned).
fn install_length_overrides(fields: &mut [Field]) -> Result<(), DefinitionError> {
    let mut installs: Vec<(String, String, LengthSource)> = Vec::new();
    for field in fields.iter() {
        let (path, source) = match field.kind() {
            FieldKind::Bytes(run) => match &run.length {
                Some(Prop::Reference(path)) => (path.clone(), LengthSource::Run),
                _ => continue,
            },
            FieldKind::Text(t) => match (&t.run.length, t.encoding) {
                (Some(Prop::Reference(path)), Some(enc)) => (path.clone(), LengthSource::Text(enc)),
                _ => continue,
            },
            FieldKind::Bits(b) => match &b.count {
                Prop::Reference(path) => (path.clone(), LengthSource::Bits),
                _ => continue,
            },
            _ => continue,
        };
        if path.contains('.') || path.starts_with('^') {
            continue;
        }
        installs.push((path, field.name().to_string(), source));
    }
    for (target, source_field, source) in installs {
        let idx = fields
            .iter()
            .position(|f| f.name() == target)
            .ok_or_else(|| DefinitionError::BadLengthReference(source_field.clone(), target.clone()))?;
        if fields[idx].override_spec.is_some() {
            continue;
        }
        let compute: OverrideFn = match source {
            LengthSource::Run => {
                let src = source_field;
                Arc::new(move |ctx: &Context, v: Value| {
                    if !v.is_null() {
                        return Ok(v);
                    }
                    match ctx.get(&src)? {
                        Value::Bytes(b) => Ok(Value::Uint(b.len() as u64)),
                        Value::Text(s) => Ok(Value::Uint(s.len() as u64)),
                        other => Err(CodecError::Write(format!(
                            "field {}: cannot derive a byte length from {:?}",
                            src, other
                        ))),
                    }
                })
            }
            LengthSource::Text(enc) => {
                let src = source_field;
                Arc::new(move |ctx: &Context, v: Value| {
                    if !v.is_null() {
                        return Ok(v);
                    }
                    match ctx.get(&src)? {
                        Value::Text(s) => Ok(Value::Uint(enc.encoded_len(s))),
                        Value::Bytes(b) => Ok(Value::Uint(b.len() as u64)),
                        other => Err(CodecError::Write(format!(
                            "field {}: cannot derive a byte length from {:?}",
                            src, other
                        ))),
                    }
                })
            }
            LengthSource::Bits => {
                let src = source_field;
                Arc::new(move |ctx: &Context, v: Value| {
                    if !v.is_null() {
                        return Ok(v);
                    }
                    let raw = ctx.get(&src)?.as_u64().ok_or_else(|| {
                        CodecError::Write(format!("field {}: cannot derive a bit length", src))
                    })?;
                    Ok(Value::Uint((64 - raw.leading_zeros()) as u64))
                })
            }
        };
        fields[idx].override_spec = Some(OverrideSpec::Computed(compute));
    }
    Ok(())
}

/// One instance of a structure type: the resolved value of every field in
/// declaration order. Equality is field-by-field value equality, defined
/// only between records of the exact same type.
#[derive(Clone)]
pub struct Record {
    ty: Arc<StructType>,
    pub(crate) values: Vec<Value>,
}

impl Record {
    pub fn struct_type(&self) -> &Arc<StructType> {
        &self.ty
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        let idx = self.ty.fields.iter().position(|f| f.name() == name)?;
        Some(&self.values[idx])
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), CodecError> {
        let idx = self
            .ty
            .fields
            .iter()
            .position(|f| f.name() == name)
            .ok_or_else(|| CodecError::UnknownField(format!("{}.{}", self.ty.name, name)))?;
        self.values[idx] = value.into();
        Ok(())
    }

    /// The values as an ordered map, e.g. for nesting into another record.
    pub fn to_values(&self) -> ValueMap {
        self.ty
            .fields
            .iter()
            .zip(self.values.iter())
            .map(|(f, v)| (f.name(), v.clone()))
            .collect()
    }

    /// Writes the record to the stream; returns the bytes spanned.
    pub fn write<W: Write + Seek>(&self, stream: &mut W) -> Result<u64, CodecError> {
        let mut ctx = Context::for_record(self);
        self.ty.write_fields(stream, self, &mut ctx)
    }

    /// Writes the record using an explicitly provided context.
    pub fn write_into(&self, stream: &mut dyn WriteSeek, ctx: &mut Context) -> Result<u64, CodecError> {
        self.ty.write_fields(stream, self, ctx)
    }

    /// Encodes the record to a fresh buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut cursor = Cursor::new(Vec::new());
        self.write(&mut cursor)?;
        Ok(cursor.into_inner())
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.ty, &other.ty) && self.values == other.values
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.ty.name)?;
        for (i, (field, value)) in self.ty.fields.iter().zip(self.values.iter()).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={:?}", field.name(), value)?;
        }
        write!(f, ")")
    }
}
