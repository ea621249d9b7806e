//! Per-call parsing/writing context.
//!
//! A context is created fresh for every top-level read or write and for
//! every nested structure inside one. It carries the values resolved so
//! far (in field order), an optional link to the record being written, an
//! optional parent context for nested lookups, and the leftover-bits
//! buffer shared by consecutive bit-packed fields.

use std::io::{Read, Write};

use crate::error::CodecError;
use crate::structure::Record;
use crate::value::Value;

/// Per-field outcome kept in the context: the resolved value, where it
/// started, how many bytes it spanned, and for nested fields the child
/// context's own entries.
#[derive(Debug, Clone)]
pub struct FieldResult {
    pub value: Value,
    pub start: u64,
    pub length: u64,
    pub children: Option<Vec<(String, FieldResult)>>,
}

impl FieldResult {
    pub(crate) fn bare(value: Value) -> Self {
        FieldResult { value, start: 0, length: 0, children: None }
    }
}

pub struct Context<'a> {
    record: Option<&'a Record>,
    parent: Option<&'a Context<'a>>,
    entries: Vec<(String, FieldResult)>,
    bits: Vec<bool>,
}

impl<'a> Context<'a> {
    pub fn new() -> Self {
        Context { record: None, parent: None, entries: Vec::new(), bits: Vec::new() }
    }

    /// Context for writing `record`: lookups that miss the resolved
    /// entries fall through to the record's own values.
    pub fn for_record(record: &'a Record) -> Self {
        Context { record: Some(record), parent: None, entries: Vec::new(), bits: Vec::new() }
    }

    /// Child context for a nested structure, linked to its parent for
    /// `^.`-prefixed references.
    pub fn child_of(parent: &'a Context<'a>) -> Self {
        Context { record: None, parent: Some(parent), entries: Vec::new(), bits: Vec::new() }
    }

    pub fn parent(&self) -> Option<&Context<'a>> {
        self.parent
    }

    /// Two-tier lookup of a plain field name: values resolved in the
    /// current pass first, then the record being written. A miss is an
    /// `UnknownDependentField` error, never a silent reorder.
    pub fn get(&self, name: &str) -> Result<&Value, CodecError> {
        if let Some((_, result)) = self.entries.iter().find(|(n, _)| n == name) {
            return Ok(&result.value);
        }
        if let Some(record) = self.record {
            if let Some(value) = record.get(name) {
                return Ok(value);
            }
        }
        Err(CodecError::UnknownDependentField(name.to_string()))
    }

    /// Path lookup: any number of leading `^.` segments walk up to parent
    /// contexts, the remaining dotted segments descend into resolved
    /// struct values.
    pub fn lookup(&self, path: &str) -> Result<&Value, CodecError> {
        let mut ctx: &Context<'a> = self;
        let mut rest = path;
        while let Some(stripped) = rest.strip_prefix("^.") {
            ctx = ctx
                .parent
                .ok_or_else(|| CodecError::UnknownDependentField(path.to_string()))?;
            rest = stripped;
        }
        let mut segments = rest.split('.');
        let first = segments
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CodecError::UnknownDependentField(path.to_string()))?;
        let mut value = ctx
            .get(first)
            .map_err(|_| CodecError::UnknownDependentField(path.to_string()))?;
        for segment in segments {
            value = value
                .as_struct()
                .and_then(|m| m.get(segment))
                .ok_or_else(|| CodecError::UnknownDependentField(path.to_string()))?;
        }
        Ok(value)
    }

    pub fn result(&self, name: &str) -> Option<&FieldResult> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, r)| r)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &FieldResult)> {
        self.entries.iter().map(|(n, r)| (n.as_str(), r))
    }

    pub(crate) fn insert(&mut self, name: &str, result: FieldResult) {
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, r)) => *r = result,
            None => self.entries.push((name.to_string(), result)),
        }
    }

    pub(crate) fn update_span(&mut self, name: &str, start: u64, length: u64) {
        if let Some((_, r)) = self.entries.iter_mut().find(|(n, _)| n == name) {
            r.start = start;
            r.length = length;
        }
    }

    pub(crate) fn take_entries(self) -> Vec<(String, FieldResult)> {
        self.entries
    }

    // ---- byte access, guarded by the bit buffer invariant ----

    /// Number of bits currently buffered between bit-packed fields.
    pub fn bits_pending(&self) -> usize {
        self.bits.len()
    }

    /// Reads up to `n` bytes. Fails with `MisalignedField` if leftover
    /// bits are buffered; returns fewer bytes only at end of stream.
    pub(crate) fn read_bytes<R: Read + ?Sized>(&mut self, stream: &mut R, n: usize) -> Result<Vec<u8>, CodecError> {
        self.check_read_aligned()?;
        let mut buf = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            let got = stream.read(&mut buf[filled..])?;
            if got == 0 {
                break;
            }
            filled += got;
        }
        buf.truncate(filled);
        Ok(buf)
    }

    /// Reads until end of stream (or end of the enclosing substream).
    pub(crate) fn read_to_end<R: Read + ?Sized>(&mut self, stream: &mut R) -> Result<Vec<u8>, CodecError> {
        self.check_read_aligned()?;
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Writes `bytes`, first flushing any whole buffered bytes of bit
    /// output. A 1-7 bit residue is a fatal misalignment. Returns the
    /// total bytes that reached the stream.
    pub(crate) fn write_bytes<W: Write + ?Sized>(&mut self, stream: &mut W, bytes: &[u8]) -> Result<u64, CodecError> {
        if self.bits.len() % 8 != 0 {
            return Err(CodecError::MisalignedField(format!(
                "a field following a bit field is misaligned, {} bits are still buffered",
                self.bits.len()
            )));
        }
        let flushed = self.flush_bits(stream)?;
        stream.write_all(bytes)?;
        Ok(flushed + bytes.len() as u64)
    }

    fn check_read_aligned(&self) -> Result<(), CodecError> {
        if self.bits.is_empty() {
            Ok(())
        } else {
            Err(CodecError::MisalignedField(format!(
                "a field following a bit field is misaligned, {} bits are still buffered",
                self.bits.len()
            )))
        }
    }

    // ---- bit access ----

    /// Reads `count` bits, most significant first, pulling one source
    /// byte at a time and only when the buffer is empty. Returns the bits
    /// as a big-endian integer and the bytes freshly consumed from the
    /// stream (which may be zero).
    pub(crate) fn read_bits<R: Read + ?Sized>(&mut self, stream: &mut R, count: u32) -> Result<(u64, u64), CodecError> {
        let mut out = 0u64;
        let mut taken = 0;
        let mut consumed = 0u64;
        while taken < count {
            if self.bits.is_empty() {
                let mut byte = [0u8; 1];
                let got = stream.read(&mut byte)?;
                if got == 0 {
                    return Err(CodecError::StreamExhausted(
                        "could not parse bit field, trying to read 1 byte".to_string(),
                    ));
                }
                consumed += 1;
                for i in (0..8).rev() {
                    self.bits.push((byte[0] >> i) & 1 == 1);
                }
            }
            let take = ((count - taken) as usize).min(self.bits.len());
            for bit in self.bits.drain(..take) {
                out = (out << 1) | bit as u64;
            }
            taken += take as u32;
        }
        Ok((out, consumed))
    }

    /// Appends the low `count` bits of `value` to the buffer, most
    /// significant first. Nothing reaches the stream until a realign or
    /// the structure-level final flush.
    pub(crate) fn push_bits(&mut self, value: u64, count: u32) {
        for i in (0..count).rev() {
            self.bits.push((value >> i) & 1 == 1);
        }
    }

    /// Drops any buffered bits (read-side realign).
    pub(crate) fn discard_bits(&mut self) {
        self.bits.clear();
    }

    /// Zero-pads the buffer to a byte boundary, packs it big-endian, and
    /// writes it out. Returns the bytes written.
    pub(crate) fn flush_bits<W: Write + ?Sized>(&mut self, stream: &mut W) -> Result<u64, CodecError> {
        if self.bits.is_empty() {
            return Ok(0);
        }
        while self.bits.len() % 8 != 0 {
            self.bits.push(false);
        }
        let mut out = Vec::with_capacity(self.bits.len() / 8);
        for chunk in self.bits.chunks(8) {
            let mut byte = 0u8;
            for &bit in chunk {
                byte = (byte << 1) | bit as u8;
            }
            out.push(byte);
        }
        self.bits.clear();
        stream.write_all(&out)?;
        Ok(out.len() as u64)
    }
}

impl Default for Context<'_> {
    fn default() -> Self {
        Context::new()
    }
}
