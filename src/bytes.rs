//! Byte-run fields: fixed length, terminator-delimited, and padded, plus
//! the fixed-marker and text fields layered on the same algorithms.

use std::io::SeekFrom;

use crate::context::Context;
use crate::error::{CodecError, DefinitionError};
use crate::prop::Prop;
use crate::stream::{ReadSeek, WriteSeek};

/// What to do with the terminator once found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminatorHandler {
    /// Terminator is consumed from the stream and dropped from the value.
    Consume,
    /// Terminator is consumed and kept in the returned value.
    Include,
    /// Terminator is left unconsumed in the stream. Incompatible with a
    /// fixed length.
    Until,
}

/// Configuration of a byte-run field. The three shapes (fixed length,
/// terminated, fixed length with padding) are selected by which options
/// are set; conflicting combinations are definition errors.
#[derive(Debug, Clone)]
pub struct ByteRun {
    pub length: Option<Prop>,
    pub terminator: Option<Vec<u8>>,
    pub step: usize,
    pub handler: TerminatorHandler,
    pub padding: Option<Vec<u8>>,
    pub strict: bool,
}

impl Default for ByteRun {
    fn default() -> Self {
        ByteRun {
            length: None,
            terminator: None,
            step: 1,
            handler: TerminatorHandler::Consume,
            padding: None,
            strict: true,
        }
    }
}

impl ByteRun {
    pub(crate) fn validate(&self, name: &str) -> Result<(), DefinitionError> {
        if self.length.is_none() && self.terminator.is_none() {
            return Err(DefinitionError::MissingLengthOrTerminator(name.to_string()));
        }
        if self.padding.is_some() && self.length.is_none() {
            return Err(DefinitionError::PaddingWithoutLength(name.to_string()));
        }
        if self.padding.is_some() && self.terminator.is_some() {
            return Err(DefinitionError::TerminatorWithPadding(name.to_string()));
        }
        if self.handler == TerminatorHandler::Until && self.length.is_some() {
            return Err(DefinitionError::UntilWithLength(name.to_string()));
        }
        if self.step == 0 {
            return Err(DefinitionError::InvalidOption(name.to_string(), "step"));
        }
        if self.padding.as_ref().is_some_and(|p| p.is_empty()) {
            return Err(DefinitionError::InvalidOption(name.to_string(), "padding"));
        }
        if self.terminator.as_ref().is_some_and(|t| t.is_empty()) {
            return Err(DefinitionError::InvalidOption(name.to_string(), "terminator"));
        }
        Ok(())
    }

    pub(crate) fn read(
        &self,
        name: &str,
        stream: &mut dyn ReadSeek,
        ctx: &mut Context,
    ) -> Result<(Vec<u8>, u64), CodecError> {
        match &self.length {
            Some(length) => self.read_fixed(name, stream, ctx, length.clone()),
            None => self.read_terminated(name, stream, ctx),
        }
    }

    pub(crate) fn write(
        &self,
        name: &str,
        stream: &mut dyn WriteSeek,
        ctx: &mut Context,
        raw: &[u8],
    ) -> Result<u64, CodecError> {
        match &self.length {
            Some(length) => self.write_fixed(name, stream, ctx, length.clone(), raw),
            None => self.write_terminated(name, stream, ctx, raw),
        }
    }

    fn read_fixed(
        &self,
        name: &str,
        stream: &mut dyn ReadSeek,
        ctx: &mut Context,
        length: Prop,
    ) -> Result<(Vec<u8>, u64), CodecError> {
        let length = length.resolve_i64(ctx, name)?;
        let read = if length < 0 {
            ctx.read_to_end(stream)?
        } else {
            ctx.read_bytes(stream, length as usize)?
        };
        if length >= 0 && (read.len() as i64) < length && self.strict {
            return Err(CodecError::StreamExhausted(format!(
                "could not parse field {}, trying to read {} bytes, but only {} read",
                name,
                length,
                read.len()
            )));
        }
        let consumed = read.len() as u64;

        let value = if let Some(terminator) = &self.terminator {
            self.scan_terminator(name, &read, terminator)?
        } else if let Some(padding) = &self.padding {
            let mut value = read;
            while value.ends_with(padding) {
                value.truncate(value.len() - padding.len());
            }
            value
        } else {
            read
        };
        Ok((value, consumed))
    }

    /// Scans `read` in step-sized windows for the terminator. The whole
    /// run was already consumed from the stream; only the value changes.
    fn scan_terminator(&self, name: &str, read: &[u8], terminator: &[u8]) -> Result<Vec<u8>, CodecError> {
        let mut value = Vec::with_capacity(read.len());
        let mut i = 0;
        while i < read.len() {
            let end = (i + self.step).min(read.len());
            let chunk = &read[i..end];
            value.extend_from_slice(chunk);
            if chunk.len() == self.step && value.ends_with(terminator) {
                if self.handler == TerminatorHandler::Consume {
                    value.truncate(value.len() - terminator.len());
                }
                return Ok(value);
            }
            i = end;
        }
        if self.strict {
            return Err(CodecError::StreamExhausted(format!(
                "could not parse field {}, did not find terminator {:02x?}",
                name, terminator
            )));
        }
        Ok(value)
    }

    fn write_fixed(
        &self,
        name: &str,
        stream: &mut dyn WriteSeek,
        ctx: &mut Context,
        length: Prop,
        raw: &[u8],
    ) -> Result<u64, CodecError> {
        let length = length.resolve_i64(ctx, name)?;
        let mut val = raw.to_vec();
        if let Some(terminator) = &self.terminator {
            match self.handler {
                TerminatorHandler::Consume => val.extend_from_slice(terminator),
                TerminatorHandler::Include => {
                    if self.strict && !val.ends_with(terminator) {
                        return Err(CodecError::Write(format!(
                            "the field {} does not include its terminator",
                            name
                        )));
                    }
                }
                // Rejected at definition time.
                TerminatorHandler::Until => {}
            }
        }
        if length < 0 {
            return ctx.write_bytes(stream, &val);
        }
        let length = length as usize;
        if val.len() < length {
            if let Some(padding) = &self.padding {
                let remaining = length - val.len();
                if self.strict && remaining % padding.len() != 0 {
                    return Err(CodecError::Write(format!(
                        "the field {} must be padded, but the remaining {} bytes are not a multiple of {}",
                        name,
                        remaining,
                        padding.len()
                    )));
                }
                while val.len() < length {
                    val.extend_from_slice(padding);
                }
                // Truncate a partial final copy to fit.
                val.truncate(length);
            } else if self.strict {
                return Err(CodecError::Write(format!(
                    "the contents of {} are {} bytes, but expecting {}",
                    name,
                    val.len(),
                    length
                )));
            }
        } else if val.len() > length {
            if self.strict {
                return Err(CodecError::Write(format!(
                    "the contents of {} are {} bytes, but expecting {}",
                    name,
                    val.len(),
                    length
                )));
            }
            val.truncate(length);
        }
        ctx.write_bytes(stream, &val)
    }

    fn read_terminated(
        &self,
        name: &str,
        stream: &mut dyn ReadSeek,
        ctx: &mut Context,
    ) -> Result<(Vec<u8>, u64), CodecError> {
        let Some(terminator) = self.terminator.as_ref() else {
            return Err(CodecError::Parse(format!(
                "field {}: a length or terminator is required",
                name
            )));
        };
        let mut read: Vec<u8> = Vec::new();
        loop {
            let chunk = ctx.read_bytes(stream, self.step)?;
            read.extend_from_slice(&chunk);
            if chunk.len() != self.step {
                if self.strict {
                    return Err(CodecError::StreamExhausted(format!(
                        "could not parse field {}, did not find terminator {:02x?}",
                        name, terminator
                    )));
                }
                let len = read.len() as u64;
                return Ok((read, len));
            }
            if read.ends_with(terminator) {
                return match self.handler {
                    TerminatorHandler::Consume => {
                        let consumed = read.len() as u64;
                        read.truncate(read.len() - terminator.len());
                        Ok((read, consumed))
                    }
                    TerminatorHandler::Include => {
                        let consumed = read.len() as u64;
                        Ok((read, consumed))
                    }
                    TerminatorHandler::Until => {
                        read.truncate(read.len() - terminator.len());
                        stream.seek(SeekFrom::Current(-(terminator.len() as i64)))?;
                        let consumed = read.len() as u64;
                        Ok((read, consumed))
                    }
                };
            }
        }
    }

    fn write_terminated(
        &self,
        name: &str,
        stream: &mut dyn WriteSeek,
        ctx: &mut Context,
        raw: &[u8],
    ) -> Result<u64, CodecError> {
        let Some(terminator) = self.terminator.as_ref() else {
            return Err(CodecError::Parse(format!(
                "field {}: a length or terminator is required",
                name
            )));
        };
        match self.handler {
            TerminatorHandler::Consume => {
                let mut val = raw.to_vec();
                val.extend_from_slice(terminator);
                ctx.write_bytes(stream, &val)
            }
            TerminatorHandler::Include => {
                if self.strict && !raw.ends_with(terminator) {
                    return Err(CodecError::Write(format!(
                        "the field {} does not include its terminator",
                        name
                    )));
                }
                ctx.write_bytes(stream, raw)
            }
            TerminatorHandler::Until => ctx.write_bytes(stream, raw),
        }
    }

    pub(crate) fn static_size(&self, name: &str) -> Result<u64, CodecError> {
        match self.length.as_ref().and_then(|l| l.as_literal()).and_then(|v| v.as_i64()) {
            Some(n) if n >= 0 => Ok(n as u64),
            _ => Err(CodecError::SizeUnknown(name.to_string())),
        }
    }
}

/// A fixed marker: reads must match the expected constant exactly.
#[derive(Debug, Clone)]
pub struct Marker {
    pub expected: Vec<u8>,
}

impl Marker {
    pub(crate) fn read(
        &self,
        name: &str,
        stream: &mut dyn ReadSeek,
        ctx: &mut Context,
    ) -> Result<(Vec<u8>, u64), CodecError> {
        let read = ctx.read_bytes(stream, self.expected.len())?;
        if read.len() < self.expected.len() {
            return Err(CodecError::StreamExhausted(format!(
                "could not parse field {}, trying to read {} bytes, but only {} read",
                name,
                self.expected.len(),
                read.len()
            )));
        }
        if read != self.expected {
            return Err(CodecError::WrongMagic(format!(
                "field {} expected {:02x?}, found {:02x?}",
                name, self.expected, read
            )));
        }
        let consumed = read.len() as u64;
        Ok((read, consumed))
    }

    pub(crate) fn write(
        &self,
        name: &str,
        stream: &mut dyn WriteSeek,
        ctx: &mut Context,
        value: &crate::value::Value,
    ) -> Result<u64, CodecError> {
        if value.as_bytes() != Some(self.expected.as_slice()) {
            return Err(CodecError::Write(format!(
                "field {} must equal its magic value {:02x?}, got {:?}",
                name, self.expected, value
            )));
        }
        ctx.write_bytes(stream, &self.expected)
    }
}

/// Text encoding for text fields. A field without a declared or
/// structure-inherited encoding is a definition error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Ascii,
    Latin1,
}

impl Encoding {
    pub fn decode(&self, name: &str, bytes: &[u8]) -> Result<String, CodecError> {
        match self {
            Encoding::Utf8 => String::from_utf8(bytes.to_vec())
                .map_err(|e| CodecError::Encoding(format!("field {}: invalid utf-8: {}", name, e))),
            Encoding::Ascii => {
                if bytes.iter().any(|&b| b >= 0x80) {
                    return Err(CodecError::Encoding(format!("field {}: invalid ascii", name)));
                }
                Ok(bytes.iter().map(|&b| b as char).collect())
            }
            Encoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
        }
    }

    pub fn encode(&self, name: &str, text: &str) -> Result<Vec<u8>, CodecError> {
        match self {
            Encoding::Utf8 => Ok(text.as_bytes().to_vec()),
            Encoding::Ascii => {
                if !text.is_ascii() {
                    return Err(CodecError::Encoding(format!(
                        "field {}: text is not representable in ascii",
                        name
                    )));
                }
                Ok(text.as_bytes().to_vec())
            }
            Encoding::Latin1 => text
                .chars()
                .map(|c| {
                    u8::try_from(c as u32).map_err(|_| {
                        CodecError::Encoding(format!(
                            "field {}: character {:?} is not representable in latin-1",
                            name, c
                        ))
                    })
                })
                .collect(),
        }
    }

    /// Encoded byte length, for dependent-length overrides.
    pub fn encoded_len(&self, text: &str) -> u64 {
        match self {
            Encoding::Utf8 => text.len() as u64,
            Encoding::Ascii | Encoding::Latin1 => text.chars().count() as u64,
        }
    }
}

/// A text field: a byte run decoded through an encoding.
#[derive(Debug, Clone)]
pub struct TextRun {
    pub run: ByteRun,
    pub encoding: Option<Encoding>,
}

impl TextRun {
    pub(crate) fn validate(&self, name: &str) -> Result<(), DefinitionError> {
        self.run.validate(name)?;
        if self.encoding.is_none() {
            return Err(DefinitionError::MissingEncoding(name.to_string()));
        }
        Ok(())
    }

    pub(crate) fn encoding_of(&self, name: &str) -> Result<Encoding, CodecError> {
        self.encoding.ok_or_else(|| {
            CodecError::Encoding(format!(
                "field {}: no text encoding declared and none inherited",
                name
            ))
        })
    }
}
