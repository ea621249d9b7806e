//! Error taxonomy: eager definition-time errors and per-call codec errors.

use thiserror::Error;

/// Invalid field or structure configuration, detected when the structure
/// type is built, before any stream is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("field {0}: a length or a terminator is required")]
    MissingLengthOrTerminator(String),
    #[error("field {0}: padding requires a length")]
    PaddingWithoutLength(String),
    #[error("field {0}: terminator and padding cannot be combined")]
    TerminatorWithPadding(String),
    #[error("field {0}: terminator handling 'until' cannot be combined with a length")]
    UntilWithLength(String),
    #[error("field {0}: no byte order declared and none inherited from the structure")]
    MissingByteOrder(String),
    #[error("field {0}: no text encoding declared and none inherited from the structure")]
    MissingEncoding(String),
    #[error("field {0}: integer width must be 1 to 8 bytes, got {1}")]
    BadIntegerWidth(String, i64),
    #[error("field {0}: bit width must be 1 to 64, got {1}")]
    BadBitWidth(String, i64),
    #[error("field {0}: an array requires exactly one of count or length")]
    BadArrayBounds(String),
    #[error("field {0}: option '{1}' does not apply to this field kind")]
    InvalidOption(String, &'static str),
    #[error("field {0}: skip and offset are mutually exclusive")]
    OffsetConflict(String),
    #[error("structure {0}: duplicate field name '{1}'")]
    DuplicateField(String, String),
    #[error("field {0}: length reference '{1}' does not name a field of the structure")]
    BadLengthReference(String, String),
}

/// A failure during a single read or write call. The first unhandled error
/// aborts the call; no partial structure is returned.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("stream exhausted: {0}")]
    StreamExhausted(String),
    #[error("misaligned field: {0}")]
    MisalignedField(String),
    #[error("wrong magic: {0}")]
    WrongMagic(String),
    #[error("write: {0}")]
    Write(String),
    #[error("dependent field '{0}' is not resolved yet")]
    UnknownDependentField(String),
    #[error("unknown field: {0}")]
    UnknownField(String),
    #[error("size of {0} is not statically known")]
    SizeUnknown(String),
    #[error("overflow: {0}")]
    Overflow(String),
    #[error("encoding: {0}")]
    Encoding(String),
    #[error("parse: {0}")]
    Parse(String),
}
