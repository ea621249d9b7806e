//! # bytestruct — declarative binary structure codec
//!
//! Describe the layout of a byte-oriented wire or file format as an
//! ordered sequence of typed fields; the engine parses a byte stream into
//! values and re-serializes them with round-trip fidelity.
//!
//! ## Field kinds
//!
//! - Byte runs: fixed length, terminator-delimited, or padded
//! - Bit-packed integers sharing a cross-field bit buffer
//! - Fixed-width integers (1 to 8 bytes, big or little endian) and
//!   base-128 variable-length quantities
//! - Text runs with a declared encoding
//! - Nested structures, discriminated switches, arrays, conditionals
//! - Fixed markers (magic values)
//!
//! Lengths, counts, and discriminants are literals, references to other
//! fields, or computations over the parsing context; defaults and
//! write-time overrides follow the same shape.
//!
//! ## Example
//!
//! ```
//! use bytestruct::{ByteOrder, Field, StructType, Value};
//!
//! let chunk = StructType::builder("Chunk")
//!     .byte_order(ByteOrder::Big)
//!     .field(Field::uint("length", 4))
//!     .field(Field::bytes("tag").length(4))
//!     .field(Field::bytes("data").length_ref("length"))
//!     .build()?;
//!
//! let record = chunk.decode(&[0, 0, 0, 2, b'I', b'D', b'A', b'T', 1, 2])?;
//! assert_eq!(record.get("data"), Some(&Value::Bytes(vec![1, 2])));
//!
//! // "length" has no explicit value here; it resolves to the data length.
//! let written = chunk.instantiate(
//!     [("tag", Value::Bytes(b"IEND".to_vec())), ("data", Value::Bytes(vec![7]))]
//!         .into_iter()
//!         .collect(),
//! )?;
//! assert_eq!(written.to_bytes()?, vec![0, 0, 0, 1, b'I', b'E', b'N', b'D', 7]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod bits;
pub mod bytes;
pub mod context;
pub mod error;
pub mod field;
pub mod nested;
pub mod numeric;
pub mod prop;
pub mod stream;
pub mod structure;
pub mod value;

pub use bits::BitPacked;
pub use bytes::{ByteRun, Encoding, Marker, TerminatorHandler, TextRun};
pub use context::{Context, FieldResult};
pub use error::{CodecError, DefinitionError};
pub use field::{Field, FieldKind};
pub use nested::{Discriminated, Guarded, Nested, Repeat};
pub use numeric::{ByteOrder, FixedInt};
pub use prop::{FieldDefault, OverrideSpec, Prop};
pub use stream::{ReadSeek, Substream, WriteSeek};
pub use structure::{FieldLayout, FinalizeFn, Record, StructType, StructTypeBuilder};
pub use value::{Value, ValueMap};
