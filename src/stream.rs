//! Stream bounds and the bounded substream view.
//!
//! The codec works against `std::io` streams. Internally everything runs
//! over trait objects so that nested parsing can wrap a stream in a
//! [`Substream`] without recursing in the type system.

use std::io::{self, Read, Seek, SeekFrom, Write};

/// Readable, seekable byte stream. Implemented for every `Read + Seek`.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek + ?Sized> ReadSeek for T {}

/// Writable, seekable byte stream. Implemented for every `Write + Seek`.
pub trait WriteSeek: Write + Seek {}

impl<T: Write + Seek + ?Sized> WriteSeek for T {}

/// A bounded view over an outer stream: reads are capped at the window
/// end and seek positions are window-relative, clamped to `[start, stop)`.
/// The view operates directly on the outer stream; when it is dropped the
/// outer position is wherever the last operation left it.
pub struct Substream<'a> {
    inner: &'a mut dyn ReadSeek,
    start: u64,
    stop: Option<u64>,
}

impl<'a> Substream<'a> {
    /// An unbounded window starting at the current position.
    pub fn new(inner: &'a mut dyn ReadSeek) -> io::Result<Self> {
        let start = inner.stream_position()?;
        Ok(Substream { inner, start, stop: None })
    }

    /// A window from the current position up to the absolute offset
    /// `stop` in the outer stream.
    pub fn bounded(inner: &'a mut dyn ReadSeek, stop: u64) -> io::Result<Self> {
        let start = inner.stream_position()?;
        Ok(Substream { inner, start, stop: Some(stop.max(start)) })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    fn remaining(&mut self) -> io::Result<u64> {
        match self.stop {
            Some(stop) => {
                let pos = self.inner.stream_position()?;
                Ok(stop.saturating_sub(pos))
            }
            None => Ok(u64::MAX),
        }
    }
}

impl Read for Substream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let cap = self.remaining()?.min(buf.len() as u64) as usize;
        if cap == 0 {
            return Ok(0);
        }
        self.inner.read(&mut buf[..cap])
    }
}

impl Seek for Substream<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => self.start as i128 + offset as i128,
            SeekFrom::Current(delta) => self.inner.stream_position()? as i128 + delta as i128,
            SeekFrom::End(delta) => match self.stop {
                Some(stop) => stop as i128 + delta as i128,
                None => {
                    let end = self.inner.seek(SeekFrom::End(0))?;
                    end as i128 + delta as i128
                }
            },
        };
        // Clamp to the window rather than erroring, like a file clamps at 0.
        let mut target = target.max(self.start as i128) as u64;
        if let Some(stop) = self.stop {
            target = target.min(stop);
        }
        let absolute = self.inner.seek(SeekFrom::Start(target))?;
        Ok(absolute - self.start)
    }
}
