//! Byte sources.
//!
//! A [`ByteSource`] hands the decoders a flat, seekable sequence of bytes
//! regardless of where those bytes actually live. Three backings are
//! provided:
//!
//! - [`FixedSource`]: a single in-memory buffer.
//! - [`ChunkedSource`]: an ordered list of buffers that behave as one
//!   contiguous stream (for targets that split data across several
//!   read-only arrays).
//! - [`StreamedSource`]: a file or any `Read + Seek` reader, accessed
//!   through a small read-ahead window.
//!
//! Decoding the same bytes through any of them yields identical events.
//!
//! ```
//! use chipdrive::source::{ByteSource, ChunkedSource, FixedSource};
//!
//! let data = [0x10, 0x20, 0x30, 0x40];
//! let mut fixed = FixedSource::new(&data);
//! let mut chunked = ChunkedSource::new(vec![&data[..1], &data[1..3], &data[3..]]);
//!
//! chunked.seek(2).unwrap();
//! fixed.seek(2).unwrap();
//! assert_eq!(chunked.read_byte().unwrap(), fixed.read_byte().unwrap());
//! assert_eq!(chunked.read_u16_le("pair").unwrap_err().to_string(),
//!            "truncated stream at offset 0x4 while reading pair");
//! ```
use crate::error::{Error, Result};

mod chunked;
mod fixed;
mod streamed;

pub use chunked::ChunkedSource;
pub use fixed::FixedSource;
pub use streamed::StreamedSource;

/// Sequential, seekable access to a command stream.
///
/// `read_byte` returns `Ok(None)` at end of data. Storage failures are
/// reported as [`Error::SourceUnavailable`].
pub trait ByteSource {
    /// Read the next byte, or `None` when the end of data is reached.
    fn read_byte(&mut self) -> Result<Option<u8>>;

    /// Move to an absolute offset. Seeking to `len()` is allowed and leaves
    /// the source at end of data.
    fn seek(&mut self, pos: usize) -> Result<()>;

    /// Current absolute offset.
    fn position(&self) -> usize;

    /// Total number of bytes.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remaining(&self) -> usize {
        self.len().saturating_sub(self.position())
    }

    /// Read a byte that must exist.
    fn expect_byte(&mut self, context: &'static str) -> Result<u8> {
        let offset = self.position();
        self.read_byte()?
            .ok_or(Error::TruncatedStream { offset, context })
    }

    fn read_u16_le(&mut self, context: &'static str) -> Result<u16> {
        let lo = self.expect_byte(context)?;
        let hi = self.expect_byte(context)?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    fn read_u32_le(&mut self, context: &'static str) -> Result<u32> {
        let mut tmp = [0u8; 4];
        self.read_exact(&mut tmp, context)?;
        Ok(u32::from_le_bytes(tmp))
    }

    /// Fill `buf` completely or fail with [`Error::TruncatedStream`].
    fn read_exact(&mut self, buf: &mut [u8], context: &'static str) -> Result<()> {
        for slot in buf.iter_mut() {
            *slot = self.expect_byte(context)?;
        }
        Ok(())
    }

    /// Look at the next byte without consuming it.
    fn peek_byte(&mut self) -> Result<Option<u8>> {
        let pos = self.position();
        let byte = self.read_byte()?;
        self.seek(pos)?;
        Ok(byte)
    }

    /// Advance `count` bytes; all of them must exist.
    fn skip(&mut self, count: usize, context: &'static str) -> Result<()> {
        let offset = self.position();
        match offset.checked_add(count) {
            Some(target) if target <= self.len() => self.seek(target),
            _ => Err(Error::TruncatedStream {
                offset: self.len(),
                context,
            }),
        }
    }
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read_byte(&mut self) -> Result<Option<u8>> {
        (**self).read_byte()
    }

    fn seek(&mut self, pos: usize) -> Result<()> {
        (**self).seek(pos)
    }

    fn position(&self) -> usize {
        (**self).position()
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}

impl<S: ByteSource + ?Sized> ByteSource for &mut S {
    fn read_byte(&mut self) -> Result<Option<u8>> {
        (**self).read_byte()
    }

    fn seek(&mut self, pos: usize) -> Result<()> {
        (**self).seek(pos)
    }

    fn position(&self) -> usize {
        (**self).position()
    }

    fn len(&self) -> usize {
        (**self).len()
    }
}

pub(crate) fn seek_past_end(pos: usize, len: usize) -> Error {
    Error::InvalidReference(format!(
        "seek to offset 0x{:X} past end of source (length 0x{:X})",
        pos, len
    ))
}
