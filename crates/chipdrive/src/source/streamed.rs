use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::{Error, Result};
use crate::source::{ByteSource, seek_past_end};

/// Default read-ahead window in bytes.
pub const DEFAULT_WINDOW: usize = 512;

/// A byte source that reads through a small window over a `Read + Seek`.
///
/// The stream length is captured when the source is opened. If the
/// underlying file later delivers fewer bytes than that length promised,
/// reads fail with [`Error::SourceUnavailable`] instead of reporting a
/// clean end of data.
#[derive(Debug)]
pub struct StreamedSource<R> {
    reader: R,
    len: usize,
    pos: usize,
    window: Vec<u8>,
    window_start: usize,
    window_size: usize,
}

impl StreamedSource<File> {
    /// Open a file with the default window size.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_window(File::open(path)?, DEFAULT_WINDOW)
    }
}

impl<R: Read + Seek> StreamedSource<R> {
    pub fn new(reader: R) -> Result<Self> {
        Self::with_window(reader, DEFAULT_WINDOW)
    }

    pub fn with_window(mut reader: R, window_size: usize) -> Result<Self> {
        let len = reader.seek(SeekFrom::End(0))?;
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "stream too large"))?;
        Ok(Self {
            reader,
            len,
            pos: 0,
            window: Vec::with_capacity(window_size.max(1)),
            window_start: 0,
            window_size: window_size.max(1),
        })
    }

    pub fn into_inner(self) -> R {
        self.reader
    }

    fn refill(&mut self) -> Result<()> {
        let want = self.window_size.min(self.len - self.pos);
        self.window.clear();
        self.window.resize(want, 0);
        self.reader.seek(SeekFrom::Start(self.pos as u64))?;
        let mut filled = 0;
        while filled < want {
            match self.reader.read(&mut self.window[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.window.clear();
                    return Err(e.into());
                }
            }
        }
        self.window.truncate(filled);
        self.window_start = self.pos;
        if filled == 0 {
            return Err(Error::SourceUnavailable(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "stream ended at 0x{:X}, expected 0x{:X} bytes",
                    self.pos, self.len
                ),
            )));
        }
        Ok(())
    }
}

impl<R: Read + Seek> ByteSource for StreamedSource<R> {
    fn read_byte(&mut self) -> Result<Option<u8>> {
        if self.pos >= self.len {
            return Ok(None);
        }
        let in_window =
            self.pos >= self.window_start && self.pos < self.window_start + self.window.len();
        if !in_window {
            self.refill()?;
        }
        let byte = self.window[self.pos - self.window_start];
        self.pos += 1;
        Ok(Some(byte))
    }

    fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.len {
            return Err(seek_past_end(pos, self.len));
        }
        self.pos = pos;
        Ok(())
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn window_refills_transparently() {
        let data: Vec<u8> = (0..=255).collect();
        let mut src = StreamedSource::with_window(Cursor::new(data.clone()), 7).unwrap();
        let mut out = Vec::new();
        while let Some(byte) = src.read_byte().unwrap() {
            out.push(byte);
        }
        assert_eq!(out, data);

        src.seek(100).unwrap();
        assert_eq!(src.read_byte().unwrap(), Some(100));
        src.seek(3).unwrap();
        assert_eq!(src.read_byte().unwrap(), Some(3));
    }
}
