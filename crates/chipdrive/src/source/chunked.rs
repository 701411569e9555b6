use crate::error::Result;
use crate::source::{ByteSource, seek_past_end};

/// A byte source over an ordered list of buffers.
///
/// Chunk boundaries are invisible to the reader: bytes are delivered as if
/// the chunks were concatenated. Empty chunks are allowed and skipped.
#[derive(Debug, Clone)]
pub struct ChunkedSource<'a> {
    chunks: Vec<&'a [u8]>,
    /// Global offset of the first byte of each chunk.
    starts: Vec<usize>,
    len: usize,
    chunk: usize,
    local: usize,
}

impl<'a> ChunkedSource<'a> {
    pub fn new(chunks: Vec<&'a [u8]>) -> Self {
        let mut starts = Vec::with_capacity(chunks.len());
        let mut len = 0usize;
        for chunk in &chunks {
            starts.push(len);
            len += chunk.len();
        }
        Self {
            chunks,
            starts,
            len,
            chunk: 0,
            local: 0,
        }
    }

    /// Split `data` into chunks of at most `chunk_size` bytes.
    pub fn split(data: &'a [u8], chunk_size: usize) -> Self {
        Self::new(data.chunks(chunk_size.max(1)).collect())
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

impl ByteSource for ChunkedSource<'_> {
    fn read_byte(&mut self) -> Result<Option<u8>> {
        while let Some(chunk) = self.chunks.get(self.chunk) {
            if let Some(&byte) = chunk.get(self.local) {
                self.local += 1;
                return Ok(Some(byte));
            }
            self.chunk += 1;
            self.local = 0;
        }
        Ok(None)
    }

    fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.len {
            return Err(seek_past_end(pos, self.len));
        }
        // Last chunk starting at or before `pos`.
        let index = self.starts.partition_point(|&start| start <= pos);
        self.chunk = index.saturating_sub(1);
        self.local = pos - self.starts.get(self.chunk).copied().unwrap_or(0);
        Ok(())
    }

    fn position(&self) -> usize {
        match self.starts.get(self.chunk) {
            Some(start) => start + self.local,
            None => self.len,
        }
    }

    fn len(&self) -> usize {
        self.len
    }
}
