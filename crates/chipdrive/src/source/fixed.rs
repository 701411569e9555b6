use crate::error::Result;
use crate::source::{ByteSource, seek_past_end};

/// A byte source over one contiguous buffer.
#[derive(Debug, Clone)]
pub struct FixedSource<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FixedSource<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl ByteSource for FixedSource<'_> {
    fn read_byte(&mut self) -> Result<Option<u8>> {
        let byte = self.data.get(self.pos).copied();
        if byte.is_some() {
            self.pos += 1;
        }
        Ok(byte)
    }

    fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(seek_past_end(pos, self.data.len()));
        }
        self.pos = pos;
        Ok(())
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn reads_until_end() {
        let data = [1u8, 2, 3];
        let mut src = FixedSource::new(&data);
        assert_eq!(src.read_byte().unwrap(), Some(1));
        assert_eq!(src.read_u16_le("pair").unwrap(), 0x0302);
        assert_eq!(src.read_byte().unwrap(), None);
        assert_eq!(src.position(), 3);
    }

    #[test]
    fn seek_past_end_is_rejected() {
        let data = [0u8; 4];
        let mut src = FixedSource::new(&data);
        assert!(src.seek(4).is_ok());
        assert!(matches!(src.seek(5), Err(Error::InvalidReference(_))));
    }
}
