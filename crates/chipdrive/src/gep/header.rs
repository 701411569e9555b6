//! GEP fixed header.
use bitflags::bitflags;

use crate::binutil::{read_u8_at, read_u16_le_at, read_u32_le_at, write_u16_le, write_u32_le};
use crate::error::{Error, Result};
use crate::gep::{GEP_MAGIC, HEADER_SIZE, NO_LOOP};

bitflags! {
    /// Feature flags stored at header offset 4.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct GepFlags: u16 {
        const PSG = 0x01;
        const YM2612 = 0x02;
        const DAC = 0x04;
        const MULTI_CHUNK = 0x08;
        const DPCM = 0x10;
        const PATTERNS = 0x40;
    }
}

/// Parsed GEP header.
///
/// | Offset | Size | Field |
/// |---|---|---|
/// | 0 | 4 | magic `"GEP"` and version `0x01` |
/// | 4 | 2 | [`GepFlags`] |
/// | 6 | 1 | dictionary entry count (0 means 256) |
/// | 7 | 1 | PCM block count |
/// | 8 | 4 | total duration in samples |
/// | 12 | 2 | loop chunk index (`0xFFFF` = no loop) |
/// | 14 | 2 | loop offset inside that chunk |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GepHeader {
    pub flags: GepFlags,
    pub dictionary_len: usize,
    pub pcm_blocks: u8,
    pub total_samples: u32,
    /// `(chunk, offset)` of the loop point.
    pub loop_point: Option<(u16, u16)>,
}

impl GepHeader {
    /// Parse and validate a header image.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::MalformedHeader(format!(
                "GEP header needs {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }
        if bytes[..4] != GEP_MAGIC {
            return Err(Error::MalformedHeader(format!(
                "bad GEP magic {:02X?}",
                &bytes[..4]
            )));
        }
        let raw_flags = read_u16_le_at(bytes, 4, "GEP flags")?;
        let flags = GepFlags::from_bits(raw_flags).ok_or_else(|| {
            Error::MalformedHeader(format!("unsupported GEP flags 0x{:04X}", raw_flags))
        })?;
        let dictionary_len = match read_u8_at(bytes, 6, "dictionary count")? {
            0 => 256,
            n => n as usize,
        };
        let pcm_blocks = read_u8_at(bytes, 7, "PCM block count")?;
        let total_samples = read_u32_le_at(bytes, 8, "total samples")?;
        let loop_chunk = read_u16_le_at(bytes, 12, "loop chunk")?;
        let loop_offset = read_u16_le_at(bytes, 14, "loop offset")?;

        if !flags.contains(GepFlags::DAC) {
            if flags.contains(GepFlags::DPCM) {
                return Err(Error::MalformedHeader(
                    "DPCM flag set without DAC flag".to_string(),
                ));
            }
            if pcm_blocks > 0 {
                return Err(Error::MalformedHeader(format!(
                    "{} PCM blocks declared without DAC flag",
                    pcm_blocks
                )));
            }
        }

        Ok(Self {
            flags,
            dictionary_len,
            pcm_blocks,
            total_samples,
            loop_point: (loop_chunk != NO_LOOP).then_some((loop_chunk, loop_offset)),
        })
    }

    /// Serialize into the 16-byte header image.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE);
        out.extend_from_slice(&GEP_MAGIC);
        write_u16_le(&mut out, self.flags.bits());
        out.push((self.dictionary_len % 256) as u8);
        out.push(self.pcm_blocks);
        write_u32_le(&mut out, self.total_samples);
        let (chunk, offset) = self.loop_point.unwrap_or((NO_LOOP, 0));
        write_u16_le(&mut out, chunk);
        write_u16_le(&mut out, offset);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(flags: u16, dict: u8, pcm: u8) -> Vec<u8> {
        let mut b = b"GEP\x01".to_vec();
        b.extend_from_slice(&flags.to_le_bytes());
        b.extend_from_slice(&[dict, pcm]);
        b.extend_from_slice(&735u32.to_le_bytes());
        b.extend_from_slice(&[0xFF, 0xFF, 0, 0]);
        b
    }

    #[test]
    fn parses_fields() {
        let h = GepHeader::parse(&header(0x03, 0, 0)).unwrap();
        assert_eq!(h.flags, GepFlags::PSG | GepFlags::YM2612);
        assert_eq!(h.dictionary_len, 256);
        assert_eq!(h.total_samples, 735);
        assert_eq!(h.loop_point, None);
        assert_eq!(GepHeader::parse(&h.to_bytes()).unwrap(), h);
    }

    #[test]
    fn rejects_inconsistent_flags() {
        assert!(matches!(
            GepHeader::parse(&header(0x12, 1, 0)),
            Err(Error::MalformedHeader(_))
        ));
        assert!(matches!(
            GepHeader::parse(&header(0x02, 1, 1)),
            Err(Error::MalformedHeader(_))
        ));
        assert!(matches!(
            GepHeader::parse(&header(0x22, 1, 0)),
            Err(Error::MalformedHeader(_))
        ));
        assert!(matches!(
            GepHeader::parse(b"GEP\x02\0\0\0\0\0\0\0\0\0\0\0\0"),
            Err(Error::MalformedHeader(_))
        ));
    }
}
