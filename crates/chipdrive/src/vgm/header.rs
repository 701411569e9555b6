//! VGM header fields used for playback.
use crate::binutil::read_u32_le_at;
use crate::error::{Error, Result};
use crate::vgm::VGM_MAGIC;

/// Bytes of header read before the command stream can be located.
pub const MIN_HEADER_SIZE: usize = 0x40;

const CLOCK_MASK: u32 = 0x3FFF_FFFF;

/// Playback-relevant subset of a VGM header. Offsets are absolute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VgmHeader {
    pub version: u32,
    pub sn76489_clock: u32,
    pub ym2612_clock: u32,
    pub total_samples: u32,
    pub loop_offset: Option<usize>,
    pub loop_samples: u32,
    pub data_offset: usize,
}

impl VgmHeader {
    /// Parse the first [`MIN_HEADER_SIZE`] bytes of a VGM file.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < MIN_HEADER_SIZE {
            return Err(Error::MalformedHeader(format!(
                "VGM header needs {} bytes, got {}",
                MIN_HEADER_SIZE,
                bytes.len()
            )));
        }
        if bytes[..4] != VGM_MAGIC {
            return Err(Error::MalformedHeader(format!(
                "bad VGM magic {:02X?}",
                &bytes[..4]
            )));
        }
        let version = read_u32_le_at(bytes, 0x08, "version")?;
        let sn76489_clock = read_u32_le_at(bytes, 0x0C, "SN76489 clock")? & CLOCK_MASK;
        let total_samples = read_u32_le_at(bytes, 0x18, "total samples")?;
        let loop_rel = read_u32_le_at(bytes, 0x1C, "loop offset")?;
        let loop_samples = read_u32_le_at(bytes, 0x20, "loop samples")?;
        // Before 1.10 the YM2413 field at 0x10 also clocked the YM2612.
        let ym2612_offset = if version >= 0x110 { 0x2C } else { 0x10 };
        let ym2612_clock = read_u32_le_at(bytes, ym2612_offset, "YM2612 clock")? & CLOCK_MASK;
        let data_offset = if version >= 0x150 {
            match read_u32_le_at(bytes, 0x34, "data offset")? {
                0 => MIN_HEADER_SIZE,
                rel => 0x34 + rel as usize,
            }
        } else {
            MIN_HEADER_SIZE
        };

        if sn76489_clock == 0 && ym2612_clock == 0 {
            return Err(Error::MalformedHeader(
                "VGM file uses neither YM2612 nor SN76489".to_string(),
            ));
        }

        Ok(Self {
            version,
            sn76489_clock,
            ym2612_clock,
            total_samples,
            loop_offset: (loop_rel != 0).then_some(0x1C + loop_rel as usize),
            loop_samples,
            data_offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(version: u32, sn: u32, ym: u32) -> Vec<u8> {
        let mut b = vec![0u8; MIN_HEADER_SIZE];
        b[..4].copy_from_slice(b"Vgm ");
        b[0x08..0x0C].copy_from_slice(&version.to_le_bytes());
        b[0x0C..0x10].copy_from_slice(&sn.to_le_bytes());
        b[0x2C..0x30].copy_from_slice(&ym.to_le_bytes());
        b
    }

    #[test]
    fn old_versions_ignore_late_fields() {
        let mut b = image(0x101, 3_579_545, 7_670_453);
        b[0x34..0x38].copy_from_slice(&0x80u32.to_le_bytes());
        let h = VgmHeader::parse(&b).unwrap();
        assert_eq!(h.ym2612_clock, 0);
        assert_eq!(h.data_offset, 0x40);
        assert_eq!(h.loop_offset, None);
    }

    #[test]
    fn old_versions_take_the_fm_clock_from_the_shared_field() {
        let mut b = image(0x101, 0, 0);
        b[0x10..0x14].copy_from_slice(&7_670_453u32.to_le_bytes());
        let h = VgmHeader::parse(&b).unwrap();
        assert_eq!(h.ym2612_clock, 7_670_453);
        assert_eq!(h.sn76489_clock, 0);

        // 1.10 moved the YM2612 clock to its own field
        let mut b = image(0x110, 3_579_545, 0);
        b[0x10..0x14].copy_from_slice(&3_579_545u32.to_le_bytes());
        assert_eq!(VgmHeader::parse(&b).unwrap().ym2612_clock, 0);
    }

    #[test]
    fn relative_offsets_become_absolute() {
        let mut b = image(0x150, 0, 7_670_453);
        b[0x1C..0x20].copy_from_slice(&0x24u32.to_le_bytes());
        b[0x34..0x38].copy_from_slice(&0x0Cu32.to_le_bytes());
        let h = VgmHeader::parse(&b).unwrap();
        assert_eq!(h.loop_offset, Some(0x40));
        assert_eq!(h.data_offset, 0x40);
    }

    #[test]
    fn header_without_supported_chip_is_rejected() {
        assert!(matches!(
            VgmHeader::parse(&image(0x150, 0, 0)),
            Err(Error::MalformedHeader(_))
        ));
    }
}
