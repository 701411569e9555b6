//! VGM command stream decoder.
use log::{debug, info, warn};

use crate::bank::{BankConfig, BankCursor, PcmEncoding, SampleBank};
use crate::chip::ChipWrite;
use crate::decoder::CommandDecoder;
use crate::error::{Error, Result};
use crate::event::{ChipFlags, Event, Format, StreamInfo};
use crate::source::ByteSource;
use crate::timing::FRAME_SAMPLES;
use crate::vgm::header::{MIN_HEADER_SIZE, VgmHeader};

/// Samples per PAL frame (`0x63`).
const PAL_FRAME_SAMPLES: u32 = 882;

/// Data block type holding YM2612 PCM.
const DATA_TYPE_YM2612_PCM: u8 = 0x00;

/// Operand bytes of commands for chips this engine does not drive.
fn other_chip_operands(op: u8) -> Option<usize> {
    match op {
        0x30..=0x3F | 0x4F => Some(1),
        0x40..=0x4E | 0x51 | 0x54..=0x5F | 0xA0..=0xBF => Some(2),
        0xC0..=0xDF => Some(3),
        0xE1..=0xFF => Some(4),
        _ => None,
    }
}

/// Operand bytes of the DAC stream control commands `0x90..=0x95`.
fn stream_control_operands(op: u8) -> usize {
    match op {
        0x92 => 5,
        0x93 => 10,
        0x94 => 1,
        _ => 4,
    }
}

/// Decoder for VGM streams.
///
/// YM2612 PCM data blocks (`0x67`, type `0x00`) found at the start of the
/// command stream are loaded into the sample bank while the decoder is
/// opened; blocks appearing later are loaded when reached. A block is only
/// loaded once, so looping over it does not grow the bank.
#[derive(Debug)]
pub struct VgmDecoder<S> {
    source: S,
    header: VgmHeader,
    info: StreamInfo,
    bank: SampleBank,
    loaded_blocks: Vec<usize>,
    loop_at: Option<usize>,
    loop_cursor: Option<BankCursor>,
    marker_emitted: bool,
    pending: Option<Event>,
    warned_streams: bool,
    finished: bool,
}

impl<S: ByteSource> VgmDecoder<S> {
    pub fn open(mut source: S, bank: BankConfig) -> Result<Self> {
        source.seek(0)?;
        let mut raw = [0u8; MIN_HEADER_SIZE];
        source
            .read_exact(&mut raw, "VGM header")
            .map_err(|e| match e {
                Error::TruncatedStream { .. } => {
                    Error::MalformedHeader("VGM header truncated".to_string())
                }
                other => other,
            })?;
        let header = VgmHeader::parse(&raw)?;
        if header.data_offset > source.len() {
            return Err(Error::MalformedHeader(format!(
                "data offset 0x{:X} lies past end of file",
                header.data_offset
            )));
        }
        if let Some(at) = header.loop_offset {
            if at < header.data_offset || at >= source.len() {
                return Err(Error::MalformedHeader(format!(
                    "loop offset 0x{:X} outside the command stream",
                    at
                )));
            }
        }
        source.seek(header.data_offset)?;

        let mut chips = ChipFlags::empty();
        chips.set(ChipFlags::YM2612, header.ym2612_clock != 0);
        chips.set(ChipFlags::SN76489, header.sn76489_clock != 0);
        let info = StreamInfo {
            format: Format::Vgm,
            chips,
            total_samples: header.total_samples,
            has_loop: header.loop_offset.is_some(),
            pcm_samples: 0,
        };

        let mut decoder = Self {
            source,
            header,
            info,
            bank: SampleBank::new(bank),
            loaded_blocks: Vec::new(),
            loop_at: header.loop_offset,
            loop_cursor: None,
            marker_emitted: false,
            pending: None,
            warned_streams: false,
            finished: false,
        };
        while decoder.source.peek_byte()? == Some(0x67) {
            let pos = decoder.source.position();
            decoder.source.skip(1, "data block")?;
            decoder.data_block(pos)?;
        }
        let first_command = decoder.source.position();
        if let Some(at) = decoder.loop_at {
            if at < first_command {
                decoder.loop_at = Some(first_command);
            }
        }
        debug!(
            "VGM {:X}.{:02X}: commands at 0x{:X}, loop {:?}, {} DAC samples",
            header.version >> 8,
            header.version & 0xFF,
            first_command,
            decoder.loop_at,
            decoder.bank.len()
        );
        Ok(decoder)
    }

    pub fn header(&self) -> &VgmHeader {
        &self.header
    }

    pub fn next_event(&mut self) -> Result<Event> {
        loop {
            if let Some(event) = self.pending.take() {
                return Ok(event);
            }
            if self.finished {
                return Ok(Event::End);
            }
            if let Some(event) = self.decode_one()? {
                return Ok(event);
            }
        }
    }

    fn data_block(&mut self, pos: usize) -> Result<()> {
        let marker = self.source.expect_byte("data block")?;
        if marker != 0x66 {
            return Err(Error::InvalidReference(format!(
                "data block at 0x{:X} lacks its 0x66 marker (found 0x{:02X})",
                pos, marker
            )));
        }
        let kind = self.source.expect_byte("data block")?;
        let size = self.source.read_u32_le("data block")? as usize;
        if kind != DATA_TYPE_YM2612_PCM || self.loaded_blocks.contains(&pos) {
            return self.source.skip(size, "data block");
        }
        self.loaded_blocks.push(pos);
        self.bank
            .load_segment(&mut self.source, size, PcmEncoding::Raw)?;
        info!(
            "loaded {} byte PCM block at 0x{:X} ({} resident)",
            size,
            pos,
            self.bank.resident_len()
        );
        self.info.pcm_samples = self.bank.len();
        self.info.chips.set(ChipFlags::DAC, self.bank.is_available());
        Ok(())
    }

    fn dac_sample(&mut self, after: u32) -> Result<Option<Event>> {
        if !self.bank.is_available() {
            return Ok(wait(after));
        }
        let sample = self.bank.read(&mut self.source)?;
        self.pending = wait(after);
        Ok(Some(Event::DacSample(sample)))
    }

    fn decode_one(&mut self) -> Result<Option<Event>> {
        let pos = self.source.position();
        if self.loop_at == Some(pos) && !self.marker_emitted {
            self.marker_emitted = true;
            self.loop_cursor = Some(self.bank.cursor());
            return Ok(Some(Event::LoopMarker));
        }
        let Some(op) = self.source.read_byte()? else {
            debug!("VGM stream ended without end marker at 0x{:X}", pos);
            self.finished = true;
            return Ok(Some(Event::End));
        };
        self.marker_emitted = false;

        let event = match op {
            0x50 => Some(Event::Write(ChipWrite::psg(
                self.source.expect_byte("PSG write")?,
            ))),
            0x52 | 0x53 => {
                let register = self.source.expect_byte("YM2612 write")?;
                let value = self.source.expect_byte("YM2612 write")?;
                Some(Event::Write(ChipWrite::fm(op - 0x52, register, value)))
            }
            0x61 => wait(self.source.read_u16_le("wait")? as u32),
            0x62 => wait(FRAME_SAMPLES),
            0x63 => wait(PAL_FRAME_SAMPLES),
            0x66 => {
                self.finished = true;
                Some(Event::End)
            }
            0x67 => {
                self.data_block(pos)?;
                None
            }
            0x68 => {
                self.source.skip(11, "PCM RAM write")?;
                None
            }
            0x70..=0x7F => wait((op & 0x0F) as u32 + 1),
            0x80..=0x8F => self.dac_sample((op & 0x0F) as u32)?,
            0x90..=0x95 => {
                if !self.warned_streams {
                    warn!("DAC stream control commands are not supported and are skipped");
                    self.warned_streams = true;
                }
                self.source
                    .skip(stream_control_operands(op), "DAC stream control")?;
                None
            }
            0xE0 => {
                let offset = self.source.read_u32_le("PCM seek")? as usize;
                if self.bank.is_available() {
                    self.bank.seek(&mut self.source, offset)?;
                }
                None
            }
            _ => match other_chip_operands(op) {
                Some(len) => {
                    self.source.skip(len, "unsupported chip command")?;
                    None
                }
                None => {
                    return Err(Error::UnknownOpcode {
                        opcode: op,
                        offset: pos,
                    });
                }
            },
        };
        Ok(event)
    }
}

fn wait(samples: u32) -> Option<Event> {
    (samples > 0).then_some(Event::Wait(samples))
}

impl<S: ByteSource> CommandDecoder for VgmDecoder<S> {
    fn next_event(&mut self) -> Result<Event> {
        VgmDecoder::next_event(self)
    }

    fn seek_to_loop(&mut self) -> Result<bool> {
        let Some(at) = self.loop_at else {
            return Ok(false);
        };
        self.source.seek(at)?;
        self.pending = None;
        self.finished = false;
        self.marker_emitted = false;
        if let Some(cursor) = self.loop_cursor {
            self.bank.restore(cursor);
        }
        Ok(true)
    }

    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn stream_position(&self) -> usize {
        self.source.position()
    }

    fn bank(&self) -> &SampleBank {
        &self.bank
    }
}

impl<S: ByteSource> Iterator for VgmDecoder<S> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished && self.pending.is_none() {
            return None;
        }
        let result = VgmDecoder::next_event(self);
        if result.is_err() {
            self.finished = true;
            self.pending = None;
        }
        Some(result)
    }
}
