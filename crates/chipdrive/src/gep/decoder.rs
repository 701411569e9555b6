//! GEP command stream decoder.
//!
//! The decoder pulls bytes from a [`ByteSource`] one opcode at a time and
//! never materializes more than a single opcode's worth of events. DAC
//! bursts (`DAC_BLOCK`, `DAC_RUN`) are expanded lazily as a micro-loop, one
//! sample and its wait per call.
use std::collections::VecDeque;

use log::debug;

use crate::bank::{BankConfig, BankCursor, PcmEncoding, SampleBank};
use crate::chip::{ChipWrite, key_on_off};
use crate::decoder::CommandDecoder;
use crate::error::{Error, Result};
use crate::event::{ChipFlags, Event, Format, StreamInfo};
use crate::gep::header::{GepFlags, GepHeader};
use crate::gep::{HEADER_SIZE, MAX_PATTERNS, opcode};
use crate::source::ByteSource;
use crate::timing::FRAME_SAMPLES;

#[derive(Debug, Clone, Copy)]
struct PatternFrame {
    end: usize,
    resume: usize,
}

#[derive(Debug, Clone, Copy)]
enum DacBurst {
    /// `remaining` samples, each followed by the same wait.
    Block { remaining: u8, wait: u8 },
    /// `count` samples with individual 4-bit waits packed high nibble first.
    Run {
        count: u8,
        index: u8,
        packed: [u8; 128],
    },
}

/// Decoder for GEP streams.
///
/// ```
/// use chipdrive::bank::BankConfig;
/// use chipdrive::chip::ChipWrite;
/// use chipdrive::gep::GepDecoder;
/// use chipdrive::source::FixedSource;
/// use chipdrive::Event;
///
/// let mut image = b"GEP\x01".to_vec();
/// image.extend_from_slice(&[0x02, 0x00, 0x02, 0x00]); // FM, 2 dictionary entries
/// image.extend_from_slice(&735u32.to_le_bytes());
/// image.extend_from_slice(&[0xFF, 0xFF, 0x00, 0x00]); // no loop
/// image.extend_from_slice(&[0x02, 0x28, 0xF1, 0x22, 0x08]); // dictionary
/// image.extend_from_slice(&[0x40, 0x90, 0xFF]);
///
/// let mut dec = GepDecoder::open(FixedSource::new(&image), BankConfig::default()).unwrap();
/// assert_eq!(dec.next_event().unwrap(), Event::Write(ChipWrite::fm(0, 0x28, 0xF1)));
/// assert_eq!(dec.next_event().unwrap(), Event::Wait(735));
/// assert_eq!(dec.next_event().unwrap(), Event::End);
/// ```
#[derive(Debug)]
pub struct GepDecoder<S> {
    source: S,
    header: GepHeader,
    info: StreamInfo,
    dictionary: Vec<(u8, u8)>,
    /// Absolute `(start, length)` of each pattern span.
    patterns: Vec<(usize, usize)>,
    bank: SampleBank,
    /// Offset of each command stream chunk seen so far; entry 0 is the
    /// start of the command stream.
    chunk_starts: Vec<usize>,
    loop_at: Option<usize>,
    loop_cursor: Option<BankCursor>,
    marker_emitted: bool,
    frame: Option<PatternFrame>,
    burst: Option<DacBurst>,
    pending: VecDeque<Event>,
    finished: bool,
}

impl<S: ByteSource> GepDecoder<S> {
    /// Parse the header blocks and position the decoder at the first command.
    pub fn open(mut source: S, bank: BankConfig) -> Result<Self> {
        source.seek(0)?;
        let mut raw = [0u8; HEADER_SIZE];
        source
            .read_exact(&mut raw, "GEP header")
            .map_err(|e| match e {
                Error::TruncatedStream { .. } => {
                    Error::MalformedHeader("GEP header truncated".to_string())
                }
                other => other,
            })?;
        let header = GepHeader::parse(&raw)?;

        let declared = match source.expect_byte("dictionary count")? {
            0 => 256,
            n => n as usize,
        };
        if declared != header.dictionary_len {
            return Err(Error::MalformedHeader(format!(
                "dictionary block holds {} entries, header declares {}",
                declared, header.dictionary_len
            )));
        }
        let mut dictionary = Vec::with_capacity(declared);
        for _ in 0..declared {
            let register = source.expect_byte("dictionary entry")?;
            let value = source.expect_byte("dictionary entry")?;
            dictionary.push((register, value));
        }

        let mut spans = Vec::new();
        if header.flags.contains(GepFlags::PATTERNS) {
            let count = source.expect_byte("pattern count")? as usize;
            if count > MAX_PATTERNS {
                return Err(Error::MalformedHeader(format!(
                    "{} patterns declared, at most {} allowed",
                    count, MAX_PATTERNS
                )));
            }
            for _ in 0..count {
                let offset = source.read_u16_le("pattern table")? as usize;
                let len = source.read_u16_le("pattern table")? as usize;
                spans.push((offset, len));
            }
        }

        let mut bank = SampleBank::new(bank);
        let encoding = if header.flags.contains(GepFlags::DPCM) {
            PcmEncoding::Dpcm
        } else {
            PcmEncoding::Raw
        };
        for _ in 0..header.pcm_blocks {
            let size = source.read_u16_le("PCM block size")? as usize;
            bank.load_segment(&mut source, size, encoding)?;
        }

        let stream_start = source.position();
        let mut patterns = Vec::with_capacity(spans.len());
        for (id, (offset, len)) in spans.into_iter().enumerate() {
            let start = stream_start + offset;
            if start + len > source.len() {
                return Err(Error::InvalidReference(format!(
                    "pattern {} span 0x{:X}+{} runs past end of stream",
                    id, start, len
                )));
            }
            patterns.push((start, len));
        }

        let mut chips = ChipFlags::empty();
        chips.set(ChipFlags::YM2612, header.flags.contains(GepFlags::YM2612));
        chips.set(ChipFlags::SN76489, header.flags.contains(GepFlags::PSG));
        chips.set(ChipFlags::DAC, bank.is_available());

        let info = StreamInfo {
            format: Format::Gep,
            chips,
            total_samples: header.total_samples,
            has_loop: header.loop_point.is_some(),
            pcm_samples: bank.len(),
        };
        debug!(
            "GEP stream: flags {:?}, {} dictionary entries, {} patterns, {} DAC samples, commands at 0x{:X}",
            header.flags,
            dictionary.len(),
            patterns.len(),
            bank.len(),
            stream_start
        );

        let mut decoder = Self {
            source,
            header,
            info,
            dictionary,
            patterns,
            bank,
            chunk_starts: vec![stream_start],
            loop_at: None,
            loop_cursor: None,
            marker_emitted: false,
            frame: None,
            burst: None,
            pending: VecDeque::with_capacity(16),
            finished: false,
        };
        decoder.resolve_loop_point()?;
        Ok(decoder)
    }

    pub fn header(&self) -> &GepHeader {
        &self.header
    }

    pub fn dictionary(&self) -> &[(u8, u8)] {
        &self.dictionary
    }

    /// Absolute `(start, length)` of each pattern.
    pub fn patterns(&self) -> &[(usize, usize)] {
        &self.patterns
    }

    /// Decode the next event.
    pub fn next_event(&mut self) -> Result<Event> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(event);
            }
            if self.finished {
                return Ok(Event::End);
            }
            if self.burst.is_some() {
                self.burst_step()?;
                continue;
            }
            if let Some(event) = self.decode_one()? {
                return Ok(event);
            }
        }
    }

    fn resolve_loop_point(&mut self) -> Result<()> {
        let Some((chunk, offset)) = self.header.loop_point else {
            return Ok(());
        };
        if self.loop_at.is_some() {
            return Ok(());
        }
        if let Some(&start) = self.chunk_starts.get(chunk as usize) {
            let at = start + offset as usize;
            if at > self.source.len() {
                return Err(Error::InvalidReference(format!(
                    "loop point chunk {} offset {} lies past end of stream",
                    chunk, offset
                )));
            }
            debug!("loop point resolved to 0x{:X}", at);
            self.loop_at = Some(at);
        }
        Ok(())
    }

    fn dac_ready(&self) -> bool {
        self.bank.is_available()
    }

    fn burst_step(&mut self) -> Result<()> {
        let Some(burst) = self.burst.as_mut() else {
            return Ok(());
        };
        let (wait, done) = match burst {
            DacBurst::Block { remaining, wait } => {
                *remaining -= 1;
                (*wait, *remaining == 0)
            }
            DacBurst::Run {
                count,
                index,
                packed,
            } => {
                let i = *index as usize;
                *index += 1;
                let byte = packed[i / 2];
                let wait = if i % 2 == 0 { byte >> 4 } else { byte & 0x0F };
                (wait, *index == *count)
            }
        };
        if done {
            self.burst = None;
        }
        let sample = self.bank.read(&mut self.source)?;
        self.pending.push_back(Event::DacSample(sample));
        if wait > 0 {
            self.pending.push_back(Event::Wait(wait as u32));
        }
        Ok(())
    }

    fn decode_one(&mut self) -> Result<Option<Event>> {
        let pos = self.source.position();
        match self.frame {
            Some(frame) if pos == frame.end => {
                self.source.seek(frame.resume)?;
                self.frame = None;
                return Ok(None);
            }
            Some(_) => {}
            None => {
                if self.loop_at == Some(pos) && !self.marker_emitted {
                    self.marker_emitted = true;
                    self.loop_cursor = Some(self.bank.cursor());
                    return Ok(Some(Event::LoopMarker));
                }
            }
        }

        let Some(op) = self.source.read_byte()? else {
            if self.frame.is_some() {
                return Err(Error::InvalidReference(format!(
                    "pattern body runs past end of stream at 0x{:X}",
                    pos
                )));
            }
            debug!("GEP stream ended without end marker at 0x{:X}", pos);
            self.finished = true;
            return Ok(Some(Event::End));
        };
        self.marker_emitted = false;

        let event = self.dispatch(op, pos)?;
        if let Some(frame) = self.frame {
            if self.source.position() > frame.end {
                return Err(Error::InvalidReference(format!(
                    "opcode 0x{:02X} at 0x{:X} crosses the end of its pattern",
                    op, pos
                )));
            }
        }
        Ok(event)
    }

    fn dispatch(&mut self, op: u8, pos: usize) -> Result<Option<Event>> {
        let event = match op {
            0x00..=0x3F => wait(op as u32 + 1),
            0x40..=0x7F => Some(self.dictionary_write((op - opcode::DICT_WRITE) as usize)?),
            0x80..=0x8F => {
                let count = (op & 0x0F) + 1;
                for _ in 0..count {
                    let value = self.source.expect_byte("PSG burst")?;
                    self.pending.push_back(Event::Write(ChipWrite::psg(value)));
                }
                None
            }
            0x90..=0x9F => wait(((op & 0x0F) as u32 + 1) * FRAME_SAMPLES),
            0xA0..=0xAB => {
                let code = op - opcode::KEY;
                let spec = if code < 6 {
                    key_on_off(code, false)
                } else {
                    key_on_off(code - 6, true)
                };
                Some(Event::Write(spec.into()))
            }
            opcode::DICT_WRITE_EXT => {
                let index = self.source.expect_byte("dictionary index")?;
                Some(self.dictionary_write(index as usize)?)
            }
            opcode::FM_PORT0 | opcode::FM_PORT1 => {
                let register = self.source.expect_byte("FM write")?;
                let value = self.source.expect_byte("FM write")?;
                Some(Event::Write(ChipWrite::fm(
                    op - opcode::FM_PORT0,
                    register,
                    value,
                )))
            }
            opcode::PSG_WRITE => {
                let value = self.source.expect_byte("PSG write")?;
                Some(Event::Write(ChipWrite::psg(value)))
            }
            opcode::WAIT_LONG => wait(self.source.read_u16_le("long wait")? as u32),
            opcode::LOOP_MARK => self.loop_mark(pos),
            opcode::DAC_WRITE => {
                if self.dac_ready() {
                    Some(Event::DacSample(self.bank.read(&mut self.source)?))
                } else {
                    None
                }
            }
            opcode::DAC_SEEK => {
                let offset = self.source.read_u16_le("DAC seek")? as usize;
                if self.dac_ready() {
                    self.bank.seek(&mut self.source, offset)?;
                }
                None
            }
            opcode::DAC_BLOCK => {
                let count = self.source.expect_byte("DAC block")?;
                let per_sample = self.source.expect_byte("DAC block")?;
                if count == 0 {
                    None
                } else if self.dac_ready() {
                    self.burst = Some(DacBurst::Block {
                        remaining: count,
                        wait: per_sample,
                    });
                    None
                } else {
                    wait(count as u32 * per_sample as u32)
                }
            }
            opcode::DAC_RUN => {
                let count = self.source.expect_byte("DAC run")?;
                let mut packed = [0u8; 128];
                let packed_len = (count as usize).div_ceil(2);
                self.source
                    .read_exact(&mut packed[..packed_len], "DAC run waits")?;
                if count == 0 {
                    None
                } else if self.dac_ready() {
                    self.burst = Some(DacBurst::Run {
                        count,
                        index: 0,
                        packed,
                    });
                    None
                } else {
                    let total: u32 = (0..count as usize)
                        .map(|i| {
                            let byte = packed[i / 2];
                            (if i % 2 == 0 { byte >> 4 } else { byte & 0x0F }) as u32
                        })
                        .sum();
                    wait(total)
                }
            }
            0xC0..=0xCF => {
                let after = (op & 0x0F) as u32;
                if self.dac_ready() {
                    let sample = self.bank.read(&mut self.source)?;
                    if after > 0 {
                        self.pending.push_back(Event::Wait(after));
                    }
                    Some(Event::DacSample(sample))
                } else {
                    wait(after)
                }
            }
            0xE0..=0xEF => {
                self.enter_pattern((op & 0x0F) as usize, pos)?;
                None
            }
            opcode::CHUNK_END => {
                self.reject_in_pattern(op, pos)?;
                let next = self.source.position();
                if self.chunk_starts.last().is_some_and(|&last| next > last) {
                    self.chunk_starts.push(next);
                    debug!("GEP chunk {} starts at 0x{:X}", self.chunk_starts.len() - 1, next);
                    self.resolve_loop_point()?;
                }
                if self.source.remaining() == 0 {
                    self.finished = true;
                    Some(Event::End)
                } else {
                    None
                }
            }
            opcode::END => {
                self.reject_in_pattern(op, pos)?;
                self.finished = true;
                Some(Event::End)
            }
            _ => {
                return Err(Error::UnknownOpcode {
                    opcode: op,
                    offset: pos,
                });
            }
        };
        Ok(event)
    }

    fn dictionary_write(&self, index: usize) -> Result<Event> {
        let &(register, value) = self.dictionary.get(index).ok_or_else(|| {
            Error::InvalidReference(format!(
                "dictionary index {} out of range ({} entries)",
                index,
                self.dictionary.len()
            ))
        })?;
        Ok(Event::Write(ChipWrite::fm(0, register, value)))
    }

    fn loop_mark(&mut self, pos: usize) -> Option<Event> {
        // A marker at a known loop point was already reported before the
        // opcode was read; markers elsewhere are ignored.
        if self.frame.is_some() || self.loop_at.is_some() || self.header.loop_point.is_some() {
            return None;
        }
        debug!("runtime loop point at 0x{:X}", pos);
        self.loop_at = Some(pos);
        self.loop_cursor = Some(self.bank.cursor());
        self.info.has_loop = true;
        Some(Event::LoopMarker)
    }

    fn enter_pattern(&mut self, id: usize, pos: usize) -> Result<()> {
        if self.frame.is_some() {
            return Err(Error::InvalidReference(format!(
                "nested pattern {} at 0x{:X}",
                id, pos
            )));
        }
        let &(start, len) = self.patterns.get(id).ok_or_else(|| {
            Error::InvalidReference(format!(
                "undefined pattern {} at 0x{:X} ({} defined)",
                id,
                pos,
                self.patterns.len()
            ))
        })?;
        self.frame = Some(PatternFrame {
            end: start + len,
            resume: self.source.position(),
        });
        self.source.seek(start)
    }

    fn reject_in_pattern(&self, op: u8, pos: usize) -> Result<()> {
        if self.frame.is_some() {
            return Err(Error::InvalidReference(format!(
                "opcode 0x{:02X} at 0x{:X} is not allowed inside a pattern",
                op, pos
            )));
        }
        Ok(())
    }
}

fn wait(samples: u32) -> Option<Event> {
    (samples > 0).then_some(Event::Wait(samples))
}

impl<S: ByteSource> CommandDecoder for GepDecoder<S> {
    fn next_event(&mut self) -> Result<Event> {
        GepDecoder::next_event(self)
    }

    fn seek_to_loop(&mut self) -> Result<bool> {
        let Some(at) = self.loop_at else {
            return Ok(false);
        };
        self.source.seek(at)?;
        self.pending.clear();
        self.burst = None;
        self.frame = None;
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

impl<S: ByteSource> Iterator for GepDecoder<S> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished && self.pending.is_empty() {
            return None;
        }
        let result = GepDecoder::next_event(self);
        if result.is_err() {
            self.finished = true;
            self.pending.clear();
        }
        Some(result)
    }
}
