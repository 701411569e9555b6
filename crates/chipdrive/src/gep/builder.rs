//! Builder that encodes a register-write trace into a GEP image.
use std::collections::HashMap;

use crate::bank::dpcm;
use crate::binutil::write_u16_le;
use crate::chip::{ChipWrite, YM2612_KEY_ON_OFF, Ym2612Spec};
use crate::error::{Error, Result};
use crate::gep::header::{GepFlags, GepHeader};
use crate::gep::opcode;
use crate::timing::FRAME_SAMPLES;

/// Largest dictionary the count byte can describe.
const MAX_DICTIONARY: usize = 256;
/// Entries reachable with a one-byte opcode.
const SHORT_DICTIONARY: usize = 64;
/// Stored bytes per PCM block (u16 size field).
const MAX_BLOCK: usize = u16::MAX as usize;
/// Shortest DAC run worth a burst opcode.
const MIN_BURST: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Fm(Ym2612Spec),
    Psg(u8),
    Wait(u32),
    Dac(usize),
    Loop,
}

/// Encodes a trace of chip writes, waits and DAC samples as GEP.
///
/// ```
/// use chipdrive::chip::ChipWrite;
/// use chipdrive::gep::{GepBuilder, GepDecoder};
/// use chipdrive::bank::BankConfig;
/// use chipdrive::source::FixedSource;
/// use chipdrive::Event;
///
/// let mut builder = GepBuilder::new();
/// builder.add_write(ChipWrite::fm(0, 0x22, 0x08));
/// builder.add_write(ChipWrite::psg(0x9F));
/// builder.add_wait(735);
/// let image = builder.finalize().unwrap();
///
/// let events: Vec<Event> = GepDecoder::open(FixedSource::new(&image), BankConfig::default())
///     .unwrap()
///     .collect::<Result<_, _>>()
///     .unwrap();
/// assert_eq!(events, vec![
///     Event::Write(ChipWrite::fm(0, 0x22, 0x08)),
///     Event::Write(ChipWrite::psg(0x9F)),
///     Event::Wait(735),
///     Event::End,
/// ]);
/// ```
#[derive(Debug, Default, Clone)]
pub struct GepBuilder {
    ops: Vec<Op>,
    pcm: Vec<u8>,
    dpcm: bool,
    max_chunk_size: Option<usize>,
}

impl GepBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_write(&mut self, write: impl Into<ChipWrite>) {
        match write.into() {
            ChipWrite::Ym2612(spec) => self.ops.push(Op::Fm(spec)),
            ChipWrite::Psg(spec) => self.ops.push(Op::Psg(spec.value)),
        }
    }

    /// Append a wait; consecutive waits are merged.
    pub fn add_wait(&mut self, samples: u32) {
        if samples == 0 {
            return;
        }
        if let Some(Op::Wait(prev)) = self.ops.last_mut() {
            if let Some(sum) = prev.checked_add(samples) {
                *prev = sum;
                return;
            }
        }
        self.ops.push(Op::Wait(samples));
    }

    /// Play the DAC sample at `offset` of the PCM payload.
    pub fn add_dac(&mut self, offset: usize) {
        self.ops.push(Op::Dac(offset));
    }

    /// Mark the current position as the loop point.
    pub fn set_loop_point(&mut self) {
        self.ops.retain(|op| *op != Op::Loop);
        self.ops.push(Op::Loop);
    }

    /// Raw 8-bit unsigned samples addressed by [`GepBuilder::add_dac`].
    pub fn set_pcm(&mut self, samples: Vec<u8>) {
        self.pcm = samples;
    }

    /// Store the PCM payload delta coded (lossy).
    pub fn set_dpcm(&mut self, dpcm: bool) {
        self.dpcm = dpcm;
    }

    /// Split the command stream into chunks of roughly this many bytes.
    pub fn set_max_chunk_size(&mut self, size: Option<usize>) {
        self.max_chunk_size = size.filter(|&s| s > 0);
    }

    /// Encode the image.
    pub fn finalize(self) -> Result<Vec<u8>> {
        let dictionary = self.build_dictionary();
        let index: HashMap<(u8, u8), usize> = dictionary
            .iter()
            .enumerate()
            .map(|(i, &entry)| (entry, i))
            .collect();

        let mut enc = Encoder {
            chunks: vec![Vec::new()],
            index,
            max_chunk_size: self.max_chunk_size,
            loop_point: None,
            total_samples: 0,
            cursor: 0,
        };
        enc.encode(&self.ops)?;
        let Encoder {
            mut chunks,
            loop_point,
            total_samples,
            ..
        } = enc;
        if let Some(last) = chunks.last_mut() {
            last.push(opcode::END);
        }

        let blocks: Vec<Vec<u8>> = if self.dpcm {
            // Odd-length pieces decode back to exactly their own length.
            self.pcm.chunks(2 * MAX_BLOCK - 1).map(dpcm::encode).collect()
        } else {
            self.pcm.chunks(MAX_BLOCK).map(<[u8]>::to_vec).collect()
        };
        let pcm_blocks = u8::try_from(blocks.len()).map_err(|_| Error::CapacityExceeded {
            needed: self.pcm.len(),
            capacity: u8::MAX as usize * MAX_BLOCK,
        })?;

        let mut flags = GepFlags::empty();
        for op in &self.ops {
            match op {
                Op::Fm(_) => flags |= GepFlags::YM2612,
                Op::Psg(_) => flags |= GepFlags::PSG,
                _ => {}
            }
        }
        if !self.pcm.is_empty() {
            flags |= GepFlags::DAC;
            if self.dpcm {
                flags |= GepFlags::DPCM;
            }
        }
        if chunks.len() > 1 {
            flags |= GepFlags::MULTI_CHUNK;
        }

        let header = GepHeader {
            flags,
            dictionary_len: dictionary.len(),
            pcm_blocks,
            total_samples,
            loop_point,
        };
        let mut out = header.to_bytes();
        out.push((dictionary.len() % MAX_DICTIONARY) as u8);
        for (register, value) in &dictionary {
            out.push(*register);
            out.push(*value);
        }
        for block in &blocks {
            write_u16_le(&mut out, block.len() as u16);
            out.extend_from_slice(block);
        }
        for chunk in &chunks {
            out.extend_from_slice(chunk);
        }
        Ok(out)
    }

    /// Most frequent port 0 writes, most frequent first.
    fn build_dictionary(&self) -> Vec<(u8, u8)> {
        let mut counts: HashMap<(u8, u8), (usize, usize)> = HashMap::new();
        for (order, op) in self.ops.iter().enumerate() {
            if let Op::Fm(spec) = op {
                if spec.port == 0 && key_code(spec).is_none() {
                    counts
                        .entry((spec.register, spec.value))
                        .or_insert((0, order))
                        .0 += 1;
                }
            }
        }
        let mut ranked: Vec<((u8, u8), (usize, usize))> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.0.cmp(&a.1.0).then(a.1.1.cmp(&b.1.1)));
        let mut dictionary: Vec<(u8, u8)> = ranked
            .into_iter()
            .take(MAX_DICTIONARY)
            .map(|(entry, _)| entry)
            .collect();
        // A zero count byte means 256 entries, so an empty table still
        // carries one placeholder.
        if dictionary.is_empty() {
            dictionary.push((0x00, 0x00));
        }
        dictionary
    }
}

/// Key on/off shortcut code for a write, if it has one.
fn key_code(spec: &Ym2612Spec) -> Option<u8> {
    if spec.port != 0 || spec.register != YM2612_KEY_ON_OFF {
        return None;
    }
    let channel = match spec.value & 0x0F {
        bits @ 0..=2 => bits,
        bits @ 4..=6 => bits - 1,
        _ => return None,
    };
    match spec.value & 0xF0 {
        0x00 => Some(channel),
        0xF0 => Some(channel + 6),
        _ => None,
    }
}

struct Encoder {
    chunks: Vec<Vec<u8>>,
    index: HashMap<(u8, u8), usize>,
    max_chunk_size: Option<usize>,
    loop_point: Option<(u16, u16)>,
    total_samples: u32,
    /// Bank offset the decoder's DAC cursor will be at.
    cursor: usize,
}

impl Encoder {
    fn out(&mut self) -> &mut Vec<u8> {
        let last = self.chunks.len() - 1;
        &mut self.chunks[last]
    }

    fn encode(&mut self, ops: &[Op]) -> Result<()> {
        let mut i = 0;
        while i < ops.len() {
            let consumed = match ops[i] {
                Op::Fm(spec) => {
                    self.fm(&spec);
                    1
                }
                Op::Psg(_) => self.psg_group(&ops[i..]),
                Op::Wait(samples) => {
                    self.wait(samples);
                    1
                }
                Op::Loop => {
                    let chunk = u16::try_from(self.chunks.len() - 1).ok();
                    let offset = u16::try_from(self.out().len()).ok();
                    let (Some(chunk), Some(offset)) = (chunk, offset) else {
                        return Err(Error::InvalidReference(
                            "loop point offset does not fit 16 bits, use a smaller chunk size"
                                .to_string(),
                        ));
                    };
                    self.loop_point = Some((chunk, offset));
                    self.out().push(opcode::LOOP_MARK);
                    1
                }
                Op::Dac(offset) => self.dac(&ops[i..], offset)?,
            };
            i += consumed;
            let ends_with_wait = matches!(ops[i - 1], Op::Wait(_) | Op::Dac(_));
            if ends_with_wait && i < ops.len() {
                self.maybe_split();
            }
        }
        Ok(())
    }

    fn maybe_split(&mut self) {
        if let Some(max) = self.max_chunk_size {
            if self.out().len() >= max {
                self.out().push(opcode::CHUNK_END);
                self.chunks.push(Vec::new());
            }
        }
    }

    fn fm(&mut self, spec: &Ym2612Spec) {
        if let Some(code) = key_code(spec) {
            self.out().push(opcode::KEY + code);
            return;
        }
        if spec.port == 0 {
            if let Some(&index) = self.index.get(&(spec.register, spec.value)) {
                if index < SHORT_DICTIONARY {
                    self.out().push(opcode::DICT_WRITE + index as u8);
                } else {
                    self.out()
                        .extend_from_slice(&[opcode::DICT_WRITE_EXT, index as u8]);
                }
                return;
            }
        }
        let op = if spec.port == 0 {
            opcode::FM_PORT0
        } else {
            opcode::FM_PORT1
        };
        self.out()
            .extend_from_slice(&[op, spec.register, spec.value]);
    }

    fn psg_group(&mut self, ops: &[Op]) -> usize {
        let values: Vec<u8> = ops
            .iter()
            .take(16)
            .map_while(|op| match op {
                Op::Psg(v) => Some(*v),
                _ => None,
            })
            .collect();
        if values.len() == 1 {
            self.out().extend_from_slice(&[opcode::PSG_WRITE, values[0]]);
        } else {
            self.out()
                .push(opcode::PSG_BURST + (values.len() as u8 - 1));
            self.out().extend_from_slice(&values);
        }
        values.len()
    }

    fn wait(&mut self, samples: u32) {
        self.total_samples = self.total_samples.saturating_add(samples);
        let mut left = samples;
        while left > 0 {
            if left <= 64 {
                self.out().push(opcode::WAIT_SHORT + (left - 1) as u8);
                break;
            }
            if left % FRAME_SAMPLES == 0 && left / FRAME_SAMPLES <= 16 {
                let frames = (left / FRAME_SAMPLES) as u8;
                self.out().push(opcode::WAIT_FRAMES + frames - 1);
                break;
            }
            let part = left.min(u16::MAX as u32);
            self.out().push(opcode::WAIT_LONG);
            write_u16_le(self.out(), part as u16);
            left -= part;
        }
    }

    /// Encode the DAC sample at `ops[0]` and, when worthwhile, the run of
    /// sequential samples that follows it. Returns the ops consumed.
    fn dac(&mut self, ops: &[Op], offset: usize) -> Result<usize> {
        if offset != self.cursor {
            let target = u16::try_from(offset).map_err(|_| {
                Error::InvalidReference(format!(
                    "DAC seek target {} does not fit 16 bits",
                    offset
                ))
            })?;
            self.out().push(opcode::DAC_SEEK);
            write_u16_le(self.out(), target);
        }

        // (wait after sample, ops consumed) for each sequential sample.
        let mut run: Vec<(u32, usize)> = Vec::new();
        let mut i = 0;
        while run.len() < u8::MAX as usize {
            match ops.get(i) {
                Some(Op::Dac(o)) if *o == offset + run.len() => {}
                _ => break,
            }
            match ops.get(i + 1) {
                Some(Op::Wait(w)) => {
                    run.push((*w, 2));
                    i += 2;
                }
                _ => {
                    run.push((0, 1));
                    i += 1;
                }
            }
        }

        let first_wait = run[0].0;
        let uniform = run.iter().all(|&(w, _)| w == first_wait) && first_wait <= u8::MAX as u32;
        let nibbles = run.iter().all(|&(w, _)| w <= 0x0F);
        let consumed = if run.len() >= MIN_BURST && uniform {
            let out = self.out();
            out.extend_from_slice(&[opcode::DAC_BLOCK, run.len() as u8, first_wait as u8]);
            self.total_samples = self
                .total_samples
                .saturating_add(first_wait * run.len() as u32);
            self.cursor = offset + run.len();
            i
        } else if run.len() >= MIN_BURST && nibbles {
            let mut bytes = vec![opcode::DAC_RUN, run.len() as u8];
            for pair in run.chunks(2) {
                let hi = pair[0].0 as u8;
                let lo = pair.get(1).map_or(0, |p| p.0 as u8);
                bytes.push((hi << 4) | lo);
            }
            self.out().extend_from_slice(&bytes);
            let sum: u32 = run.iter().map(|&(w, _)| w).sum();
            self.total_samples = self.total_samples.saturating_add(sum);
            self.cursor = offset + run.len();
            i
        } else {
            let (wait, used) = run[0];
            self.cursor = offset + 1;
            if used == 2 && wait <= 0x0F {
                self.out().push(opcode::DAC_WAIT + wait as u8);
                self.total_samples = self.total_samples.saturating_add(wait);
                2
            } else {
                self.out().push(opcode::DAC_WRITE);
                1
            }
        };
        Ok(consumed)
    }
}
