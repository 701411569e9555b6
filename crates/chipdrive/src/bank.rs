//! Bounded-capacity store for DAC sample payloads.
//!
//! A stream may carry one or more PCM payload segments. The bank keeps them
//! resident while they fit the configured capacity; past that point the
//! [`OverflowPolicy`] decides between refusing the stream, disabling DAC
//! playback for the session, or leaving the payload in the byte source and
//! reading it through a small sliding window.
//!
//! Samples are addressed by logical offset through a cursor. Raw payloads
//! map offsets to stored bytes directly. Delta-coded payloads (see
//! [`dpcm`]) are decoded on the fly, so a backwards seek re-decodes from
//! the start of the segment.
use log::{info, warn};

use crate::error::{Error, Result};
use crate::source::ByteSource;

pub mod dpcm;

/// Default resident capacity in bytes.
pub const DEFAULT_CAPACITY: usize = 256 * 1024;

/// Default sliding window for streamed payloads.
pub const DEFAULT_WINDOW: usize = 256;

/// What the bank does when a payload does not fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Fail the load with [`Error::CapacityExceeded`].
    Reject,
    /// Keep playing FM and PSG; DAC opcodes turn into plain waits.
    DisableDac,
    /// Read the payload from the byte source through a window of this many
    /// bytes.
    Stream { window: usize },
}

/// Sample bank configuration.
///
/// A capacity of zero with [`OverflowPolicy::DisableDac`] discards every
/// payload, which is how a build without DAC support is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankConfig {
    pub capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for BankConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            overflow: OverflowPolicy::DisableDac,
        }
    }
}

/// How a payload segment is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PcmEncoding {
    Raw,
    Dpcm,
}

#[derive(Debug, Clone, Copy)]
enum Storage {
    Resident { start: usize },
    Streamed { source_offset: usize },
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    logical_start: usize,
    logical_len: usize,
    stored_len: usize,
    encoding: PcmEncoding,
    storage: Storage,
}

/// Read position inside the bank.
///
/// `last` is the value of the sample just before `offset` within the same
/// segment, which is what a delta-coded read continues from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BankCursor {
    offset: usize,
    segment: usize,
    last: Option<u8>,
}

impl BankCursor {
    pub fn offset(&self) -> usize {
        self.offset
    }
}

#[derive(Debug, Default)]
struct Window {
    segment: usize,
    start: usize,
    bytes: Vec<u8>,
}

/// The sample data bank of one playback session.
#[derive(Debug)]
pub struct SampleBank {
    config: BankConfig,
    resident: Vec<u8>,
    segments: Vec<Segment>,
    size: usize,
    enabled: bool,
    cursor: BankCursor,
    window: Window,
}

impl SampleBank {
    pub fn new(config: BankConfig) -> Self {
        Self {
            config,
            resident: Vec::new(),
            segments: Vec::new(),
            size: 0,
            enabled: true,
            cursor: BankCursor::default(),
            window: Window::default(),
        }
    }

    /// Logical number of samples.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// DAC playback is possible: the bank holds samples and has not been
    /// disabled by the overflow policy.
    pub fn is_available(&self) -> bool {
        self.enabled && self.size > 0
    }

    /// `false` once the overflow policy has turned DAC playback off.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Bytes held in memory for resident segments.
    pub fn resident_len(&self) -> usize {
        self.resident.len()
    }

    /// Resident bytes as stored (raw samples for raw payloads).
    pub fn resident_data(&self) -> &[u8] {
        &self.resident
    }

    /// Whether any segment is read through the sliding window.
    pub fn is_streaming(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s.storage, Storage::Streamed { .. }))
    }

    pub fn cursor(&self) -> BankCursor {
        self.cursor
    }

    /// Restore a cursor previously obtained from [`SampleBank::cursor`].
    pub fn restore(&mut self, cursor: BankCursor) {
        self.cursor = cursor;
    }

    pub fn offset(&self) -> usize {
        self.cursor.offset
    }

    /// Load a payload of `stored_len` bytes starting at the source's current
    /// position. On return the source is positioned just past the payload.
    pub fn load_segment<S: ByteSource + ?Sized>(
        &mut self,
        src: &mut S,
        stored_len: usize,
        encoding: PcmEncoding,
    ) -> Result<()> {
        if !self.enabled {
            return src.skip(stored_len, "sample payload");
        }
        let logical_len = match encoding {
            PcmEncoding::Raw => stored_len,
            PcmEncoding::Dpcm => dpcm::decoded_len(stored_len),
        };
        let needed = self.resident.len() + stored_len;
        let storage = if needed <= self.config.capacity {
            let start = self.resident.len();
            self.resident.resize(needed, 0);
            src.read_exact(&mut self.resident[start..], "sample payload")?;
            Storage::Resident { start }
        } else {
            match self.config.overflow {
                OverflowPolicy::Reject => {
                    return Err(Error::CapacityExceeded {
                        needed,
                        capacity: self.config.capacity,
                    });
                }
                OverflowPolicy::DisableDac => {
                    warn!(
                        "sample payload of {} bytes exceeds bank capacity {}, DAC disabled",
                        stored_len, self.config.capacity
                    );
                    self.disable();
                    return src.skip(stored_len, "sample payload");
                }
                OverflowPolicy::Stream { window } => {
                    let source_offset = src.position();
                    src.skip(stored_len, "sample payload")?;
                    info!(
                        "streaming {} byte sample payload at 0x{:X} through a {} byte window",
                        stored_len, source_offset, window
                    );
                    Storage::Streamed { source_offset }
                }
            }
        };
        self.segments.push(Segment {
            logical_start: self.size,
            logical_len,
            stored_len,
            encoding,
            storage,
        });
        self.size += logical_len;
        Ok(())
    }

    fn disable(&mut self) {
        self.enabled = false;
        self.resident = Vec::new();
        self.segments.clear();
        self.size = 0;
        self.cursor = BankCursor::default();
        self.window = Window::default();
    }

    fn out_of_range(&self, offset: usize) -> Error {
        Error::InvalidReference(format!(
            "sample offset {} outside payload of {} samples",
            offset, self.size
        ))
    }

    fn segment_index(&self, offset: usize) -> usize {
        self.segments
            .partition_point(|s| s.logical_start <= offset)
            .saturating_sub(1)
    }

    /// Move the cursor to `offset`.
    pub fn seek<S: ByteSource + ?Sized>(&mut self, src: &mut S, offset: usize) -> Result<()> {
        if offset >= self.size {
            return Err(self.out_of_range(offset));
        }
        let segment = self.segment_index(offset);
        let seg = self.segments[segment];
        match seg.encoding {
            PcmEncoding::Raw => {
                self.cursor = BankCursor {
                    offset,
                    segment,
                    last: None,
                };
            }
            PcmEncoding::Dpcm => {
                let c = self.cursor;
                let forward = c.segment == segment
                    && c.offset <= offset
                    && (c.last.is_some() || c.offset == seg.logical_start);
                if !forward {
                    self.cursor = BankCursor {
                        offset: seg.logical_start,
                        segment,
                        last: None,
                    };
                }
                while self.cursor.offset < offset {
                    self.read(src)?;
                }
            }
        }
        Ok(())
    }

    /// Read the sample at the cursor and advance.
    pub fn read<S: ByteSource + ?Sized>(&mut self, src: &mut S) -> Result<u8> {
        let offset = self.cursor.offset;
        if offset >= self.size {
            return Err(self.out_of_range(offset));
        }
        let mut segment = self.cursor.segment;
        let mut last = self.cursor.last;
        if self
            .segments
            .get(segment)
            .is_none_or(|s| offset >= s.logical_start + s.logical_len || offset < s.logical_start)
        {
            segment = self.segment_index(offset);
            last = None;
        }
        let seg = self.segments[segment];
        let local = offset - seg.logical_start;
        let value = match seg.encoding {
            PcmEncoding::Raw => self.stored_byte(src, segment, local)?,
            PcmEncoding::Dpcm if local == 0 => self.stored_byte(src, segment, 0)?,
            PcmEncoding::Dpcm => {
                let prev = match last {
                    Some(v) => v,
                    None => {
                        // Cursor was restored without history; rebuild it.
                        self.seek(src, offset)?;
                        return self.read(src);
                    }
                };
                let byte = self.stored_byte(src, segment, dpcm::stored_index(local))?;
                dpcm::step(prev, dpcm::code_for(local, byte))
            }
        };
        self.cursor = BankCursor {
            offset: offset + 1,
            segment,
            last: Some(value),
        };
        Ok(value)
    }

    fn stored_byte<S: ByteSource + ?Sized>(
        &mut self,
        src: &mut S,
        segment: usize,
        index: usize,
    ) -> Result<u8> {
        let seg = self.segments[segment];
        if index >= seg.stored_len {
            return Err(self.out_of_range(seg.logical_start + index));
        }
        match seg.storage {
            Storage::Resident { start } => Ok(self.resident[start + index]),
            Storage::Streamed { source_offset } => {
                let w = &self.window;
                let hit = w.segment == segment
                    && index >= w.start
                    && index < w.start + w.bytes.len();
                if !hit {
                    self.refill_window(src, segment, source_offset, index)?;
                }
                Ok(self.window.bytes[index - self.window.start])
            }
        }
    }

    fn refill_window<S: ByteSource + ?Sized>(
        &mut self,
        src: &mut S,
        segment: usize,
        source_offset: usize,
        index: usize,
    ) -> Result<()> {
        let size = match self.config.overflow {
            OverflowPolicy::Stream { window } => window.max(1),
            _ => DEFAULT_WINDOW,
        };
        let want = size.min(self.segments[segment].stored_len - index);
        let resume = src.position();
        let mut bytes = std::mem::take(&mut self.window.bytes);
        bytes.clear();
        bytes.resize(want, 0);
        src.seek(source_offset + index)?;
        let filled = src.read_exact(&mut bytes, "streamed sample payload");
        src.seek(resume)?;
        filled?;
        self.window = Window {
            segment,
            start: index,
            bytes,
        };
        Ok(())
    }
}
