//! The canonical event vocabulary shared by both stream formats.
use bitflags::bitflags;

use crate::chip::ChipWrite;

/// One decoded playback event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A register write to release immediately.
    Write(ChipWrite),
    /// Advance the playback clock by this many 44.1 kHz samples.
    Wait(u32),
    /// One 8-bit unsigned sample for the FM chip's DAC.
    DacSample(u8),
    /// The loop point has been reached.
    LoopMarker,
    /// The command stream is finished.
    End,
}

bitflags! {
    /// Chips a stream drives.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ChipFlags: u8 {
        const YM2612 = 0x01;
        const SN76489 = 0x02;
        /// DAC samples are played (payload present and accepted by the bank).
        const DAC = 0x04;
    }
}

/// Stream container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Verbatim register log (VGM).
    Vgm,
    /// Compressed command stream (GEP).
    Gep,
}

/// Facts about a loaded stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub format: Format,
    pub chips: ChipFlags,
    /// Declared duration in samples.
    pub total_samples: u32,
    /// A loop point is known (from the header or a marker already decoded).
    pub has_loop: bool,
    /// Logical sample count of the DAC payload.
    pub pcm_samples: usize,
}
