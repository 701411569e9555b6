#![allow(dead_code)]

use chipdrive::chip::{BusWrite, RecordingBus};
use chipdrive::player::{Player, PlayerState};
use chipdrive::source::{ByteSource, FixedSource};
use chipdrive::timing::{Clock, ManualClock};
use chipdrive::{BankConfig, Event, Result, decoder};

/// Hand-assembled GEP image.
pub struct GepImage {
    flags: u16,
    dictionary: Vec<(u8, u8)>,
    patterns: Option<Vec<(u16, u16)>>,
    pcm: Vec<Vec<u8>>,
    total: u32,
    loop_point: Option<(u16, u16)>,
    commands: Vec<u8>,
}

impl GepImage {
    pub fn new(commands: &[u8]) -> Self {
        Self {
            flags: 0x03,
            dictionary: vec![(0x28, 0xF1), (0x22, 0x08)],
            patterns: None,
            pcm: Vec::new(),
            total: 0,
            loop_point: None,
            commands: commands.to_vec(),
        }
    }

    pub fn dictionary(mut self, entries: &[(u8, u8)]) -> Self {
        self.dictionary = entries.to_vec();
        self
    }

    /// Pattern spans as (offset, length) relative to the command stream.
    pub fn patterns(mut self, spans: &[(u16, u16)]) -> Self {
        self.flags |= 0x40;
        self.patterns = Some(spans.to_vec());
        self
    }

    pub fn pcm(mut self, blocks: &[&[u8]]) -> Self {
        self.flags |= 0x04;
        self.pcm = blocks.iter().map(|b| b.to_vec()).collect();
        self
    }

    pub fn dpcm(mut self) -> Self {
        self.flags |= 0x10;
        self
    }

    pub fn dac_flag(mut self) -> Self {
        self.flags |= 0x04;
        self
    }

    pub fn multi_chunk(mut self) -> Self {
        self.flags |= 0x08;
        self
    }

    pub fn total(mut self, samples: u32) -> Self {
        self.total = samples;
        self
    }

    pub fn loop_at(mut self, chunk: u16, offset: u16) -> Self {
        self.loop_point = Some((chunk, offset));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = b"GEP\x01".to_vec();
        out.extend_from_slice(&self.flags.to_le_bytes());
        out.push((self.dictionary.len() % 256) as u8);
        out.push(self.pcm.len() as u8);
        out.extend_from_slice(&self.total.to_le_bytes());
        let (chunk, offset) = self.loop_point.unwrap_or((0xFFFF, 0));
        out.extend_from_slice(&chunk.to_le_bytes());
        out.extend_from_slice(&offset.to_le_bytes());

        out.push((self.dictionary.len() % 256) as u8);
        for (r, v) in &self.dictionary {
            out.extend_from_slice(&[*r, *v]);
        }
        if let Some(spans) = &self.patterns {
            out.push(spans.len() as u8);
            for (off, len) in spans {
                out.extend_from_slice(&off.to_le_bytes());
                out.extend_from_slice(&len.to_le_bytes());
            }
        }
        for block in &self.pcm {
            out.extend_from_slice(&(block.len() as u16).to_le_bytes());
            out.extend_from_slice(block);
        }
        out.extend_from_slice(&self.commands);
        out
    }
}

/// Hand-assembled VGM 1.50 image.
pub struct VgmImage {
    sn76489_clock: u32,
    ym2612_clock: u32,
    total: u32,
    /// Loop point as an offset into `commands`.
    loop_at: Option<usize>,
    commands: Vec<u8>,
}

impl VgmImage {
    pub fn new(commands: &[u8]) -> Self {
        Self {
            sn76489_clock: 3_579_545,
            ym2612_clock: 7_670_453,
            total: 0,
            loop_at: None,
            commands: commands.to_vec(),
        }
    }

    pub fn clocks(mut self, sn76489: u32, ym2612: u32) -> Self {
        self.sn76489_clock = sn76489;
        self.ym2612_clock = ym2612;
        self
    }

    pub fn total(mut self, samples: u32) -> Self {
        self.total = samples;
        self
    }

    pub fn loop_at(mut self, command_offset: usize) -> Self {
        self.loop_at = Some(command_offset);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = vec![0u8; 0x40];
        out[..4].copy_from_slice(b"Vgm ");
        let eof = (0x40 + self.commands.len() - 4) as u32;
        out[0x04..0x08].copy_from_slice(&eof.to_le_bytes());
        out[0x08..0x0C].copy_from_slice(&0x150u32.to_le_bytes());
        out[0x0C..0x10].copy_from_slice(&self.sn76489_clock.to_le_bytes());
        out[0x18..0x1C].copy_from_slice(&self.total.to_le_bytes());
        if let Some(at) = self.loop_at {
            let rel = (0x40 + at - 0x1C) as u32;
            out[0x1C..0x20].copy_from_slice(&rel.to_le_bytes());
        }
        out[0x2C..0x30].copy_from_slice(&self.ym2612_clock.to_le_bytes());
        out[0x34..0x38].copy_from_slice(&0x0Cu32.to_le_bytes());
        out.extend_from_slice(&self.commands);
        out
    }
}

/// Decode every event up to and including `End`.
pub fn decode_all<S: ByteSource>(source: S, bank: BankConfig) -> Result<Vec<Event>> {
    let mut dec = decoder::open(source, bank)?;
    let mut events = Vec::new();
    loop {
        let event = dec.next_event()?;
        events.push(event);
        if event == Event::End {
            return Ok(events);
        }
        assert!(events.len() < 1_000_000, "decoder did not terminate");
    }
}

pub fn decode_bytes(bytes: &[u8]) -> Result<Vec<Event>> {
    decode_all(FixedSource::new(bytes), BankConfig::default())
}

/// Writes with the mute bursts (start, pause, finish) filtered out.
pub fn music_writes(writes: &[BusWrite]) -> Vec<BusWrite> {
    const MUTE: [BusWrite; 4] = [
        BusWrite::Tone(0x9F),
        BusWrite::Tone(0xBF),
        BusWrite::Tone(0xDF),
        BusWrite::Tone(0xFF),
    ];
    let mut out = Vec::new();
    let mut i = 0;
    while i < writes.len() {
        // mute_all: six key-offs, DAC disable, four PSG attenuations
        if i + 11 <= writes.len()
            && writes[i + 6]
                == (BusWrite::Fm {
                    port: 0,
                    register: 0x2B,
                    value: 0,
                })
            && writes[i + 7..i + 11] == MUTE
        {
            i += 11;
            continue;
        }
        out.push(writes[i]);
        i += 1;
    }
    out
}

/// Jump the clock from deadline to deadline until playback stops.
pub fn run_to_end(player: &mut Player<'_, RecordingBus, ManualClock>, clock: &ManualClock) {
    for _ in 0..1_000_000 {
        match player.tick().unwrap() {
            PlayerState::Playing => {}
            _ => return,
        }
        if let Some(deadline) = player.next_deadline_micros() {
            if deadline > clock.now_micros() {
                clock.set(deadline);
            }
        }
    }
    panic!("playback did not finish");
}
