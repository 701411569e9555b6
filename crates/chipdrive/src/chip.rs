//! Chip register-write types and the hardware write contract.
//!
//! The engine never talks to hardware directly. Every decoded write is
//! routed through a [`ChipBus`], which a board support layer implements on
//! top of its bus strobes and settle delays. [`RecordingBus`] captures the
//! writes in memory, which is what tests and the command line tools use.

/// YM2612 key on/off register.
pub const YM2612_KEY_ON_OFF: u8 = 0x28;
/// YM2612 DAC data register.
pub const YM2612_DAC_DATA: u8 = 0x2A;
/// YM2612 DAC enable register.
pub const YM2612_DAC_ENABLE: u8 = 0x2B;

/// A write to one of the two YM2612 register ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ym2612Spec {
    pub port: u8,
    pub register: u8,
    pub value: u8,
}

/// A byte latched into the SN76489.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PsgSpec {
    pub value: u8,
}

/// A decoded chip register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChipWrite {
    Ym2612(Ym2612Spec),
    Psg(PsgSpec),
}

impl ChipWrite {
    pub fn fm(port: u8, register: u8, value: u8) -> Self {
        ChipWrite::Ym2612(Ym2612Spec {
            port,
            register,
            value,
        })
    }

    pub fn psg(value: u8) -> Self {
        ChipWrite::Psg(PsgSpec { value })
    }
}

impl From<Ym2612Spec> for ChipWrite {
    fn from(spec: Ym2612Spec) -> Self {
        ChipWrite::Ym2612(spec)
    }
}

impl From<PsgSpec> for ChipWrite {
    fn from(spec: PsgSpec) -> Self {
        ChipWrite::Psg(spec)
    }
}

/// Channel-select bits of the key on/off register for FM channel 0-5.
///
/// Channels 3-5 live behind bit 2, so their select value skips 3.
pub fn key_channel_bits(channel: u8) -> u8 {
    if channel < 3 { channel } else { channel + 1 }
}

/// Key on (all four operators) or key off for FM channel 0-5.
pub fn key_on_off(channel: u8, on: bool) -> Ym2612Spec {
    let operators = if on { 0xF0 } else { 0x00 };
    Ym2612Spec {
        port: 0,
        register: YM2612_KEY_ON_OFF,
        value: key_channel_bits(channel) | operators,
    }
}

/// Hardware write contract consumed by the player.
///
/// Implementors handle bus timing (address/data strobes and the chips'
/// minimum settle times); the engine only decides what to write and when.
pub trait ChipBus {
    /// Write `value` to `register` on YM2612 port 0 or 1.
    fn write_fm(&mut self, port: u8, register: u8, value: u8);

    /// Latch one byte into the SN76489.
    fn write_tone(&mut self, value: u8);

    /// Output one 8-bit unsigned DAC sample.
    fn write_dac(&mut self, value: u8) {
        self.write_fm(0, YM2612_DAC_DATA, value);
    }

    /// Silence both chips: key off all FM channels, disable the DAC and set
    /// every PSG channel to maximum attenuation.
    fn mute_all(&mut self) {
        for channel in 0..6 {
            let off = key_on_off(channel, false);
            self.write_fm(off.port, off.register, off.value);
        }
        self.write_fm(0, YM2612_DAC_ENABLE, 0x00);
        for latch in [0x9F, 0xBF, 0xDF, 0xFF] {
            self.write_tone(latch);
        }
    }

    /// Route a decoded write to the matching chip.
    fn write(&mut self, write: ChipWrite) {
        match write {
            ChipWrite::Ym2612(s) => self.write_fm(s.port, s.register, s.value),
            ChipWrite::Psg(s) => self.write_tone(s.value),
        }
    }
}

impl<B: ChipBus + ?Sized> ChipBus for &mut B {
    fn write_fm(&mut self, port: u8, register: u8, value: u8) {
        (**self).write_fm(port, register, value)
    }

    fn write_tone(&mut self, value: u8) {
        (**self).write_tone(value)
    }

    fn write_dac(&mut self, value: u8) {
        (**self).write_dac(value)
    }

    fn mute_all(&mut self) {
        (**self).mute_all()
    }
}

/// A write as observed on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusWrite {
    Fm { port: u8, register: u8, value: u8 },
    Tone(u8),
    Dac(u8),
}

/// A bus that records every write in order.
#[derive(Debug, Default, Clone)]
pub struct RecordingBus {
    writes: Vec<BusWrite>,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> &[BusWrite] {
        &self.writes
    }

    /// Take the recorded writes, leaving the log empty.
    pub fn take(&mut self) -> Vec<BusWrite> {
        std::mem::take(&mut self.writes)
    }
}

impl ChipBus for RecordingBus {
    fn write_fm(&mut self, port: u8, register: u8, value: u8) {
        self.writes.push(BusWrite::Fm {
            port,
            register,
            value,
        });
    }

    fn write_tone(&mut self, value: u8) {
        self.writes.push(BusWrite::Tone(value));
    }

    fn write_dac(&mut self, value: u8) {
        self.writes.push(BusWrite::Dac(value));
    }
}

/// A bus that drops every write.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBus;

impl ChipBus for NullBus {
    fn write_fm(&mut self, _port: u8, _register: u8, _value: u8) {}

    fn write_tone(&mut self, _value: u8) {}
}
