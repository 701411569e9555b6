//! chipdrive: playback engine for YM2612 + SN76489 register-write streams
//!
//! `chipdrive` replays prerecorded chip command streams on hardware that
//! has a YM2612 FM synthesizer and an SN76489 tone generator attached,
//! releasing each register write at the sample it was recorded at. It is
//! written for small targets: nothing blocks, the command stream is read
//! one opcode at a time, and sample payloads that do not fit the memory
//! budget can be streamed from storage or dropped cleanly.
//!
//! Two stream formats are understood:
//! - VGM, the verbatim register log ([`vgm`]).
//! - GEP, a compact byte-code with a register dictionary, DAC bursts and
//!   reusable patterns ([`gep`]).
//!
//! Layers, leaf first:
//! - [`source`]: where the bytes come from (buffer, chunk list, file).
//! - [`decoder`]: format decoders producing [`Event`]s.
//! - [`bank`]: the DAC sample store.
//! - [`timing`]: sample clock bookkeeping.
//! - [`player`]: transport state machine driving a [`chip::ChipBus`].
//!
//! Example: play a GEP image on a recording bus
//!
//! ```rust
//! use chipdrive::chip::{ChipWrite, RecordingBus};
//! use chipdrive::gep::GepBuilder;
//! use chipdrive::player::{Player, PlayerConfig, PlayerState};
//! use chipdrive::source::FixedSource;
//! use chipdrive::timing::ManualClock;
//!
//! let mut builder = GepBuilder::new();
//! builder.add_write(ChipWrite::fm(0, 0x28, 0xF0)); // key on, channel 0
//! builder.add_wait(44_100);
//! builder.add_write(ChipWrite::fm(0, 0x28, 0x00)); // key off
//! let image = builder.finalize().unwrap();
//!
//! let clock = ManualClock::new();
//! let mut player = Player::new(RecordingBus::new(), clock.clone(), PlayerConfig::default());
//! player.start(FixedSource::new(&image)).unwrap();
//! while player.tick().unwrap() == PlayerState::Playing {
//!     if let Some(deadline) = player.next_deadline_micros() {
//!         clock.set(deadline);
//!     }
//! }
//! assert_eq!(player.position(), 44_100);
//! assert_eq!(player.duration(), 44_100);
//! ```
pub mod bank;
pub mod binutil;
pub mod chip;
pub mod decoder;
pub mod error;
pub mod event;
pub mod gep;
pub mod player;
pub mod source;
pub mod timing;
pub mod vgm;

pub use bank::{BankConfig, OverflowPolicy, SampleBank};
pub use chip::{ChipBus, ChipWrite};
pub use decoder::CommandDecoder;
pub use error::{Error, Result};
pub use event::{ChipFlags, Event, Format, StreamInfo};
pub use gep::{GepBuilder, GepDecoder};
pub use player::{Player, PlayerConfig, PlayerState};
pub use source::{ByteSource, ChunkedSource, FixedSource, StreamedSource};
pub use timing::{Clock, ManualClock, SystemClock, TimingEngine};
pub use vgm::VgmDecoder;
