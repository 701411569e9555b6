//! Transport control and event routing.
//!
//! A [`Player`] owns at most one playback session (a decoder over a byte
//! source) and forwards decoded writes to its [`ChipBus`] when the
//! [`TimingEngine`] says they are due.
//!
//! ```text
//! Idle -> Loading -> Playing <-> Paused
//!                       |
//!                       v
//!                    Finished
//! ```
//!
//! `stop` (or a decode error) returns to `Idle` from any state.
use log::{debug, warn};

use crate::bank::BankConfig;
use crate::chip::ChipBus;
use crate::decoder::{self, CommandDecoder};
use crate::error::{Error, Result};
use crate::event::{ChipFlags, Event, StreamInfo};
use crate::source::ByteSource;
use crate::timing::{Clock, TimingEngine};

/// Transport state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Loading,
    Playing,
    Paused,
    Finished,
}

/// Player configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerConfig {
    /// Jump back to the loop point at stream end (when the stream has one).
    pub looping: bool,
    /// Finish after this many wraps.
    pub max_loops: Option<u32>,
    /// Upper bound on decode steps per tick. Work beyond the bound is
    /// deferred to the next tick, never dropped. `Some(0)` is treated as
    /// `None`.
    pub max_steps_per_tick: Option<u32>,
    pub bank: BankConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            looping: true,
            max_loops: None,
            max_steps_per_tick: None,
            bank: BankConfig::default(),
        }
    }
}

enum Step {
    Waiting,
    Finished,
}

struct Session<'a> {
    decoder: Box<dyn CommandDecoder + 'a>,
    /// Samples into the song; restored to `loop_start` on every wrap.
    position: u64,
    /// Samples played since start, across loops.
    elapsed: u64,
    loop_start: Option<u64>,
    loop_count: u32,
    /// Samples released since the last wrap (or start).
    since_wrap: u64,
}

/// Drives a [`ChipBus`] from a command stream.
///
/// ```
/// use chipdrive::chip::{BusWrite, RecordingBus};
/// use chipdrive::player::{Player, PlayerConfig, PlayerState};
/// use chipdrive::source::FixedSource;
/// use chipdrive::timing::ManualClock;
///
/// let mut image = b"GEP\x01".to_vec();
/// image.extend_from_slice(&[0x02, 0x00, 0x01, 0x00]);
/// image.extend_from_slice(&735u32.to_le_bytes());
/// image.extend_from_slice(&[0xFF, 0xFF, 0x00, 0x00]);
/// image.extend_from_slice(&[0x01, 0x28, 0xF1]);
/// image.extend_from_slice(&[0x40, 0x90, 0xFF]);
///
/// let clock = ManualClock::new();
/// let mut player = Player::new(RecordingBus::new(), clock.clone(), PlayerConfig::default());
/// player.start(FixedSource::new(&image)).unwrap();
/// player.bus_mut().take();
///
/// player.tick().unwrap();
/// assert_eq!(player.bus().writes(), &[BusWrite::Fm { port: 0, register: 0x28, value: 0xF1 }]);
///
/// clock.advance(16_667);
/// assert_eq!(player.tick().unwrap(), PlayerState::Finished);
/// assert_eq!(player.position(), 735);
/// ```
pub struct Player<'a, B: ChipBus, C: Clock> {
    bus: B,
    clock: C,
    config: PlayerConfig,
    state: PlayerState,
    timing: TimingEngine,
    session: Option<Session<'a>>,
}

impl<'a, B: ChipBus, C: Clock> Player<'a, B, C> {
    pub fn new(bus: B, clock: C, config: PlayerConfig) -> Self {
        Self {
            bus,
            clock,
            config,
            state: PlayerState::Idle,
            timing: TimingEngine::new(),
            session: None,
        }
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn into_bus(self) -> B {
        self.bus
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Begin playing `source`, replacing any current session.
    ///
    /// On failure the player is left `Idle` and the error is returned.
    pub fn start<S: ByteSource + 'a>(&mut self, source: S) -> Result<()> {
        if self.session.take().is_some() {
            self.bus.mute_all();
        }
        self.state = PlayerState::Loading;
        let decoder = match decoder::open(source, self.config.bank) {
            Ok(decoder) => decoder,
            Err(e) => {
                self.state = PlayerState::Idle;
                return Err(e);
            }
        };
        self.start_decoder(decoder);
        Ok(())
    }

    /// Begin playing an already opened decoder.
    pub fn start_decoder(&mut self, decoder: Box<dyn CommandDecoder + 'a>) {
        if self.session.is_some() {
            self.bus.mute_all();
        }
        let info = decoder.info();
        debug!(
            "session start: {:?}, chips {:?}, {} samples, loop {}",
            info.format, info.chips, info.total_samples, info.has_loop
        );
        self.session = Some(Session {
            decoder,
            position: 0,
            elapsed: 0,
            loop_start: None,
            loop_count: 0,
            since_wrap: 0,
        });
        self.bus.mute_all();
        self.timing.start(self.clock.now_micros());
        self.state = PlayerState::Playing;
    }

    /// Release every event that is due. Returns the state afterwards.
    pub fn tick(&mut self) -> Result<PlayerState> {
        if self.state != PlayerState::Playing {
            return Ok(self.state);
        }
        let now = self.clock.now_micros();
        let mut steps = 0u32;
        while self.timing.is_due(now) {
            if self
                .config
                .max_steps_per_tick
                .is_some_and(|max| max > 0 && steps >= max)
            {
                break;
            }
            steps += 1;
            match self.step() {
                Ok(Step::Waiting) => {}
                Ok(Step::Finished) => break,
                Err(e) => {
                    self.fail();
                    return Err(e);
                }
            }
        }
        Ok(self.state)
    }

    /// Decode up to and including the next non-zero wait.
    fn step(&mut self) -> Result<Step> {
        let Some(session) = self.session.as_mut() else {
            return Ok(Step::Finished);
        };
        loop {
            match session.decoder.next_event()? {
                Event::Write(write) => self.bus.write(write),
                Event::DacSample(value) => self.bus.write_dac(value),
                Event::Wait(0) => {}
                Event::Wait(samples) => {
                    session.position += samples as u64;
                    session.elapsed += samples as u64;
                    session.since_wrap += samples as u64;
                    self.timing.schedule(samples);
                    return Ok(Step::Waiting);
                }
                Event::LoopMarker => {
                    session.loop_start = Some(session.position);
                }
                Event::End => {
                    let can_loop = self.config.looping && session.decoder.info().has_loop;
                    let limit_hit = self
                        .config
                        .max_loops
                        .is_some_and(|max| session.loop_count >= max);
                    if !can_loop || limit_hit {
                        break;
                    }
                    if session.since_wrap == 0 {
                        warn!("loop body contains no waits, stopping instead of spinning");
                        break;
                    }
                    if !session.decoder.seek_to_loop()? {
                        return Err(Error::InvalidReference(
                            "loop point was never reached".to_string(),
                        ));
                    }
                    session.loop_count += 1;
                    session.position = session.loop_start.unwrap_or(0);
                    session.since_wrap = 0;
                    debug!(
                        "loop {} from sample {}",
                        session.loop_count, session.position
                    );
                }
            }
        }
        self.finish();
        Ok(Step::Finished)
    }

    fn finish(&mut self) {
        debug!("playback finished at sample {}", self.position());
        self.bus.mute_all();
        self.state = PlayerState::Finished;
    }

    fn fail(&mut self) {
        self.bus.mute_all();
        self.session = None;
        self.state = PlayerState::Idle;
    }

    pub fn pause(&mut self) {
        if self.state == PlayerState::Playing {
            self.timing.pause(self.clock.now_micros());
            self.bus.mute_all();
            self.state = PlayerState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == PlayerState::Paused {
            self.timing.resume(self.clock.now_micros());
            self.state = PlayerState::Playing;
        }
    }

    /// End the session and return to `Idle`.
    pub fn stop(&mut self) {
        if self.session.take().is_some() {
            self.bus.mute_all();
        }
        self.timing = TimingEngine::new();
        self.state = PlayerState::Idle;
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.config.looping = looping;
    }

    /// Jump to the loop point.
    ///
    /// When the loop point has already been passed the decoder seeks back
    /// to it. Otherwise the stream is decoded ahead until the loop point:
    /// register writes on the way are released at once, waits are counted
    /// but not scheduled and DAC samples are dropped. A finished session
    /// resumes playing.
    ///
    /// Without a session or a loop point the call fails and nothing
    /// changes. A decode error while skipping ahead ends the session.
    pub fn seek_to_loop(&mut self) -> Result<()> {
        match self.info() {
            None => return Err(Error::InvalidReference("no active session".to_string())),
            Some(info) if !info.has_loop => {
                return Err(Error::InvalidReference(
                    "stream has no loop point".to_string(),
                ));
            }
            Some(_) => {}
        }
        let result = self.seek_to_loop_inner();
        if result.is_err() {
            self.fail();
        }
        result
    }

    fn seek_to_loop_inner(&mut self) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Ok(());
        };
        self.bus.mute_all();
        let start = session.loop_start;
        let seeked = start.is_some() && session.decoder.seek_to_loop()?;
        match (seeked, start) {
            (true, Some(start)) => session.position = start,
            _ => loop {
                match session.decoder.next_event()? {
                    Event::Wait(samples) => session.position += samples as u64,
                    Event::LoopMarker => {
                        session.loop_start = Some(session.position);
                        break;
                    }
                    Event::End => {
                        return Err(Error::InvalidReference(
                            "stream ended before its loop point".to_string(),
                        ));
                    }
                    // Register state must match a normal pass through the skipped part.
                    Event::Write(write) => self.bus.write(write),
                    Event::DacSample(_) => {}
                }
            },
        }
        session.since_wrap = 0;
        self.timing.restart(self.clock.now_micros());
        if self.state == PlayerState::Finished {
            self.state = PlayerState::Playing;
        }
        Ok(())
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    /// Samples into the song.
    pub fn position(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.position)
    }

    /// Samples played since start, including looped passes.
    pub fn elapsed(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.elapsed)
    }

    /// Declared duration of the stream in samples.
    pub fn duration(&self) -> u64 {
        self.info().map_or(0, |i| i.total_samples as u64)
    }

    pub fn loop_count(&self) -> u32 {
        self.session.as_ref().map_or(0, |s| s.loop_count)
    }

    pub fn chips(&self) -> ChipFlags {
        self.info().map_or(ChipFlags::empty(), |i| i.chips)
    }

    pub fn info(&self) -> Option<&StreamInfo> {
        self.session.as_ref().map(|s| s.decoder.info())
    }

    /// Clock reading at which the next tick has work to do.
    pub fn next_deadline_micros(&self) -> Option<u64> {
        match self.state {
            PlayerState::Playing => self.timing.next_deadline_micros(),
            _ => None,
        }
    }
}
