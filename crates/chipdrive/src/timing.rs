//! Sample-clock scheduling.
//!
//! Streams express time in samples of a 44.1 kHz clock. The
//! [`TimingEngine`] keeps a running total of the samples scheduled so far
//! and compares it with the time elapsed since playback started. It never
//! sleeps: the host calls [`crate::Player::tick`] as often as it likes and
//! the engine only reports whether the pending wait has elapsed.
//!
//! Because deadlines are derived from the running total (not from "now"
//! plus the last wait), a late tick never accumulates drift: the next
//! tick simply finds several waits due at once.
use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

pub const SAMPLE_RATE: u32 = 44_100;

/// Samples in one 60 Hz frame.
pub const FRAME_SAMPLES: u32 = 735;

/// Convert microseconds to whole samples.
///
/// Split so the intermediate product stays small on 32-bit targets.
pub fn micros_to_samples(micros: u64) -> u64 {
    (micros / 10_000) * 441 + ((micros % 10_000) * 441) / 10_000
}

/// Earliest microsecond at which `samples` samples have elapsed.
pub fn samples_to_micros(samples: u64) -> u64 {
    (samples * 10_000).div_ceil(441)
}

/// Monotonic microsecond time source.
pub trait Clock {
    fn now_micros(&self) -> u64;
}

/// Wall clock based on [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_micros(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// A clock advanced by hand. Clones share the same time.
///
/// ```
/// use chipdrive::timing::{Clock, ManualClock};
///
/// let clock = ManualClock::new();
/// let handle = clock.clone();
/// handle.advance(16_667);
/// assert_eq!(clock.now_micros(), 16_667);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock(Rc<Cell<u64>>);

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, micros: u64) {
        self.0.set(micros);
    }

    pub fn advance(&self, micros: u64) {
        self.0.set(self.0.get() + micros);
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> u64 {
        self.0.get()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_micros(&self) -> u64 {
        (**self).now_micros()
    }
}

/// Tracks scheduled samples against elapsed time.
#[derive(Debug, Clone, Default)]
pub struct TimingEngine {
    /// Clock reading that corresponds to sample 0.
    anchor: u64,
    scheduled: u64,
    paused_at: Option<u64>,
}

impl TimingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start counting from `now` with nothing scheduled.
    pub fn start(&mut self, now: u64) {
        self.anchor = now;
        self.scheduled = 0;
        self.paused_at = None;
    }

    /// Drop everything scheduled and make the next step due at `now`,
    /// keeping the paused state.
    pub fn restart(&mut self, now: u64) {
        self.anchor = now;
        self.scheduled = 0;
        if self.paused_at.is_some() {
            self.paused_at = Some(now);
        }
    }

    /// Add a wait to the schedule.
    pub fn schedule(&mut self, samples: u32) {
        self.scheduled += samples as u64;
    }

    pub fn scheduled_samples(&self) -> u64 {
        self.scheduled
    }

    /// Samples elapsed since start, not counting paused time.
    pub fn elapsed_samples(&self, now: u64) -> u64 {
        let at = self.paused_at.unwrap_or(now);
        micros_to_samples(at.saturating_sub(self.anchor))
    }

    /// The scheduled waits have all elapsed.
    pub fn is_due(&self, now: u64) -> bool {
        self.paused_at.is_none() && self.elapsed_samples(now) >= self.scheduled
    }

    /// Clock reading at which the next step becomes due, `None` while
    /// paused.
    pub fn next_deadline_micros(&self) -> Option<u64> {
        match self.paused_at {
            Some(_) => None,
            None => Some(self.anchor + samples_to_micros(self.scheduled)),
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    pub fn pause(&mut self, now: u64) {
        if self.paused_at.is_none() {
            self.paused_at = Some(now);
        }
    }

    /// Resume, shifting the anchor by the paused duration.
    pub fn resume(&mut self, now: u64) {
        if let Some(at) = self.paused_at.take() {
            self.anchor += now.saturating_sub(at);
        }
    }
}
