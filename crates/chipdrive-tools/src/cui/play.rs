use std::io::Cursor;
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};

use chipdrive::bank::BankConfig;
use chipdrive::chip::{ChipBus, ChipWrite};
use chipdrive::event::Format;
use chipdrive::player::{Player, PlayerConfig, PlayerState};
use chipdrive::source::{ByteSource, ChunkedSource, FixedSource, StreamedSource};
use chipdrive::timing::{Clock, ManualClock, SystemClock};

use crate::cui::dump::describe_write;
use crate::cui::{chip_names, format_samples};

/// Loops played on the virtual clock when looping has no explicit limit.
const VIRTUAL_LOOP_LIMIT: u32 = 2;

/// How the file reaches the decoder.
#[derive(Debug, Clone, Copy)]
pub enum Backing {
    Fixed,
    Chunked(usize),
    Stream,
}

#[derive(Debug, Clone, Copy)]
pub struct PlayOptions {
    pub realtime: bool,
    pub source: Backing,
    pub bank: BankConfig,
    pub looping: bool,
    pub max_loops: Option<u32>,
    pub dry_run: bool,
}

/// Bus that prints every write with the sample it was released at.
struct LogBus {
    sample: u64,
    dry_run: bool,
    writes: u64,
    dac_samples: u64,
}

impl LogBus {
    fn new(dry_run: bool) -> Self {
        Self {
            sample: 0,
            dry_run,
            writes: 0,
            dac_samples: 0,
        }
    }

    fn log(&self, line: &str) {
        if self.dry_run {
            return;
        }
        println!("{:<12} {}", self.sample, line);
    }
}

impl ChipBus for LogBus {
    fn write_fm(&mut self, port: u8, register: u8, value: u8) {
        self.writes += 1;
        self.log(&describe_write(&ChipWrite::fm(port, register, value)));
    }

    fn write_tone(&mut self, value: u8) {
        self.writes += 1;
        self.log(&describe_write(&ChipWrite::psg(value)));
    }

    fn write_dac(&mut self, value: u8) {
        // DAC samples only go to the trace log.
        self.dac_samples += 1;
        log::trace!("{:<12} DAC 0x{:02X}", self.sample, value);
    }

    fn mute_all(&mut self) {
        self.log("mute all channels");
    }
}

/// Play `path` on a logging bus.
pub fn play_file(path: &Path, options: &PlayOptions) -> Result<()> {
    match options.source {
        Backing::Fixed => {
            let data = crate::load_bytes_from_path(path)?;
            play(path, FixedSource::new(&data), options)
        }
        Backing::Chunked(size) => {
            let data = crate::load_bytes_from_path(path)?;
            let source = ChunkedSource::split(&data, size.max(1));
            log::info!("{} chunks of up to {} bytes", source.chunk_count(), size);
            play(path, source, options)
        }
        Backing::Stream if crate::has_gzip_extension(path) => {
            // Compressed files cannot be windowed; inflate first.
            let data = crate::load_bytes_from_path(path)?;
            play(path, StreamedSource::new(Cursor::new(data))?, options)
        }
        Backing::Stream => {
            let source = StreamedSource::open(path)
                .with_context(|| format!("failed to open {}", path.display()))?;
            play(path, source, options)
        }
    }
}

fn play<'a, S: ByteSource + 'a>(path: &Path, source: S, options: &PlayOptions) -> Result<()> {
    let mut config = PlayerConfig {
        looping: options.looping,
        max_loops: options.max_loops,
        max_steps_per_tick: None,
        bank: options.bank,
    };
    if options.looping && options.max_loops.is_none() && !options.realtime {
        log::warn!(
            "looping on the virtual clock without --max-loops, stopping after {} loops",
            VIRTUAL_LOOP_LIMIT
        );
        config.max_loops = Some(VIRTUAL_LOOP_LIMIT);
    }
    let bus = LogBus::new(options.dry_run);

    if options.realtime {
        let clock = SystemClock::new();
        let mut player = Player::new(bus, clock, config);
        run(path, &mut player, source, options.dry_run, |deadline| {
            let now = clock.now_micros();
            if deadline > now {
                thread::sleep(Duration::from_micros(deadline - now));
            }
        })
    } else {
        let clock = ManualClock::new();
        let handle = clock.clone();
        let mut player = Player::new(bus, clock, config);
        run(path, &mut player, source, options.dry_run, |deadline| {
            handle.set(deadline)
        })
    }
}

fn run<'a, C: Clock, S: ByteSource + 'a>(
    path: &Path,
    player: &mut Player<'a, LogBus, C>,
    source: S,
    dry_run: bool,
    mut wait_until: impl FnMut(u64),
) -> Result<()> {
    player
        .start(source)
        .with_context(|| format!("failed to open stream: {}", path.display()))?;

    if !dry_run {
        if let Some(info) = player.info() {
            let format = match info.format {
                Format::Vgm => "VGM",
                Format::Gep => "GEP",
            };
            println!("=== {} File: {} ===", format, path.display());
            println!("Chips: {}", chip_names(info.chips));
            println!(
                "Total Samples: {} ({})",
                info.total_samples,
                format_samples(info.total_samples as u64)
            );
            println!("Loop: {}", if info.has_loop { "yes" } else { "no" });
            println!("DAC Samples: {}", info.pcm_samples);
        }
        println!();
        println!("Register Write Log:");
        println!("{:<12} Register Write", "Sample");
        println!("{}", "-".repeat(100));
    }

    loop {
        // Writes released by this tick precede its wait, so they belong to
        // the position reached by the previous one.
        let position = player.position();
        player.bus_mut().sample = position;
        let state = player.tick().with_context(|| {
            format!("{}: playback failed at sample {}", path.display(), position)
        })?;
        if state != PlayerState::Playing {
            break;
        }
        if let Some(deadline) = player.next_deadline_micros() {
            wait_until(deadline);
        }
    }

    let bus = player.bus();
    if !dry_run {
        println!();
        println!("=== Playback Complete ===");
        println!(
            "Position: {} ({})",
            player.position(),
            format_samples(player.position())
        );
        println!(
            "Elapsed: {} ({})",
            player.elapsed(),
            format_samples(player.elapsed())
        );
        println!("Loops: {}", player.loop_count());
        println!("Register Writes: {}", bus.writes);
        println!("DAC Samples: {}", bus.dac_samples);
    }
    log::info!(
        "{}: {} samples, {} loops, {} writes, {} DAC samples",
        path.display(),
        player.elapsed(),
        player.loop_count(),
        bus.writes,
        bus.dac_samples
    );
    Ok(())
}
