//! `chipdrive` command line tools.
//!
//! Inspect, dump, play and convert VGM / GEP streams with the `chipdrive`
//! engine. Playback drives a logging bus instead of real chips, so the
//! output shows every register write at the sample it was released.
mod cui;

use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use flate2::read::GzDecoder;
use log::LevelFilter;

use chipdrive::bank::{self, BankConfig, OverflowPolicy};

/// How `play` feeds the stream to the decoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    /// Whole file in one buffer.
    Fixed,
    /// File split into equally sized buffers.
    Chunked,
    /// Read from disk through a small window.
    Stream,
}

/// What the sample bank does with payloads larger than its capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Overflow {
    /// Refuse to play.
    Reject,
    /// Play without DAC samples.
    Disable,
    /// Read samples from the source on demand.
    Stream,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show a summary of a VGM or GEP file (.vgz is accepted)
    Info {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// List the decoded events with their sample positions
    Dump {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Stop after this many events
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Play a file on a logging bus
    Play {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Pace playback with the wall clock instead of jumping to each deadline
        #[arg(long)]
        realtime: bool,

        /// Byte source backing the decoder
        #[arg(long, value_enum, default_value_t = SourceKind::Fixed)]
        source: SourceKind,

        /// Buffer size for `--source chunked`
        #[arg(long, default_value_t = 4096)]
        chunk_size: usize,

        /// Sample bank capacity in bytes
        #[arg(long, default_value_t = bank::DEFAULT_CAPACITY)]
        bank_capacity: usize,

        /// Policy for sample payloads that exceed the bank capacity
        #[arg(long, value_enum, default_value_t = Overflow::Disable)]
        overflow: Overflow,

        /// Window size for `--overflow stream`
        #[arg(long, default_value_t = bank::DEFAULT_WINDOW)]
        window: usize,

        /// Jump back to the loop point at the end of the stream
        #[arg(long = "loop")]
        looping: bool,

        /// Stop after this many loops
        #[arg(long)]
        max_loops: Option<u32>,

        /// Process the file without printing register writes
        #[arg(long)]
        dry_run: bool,
    },
    /// Convert a VGM file to GEP
    Convert {
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        /// Store DAC samples delta coded (lossy, about half the size)
        #[arg(long)]
        dpcm: bool,

        /// Split the command stream into chunks of about this many bytes
        #[arg(long)]
        chunk_size: Option<usize>,
    },
}

#[derive(Parser, Debug)]
#[command(
    name = "chipdrive",
    version = env!("CARGO_PKG_VERSION"),
    about = env!("CARGO_PKG_DESCRIPTION"),
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

/// Read a file, transparently gunzipping `.vgz`/`.gz` or anything that
/// starts with the gzip magic.
pub(crate) fn load_bytes_from_path(path: &Path) -> Result<Vec<u8>> {
    let data =
        fs::read(path).with_context(|| format!("failed to read file: {}", path.display()))?;
    if !is_gzip(path, &data) {
        return Ok(data);
    }
    let mut decoder = GzDecoder::new(Cursor::new(data));
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .with_context(|| format!("gzip decompression failed: {}", path.display()))?;
    Ok(out)
}

/// `.vgz` or `.gz`.
pub(crate) fn has_gzip_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .is_some_and(|s| s.eq_ignore_ascii_case("vgz") || s.eq_ignore_ascii_case("gz"))
}

fn is_gzip(path: &Path, data: &[u8]) -> bool {
    has_gzip_extension(path) || data.starts_with(&[0x1f, 0x8b])
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        3.. => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match cli.command {
        Commands::Info { file } => {
            let bytes = load_bytes_from_path(&file)?;
            cui::info::print_info(&file, &bytes)?;
        }
        Commands::Dump { file, limit } => {
            let bytes = load_bytes_from_path(&file)?;
            cui::dump::dump_events(&bytes, limit)?;
        }
        Commands::Play {
            file,
            realtime,
            source,
            chunk_size,
            bank_capacity,
            overflow,
            window,
            looping,
            max_loops,
            dry_run,
        } => {
            let overflow = match overflow {
                Overflow::Reject => OverflowPolicy::Reject,
                Overflow::Disable => OverflowPolicy::DisableDac,
                Overflow::Stream => OverflowPolicy::Stream { window },
            };
            let options = cui::play::PlayOptions {
                realtime,
                source: match source {
                    SourceKind::Fixed => cui::play::Backing::Fixed,
                    SourceKind::Chunked => cui::play::Backing::Chunked(chunk_size),
                    SourceKind::Stream => cui::play::Backing::Stream,
                },
                bank: BankConfig {
                    capacity: bank_capacity,
                    overflow,
                },
                looping,
                max_loops,
                dry_run,
            };
            cui::play::play_file(&file, &options)?;
        }
        Commands::Convert {
            input,
            output,
            dpcm,
            chunk_size,
        } => {
            let bytes = load_bytes_from_path(&input)?;
            let image = cui::convert::vgm_to_gep(&bytes, dpcm, chunk_size)
                .with_context(|| format!("failed to convert {}", input.display()))?;
            fs::write(&output, &image)
                .with_context(|| format!("failed to write {}", output.display()))?;
            println!(
                "{} -> {} ({} bytes -> {} bytes)",
                input.display(),
                output.display(),
                bytes.len(),
                image.len()
            );
        }
    }

    Ok(())
}
