use anyhow::{Context, Result};

use chipdrive::bank::BankConfig;
use chipdrive::chip::{ChipWrite, YM2612_DAC_ENABLE, YM2612_KEY_ON_OFF};
use chipdrive::decoder;
use chipdrive::event::Event;
use chipdrive::source::FixedSource;

/// One register write, e.g. `YM2612 P0 0x28=0xF0 (key)`.
pub(crate) fn describe_write(write: &ChipWrite) -> String {
    match write {
        ChipWrite::Ym2612(s) => {
            let note = match s.register {
                YM2612_KEY_ON_OFF => " (key)",
                YM2612_DAC_ENABLE => " (DAC enable)",
                _ => "",
            };
            format!(
                "YM2612 P{} 0x{:02X}=0x{:02X}{}",
                s.port, s.register, s.value, note
            )
        }
        ChipWrite::Psg(s) => format!("SN76489 0x{:02X}", s.value),
    }
}

fn describe_event(event: &Event) -> String {
    match event {
        Event::Write(w) => describe_write(w),
        Event::Wait(n) => format!("wait {}", n),
        Event::DacSample(v) => format!("DAC 0x{:02X}", v),
        Event::LoopMarker => "loop point".to_string(),
        Event::End => "end".to_string(),
    }
}

/// Decode `data` once from start to end and print every event with the
/// sample position it is released at.
pub fn dump_events(data: &[u8], limit: Option<usize>) -> Result<()> {
    let mut dec = decoder::open(FixedSource::new(data), BankConfig::default())
        .context("failed to open stream")?;
    let info = dec.info().clone();

    println!("{:<12} {:<10} Event", "Sample", "Offset");
    println!("{}", "-".repeat(60));

    let mut sample: u64 = 0;
    let mut count = 0usize;
    loop {
        if limit.is_some_and(|l| count >= l) {
            println!("... stopped after {} events", count);
            break;
        }
        let offset = dec.stream_position();
        let event = dec
            .next_event()
            .with_context(|| format!("decode failed after {} events", count))?;
        count += 1;
        println!(
            "{:<12} 0x{:<8X} {}",
            sample,
            offset,
            describe_event(&event)
        );
        match event {
            Event::Wait(n) => sample += n as u64,
            Event::End => break,
            _ => {}
        }
    }

    println!("{}", "-".repeat(60));
    println!(
        "{} events, {} of {} samples, format {:?}",
        count, sample, info.total_samples, info.format
    );
    Ok(())
}
