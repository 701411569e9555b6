use anyhow::{Context, Result, ensure};

use chipdrive::bank::{BankConfig, OverflowPolicy};
use chipdrive::event::Event;
use chipdrive::gep::GepBuilder;
use chipdrive::source::FixedSource;
use chipdrive::vgm::{VGM_MAGIC, VgmDecoder};
use chipdrive::CommandDecoder;

/// Re-encode a VGM image as GEP.
///
/// Every data block is loaded into memory and each DAC sample is recorded
/// by its offset into the combined payload.
pub fn vgm_to_gep(data: &[u8], dpcm: bool, chunk_size: Option<usize>) -> Result<Vec<u8>> {
    ensure!(data.starts_with(&VGM_MAGIC), "input is not a VGM stream");
    // A payload cannot be larger than the file holding it.
    let bank = BankConfig {
        capacity: data.len(),
        overflow: OverflowPolicy::Reject,
    };
    let mut dec = VgmDecoder::open(FixedSource::new(data), bank).context("failed to open VGM")?;

    let mut builder = GepBuilder::new();
    builder.set_dpcm(dpcm);
    builder.set_max_chunk_size(chunk_size);

    let mut events = 0usize;
    loop {
        let event = dec
            .next_event()
            .with_context(|| format!("decode failed at 0x{:X}", dec.stream_position()))?;
        events += 1;
        match event {
            Event::Write(w) => builder.add_write(w),
            Event::Wait(n) => builder.add_wait(n),
            Event::DacSample(_) => builder.add_dac(dec.bank().offset().saturating_sub(1)),
            Event::LoopMarker => builder.set_loop_point(),
            Event::End => break,
        }
    }
    let pcm = dec.bank().resident_data().to_vec();
    log::info!("{} events, {} bytes of PCM", events, pcm.len());
    builder.set_pcm(pcm);

    Ok(builder.finalize()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chipdrive::chip::ChipWrite;
    use chipdrive::decoder;
    use chipdrive::gep::GEP_MAGIC;

    fn vgm(commands: &[u8], loop_at: usize) -> Vec<u8> {
        let mut out = vec![0u8; 0x40];
        out[..4].copy_from_slice(&VGM_MAGIC);
        let eof = (0x40 + commands.len() - 4) as u32;
        out[0x04..0x08].copy_from_slice(&eof.to_le_bytes());
        out[0x08..0x0C].copy_from_slice(&0x150u32.to_le_bytes());
        out[0x0C..0x10].copy_from_slice(&3_579_545u32.to_le_bytes());
        out[0x1C..0x20].copy_from_slice(&((0x40 + loop_at - 0x1C) as u32).to_le_bytes());
        out[0x2C..0x30].copy_from_slice(&7_670_453u32.to_le_bytes());
        out[0x34..0x38].copy_from_slice(&0x0Cu32.to_le_bytes());
        out.extend_from_slice(commands);
        out
    }

    /// Events up to `End` with adjacent waits merged.
    fn events(image: &[u8]) -> Vec<Event> {
        let mut dec = decoder::open(FixedSource::new(image), BankConfig::default()).unwrap();
        let mut out: Vec<Event> = Vec::new();
        loop {
            let event = dec.next_event().unwrap();
            match (out.last_mut(), event) {
                (Some(Event::Wait(prev)), Event::Wait(n)) => *prev += n,
                _ => out.push(event),
            }
            if event == Event::End {
                return out;
            }
        }
    }

    const COMMANDS: [u8; 30] = [
        0x67, 0x66, 0x00, 0x04, 0x00, 0x00, 0x00, 10, 20, 30, 40, // data block
        0x52, 0x28, 0xF0, // key on
        0x50, 0x9F, // tone
        0xE0, 0x01, 0x00, 0x00, 0x00, // PCM seek
        0x81, // DAC + wait 1
        0x62, // frame
        0x53, 0x30, 0x71, // loop point (offset 23)
        0x61, 0x10, 0x00, // wait 16
        0x66, // end
    ];

    #[test]
    fn converted_stream_plays_the_same_events() {
        let source = vgm(&COMMANDS, 23);
        let image = vgm_to_gep(&source, false, None).unwrap();
        assert!(image.starts_with(&GEP_MAGIC));

        let expected = vec![
            Event::Write(ChipWrite::fm(0, 0x28, 0xF0)),
            Event::Write(ChipWrite::psg(0x9F)),
            Event::DacSample(20),
            Event::Wait(736),
            Event::LoopMarker,
            Event::Write(ChipWrite::fm(1, 0x30, 0x71)),
            Event::Wait(16),
            Event::End,
        ];
        assert_eq!(events(&source), expected);
        assert_eq!(events(&image), expected);
    }

    #[test]
    fn chunked_conversion_keeps_the_loop() {
        let source = vgm(&COMMANDS, 23);
        let image = vgm_to_gep(&source, false, Some(4)).unwrap();
        let dec = decoder::open(FixedSource::new(&image), BankConfig::default()).unwrap();
        assert!(dec.info().has_loop);
        assert_eq!(dec.info().total_samples, 752);
        assert_eq!(dec.info().pcm_samples, 4);
    }

    #[test]
    fn rejects_other_formats() {
        assert!(vgm_to_gep(b"GEP\x01 not a vgm", false, None).is_err());
    }
}
