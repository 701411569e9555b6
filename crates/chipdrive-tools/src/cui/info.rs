use std::path::Path;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, ContentArrangement, Table, presets::NOTHING};

use chipdrive::bank::BankConfig;
use chipdrive::gep::{GEP_MAGIC, GepDecoder};
use chipdrive::source::FixedSource;
use chipdrive::vgm::{VGM_MAGIC, VgmDecoder};
use chipdrive::{CommandDecoder, SampleBank, StreamInfo};

use crate::cui::{chip_names, format_samples};

fn clock(hz: u32) -> String {
    match hz {
        0 => "-".to_string(),
        hz => format!("{} Hz", hz),
    }
}

fn stream_rows(rows: &mut Vec<(String, String)>, info: &StreamInfo, bank: &SampleBank) {
    rows.push(("chips".into(), chip_names(info.chips)));
    rows.push((
        "duration".into(),
        format!(
            "{} samples ({})",
            info.total_samples,
            format_samples(info.total_samples as u64)
        ),
    ));
    rows.push(("loops".into(), if info.has_loop { "yes" } else { "no" }.into()));
    let pcm = if bank.is_streaming() {
        format!("{} samples (streamed)", info.pcm_samples)
    } else {
        format!(
            "{} samples ({} bytes resident)",
            info.pcm_samples,
            bank.resident_len()
        )
    };
    rows.push(("DAC payload".into(), pcm));
}

/// Print a summary table for a VGM or GEP image.
pub fn print_info(path: &Path, data: &[u8]) -> Result<()> {
    let mut rows: Vec<(String, String)> = vec![
        ("file".into(), path.display().to_string()),
        ("size".into(), format!("{} bytes", data.len())),
    ];

    if data.starts_with(&VGM_MAGIC) {
        let dec = VgmDecoder::open(FixedSource::new(data), BankConfig::default())
            .with_context(|| format!("failed to open VGM file: {}", path.display()))?;
        let h = dec.header();
        rows.push(("format".into(), "VGM".into()));
        rows.push((
            "version".into(),
            format!("{:X}.{:02X}", h.version >> 8, h.version & 0xFF),
        ));
        rows.push(("YM2612 clock".into(), clock(h.ym2612_clock)));
        rows.push(("SN76489 clock".into(), clock(h.sn76489_clock)));
        rows.push(("data offset".into(), format!("0x{:X}", h.data_offset)));
        rows.push((
            "loop offset".into(),
            match h.loop_offset {
                Some(at) => format!("0x{:X} ({} samples)", at, h.loop_samples),
                None => "none".into(),
            },
        ));
        stream_rows(&mut rows, dec.info(), dec.bank());
    } else if data.starts_with(&GEP_MAGIC) {
        let dec = GepDecoder::open(FixedSource::new(data), BankConfig::default())
            .with_context(|| format!("failed to open GEP file: {}", path.display()))?;
        let h = dec.header();
        rows.push(("format".into(), "GEP".into()));
        rows.push(("flags".into(), format!("{:?}", h.flags)));
        rows.push((
            "dictionary".into(),
            format!("{} entries", dec.dictionary().len()),
        ));
        rows.push(("patterns".into(), dec.patterns().len().to_string()));
        rows.push(("PCM blocks".into(), h.pcm_blocks.to_string()));
        rows.push((
            "loop point".into(),
            match h.loop_point {
                Some((chunk, offset)) => format!("chunk {} offset 0x{:X}", chunk, offset),
                None => "none".into(),
            },
        ));
        stream_rows(&mut rows, dec.info(), dec.bank());
    } else {
        bail!("{}: neither a VGM nor a GEP stream", path.display());
    }

    let mut table = Table::new();
    table.load_preset(NOTHING);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![Cell::new("Field"), Cell::new("Value")]);
    for (key, value) in rows {
        table.add_row(vec![Cell::new(key), Cell::new(value)]);
    }
    println!("{}", table);
    Ok(())
}
