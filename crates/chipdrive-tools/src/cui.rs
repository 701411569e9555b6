pub mod convert;
pub mod dump;
pub mod info;
pub mod play;

use chipdrive::ChipFlags;

/// Short chip list for display, e.g. `YM2612 + SN76489 + DAC`.
pub(crate) fn chip_names(chips: ChipFlags) -> String {
    let names: Vec<&str> = [
        (ChipFlags::YM2612, "YM2612"),
        (ChipFlags::SN76489, "SN76489"),
        (ChipFlags::DAC, "DAC"),
    ]
    .into_iter()
    .filter(|(flag, _)| chips.contains(*flag))
    .map(|(_, name)| name)
    .collect();
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(" + ")
    }
}

/// `m:ss.mmm` for a sample count at 44.1 kHz.
pub(crate) fn format_samples(samples: u64) -> String {
    let millis = samples * 1000 / chipdrive::timing::SAMPLE_RATE as u64;
    format!(
        "{}:{:02}.{:03}",
        millis / 60_000,
        millis / 1000 % 60,
        millis % 1000
    )
}
