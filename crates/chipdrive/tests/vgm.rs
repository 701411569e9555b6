mod common;

use chipdrive::bank::{BankConfig, OverflowPolicy};
use chipdrive::chip::ChipWrite;
use chipdrive::source::FixedSource;
use chipdrive::vgm::VgmDecoder;
use chipdrive::{ChipFlags, CommandDecoder, Error, Event};
use common::{VgmImage, decode_all, decode_bytes};
use pretty_assertions::assert_eq;

/// 0x67 block of YM2612 PCM.
fn data_block(samples: &[u8]) -> Vec<u8> {
    let mut out = vec![0x67, 0x66, 0x00];
    out.extend_from_slice(&(samples.len() as u32).to_le_bytes());
    out.extend_from_slice(samples);
    out
}

#[test]
fn writes_and_waits() {
    let image = VgmImage::new(&[
        0x50, 0x9F, // PSG
        0x52, 0x28, 0xF0, // FM port 0
        0x53, 0x30, 0x71, // FM port 1
        0x61, 0x10, 0x27, // 10000 samples
        0x62, 0x63, 0x70, 0x7F, 0x66,
    ])
    .build();
    assert_eq!(
        decode_bytes(&image).unwrap(),
        vec![
            Event::Write(ChipWrite::psg(0x9F)),
            Event::Write(ChipWrite::fm(0, 0x28, 0xF0)),
            Event::Write(ChipWrite::fm(1, 0x30, 0x71)),
            Event::Wait(10_000),
            Event::Wait(735),
            Event::Wait(882),
            Event::Wait(1),
            Event::Wait(16),
            Event::End
        ]
    );
}

#[test]
fn zero_wait_is_dropped() {
    let image = VgmImage::new(&[0x61, 0x00, 0x00, 0x70, 0x66]).build();
    assert_eq!(
        decode_bytes(&image).unwrap(),
        vec![Event::Wait(1), Event::End]
    );
}

#[test]
fn header_fields_reach_stream_info() {
    let image = VgmImage::new(&[0x62, 0x66]).total(735).loop_at(0).build();
    let dec = VgmDecoder::open(FixedSource::new(&image), BankConfig::default()).unwrap();
    let info = dec.info();
    assert_eq!(info.total_samples, 735);
    assert!(info.has_loop);
    assert_eq!(info.chips, ChipFlags::YM2612 | ChipFlags::SN76489);
    assert_eq!(dec.header().version, 0x150);
    assert_eq!(dec.header().data_offset, 0x40);

    let image = VgmImage::new(&[0x66]).clocks(3_579_545, 0).build();
    let dec = VgmDecoder::open(FixedSource::new(&image), BankConfig::default()).unwrap();
    assert_eq!(dec.info().chips, ChipFlags::SN76489);
}

#[test]
fn fm_only_log_from_before_1_10_is_played() {
    let mut image = VgmImage::new(&[0x52, 0x28, 0xF0, 0x62, 0x66])
        .clocks(0, 0)
        .build();
    image[0x08..0x0C].copy_from_slice(&0x101u32.to_le_bytes());
    image[0x10..0x14].copy_from_slice(&7_670_453u32.to_le_bytes());
    let dec = VgmDecoder::open(FixedSource::new(&image), BankConfig::default()).unwrap();
    assert_eq!(dec.info().chips, ChipFlags::YM2612);
    assert_eq!(dec.header().ym2612_clock, 7_670_453);
    assert_eq!(
        decode_bytes(&image).unwrap(),
        vec![
            Event::Write(ChipWrite::fm(0, 0x28, 0xF0)),
            Event::Wait(735),
            Event::End
        ]
    );
}

#[test]
fn pcm_block_feeds_dac_commands() {
    let mut commands = data_block(&[10, 20, 30, 40]);
    commands.extend_from_slice(&[
        0x80, // 10
        0x82, // 20, wait 2
        0xE0, 0x03, 0x00, 0x00, 0x00, // seek to 40
        0x81, 0x66,
    ]);
    let image = VgmImage::new(&commands).build();
    let dec = VgmDecoder::open(FixedSource::new(&image), BankConfig::default()).unwrap();
    assert_eq!(dec.info().pcm_samples, 4);
    assert!(dec.info().chips.contains(ChipFlags::DAC));
    let events: Vec<Event> = dec.collect::<Result<_, _>>().unwrap();
    assert_eq!(
        events,
        vec![
            Event::DacSample(10),
            Event::DacSample(20),
            Event::Wait(2),
            Event::DacSample(40),
            Event::Wait(1),
            Event::End
        ]
    );
}

#[test]
fn dac_commands_without_samples_only_wait() {
    let image = VgmImage::new(&[0x80, 0x82, 0xE0, 0x03, 0x00, 0x00, 0x00, 0x66]).build();
    assert_eq!(
        decode_bytes(&image).unwrap(),
        vec![Event::Wait(2), Event::End]
    );
}

#[test]
fn pcm_seek_past_payload_is_invalid() {
    let mut commands = data_block(&[1, 2, 3]);
    commands.extend_from_slice(&[0xE0, 0x03, 0x00, 0x00, 0x00, 0x66]);
    let image = VgmImage::new(&commands).build();
    assert!(matches!(decode_bytes(&image), Err(Error::InvalidReference(_))));
}

#[test]
fn oversized_block_disables_dac() {
    let mut commands = data_block(&[0x80; 32]);
    commands.extend_from_slice(&[0x50, 0x9F, 0x83, 0x66]);
    let image = VgmImage::new(&commands).build();
    let bank = BankConfig {
        capacity: 8,
        overflow: OverflowPolicy::DisableDac,
    };
    let dec = VgmDecoder::open(FixedSource::new(&image), bank).unwrap();
    assert!(!dec.info().chips.contains(ChipFlags::DAC));
    let events: Vec<Event> = dec.collect::<Result<_, _>>().unwrap();
    assert_eq!(
        events,
        vec![Event::Write(ChipWrite::psg(0x9F)), Event::Wait(3), Event::End]
    );
}

#[test]
fn loop_marker_and_seek_back() {
    let image = VgmImage::new(&[0x62, 0x50, 0x9F, 0x62, 0x66])
        .loop_at(1)
        .build();
    let mut dec = VgmDecoder::open(FixedSource::new(&image), BankConfig::default()).unwrap();
    let first: Vec<Event> = (0..5).map(|_| dec.next_event().unwrap()).collect();
    assert_eq!(
        first,
        vec![
            Event::Wait(735),
            Event::LoopMarker,
            Event::Write(ChipWrite::psg(0x9F)),
            Event::Wait(735),
            Event::End
        ]
    );
    // End repeats until repositioned.
    assert_eq!(dec.next_event().unwrap(), Event::End);
    assert!(dec.seek_to_loop().unwrap());
    let again: Vec<Event> = (0..4).map(|_| dec.next_event().unwrap()).collect();
    assert_eq!(again, first[1..].to_vec());
}

#[test]
fn loop_into_leading_data_block_does_not_reload_it() {
    let mut commands = data_block(&[7, 8]);
    commands.extend_from_slice(&[0x80, 0x81, 0x66]);
    // loop offset points at the data block itself
    let image = VgmImage::new(&commands).loop_at(0).build();
    let mut dec = VgmDecoder::open(FixedSource::new(&image), BankConfig::default()).unwrap();
    for _ in 0..3 {
        assert_eq!(dec.next_event().unwrap(), Event::LoopMarker);
        assert_eq!(dec.next_event().unwrap(), Event::DacSample(7));
        assert_eq!(dec.next_event().unwrap(), Event::DacSample(8));
        assert_eq!(dec.next_event().unwrap(), Event::Wait(1));
        assert_eq!(dec.next_event().unwrap(), Event::End);
        assert!(dec.seek_to_loop().unwrap());
        assert_eq!(dec.bank().len(), 2);
    }
}

#[test]
fn block_inside_loop_is_loaded_once() {
    let mut commands = vec![0x70];
    commands.extend(data_block(&[5, 6, 7]));
    commands.extend_from_slice(&[0x80, 0x66]);
    let image = VgmImage::new(&commands).loop_at(0).build();
    let mut dec = VgmDecoder::open(FixedSource::new(&image), BankConfig::default()).unwrap();
    for _ in 0..3 {
        assert_eq!(dec.next_event().unwrap(), Event::LoopMarker);
        assert_eq!(dec.next_event().unwrap(), Event::Wait(1));
        assert_eq!(dec.next_event().unwrap(), Event::DacSample(5));
        assert_eq!(dec.next_event().unwrap(), Event::End);
        assert!(dec.seek_to_loop().unwrap());
    }
    assert_eq!(dec.bank().len(), 3);
    assert_eq!(dec.info().pcm_samples, 3);
}

#[test]
fn commands_for_other_chips_are_skipped() {
    let image = VgmImage::new(&[
        0x4F, 0x00, // Game Gear stereo
        0x54, 0x01, 0x02, // YM2151
        0xB0, 0x00, 0x00, // RF5C68
        0xC0, 0x00, 0x00, 0x00, // Sega PCM
        0xE1, 0x00, 0x00, 0x00, 0x00, // C352
        0x90, 0x00, 0x02, 0x00, 0x2A, // DAC stream setup
        0x91, 0x00, 0x00, 0x01, 0x2A, // DAC stream data
        0x68, 0x66, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, // PCM RAM write
        0x70, 0x66,
    ])
    .build();
    assert_eq!(
        decode_bytes(&image).unwrap(),
        vec![Event::Wait(1), Event::End]
    );
}

#[test]
fn unknown_opcode_reports_offset() {
    for op in [0x20u8, 0x64, 0x96] {
        let image = VgmImage::new(&[0x70, op, 0x66]).build();
        match decode_bytes(&image) {
            Err(Error::UnknownOpcode { opcode, offset }) => {
                assert_eq!(opcode, op);
                assert_eq!(offset, 0x41);
            }
            other => panic!("0x{op:02X}: expected UnknownOpcode, got {other:?}"),
        }
    }
}

#[test]
fn truncated_command_is_reported() {
    let image = VgmImage::new(&[0x52, 0x28]).build();
    assert!(matches!(
        decode_bytes(&image),
        Err(Error::TruncatedStream { offset: 0x42, .. })
    ));
}

#[test]
fn stream_without_end_marker_ends_cleanly() {
    let image = VgmImage::new(&[0x62]).build();
    assert_eq!(
        decode_bytes(&image).unwrap(),
        vec![Event::Wait(735), Event::End]
    );
}

#[test]
fn malformed_headers() {
    let image = VgmImage::new(&[0x66]).clocks(0, 0).build();
    assert!(matches!(decode_bytes(&image), Err(Error::MalformedHeader(_))));

    assert!(matches!(
        decode_bytes(b"Vgm \0\0\0\0"),
        Err(Error::MalformedHeader(_))
    ));

    assert!(matches!(
        decode_all(FixedSource::new(b"Vg"), BankConfig::default()),
        Err(Error::MalformedHeader(_))
    ));

    // loop offset beyond the file
    let image = VgmImage::new(&[0x66]).loop_at(10).build();
    assert!(matches!(decode_bytes(&image), Err(Error::MalformedHeader(_))));
}
