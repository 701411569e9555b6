mod common;

use chipdrive::bank::{BankConfig, OverflowPolicy, PcmEncoding, SampleBank, dpcm};
use chipdrive::chip::ChipWrite;
use chipdrive::gep::GepBuilder;
use chipdrive::source::{ChunkedSource, FixedSource};
use chipdrive::{ChipFlags, Error, Event, decoder};
use common::{GepImage, decode_all};
use pretty_assertions::assert_eq;

fn wave(len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| (128.0 + 90.0 * (i as f64 / 11.0).sin()) as u8)
        .collect()
}

/// A stream playing every sample of `pcm` once forward, then a few
/// backwards jumps.
fn dac_stream(pcm: &[u8], dpcm: bool) -> Vec<u8> {
    let mut b = GepBuilder::new();
    b.set_pcm(pcm.to_vec());
    b.set_dpcm(dpcm);
    b.add_write(ChipWrite::fm(0, 0x2B, 0x80));
    for offset in 0..pcm.len() {
        b.add_dac(offset);
        b.add_wait(2);
    }
    for offset in [pcm.len() / 2, 3, pcm.len() - 1, 0] {
        b.add_dac(offset);
        b.add_wait(5);
    }
    b.finalize().unwrap()
}

fn dac_samples(events: &[Event]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::DacSample(v) => Some(*v),
            _ => None,
        })
        .collect()
}

#[test]
fn reject_policy_fails_the_load() {
    let image = dac_stream(&wave(500), false);
    let bank = BankConfig {
        capacity: 100,
        overflow: OverflowPolicy::Reject,
    };
    match decoder::open(FixedSource::new(&image), bank) {
        Err(Error::CapacityExceeded { needed, capacity }) => {
            assert_eq!(needed, 500);
            assert_eq!(capacity, 100);
        }
        Err(e) => panic!("unexpected error {e}"),
        Ok(_) => panic!("load should have been refused"),
    }
}

#[test]
fn disable_policy_keeps_timing() {
    let pcm = wave(500);
    let image = dac_stream(&pcm, false);
    let full = decode_all(FixedSource::new(&image), BankConfig::default()).unwrap();
    let bank = BankConfig {
        capacity: 100,
        overflow: OverflowPolicy::DisableDac,
    };
    let dec = decoder::open(FixedSource::new(&image), bank).unwrap();
    assert!(!dec.info().chips.contains(ChipFlags::DAC));
    assert_eq!(dec.info().pcm_samples, 0);
    assert!(!dec.bank().is_enabled());
    let reduced = decode_all(FixedSource::new(&image), bank).unwrap();

    let total = |events: &[Event]| -> u64 {
        events
            .iter()
            .map(|e| match e {
                Event::Wait(n) => *n as u64,
                _ => 0,
            })
            .sum()
    };
    assert_eq!(total(&reduced), total(&full));
    assert!(dac_samples(&reduced).is_empty());
    assert!(reduced.contains(&Event::Write(ChipWrite::fm(0, 0x2B, 0x80))));
}

#[test]
fn zero_capacity_build_discards_payloads() {
    let image = GepImage::new(&[0xB6, 0xC2, 0xFF]).pcm(&[&[1, 2, 3]]).build();
    let bank = BankConfig {
        capacity: 0,
        overflow: OverflowPolicy::DisableDac,
    };
    assert_eq!(
        decode_all(FixedSource::new(&image), bank).unwrap(),
        vec![Event::Wait(2), Event::End]
    );
}

#[test]
fn stream_policy_matches_resident_playback() {
    for dpcm in [false, true] {
        let pcm = wave(700);
        let image = dac_stream(&pcm, dpcm);
        let resident = decode_all(FixedSource::new(&image), BankConfig::default()).unwrap();
        for window in [1, 8, 64] {
            let bank = BankConfig {
                capacity: 64,
                overflow: OverflowPolicy::Stream { window },
            };
            let dec = decoder::open(ChunkedSource::split(&image, 13), bank).unwrap();
            assert!(dec.bank().is_streaming());
            assert_eq!(dec.bank().resident_len(), 0);
            let streamed = decode_all(ChunkedSource::split(&image, 13), bank).unwrap();
            assert_eq!(streamed, resident, "dpcm {dpcm} window {window}");
        }
        if !dpcm {
            assert_eq!(&dac_samples(&resident)[..pcm.len()], &pcm[..]);
        }
    }
}

#[test]
fn segments_share_one_address_space() {
    let data = [1u8, 2, 3, 100, 0x8F, 9, 8];
    let mut src = FixedSource::new(&data);
    let mut bank = SampleBank::new(BankConfig::default());
    bank.load_segment(&mut src, 3, PcmEncoding::Raw).unwrap();
    bank.load_segment(&mut src, 2, PcmEncoding::Dpcm).unwrap();
    bank.load_segment(&mut src, 2, PcmEncoding::Raw).unwrap();
    // 3 raw + 3 decoded + 2 raw
    assert_eq!(bank.len(), 8);

    let mut all = Vec::new();
    bank.seek(&mut src, 0).unwrap();
    for _ in 0..bank.len() {
        all.push(bank.read(&mut src).unwrap());
    }
    // 100, +1 (code 8), +55 (code 15)
    assert_eq!(all, vec![1, 2, 3, 100, 101, 156, 9, 8]);
    assert!(matches!(bank.read(&mut src), Err(Error::InvalidReference(_))));

    bank.seek(&mut src, 5).unwrap();
    assert_eq!(bank.read(&mut src).unwrap(), 156);
    bank.seek(&mut src, 4).unwrap();
    assert_eq!(bank.read(&mut src).unwrap(), 101);
    assert!(matches!(bank.seek(&mut src, 8), Err(Error::InvalidReference(_))));
}

#[test]
fn restored_cursor_continues_delta_decoding() {
    let pcm = wave(41);
    let stored = dpcm::encode(&pcm);
    let expect = dpcm::decode(&stored);
    let mut src = FixedSource::new(&stored);
    let mut bank = SampleBank::new(BankConfig::default());
    bank.load_segment(&mut src, stored.len(), PcmEncoding::Dpcm)
        .unwrap();

    bank.seek(&mut src, 10).unwrap();
    let saved = bank.cursor();
    assert_eq!(saved.offset(), 10);
    let run: Vec<u8> = (0..5).map(|_| bank.read(&mut src).unwrap()).collect();
    assert_eq!(run, expect[10..15].to_vec());

    bank.restore(saved);
    let again: Vec<u8> = (0..5).map(|_| bank.read(&mut src).unwrap()).collect();
    assert_eq!(again, run);
}
