//! Example driving a Player with a hand-built GEP stream
//!
//! Builds a short looping tune with a DAC drum hit, plays it twice around
//! the loop on a virtual clock and prints every write the bus receives.

use chipdrive::chip::{ChipBus, ChipWrite, key_on_off};
use chipdrive::gep::GepBuilder;
use chipdrive::player::{Player, PlayerConfig, PlayerState};
use chipdrive::source::FixedSource;
use chipdrive::timing::{FRAME_SAMPLES, ManualClock};

/// Prints writes as they arrive.
struct PrintBus {
    sample: u64,
}

impl ChipBus for PrintBus {
    fn write_fm(&mut self, port: u8, register: u8, value: u8) {
        println!(
            "{:>8}  YM2612 Port={} Reg=0x{:02X} Val=0x{:02X}",
            self.sample, port, register, value
        );
    }

    fn write_tone(&mut self, value: u8) {
        println!("{:>8}  SN76489 Val=0x{:02X}", self.sample, value);
    }

    fn write_dac(&mut self, value: u8) {
        println!("{:>8}  DAC {}", self.sample, value);
    }
}

fn build_tune() -> Vec<u8> {
    let mut builder = GepBuilder::new();

    // Channel 0 setup, played once
    builder.add_write(ChipWrite::fm(0, 0xA4, 0x22));
    builder.add_write(ChipWrite::fm(0, 0xA0, 0x69));
    builder.add_write(ChipWrite::fm(0, 0x2B, 0x80)); // DAC on
    builder.set_loop_point();

    // Looped bar: note on, short drum hit, note off
    builder.add_write(key_on_off(0, true));
    builder.add_write(ChipWrite::psg(0x90));
    for offset in 0..4 {
        builder.add_dac(offset);
        builder.add_wait(2);
    }
    builder.add_wait(FRAME_SAMPLES * 10);
    builder.add_write(key_on_off(0, false));
    builder.add_write(ChipWrite::psg(0x9F));
    builder.add_wait(FRAME_SAMPLES * 10);

    builder.set_pcm(vec![0x80, 0xFF, 0x00, 0x80]);
    builder.finalize().expect("tune encodes")
}

fn main() {
    println!("Player Demo\n");

    let image = build_tune();
    println!("GEP image: {} bytes\n", image.len());

    let clock = ManualClock::new();
    let config = PlayerConfig {
        max_loops: Some(2),
        ..PlayerConfig::default()
    };
    let mut player = Player::new(PrintBus { sample: 0 }, clock.clone(), config);
    player
        .start(FixedSource::new(&image))
        .expect("stream opens");

    loop {
        let position = player.position();
        player.bus_mut().sample = position;
        match player.tick().expect("stream decodes") {
            PlayerState::Playing => {}
            state => {
                println!("\nstate: {:?}", state);
                break;
            }
        }
        if let Some(deadline) = player.next_deadline_micros() {
            clock.set(deadline);
        }
    }

    println!(
        "played {} samples over {} loops",
        player.elapsed(),
        player.loop_count()
    );
}
