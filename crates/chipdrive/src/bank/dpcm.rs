//! 4-bit delta coding for DAC payloads.
//!
//! Stored layout: the first byte is the initial sample, every following
//! byte carries two delta codes (high nibble first). Each code indexes
//! [`DPCM_STEPS`] and the step is added to a running accumulator that is
//! clamped to `0..=255`.

/// Delta applied for each 4-bit code.
pub const DPCM_STEPS: [i16; 16] = [-34, -21, -13, -8, -5, -3, -1, 0, 1, 3, 5, 8, 13, 21, 34, 55];

/// Code for a zero delta, used to pad an odd sample count.
const ZERO_CODE: u8 = 7;

/// Apply one delta code to `acc`.
pub fn step(acc: u8, code: u8) -> u8 {
    let next = acc as i16 + DPCM_STEPS[(code & 0x0F) as usize];
    next.clamp(0, 255) as u8
}

/// Number of samples a stored payload of `stored_len` bytes decodes to.
pub fn decoded_len(stored_len: usize) -> usize {
    match stored_len {
        0 => 0,
        n => 1 + 2 * (n - 1),
    }
}

/// Delta code for logical sample `index` (`index >= 1`) of a payload,
/// given the stored byte that holds it.
pub fn code_for(index: usize, stored: u8) -> u8 {
    if (index - 1) % 2 == 0 {
        stored >> 4
    } else {
        stored & 0x0F
    }
}

/// Stored byte position holding the code for logical sample `index >= 1`.
pub fn stored_index(index: usize) -> usize {
    1 + (index - 1) / 2
}

/// Encode raw samples, picking the closest step greedily.
pub fn encode(samples: &[u8]) -> Vec<u8> {
    let Some((&first, rest)) = samples.split_first() else {
        return Vec::new();
    };
    let mut out = Vec::with_capacity(1 + rest.len().div_ceil(2));
    out.push(first);
    let mut acc = first;
    for pair in rest.chunks(2) {
        let mut codes = [ZERO_CODE; 2];
        for (slot, &target) in codes.iter_mut().zip(pair) {
            let wanted = target as i16 - acc as i16;
            let best = (0..16u8)
                .min_by_key(|&code| (wanted - DPCM_STEPS[code as usize]).abs())
                .unwrap_or(ZERO_CODE);
            acc = step(acc, best);
            *slot = best;
        }
        out.push((codes[0] << 4) | codes[1]);
    }
    out
}

/// Decode a whole stored payload.
pub fn decode(stored: &[u8]) -> Vec<u8> {
    let Some((&first, rest)) = stored.split_first() else {
        return Vec::new();
    };
    let mut out = Vec::with_capacity(decoded_len(stored.len()));
    let mut acc = first;
    out.push(acc);
    for &byte in rest {
        for code in [byte >> 4, byte & 0x0F] {
            acc = step(acc, code);
            out.push(acc);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_clamps_instead_of_wrapping() {
        assert_eq!(step(250, 15), 255);
        assert_eq!(step(10, 0), 0);
        assert_eq!(step(128, 7), 128);
    }

    #[test]
    fn decode_reads_high_nibble_first() {
        // initial 100, then +55 (0xF) and -1 (0x6)
        assert_eq!(decode(&[100, 0xF6]), vec![100, 155, 154]);
        assert_eq!(decoded_len(2), 3);
    }

    #[test]
    fn encode_tracks_a_smooth_wave() {
        let wave: Vec<u8> = (0..200)
            .map(|i| (128.0 + 60.0 * (i as f64 * std::f64::consts::TAU / 64.0).sin()) as u8)
            .collect();
        let decoded = decode(&encode(&wave));
        assert_eq!(decoded.len(), wave.len() + 1);
        for (got, want) in decoded.iter().zip(&wave) {
            assert!((*got as i16 - *want as i16).abs() <= 8, "{got} vs {want}");
        }
    }
}
