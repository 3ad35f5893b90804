#![allow(dead_code, unused_macros)]

pub mod buffer;

use crate::resampler::BITS_PER_OCTAVE;

// -------------------------------------------------------------------------------------------------

macro_rules! assert_eq_with_epsilon {
    ($x:expr, $y:expr, $d:expr) => {
        if !($x - $y < $d || $y - $x < $d) {
            panic!();
        }
    };
}

// -------------------------------------------------------------------------------------------------

/// Convert a pitch offset in semitones to the engine's fixed-point pitch unit,
/// where one octave equals `1 << BITS_PER_OCTAVE`.
#[inline]
pub fn semitones_to_pitch_bits(semitones: f64) -> i32 {
    (semitones * (1u32 << BITS_PER_OCTAVE) as f64 / 12.0).round() as i32
}

/// Convert a playback rate multiplier to a semitone offset.
#[inline]
pub fn multiplier_to_semitones(multiplier: f64) -> f64 {
    debug_assert!(multiplier > 0.0);
    12.0 * multiplier.log2()
}

/// Convert a detune amount in cents to semitones.
#[inline]
pub fn cents_to_semitones(cents: f64) -> f64 {
    cents / 100.0
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pitch_bit_conversion() {
        assert_eq!(semitones_to_pitch_bits(0.0), 0);
        assert_eq!(semitones_to_pitch_bits(12.0), 1 << BITS_PER_OCTAVE);
        assert_eq!(semitones_to_pitch_bits(-12.0), -(1 << BITS_PER_OCTAVE as i32));
        assert_eq!(semitones_to_pitch_bits(1.0), 5461);
    }

    #[test]
    fn multiplier_conversion() {
        assert_eq_with_epsilon!(multiplier_to_semitones(2.0), 12.0, 1e-9);
        assert_eq_with_epsilon!(multiplier_to_semitones(0.5), -12.0, 1e-9);
        assert_eq_with_epsilon!(multiplier_to_semitones(1.0), 0.0, 1e-9);
        assert_eq_with_epsilon!(cents_to_semitones(50.0), 0.5, 1e-9);
    }
}
