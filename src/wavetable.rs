//! Wavetable layout constants and helpers.
//!
//! A wavetable holds up to [`MAX_FRAMES`] single-cycle waveforms of
//! [`FRAME_LEN`] samples each. In memory every frame is replicated three
//! times back to back, and playback happens in the middle copy: this leaves
//! a full cycle of valid data on either side of any playback position, so
//! the resampler's FIR lookback never needs modular arithmetic.

// -------------------------------------------------------------------------------------------------

/// Number of samples in a single wavetable cycle.
pub const FRAME_LEN: usize = 2048;

/// Maximum number of frames in a wavetable.
pub const MAX_FRAMES: usize = 256;

/// Total sample count of a full, non-replicated wavetable.
pub const MAX_TABLE_SAMPLES: usize = FRAME_LEN * MAX_FRAMES;

/// Size of one triple-replicated frame block.
pub const REPLICATED_FRAME_LEN: usize = FRAME_LEN * 3;

/// Total sample count of a triple-replicated wavetable.
pub const REPLICATED_TABLE_SAMPLES: usize = MAX_TABLE_SAMPLES * 3;

/// Number of mipmap levels built for a wavetable. Level 0 is the source,
/// level k is decimated by 2^k.
pub const NUM_MIP_LEVELS: usize = 12;

// -------------------------------------------------------------------------------------------------

/// Start of the playable (middle) window of the given frame within a
/// triple-replicated table.
#[inline]
pub fn frame_start(frame: usize) -> i64 {
    debug_assert!(frame < MAX_FRAMES);
    (frame * REPLICATED_FRAME_LEN + FRAME_LEN) as i64
}

/// Triple-replicate all frames of `table` into `replicated`.
///
/// `table` must hold [`MAX_TABLE_SAMPLES`] samples and `replicated` must
/// hold [`REPLICATED_TABLE_SAMPLES`] samples.
pub fn replicate_frames(table: &[f32], replicated: &mut [f32]) {
    assert_eq!(table.len(), MAX_TABLE_SAMPLES);
    assert_eq!(replicated.len(), REPLICATED_TABLE_SAMPLES);

    for (src, dst) in table
        .chunks_exact(FRAME_LEN)
        .zip(replicated.chunks_exact_mut(REPLICATED_FRAME_LEN))
    {
        dst[..FRAME_LEN].copy_from_slice(src);
        dst[FRAME_LEN..2 * FRAME_LEN].copy_from_slice(src);
        dst[2 * FRAME_LEN..].copy_from_slice(src);
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_starts() {
        assert_eq!(frame_start(0), FRAME_LEN as i64);
        assert_eq!(frame_start(1), (REPLICATED_FRAME_LEN + FRAME_LEN) as i64);
        assert_eq!(
            frame_start(MAX_FRAMES - 1),
            ((MAX_FRAMES - 1) * REPLICATED_FRAME_LEN + FRAME_LEN) as i64
        );
    }

    #[test]
    fn replication_layout() {
        let mut table = vec![0.0; MAX_TABLE_SAMPLES];
        for (index, value) in table.iter_mut().enumerate() {
            *value = (index / FRAME_LEN) as f32 + (index % FRAME_LEN) as f32 / FRAME_LEN as f32;
        }
        let mut replicated = vec![0.0; REPLICATED_TABLE_SAMPLES];
        replicate_frames(&table, &mut replicated);

        for frame in [0, 1, 17, MAX_FRAMES - 1] {
            let block = &replicated[frame * REPLICATED_FRAME_LEN..][..REPLICATED_FRAME_LEN];
            let source = &table[frame * FRAME_LEN..][..FRAME_LEN];
            assert_eq!(&block[..FRAME_LEN], source);
            assert_eq!(&block[FRAME_LEN..2 * FRAME_LEN], source);
            assert_eq!(&block[2 * FRAME_LEN..], source);
            // the playable window starts at the middle copy
            let start = frame_start(frame) as usize;
            assert_eq!(replicated[start], source[0]);
        }
    }
}
