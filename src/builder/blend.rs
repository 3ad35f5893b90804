use std::{f64::consts::FRAC_PI_2, sync::Arc};

use crate::{
    error::Error,
    wavetable::{replicate_frames, MAX_TABLE_SAMPLES, REPLICATED_TABLE_SAMPLES},
};

use super::TableBuilder;

// -------------------------------------------------------------------------------------------------

/// Producer-side blender feeding a [`TableBuilder`].
///
/// Holds up to two mono source wavetables of exactly
/// [`MAX_TABLE_SAMPLES`] samples. Whenever a source or the mix position
/// changes, the sources are blended with equal-power weights, the result is
/// triple-replicated into the builder's slot and committed. With a single
/// source loaded it passes through at unity gain; with none, nothing is
/// committed and whatever table is currently published stays in use.
///
/// Runs on the editor thread. Bursts of edits are absorbed by the
/// builder's debounce.
pub struct WaveBlender {
    builder: Arc<TableBuilder>,
    tables: [Vec<f32>; 2],
    mix: f64,
    mix_buf: Vec<f32>,
}

impl WaveBlender {
    /// Number of source table slots.
    pub const NUM_SLOTS: usize = 2;

    /// Create a blender feeding the given builder.
    pub fn new(builder: Arc<TableBuilder>) -> Self {
        Self {
            builder,
            tables: [Vec::new(), Vec::new()],
            mix: 0.5,
            mix_buf: vec![0.0; MAX_TABLE_SAMPLES],
        }
    }

    /// Load a source table into one of the two slots and rebuild.
    ///
    /// The table must be mono and exactly [`MAX_TABLE_SAMPLES`] samples
    /// long; anything else empties the slot, is logged and reported, and
    /// leaves audio running on the remaining data.
    pub fn set_table(
        &mut self,
        slot: usize,
        channel_count: usize,
        samples: &[f32],
    ) -> Result<(), Error> {
        if slot >= Self::NUM_SLOTS {
            return Err(Error::ParameterError(format!(
                "table slot {slot} out of range"
            )));
        }
        if channel_count != 1 || samples.len() != MAX_TABLE_SAMPLES {
            log::warn!(
                "wavetable for slot {slot} must be mono with {MAX_TABLE_SAMPLES} samples \
                 (got {channel_count} channels, {} samples)",
                samples.len()
            );
            self.tables[slot] = Vec::new();
            self.rebuild();
            return Err(Error::ConfigError(format!(
                "wavetable must be mono with {MAX_TABLE_SAMPLES} samples"
            )));
        }
        self.tables[slot] = samples.to_vec();
        self.rebuild();
        Ok(())
    }

    /// Empty one of the source slots and rebuild from the remaining one.
    pub fn clear_table(&mut self, slot: usize) {
        if slot < Self::NUM_SLOTS {
            self.tables[slot] = Vec::new();
            self.rebuild();
        }
    }

    /// Number of samples loaded in the given slot; 0 while it is empty.
    pub fn table_len(&self, slot: usize) -> usize {
        self.tables[slot].len()
    }

    /// Set the blend position between the two sources and rebuild.
    /// 0 plays slot 0 alone, 1 plays slot 1 alone.
    pub fn set_mix(&mut self, mix: f64) {
        let mix = mix.clamp(0.0, 1.0);
        if (self.mix - mix).abs() > 1e-6 {
            self.mix = mix;
            self.rebuild();
        }
    }

    /// The current blend position.
    pub fn mix(&self) -> f64 {
        self.mix
    }

    /// Blend the loaded sources, triple-replicate the result into the
    /// builder slot and commit it.
    fn rebuild(&mut self) {
        let has_0 = !self.tables[0].is_empty();
        let has_1 = !self.tables[1].is_empty();
        if !has_0 && !has_1 {
            return;
        }

        // equal-power weights when both sources are present
        let (gain_0, gain_1) = if has_0 && has_1 {
            let angle = self.mix * FRAC_PI_2;
            (angle.cos() as f32, angle.sin() as f32)
        } else if has_0 {
            (1.0, 0.0)
        } else {
            (0.0, 1.0)
        };

        self.mix_buf.fill(0.0);
        if has_0 {
            for (mix, sample) in self.mix_buf.iter_mut().zip(self.tables[0].iter()) {
                *mix += *sample * gain_0;
            }
        }
        if has_1 {
            for (mix, sample) in self.mix_buf.iter_mut().zip(self.tables[1].iter()) {
                *mix += *sample * gain_1;
            }
        }

        {
            let mut slot = self.builder.write_slot();
            if slot.len() != REPLICATED_TABLE_SAMPLES {
                log::error!(
                    "table builder slot holds {} samples, expected {REPLICATED_TABLE_SAMPLES}",
                    slot.len()
                );
                return;
            }
            replicate_frames(&self.mix_buf, &mut slot);
        }
        self.builder.commit_slot();
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wavetable::{FRAME_LEN, NUM_MIP_LEVELS, REPLICATED_FRAME_LEN};

    fn test_blender() -> WaveBlender {
        let builder = Arc::new(TableBuilder::new(REPLICATED_TABLE_SAMPLES, NUM_MIP_LEVELS));
        WaveBlender::new(builder)
    }

    #[test]
    fn rejects_malformed_tables() {
        let mut blender = test_blender();
        // wrong length
        assert!(matches!(
            blender.set_table(0, 1, &vec![0.0; MAX_TABLE_SAMPLES / 2]),
            Err(Error::ConfigError(_))
        ));
        assert_eq!(blender.table_len(0), 0);
        // not mono
        assert!(blender
            .set_table(0, 2, &vec![0.0; MAX_TABLE_SAMPLES])
            .is_err());
        assert_eq!(blender.table_len(0), 0);
        // bad slot index
        assert!(matches!(
            blender.set_table(2, 1, &vec![0.0; MAX_TABLE_SAMPLES]),
            Err(Error::ParameterError(_))
        ));
    }

    #[test]
    fn malformed_table_keeps_other_slot_running() {
        let mut blender = test_blender();
        blender
            .set_table(0, 1, &vec![0.25; MAX_TABLE_SAMPLES])
            .unwrap();
        // a bad upload into slot 1 empties that slot but re-commits slot 0
        assert!(blender.set_table(1, 1, &vec![0.0; 123]).is_err());
        assert_eq!(blender.table_len(0), MAX_TABLE_SAMPLES);
        assert_eq!(blender.table_len(1), 0);
        // the committed slot carries slot 0 at unity gain
        let slot = blender.builder.write_slot();
        assert_eq!(slot[FRAME_LEN / 2], 0.25);
    }

    #[test]
    fn single_table_passes_through_replicated() {
        let mut blender = test_blender();
        let mut table = vec![0.0f32; MAX_TABLE_SAMPLES];
        for (index, sample) in table.iter_mut().enumerate() {
            *sample = (index % FRAME_LEN) as f32 / FRAME_LEN as f32;
        }
        blender.set_table(0, 1, &table).unwrap();

        let slot = blender.builder.write_slot();
        // frame 1's block holds three copies of frame 1
        let block = &slot[REPLICATED_FRAME_LEN..2 * REPLICATED_FRAME_LEN];
        let frame = &table[FRAME_LEN..2 * FRAME_LEN];
        assert_eq!(&block[..FRAME_LEN], frame);
        assert_eq!(&block[FRAME_LEN..2 * FRAME_LEN], frame);
        assert_eq!(&block[2 * FRAME_LEN..], frame);
    }

    #[test]
    fn blends_with_equal_power_weights() {
        let mut blender = test_blender();
        blender
            .set_table(0, 1, &vec![1.0; MAX_TABLE_SAMPLES])
            .unwrap();
        blender
            .set_table(1, 1, &vec![-1.0; MAX_TABLE_SAMPLES])
            .unwrap();

        blender.set_mix(0.0);
        assert_eq!(blender.builder.write_slot()[0], 1.0);

        blender.set_mix(1.0);
        let value = blender.builder.write_slot()[0];
        assert!((value - -1.0).abs() < 1e-6, "mix 1 plays slot 1: {value}");

        blender.set_mix(0.5);
        let value = blender.builder.write_slot()[0];
        let expected = (std::f64::consts::FRAC_PI_4.cos() - std::f64::consts::FRAC_PI_4.sin())
            as f32;
        assert!(
            (value - expected).abs() < 1e-6,
            "equal-power midpoint: {value} vs {expected}"
        );
    }
}
