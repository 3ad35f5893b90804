use std::sync::Arc;

use basedrop::Shared;

use crate::utils::buffer::clear_buffer;

use super::{
    halfband::HalfBandFilter,
    interpolator::InterpPack,
    mipmap::{MipMap, MipMapLevel},
    BITS_PER_OCTAVE, FADE_LEN,
};

// -------------------------------------------------------------------------------------------------

/// Playback state of one voice within a mipmap level.
///
/// `pos` and `step` are 64-bit fixed-point values with 32 integer and 32
/// fractional bits, expressed in the level's own sample domain: a source
/// position maps into level `table` by an arithmetic shift of the whole
/// fixed-point value.
#[derive(Clone, Copy)]
struct LaneVoice {
    table: usize,
    pos: i64,
    step: i64,
}

impl LaneVoice {
    fn new() -> Self {
        Self {
            table: 0,
            pos: 0,
            step: 1 << 32,
        }
    }

    /// Derive the per-sample step from the pitch: `2^(pitch_in_level /
    /// 2^BITS_PER_OCTAVE)` where `pitch_in_level` is the pitch relative to
    /// this voice's mipmap level.
    fn compute_step(&mut self, pitch: i32) {
        let pitch_in_level = pitch - ((self.table as i32) << BITS_PER_OCTAVE);
        let step = (pitch_in_level as f64 / (1u32 << BITS_PER_OCTAVE) as f64).exp2();
        self.step = (step * 4294967296.0).round() as i64;
    }
}

// -------------------------------------------------------------------------------------------------

/// A single lane of band-limited fractional playback over a shared mipmap.
///
/// The lane selects the mipmap level from the playback pitch so that the
/// effective step stays below one octave within the level. When a pitch
/// change crosses a level boundary, or when the mipmap itself is replaced
/// mid-playback, the lane duplicates its playback state into a fade-out
/// voice and crossfades to the new one over [`FADE_LEN`] samples. The
/// fade-out voice keeps its own owning handle to the mipmap it reads, so a
/// replaced table stays alive until the fade ends.
///
/// [`Self::interpolate_block`] runs on the audio thread and never blocks,
/// allocates, or fails: before the lane is fully set up it produces
/// silence.
pub struct LaneResampler {
    interp: Arc<InterpPack>,
    mip_map: Option<Shared<MipMap>>,
    fade_mip_map: Option<Shared<MipMap>>,
    pending_fade_mip_map: Option<Shared<MipMap>>,
    downsampler: HalfBandFilter,
    current: LaneVoice,
    fadeout: LaneVoice,
    pitch: Option<i32>,
    fade_pos: usize,
    fade_flag: bool,
    fade_needed: bool,
    can_use: bool,
}

impl LaneResampler {
    pub fn new(interp: Arc<InterpPack>) -> Self {
        Self {
            interp,
            mip_map: None,
            fade_mip_map: None,
            pending_fade_mip_map: None,
            downsampler: HalfBandFilter::new(),
            current: LaneVoice::new(),
            fadeout: LaneVoice::new(),
            pitch: None,
            fade_pos: 0,
            fade_flag: false,
            fade_needed: false,
            can_use: false,
        }
    }

    /// Bind a (shared, immutable) mipmap to this lane. If the lane is
    /// already playing, a crossfade from the previous mipmap is scheduled
    /// and the previous handle is kept alive on the fade-out voice until
    /// the fade completes.
    pub fn set_mipmap(&mut self, mip_map: Shared<MipMap>) {
        let ready = mip_map.is_ready();
        let num_levels = mip_map.num_levels();
        let previous = self.mip_map.replace(mip_map);
        if !ready {
            self.can_use = false;
            return;
        }
        if self.can_use {
            self.fade_needed = true;
            self.pending_fade_mip_map = previous;
        } else if let Some(pitch) = self.pitch {
            self.current.table = compute_table(pitch, num_levels);
            self.current.compute_step(pitch);
            self.can_use = true;
        }
    }

    /// Unbind the mipmap. The lane produces silence until a new one is set.
    pub fn remove_mipmap(&mut self) {
        self.mip_map = None;
        self.fade_mip_map = None;
        self.pending_fade_mip_map = None;
        self.fade_flag = false;
        self.fade_needed = false;
        self.can_use = false;
    }

    /// Set the playback pitch in pitch bits (one octave = `1 <<
    /// BITS_PER_OCTAVE`, positive is up). If the pitch moves the lane into
    /// another mipmap level while playing, a level crossfade is scheduled
    /// and starts at the next [`Self::interpolate_block`].
    pub fn set_pitch(&mut self, pitch: i32) {
        self.pitch = Some(pitch);
        let Some(mip_map) = &self.mip_map else {
            return;
        };
        if !mip_map.is_ready() {
            return;
        }
        let new_table = compute_table(pitch, mip_map.num_levels());
        if self.can_use && new_table != self.current.table {
            self.fade_needed = true;
        } else if !self.fade_needed {
            self.current.table = new_table;
            self.current.compute_step(pitch);
        }
        if self.fade_flag {
            self.fadeout.compute_step(pitch);
        }
        self.can_use = true;
    }

    /// The last pitch set on this lane.
    pub fn pitch(&self) -> i32 {
        self.pitch.unwrap_or(0)
    }

    /// Set the playback position, given in the source (level 0) domain as
    /// 32.32 fixed point.
    pub fn set_playback_pos(&mut self, pos: i64) {
        self.current.pos = pos >> self.current.table;
    }

    /// The current playback position in the source (level 0) domain.
    pub fn playback_pos(&self) -> i64 {
        self.current.pos << self.current.table
    }

    /// Is the lane bound to a ready mipmap and pitched, i.e. producing?
    pub fn is_ready(&self) -> bool {
        self.can_use
    }

    /// Reset the fade state and the level-blend filter history.
    pub fn clear_buffers(&mut self) {
        self.downsampler.clear_buffers();
        self.fade_flag = false;
        self.fade_needed = false;
        self.fade_pos = 0;
        self.fade_mip_map = None;
        self.pending_fade_mip_map = None;
    }

    /// Produce `dest.len()` interpolated samples and advance the playback
    /// position. Real-time safe; produces silence while the lane is not
    /// fully set up.
    pub fn interpolate_block(&mut self, dest: &mut [f32]) {
        if !self.can_use {
            clear_buffer(dest);
            return;
        }
        if self.fade_needed && !self.fade_flag {
            self.begin_fade();
        }

        let Some(mip_map) = self.mip_map.as_ref() else {
            clear_buffer(dest);
            return;
        };

        let mut done = 0;
        while done < dest.len() {
            if !self.fade_flag {
                match mip_map.level(self.current.table) {
                    Ok(level) => produce(&self.interp, &level, &mut self.current, &mut dest[done..]),
                    Err(_) => clear_buffer(&mut dest[done..]),
                }
                done = dest.len();
            } else {
                let work = (dest.len() - done).min(FADE_LEN - self.fade_pos);
                let out = &mut dest[done..done + work];

                match mip_map.level(self.current.table) {
                    Ok(level) => produce(&self.interp, &level, &mut self.current, out),
                    Err(_) => clear_buffer(out),
                }

                // the fade-out voice reads from its own, possibly older table
                let mut fade_buf = [0.0f32; FADE_LEN];
                let fade_out = &mut fade_buf[..work];
                let fade_mip_map = self.fade_mip_map.as_ref().unwrap_or(mip_map);
                match fade_mip_map.level(self.fadeout.table) {
                    Ok(level) => produce(&self.interp, &level, &mut self.fadeout, fade_out),
                    Err(_) => clear_buffer(fade_out),
                }
                // line up the outgoing stream's phase with the new level
                self.downsampler.phase_block(fade_out);

                let alpha_step = 1.0 / FADE_LEN as f32;
                for (index, (out, fade)) in out.iter_mut().zip(fade_out.iter()).enumerate() {
                    let alpha = (self.fade_pos + index) as f32 * alpha_step;
                    *out = *out * alpha + *fade * (1.0 - alpha);
                }

                self.fade_pos += work;
                done += work;
                if self.fade_pos >= FADE_LEN {
                    self.fade_flag = false;
                    self.fade_mip_map = None;
                }
            }
        }
    }

    /// Start the level crossfade scheduled by a pitch or mipmap change:
    /// duplicate the current voice into the fade-out voice, then retarget
    /// the current voice to its new level with a phase-preserving position.
    fn begin_fade(&mut self) {
        let (Some(pitch), Some(mip_map)) = (self.pitch, self.mip_map.as_ref()) else {
            self.fade_needed = false;
            return;
        };
        self.fadeout = self.current;
        self.fade_mip_map = self
            .pending_fade_mip_map
            .take()
            .or_else(|| self.mip_map.clone());

        let new_table = compute_table(pitch, mip_map.num_levels());
        let delta = new_table as i32 - self.current.table as i32;
        if delta > 0 {
            self.current.pos >>= delta;
        } else {
            self.current.pos <<= -delta;
        }
        self.current.table = new_table;
        self.current.compute_step(pitch);
        self.fadeout.compute_step(pitch);

        self.fade_pos = 0;
        self.fade_flag = true;
        self.fade_needed = false;
    }
}

// -------------------------------------------------------------------------------------------------

/// Mipmap level for a pitch: the octave count of the pitch, clamped into
/// the available levels.
#[inline]
fn compute_table(pitch: i32, num_levels: usize) -> usize {
    let table = (pitch >> BITS_PER_OCTAVE).max(0) as usize;
    table.min(num_levels - 1)
}

/// Run the FIR-interpolated production of one voice into `dest`.
#[inline]
fn produce(interp: &InterpPack, level: &MipMapLevel, voice: &mut LaneVoice, dest: &mut [f32]) {
    for out in dest.iter_mut() {
        let int_pos = voice.pos >> 32;
        let frac_pos = voice.pos as u32;
        *out = interp.interpolate(level.fir_window(int_pos), frac_pos);
        voice.pos += voice.step;
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use basedrop::Collector;

    use super::*;
    use crate::resampler::mipmap::mip_map_fir;

    fn make_mipmap(collector: &Collector, data: &[f32], num_levels: usize) -> Shared<MipMap> {
        let kernel = mip_map_fir();
        let mut mip_map = MipMap::new(
            data.len(),
            InterpPack::len_pre(),
            InterpPack::len_post(),
            num_levels,
            &kernel,
        );
        mip_map.fill(data).unwrap();
        Shared::new(&collector.handle(), mip_map)
    }

    fn make_lane(mip_map: &Shared<MipMap>) -> LaneResampler {
        let mut lane = LaneResampler::new(Arc::new(InterpPack::new()));
        lane.set_mipmap(mip_map.clone());
        lane
    }

    #[test]
    fn silent_until_ready() {
        let mut lane = LaneResampler::new(Arc::new(InterpPack::new()));
        let mut out = [1.0f32; 32];
        lane.interpolate_block(&mut out);
        assert!(out.iter().all(|s| *s == 0.0));
        assert!(!lane.is_ready());
    }

    #[test]
    fn table_selection_follows_pitch() {
        assert_eq!(compute_table(-100_000, 12), 0);
        assert_eq!(compute_table(0, 12), 0);
        assert_eq!(compute_table(65_535, 12), 0);
        assert_eq!(compute_table(65_536, 12), 1);
        assert_eq!(compute_table(3 << BITS_PER_OCTAVE, 12), 3);
        assert_eq!(compute_table(40 << BITS_PER_OCTAVE, 12), 11);
    }

    #[test]
    fn position_advances_exactly_with_step() {
        let collector = Collector::new();
        let data: Vec<f32> = (0..4096)
            .map(|i| (std::f64::consts::TAU * i as f64 / 256.0).sin() as f32)
            .collect();
        let mip_map = make_mipmap(&collector, &data, 2);
        let mut lane = make_lane(&mip_map);

        // pitch below one octave stays in level 0
        let pitch = 12_345;
        lane.set_pitch(pitch);
        lane.set_playback_pos(256 << 32);
        assert!(lane.is_ready());

        let step = ((pitch as f64 / 65536.0).exp2() * 4294967296.0).round() as i64;
        let mut out = [0.0f32; 64];
        let mut expected = 256i64 << 32;
        for _ in 0..40 {
            lane.interpolate_block(&mut out);
            expected += step * out.len() as i64;
            assert_eq!(lane.playback_pos(), expected);
        }
    }

    #[test]
    fn playback_pos_round_trips_across_levels() {
        let collector = Collector::new();
        let data = vec![0.25f32; 8192];
        let mip_map = make_mipmap(&collector, &data, 4);
        let mut lane = make_lane(&mip_map);

        // level 2: source positions quantize to 4 source samples
        lane.set_pitch(2 << BITS_PER_OCTAVE);
        lane.set_playback_pos(1024 << 32);
        assert_eq!(lane.playback_pos(), 1024 << 32);
        lane.set_playback_pos((1026 << 32) | 0x8000_0000);
        assert_eq!(lane.playback_pos(), (1026 << 32) | 0x8000_0000);
    }

    #[test]
    fn level_change_fades_over_fade_len() {
        let collector = Collector::new();
        let data: Vec<f32> = (0..8192)
            .map(|i| (std::f64::consts::TAU * i as f64 / 512.0).sin() as f32)
            .collect();
        let mip_map = make_mipmap(&collector, &data, 4);
        let mut lane = make_lane(&mip_map);

        lane.set_pitch(30_000);
        lane.set_playback_pos(1000 << 32);
        let mut out = [0.0f32; 256];
        lane.interpolate_block(&mut out);
        assert!(!lane.fade_flag);

        // crossing an octave boundary schedules a deferred fade
        lane.set_pitch(70_000);
        assert!(lane.fade_needed);
        assert_eq!(lane.current.table, 0);

        lane.interpolate_block(&mut out[..32]);
        assert!(lane.fade_flag);
        assert_eq!(lane.current.table, 1);
        assert_eq!(lane.fadeout.table, 0);

        // fade ends after FADE_LEN samples in total
        lane.interpolate_block(&mut out[..32]);
        assert!(!lane.fade_flag);

        // the signal never leaves sane bounds across the blend
        assert!(out.iter().all(|s| s.abs() < 1.5));
    }

    #[test]
    fn level_change_scales_position() {
        let collector = Collector::new();
        let data = vec![0.5f32; 8192];
        let mip_map = make_mipmap(&collector, &data, 4);
        let mut lane = make_lane(&mip_map);

        lane.set_pitch(0);
        lane.set_playback_pos(2048 << 32);
        let mut out = [0.0f32; 8];
        lane.interpolate_block(&mut out);
        let before = lane.playback_pos();

        lane.set_pitch(1 << BITS_PER_OCTAVE);
        lane.interpolate_block(&mut out[..1]);
        // source-domain position is preserved through the level switch,
        // modulo the one-sample advance of the production above
        let after = lane.playback_pos() - (lane.current.step << 1);
        assert_eq!(before, after);
    }

    #[test]
    fn mipmap_swap_keeps_fadeout_handle_alive() {
        let collector = Collector::new();
        let first = make_mipmap(&collector, &vec![1.0f32; 4096], 2);
        let second = make_mipmap(&collector, &vec![-1.0f32; 4096], 2);

        let mut lane = make_lane(&first);
        lane.set_pitch(0);
        lane.set_playback_pos(1024 << 32);
        let mut out = [0.0f32; 16];
        lane.interpolate_block(&mut out);

        lane.set_mipmap(second.clone());
        drop(first);
        assert!(lane.fade_needed);

        // during the fade both tables are read: output sweeps from the old
        // table's value towards the new one
        let mut fade = [0.0f32; FADE_LEN];
        lane.interpolate_block(&mut fade);
        assert!(fade[1] > 0.5, "fade starts at the old table: {}", fade[1]);
        assert!(
            fade[FADE_LEN - 1] < -0.5,
            "fade ends at the new table: {}",
            fade[FADE_LEN - 1]
        );
        assert!(!lane.fade_flag);
    }
}
