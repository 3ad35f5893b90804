use std::sync::Arc;

use crate::{
    resampler::{interpolator::InterpPack, lane::LaneResampler, FADE_LEN},
    wavetable::{frame_start, FRAME_LEN},
};

// -------------------------------------------------------------------------------------------------

/// Per-voice-slot detune amounts in cents, cycled by slot index. Small,
/// hand-tuned offsets that spread simultaneous voices slightly apart.
const VOICE_DETUNE_CENTS: [f64; 24] = [
    0.0, 0.3, -0.2, 3.119, 2.5, 0.1, -0.1, 0.0, //
    4.119, 1.5, 2.119, 3.119, 1.5, 0.0, 0.2, 0.1, //
    1.5, 0.0, 0.0, 1.0, 3.119, 0.5, 0.0, 1.5,
];

#[inline]
pub(crate) fn voice_detune_cents(slot: usize) -> f64 {
    VOICE_DETUNE_CENTS[slot % VOICE_DETUNE_CENTS.len()]
}

// -------------------------------------------------------------------------------------------------

/// One resampler lane of a voice, tagged with the frame it is playing.
pub(crate) struct VoiceLane {
    pub resampler: LaneResampler,
    pub frame: usize,
    pub active: bool,
}

impl VoiceLane {
    fn new(interp: &Arc<InterpPack>) -> Self {
        Self {
            resampler: LaneResampler::new(Arc::clone(interp)),
            frame: 0,
            active: false,
        }
    }
}

// -------------------------------------------------------------------------------------------------

/// The per-note playback unit: two resampler lanes with a crossfading
/// frame-switch state machine, plus pitch and glide state.
///
/// Exactly one of the two lanes is the foreground lane (selected by
/// `toggle`); the other one only plays while a frame crossfade is running.
pub(crate) struct VoicePack {
    pub slot: usize,
    pub lane_a: VoiceLane,
    pub lane_b: VoiceLane,

    pub pitch_bits: i32,
    pub semi_off: f64,
    pub mult_off: f64,

    pub toggle: bool,
    pub fading: bool,
    pub fade_alpha: f32,

    pub frame_param: usize,
    pub pend_frame: usize,
    pub pend_flag: bool,

    pub midi: i32,
    /// Note-on velocity. Stored with the voice; the core applies no
    /// amplitude modulation.
    #[allow(dead_code)]
    pub velocity: f32,
    pub active: bool,

    pub glide_cur_bits: f64,
    pub glide_step_bits_per_sample: f64,
    pub glide_samples_remaining: i64,
}

impl VoicePack {
    pub fn new(slot: usize, interp: &Arc<InterpPack>) -> Self {
        Self {
            slot,
            lane_a: VoiceLane::new(interp),
            lane_b: VoiceLane::new(interp),
            pitch_bits: 0,
            semi_off: 0.0,
            mult_off: 1.0,
            toggle: false,
            fading: false,
            fade_alpha: 1.0,
            frame_param: 0,
            pend_frame: 0,
            pend_flag: false,
            midi: -1,
            velocity: 1.0,
            active: false,
            glide_cur_bits: 0.0,
            glide_step_bits_per_sample: 0.0,
            glide_samples_remaining: 0,
        }
    }

    /// Per-sample increment of the frame crossfade alpha.
    #[inline]
    pub fn fade_delta() -> f32 {
        1.0 / FADE_LEN as f32
    }

    /// Deactivate the voice and drop all transient state.
    pub fn clear(&mut self) {
        self.lane_a.active = false;
        self.lane_b.active = false;
        self.active = false;
        self.fading = false;
        self.toggle = false;
        self.pend_flag = false;
        self.fade_alpha = 1.0;
        self.glide_cur_bits = 0.0;
        self.glide_step_bits_per_sample = 0.0;
        self.glide_samples_remaining = 0;
    }

    /// Re-seed the voice for a new note.
    pub fn start(&mut self, note: i32, velocity: f32, frame: usize, semi_off: f64, mult_off: f64) {
        self.clear();
        self.midi = note;
        self.velocity = velocity;
        self.frame_param = frame;
        self.pend_frame = frame;
        self.semi_off = semi_off;
        self.mult_off = mult_off;
        self.active = true;
    }

    /// The (foreground, background) lane pair, ordered by the toggle bit.
    #[inline]
    pub fn lanes_mut(&mut self) -> (&mut VoiceLane, &mut VoiceLane) {
        if self.toggle {
            (&mut self.lane_b, &mut self.lane_a)
        } else {
            (&mut self.lane_a, &mut self.lane_b)
        }
    }

    /// Install a pitch on both lanes.
    pub fn install_pitch(&mut self, pitch_bits: i32) {
        self.pitch_bits = pitch_bits;
        self.lane_a.resampler.set_pitch(pitch_bits);
        self.lane_b.resampler.set_pitch(pitch_bits);
    }

    /// Request a crossfade to another frame. Takes effect at the start of
    /// the next slice.
    pub fn request_frame(&mut self, frame: usize) {
        if frame != self.frame_param {
            self.pend_frame = frame;
            self.pend_flag = true;
        }
    }

    /// Perform the pending frame switch: seed the background lane at the
    /// same intra-cycle phase within the new frame, then crossfade to it.
    ///
    /// The fractional position carries over untouched and the integer
    /// offset within the cycle is identical on both lanes, so the switch
    /// preserves phase exactly.
    pub fn switch_frame(&mut self) {
        debug_assert!(self.pend_flag);
        let pend_frame = self.pend_frame;
        let current_start = frame_start(self.frame_param);
        let pitch_bits = self.pitch_bits;

        let (src, dst) = self.lanes_mut();
        let pos = src.resampler.playback_pos();
        let int_pos = pos >> 32;
        let frac = pos & 0xFFFF_FFFF;
        let rel = (int_pos - current_start) & (FRAME_LEN as i64 - 1);

        dst.resampler.clear_buffers();
        dst.resampler
            .set_playback_pos(((frame_start(pend_frame) + rel) << 32) | frac);
        dst.resampler.set_pitch(pitch_bits);
        dst.frame = pend_frame;
        dst.active = true;

        self.fading = true;
        self.toggle = !self.toggle;
        self.fade_alpha = 0.0;
        self.frame_param = pend_frame;
        self.pend_flag = false;
    }

    /// Retarget the glide ramp towards `target_bits`, keeping the current
    /// offset as the starting point. A zero time snaps immediately.
    pub fn set_glide_target(&mut self, target_bits: f64, time_secs: f64, sample_rate: f64) {
        let samples = time_secs * sample_rate;
        if samples > 0.0 {
            self.glide_step_bits_per_sample = (target_bits - self.glide_cur_bits) / samples;
            self.glide_samples_remaining = samples as i64;
        } else {
            self.glide_cur_bits = target_bits;
            self.glide_step_bits_per_sample = 0.0;
            self.glide_samples_remaining = 0;
        }
    }

    /// Stop gliding and return to the unmodified pitch.
    pub fn clear_glide(&mut self) {
        self.glide_cur_bits = 0.0;
        self.glide_step_bits_per_sample = 0.0;
        self.glide_samples_remaining = 0;
    }

    /// Advance the glide ramp by up to `len` samples. Snaps exactly onto
    /// `target_bits` when the ramp time is used up, so the endpoint carries
    /// no accumulation error.
    pub fn advance_glide(&mut self, len: usize, target_bits: f64) {
        if self.glide_samples_remaining > 0 {
            let advance = self.glide_samples_remaining.min(len as i64);
            self.glide_cur_bits += self.glide_step_bits_per_sample * advance as f64;
            self.glide_samples_remaining -= advance;
            if self.glide_samples_remaining <= 0 {
                self.glide_cur_bits = target_bits;
                self.glide_samples_remaining = 0;
            }
        }
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use basedrop::{Collector, Shared};

    use super::*;
    use crate::resampler::mipmap::{mip_map_fir, MipMap};
    use crate::wavetable::{REPLICATED_FRAME_LEN, REPLICATED_TABLE_SAMPLES};

    fn test_voice(collector: &Collector) -> VoicePack {
        let interp = Arc::new(InterpPack::new());
        let mut voice = VoicePack::new(0, &interp);

        // a small full-layout table: every frame holds its index as a
        // constant value
        let mut table = vec![0.0f32; REPLICATED_TABLE_SAMPLES];
        for (frame, chunk) in table.chunks_exact_mut(REPLICATED_FRAME_LEN).enumerate() {
            chunk.fill(frame as f32 / 256.0);
        }
        let kernel = mip_map_fir();
        let mut mip_map = MipMap::new(table.len(), 12, 12, 12, &kernel);
        mip_map.fill(&table).unwrap();
        let shared = Shared::new(&collector.handle(), mip_map);

        for lane in [&mut voice.lane_a, &mut voice.lane_b] {
            lane.resampler.set_mipmap(shared.clone());
        }
        voice
    }

    #[test]
    fn detune_table_cycles() {
        assert_eq!(voice_detune_cents(0), 0.0);
        assert_eq!(voice_detune_cents(3), 3.119);
        assert_eq!(voice_detune_cents(24), 0.0);
        assert_eq!(voice_detune_cents(27), 3.119);
    }

    #[test]
    fn start_seeds_and_clear_resets() {
        let collector = Collector::new();
        let mut voice = test_voice(&collector);
        voice.start(60, 0.9, 7, -12.0, 2.0);
        assert!(voice.active);
        assert_eq!(voice.midi, 60);
        assert_eq!(voice.frame_param, 7);
        assert_eq!(voice.pend_frame, 7);
        assert_eq!(voice.velocity, 0.9);
        voice.clear();
        assert!(!voice.active);
        assert_eq!(voice.fade_alpha, 1.0);
    }

    #[test]
    fn frame_switch_preserves_phase() {
        let collector = Collector::new();
        let mut voice = test_voice(&collector);
        voice.start(60, 1.0, 3, 0.0, 1.0);
        voice.install_pitch(10_000);

        let rel = 517i64;
        let frac = 0x1234_5678i64;
        voice
            .lane_a
            .resampler
            .set_playback_pos(((frame_start(3) + rel) << 32) | frac);
        voice.lane_a.frame = 3;
        voice.lane_a.active = true;

        voice.request_frame(200);
        assert!(voice.pend_flag);
        voice.switch_frame();

        assert!(voice.fading);
        assert_eq!(voice.fade_alpha, 0.0);
        assert_eq!(voice.frame_param, 200);
        assert!(!voice.pend_flag);
        assert!(voice.toggle);

        // the new foreground lane sits at the same intra-cycle offset with
        // an identical fractional part
        let (foreground, background) = voice.lanes_mut();
        assert_eq!(foreground.frame, 200);
        let pos = foreground.resampler.playback_pos();
        assert_eq!((pos >> 32) - frame_start(200), rel);
        assert_eq!(pos & 0xFFFF_FFFF, frac);
        // the previous lane is untouched
        let old_pos = background.resampler.playback_pos();
        assert_eq!((old_pos >> 32) - frame_start(3), rel);
        assert_eq!(old_pos & 0xFFFF_FFFF, frac);
    }

    #[test]
    fn repeated_request_for_same_frame_is_ignored() {
        let collector = Collector::new();
        let mut voice = test_voice(&collector);
        voice.start(60, 1.0, 5, 0.0, 1.0);
        voice.request_frame(5);
        assert!(!voice.pend_flag);
    }

    #[test]
    fn glide_snaps_exactly_onto_target() {
        let collector = Collector::new();
        let mut voice = test_voice(&collector);
        voice.start(60, 1.0, 0, 0.0, 1.0);

        let target_bits = 65536.0; // one octave up
        let sample_rate = 48_000.0;
        voice.set_glide_target(target_bits, 0.5, sample_rate);
        let total_samples = (0.5 * sample_rate) as i64;
        assert_eq!(voice.glide_samples_remaining, total_samples);

        let mut advanced = 0;
        while voice.glide_samples_remaining > 0 {
            voice.advance_glide(8, target_bits);
            advanced += 8;
        }
        assert!(advanced >= total_samples);
        // no residual drift at the endpoint
        assert_eq!(voice.glide_cur_bits, target_bits);

        // re-targeting starts from the current offset
        voice.set_glide_target(0.0, 0.5, sample_rate);
        assert!(voice.glide_step_bits_per_sample < 0.0);

        voice.clear_glide();
        assert_eq!(voice.glide_cur_bits, 0.0);
        assert_eq!(voice.glide_samples_remaining, 0);
    }

    #[test]
    fn zero_glide_time_snaps_immediately() {
        let collector = Collector::new();
        let mut voice = test_voice(&collector);
        voice.set_glide_target(1234.5, 0.0, 48_000.0);
        assert_eq!(voice.glide_cur_bits, 1234.5);
        assert_eq!(voice.glide_samples_remaining, 0);
    }
}
