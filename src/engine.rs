use std::sync::Arc;

use basedrop::Shared;
use crossbeam_queue::ArrayQueue;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use strum::{Display, EnumIter, FromRepr};

use crate::{
    builder::TableBuilder,
    error::Error,
    resampler::{interpolator::InterpPack, mipmap::MipMap, BITS_PER_OCTAVE},
    utils::{
        buffer::{add_buffers, scale_buffer},
        cents_to_semitones, multiplier_to_semitones, semitones_to_pitch_bits,
    },
    wavetable::{frame_start, FRAME_LEN, MAX_FRAMES},
};

// -------------------------------------------------------------------------------------------------

pub(crate) mod voice;

use voice::{voice_detune_cents, VoicePack};

// -------------------------------------------------------------------------------------------------

/// Number of output channels the engine renders. The synthesis itself is
/// mono; the mix is duplicated onto both channels.
pub const NUM_CHANNELS: usize = 2;

/// Number of voices in the engine's voice pool.
pub const NUM_VOICES: usize = 24;

/// Length of the sub-blocks the engine renders in. Parameter and frame
/// changes take effect at slice boundaries.
pub const SLICE_LEN: usize = 8;

/// Frequency a wavetable cycle maps to at pitch 0 with MIDI note 24 (C1).
const TARGET_ROOT_HZ: f64 = 32.703195;

/// Capacity of the cross-thread note event queue.
const EVENT_QUEUE_SIZE: usize = 128;

// -------------------------------------------------------------------------------------------------

/// Playback events accepted by the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoteEvent {
    NoteOn { note: u8, velocity: f32 },
}

// -------------------------------------------------------------------------------------------------

/// Ids of the engine's public parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, FromRepr)]
#[repr(u32)]
pub enum ParameterId {
    /// Target frame for all active voices, crossfaded. Integer in `[0, 255]`.
    Frame = 1,
    /// Linear gain applied to the final stereo output. `[0, 1]`, default 0.8.
    Volume = 2,
    /// Additive semitone offset. `[-72, 36]`.
    Semitone = 3,
    /// Multiplicative pitch factor. `[0.25, 4]`, values <= 0 coerce to 1.
    PitchMultiplier = 4,
    /// Glide enable. `{0, 1}`.
    GlideEnabled = 5,
    /// Glide ramp duration in seconds. `[0, 5]`.
    GlideTime = 6,
    /// Glide target as a pitch multiplier. `[0.25, 4]`.
    GlideMultiplier = 7,
}

// -------------------------------------------------------------------------------------------------

/// The polyphonic wavetable synthesis engine.
///
/// Drive it from the audio thread: [`Self::prepare`] once before any audio,
/// then [`Self::process`] per block, with [`Self::handle_event`] and
/// [`Self::set_parameter`] in between as needed. Other threads can push
/// note events through the queue returned by [`Self::event_queue`]; they
/// are drained at the start of the next block.
///
/// The engine observes its [`TableBuilder`]'s published mipmap at every
/// block start and rebinds all voices when a new table appears. Until the
/// first table is published the engine renders silence.
pub struct WavetableEngine {
    voices: Vec<VoicePack>,
    next_voice: usize,
    builder: Arc<TableBuilder>,
    active_mip_map: Option<Shared<MipMap>>,
    note_queue: Arc<ArrayQueue<NoteEvent>>,
    rng: SmallRng,

    sample_rate: f64,
    root_offset_semis: f64,
    ready: bool,

    global_volume: f32,
    global_frame: usize,
    param_semi: f64,
    param_mult: f64,
    glide_enabled: bool,
    glide_time: f64,
    glide_target: f64,
}

impl WavetableEngine {
    /// Create an engine bound to the process-wide [`TableBuilder`].
    pub fn new() -> Self {
        Self::with_builder(TableBuilder::global())
    }

    /// Create an engine bound to the given table builder.
    pub fn with_builder(builder: Arc<TableBuilder>) -> Self {
        let interp = Arc::new(InterpPack::new());
        let voices = (0..NUM_VOICES)
            .map(|slot| VoicePack::new(slot, &interp))
            .collect();
        Self {
            voices,
            next_voice: 0,
            builder,
            active_mip_map: None,
            note_queue: Arc::new(ArrayQueue::new(EVENT_QUEUE_SIZE)),
            rng: SmallRng::from_os_rng(),
            sample_rate: 0.0,
            root_offset_semis: 0.0,
            ready: false,
            global_volume: 0.8,
            global_frame: 0,
            param_semi: 0.0,
            param_mult: 1.0,
            glide_enabled: false,
            glide_time: 0.1,
            glide_target: 1.0,
        }
    }

    /// Initialize per-voice state for the given output configuration. Must
    /// be called before any note or block is processed.
    pub fn prepare(
        &mut self,
        sample_rate: u32,
        max_block_size: usize,
        channel_count: usize,
    ) -> Result<(), Error> {
        if channel_count != NUM_CHANNELS {
            return Err(Error::ConfigError(format!(
                "expected {NUM_CHANNELS} output channels, got {channel_count}"
            )));
        }
        if sample_rate == 0 || max_block_size == 0 {
            return Err(Error::ConfigError(
                "sample rate and block size must be non-zero".to_string(),
            ));
        }

        self.sample_rate = sample_rate as f64;
        self.root_offset_semis =
            12.0 * (TARGET_ROOT_HZ / (self.sample_rate / FRAME_LEN as f64)).log2();

        let global_frame = self.global_frame;
        let param_semi = self.param_semi;
        let param_mult = self.param_mult;
        for voice in &mut self.voices {
            voice.clear();
            voice.frame_param = global_frame;
            voice.pend_frame = global_frame;
            voice.semi_off = param_semi;
            voice.mult_off = param_mult;
            for lane in [&mut voice.lane_a, &mut voice.lane_b] {
                lane.resampler.clear_buffers();
            }
            voice
                .lane_a
                .resampler
                .set_playback_pos(frame_start(global_frame) << 32);
            voice.lane_a.frame = global_frame;
        }

        self.ready = true;
        Ok(())
    }

    /// Queue for feeding note events from other threads. Queued events are
    /// applied at the start of the next processed block.
    pub fn event_queue(&self) -> Arc<ArrayQueue<NoteEvent>> {
        Arc::clone(&self.note_queue)
    }

    /// Handle a note event immediately. Must be called from the audio
    /// thread; events arriving before [`Self::prepare`] are ignored.
    pub fn handle_event(&mut self, event: NoteEvent) {
        if !self.ready {
            return;
        }
        match event {
            NoteEvent::NoteOn { note, velocity } => self.note_on(note, velocity),
        }
    }

    /// Set a parameter by its numeric id. Fails on unknown ids; values are
    /// clamped into their documented ranges.
    pub fn set_parameter_by_id(&mut self, id: u32, value: f64) -> Result<(), Error> {
        match ParameterId::from_repr(id) {
            Some(parameter) => {
                self.set_parameter(parameter, value);
                Ok(())
            }
            None => Err(Error::ParameterError(format!("unknown parameter id {id}"))),
        }
    }

    /// Set a parameter. Values outside the documented range are clamped.
    /// Changes apply to all voices and take effect at the next slice
    /// boundary.
    pub fn set_parameter(&mut self, id: ParameterId, value: f64) {
        match id {
            ParameterId::Frame => {
                let frame = (value as i64).clamp(0, MAX_FRAMES as i64 - 1) as usize;
                self.global_frame = frame;
                for voice in &mut self.voices {
                    if voice.active {
                        voice.request_frame(frame);
                    }
                }
            }
            ParameterId::Volume => {
                self.global_volume = value.clamp(0.0, 1.0) as f32;
            }
            ParameterId::Semitone => {
                self.param_semi = value.clamp(-72.0, 36.0);
                self.refresh_voice_pitches(|voice, semi| voice.semi_off = semi, self.param_semi);
            }
            ParameterId::PitchMultiplier => {
                self.param_mult = if value <= 0.0 {
                    1.0
                } else {
                    value.clamp(0.25, 4.0)
                };
                self.refresh_voice_pitches(|voice, mult| voice.mult_off = mult, self.param_mult);
            }
            ParameterId::GlideEnabled => {
                self.glide_enabled = value >= 0.5;
                let target_bits = self.glide_target_bits();
                let glide_time = self.glide_time;
                let sample_rate = self.sample_rate;
                let enabled = self.glide_enabled;
                for voice in &mut self.voices {
                    if !voice.active {
                        continue;
                    }
                    voice.glide_cur_bits = 0.0;
                    if enabled {
                        voice.set_glide_target(target_bits, glide_time, sample_rate);
                    } else {
                        voice.clear_glide();
                    }
                }
            }
            ParameterId::GlideTime => {
                self.glide_time = value.clamp(0.0, 5.0);
                self.retarget_glides();
            }
            ParameterId::GlideMultiplier => {
                self.glide_target = if value <= 0.0 {
                    1.0
                } else {
                    value.clamp(0.25, 4.0)
                };
                self.retarget_glides();
            }
        }
    }

    /// Render a block of interleaved stereo samples. Never blocks and never
    /// fails: before the engine is prepared, or before a first wavetable
    /// has been published, the output is silence.
    pub fn process(&mut self, output: &mut [f32]) {
        #[cfg(feature = "assert_no_alloc")]
        assert_no_alloc::assert_no_alloc(|| self.process_block(output));
        #[cfg(not(feature = "assert_no_alloc"))]
        self.process_block(output);
    }

    fn process_block(&mut self, output: &mut [f32]) {
        debug_assert_eq!(output.len() % NUM_CHANNELS, 0);

        self.adopt_published_mip_map();

        if !self.ready {
            output.fill(0.0);
            return;
        }

        while let Some(event) = self.note_queue.pop() {
            match event {
                NoteEvent::NoteOn { note, velocity } => self.note_on(note, velocity),
            }
        }

        let frames = output.len() / NUM_CHANNELS;
        let glide_enabled = self.glide_enabled;
        let glide_target_bits = self.glide_target_bits();
        let volume = self.global_volume;

        let mut base = 0;
        while base < frames {
            let len = SLICE_LEN.min(frames - base);
            let mut mix_buf = [0.0f32; SLICE_LEN];
            let mut lane_buf = [0.0f32; SLICE_LEN];
            let mut prev_buf = [0.0f32; SLICE_LEN];

            for voice in &mut self.voices {
                if !voice.active {
                    continue;
                }
                if voice.pend_flag {
                    voice.switch_frame();
                }

                if glide_enabled {
                    voice.advance_glide(len, glide_target_bits);
                } else if voice.glide_cur_bits != 0.0 {
                    voice.clear_glide();
                }
                let offset_bits = voice.glide_cur_bits.round() as i32;
                let pitch = voice.pitch_bits + offset_bits;
                let fading = voice.fading;

                {
                    let (foreground, background) = voice.lanes_mut();
                    foreground.resampler.set_pitch(pitch);
                    foreground.resampler.set_playback_pos(wrap_position(
                        frame_start(foreground.frame),
                        foreground.resampler.playback_pos(),
                    ));
                    foreground.resampler.interpolate_block(&mut lane_buf[..len]);

                    if fading && background.active {
                        background.resampler.set_pitch(pitch);
                        background.resampler.set_playback_pos(wrap_position(
                            frame_start(background.frame),
                            background.resampler.playback_pos(),
                        ));
                        background.resampler.interpolate_block(&mut prev_buf[..len]);
                    }
                }

                if fading {
                    let delta = VoicePack::fade_delta();
                    for (out, prev) in lane_buf[..len].iter_mut().zip(prev_buf[..len].iter()) {
                        *out = *out * voice.fade_alpha + *prev * (1.0 - voice.fade_alpha);
                        voice.fade_alpha = (voice.fade_alpha + delta).min(1.0);
                    }
                    if voice.fade_alpha >= 1.0 {
                        voice.fading = false;
                        let (_, background) = voice.lanes_mut();
                        background.active = false;
                    }
                }

                add_buffers(&mut mix_buf[..len], &lane_buf[..len]);
            }

            // apply the global volume on the slice's mono mix
            scale_buffer(&mut mix_buf[..len], volume);
            for (index, mix) in mix_buf[..len].iter().enumerate() {
                output[(base + index) * NUM_CHANNELS] = *mix;
            }
            base += len;
        }

        // duplicate the left channel onto the right
        for frame in output.chunks_exact_mut(NUM_CHANNELS) {
            frame[1] = frame[0];
        }
    }

    /// Pick up a newly published mipmap and rebind all voice lanes to it.
    fn adopt_published_mip_map(&mut self) {
        let published = self.builder.current();
        let changed = match &self.active_mip_map {
            Some(current) => !std::ptr::eq::<MipMap>(&**current, &*published),
            None => true,
        };
        if !changed || !published.is_ready() {
            return;
        }
        for voice in &mut self.voices {
            for lane in [&mut voice.lane_a, &mut voice.lane_b] {
                lane.resampler.set_mipmap(published.clone());
                lane.resampler.clear_buffers();
            }
            if voice.active {
                let pitch_bits = voice.pitch_bits;
                voice.install_pitch(pitch_bits);
            }
        }
        self.active_mip_map = Some(published);
    }

    fn note_on(&mut self, note: u8, velocity: f32) {
        let pitch_bits = pitch_bits_for(
            self.root_offset_semis,
            self.param_semi,
            self.param_mult,
            note as i32,
            self.next_voice,
        );
        let glide_target_bits = self.glide_target_bits();
        let glide_enabled = self.glide_enabled;
        let glide_time = self.glide_time;
        let sample_rate = self.sample_rate;
        let global_frame = self.global_frame;
        let param_semi = self.param_semi;
        let param_mult = self.param_mult;

        let slot = self.next_voice;
        self.next_voice = (self.next_voice + 1) % self.voices.len();

        let random_word: u32 = self.rng.random();
        let voice = &mut self.voices[slot];
        voice.start(note as i32, velocity, global_frame, param_semi, param_mult);

        if let Some(mip_map) = &self.active_mip_map {
            for lane in [&mut voice.lane_a, &mut voice.lane_b] {
                lane.resampler.set_mipmap(mip_map.clone());
                lane.resampler.clear_buffers();
            }
        }
        voice.install_pitch(pitch_bits);

        if glide_enabled {
            voice.set_glide_target(glide_target_bits, glide_time, sample_rate);
        }

        // randomize the start phase within a window that widens with the
        // note number, from 17% of a cycle at note 0 to 60% at note 127
        let note_frac = note as f32 / 127.0;
        let phase_pct = (17.0 + note_frac * (60.0 - 17.0)) as i64;
        let max_offset = FRAME_LEN as i64 * phase_pct / 100;
        let random_offset = random_word as i64 % max_offset;
        let start = frame_start(voice.frame_param);
        voice
            .lane_a
            .resampler
            .set_playback_pos(((start + random_offset) << 32) | random_word as i64);
        voice.lane_a.frame = voice.frame_param;
        voice.lane_a.active = true;
    }

    /// Apply an updated tuning field to every voice and re-install pitches
    /// on the active ones.
    fn refresh_voice_pitches(&mut self, apply: impl Fn(&mut VoicePack, f64), value: f64) {
        let root_offset_semis = self.root_offset_semis;
        for voice in &mut self.voices {
            apply(voice, value);
            if voice.active {
                let pitch_bits = pitch_bits_for(
                    root_offset_semis,
                    voice.semi_off,
                    voice.mult_off,
                    voice.midi,
                    voice.slot,
                );
                voice.install_pitch(pitch_bits);
            }
        }
    }

    /// Re-aim the glide ramps of all active voices after a glide parameter
    /// change.
    fn retarget_glides(&mut self) {
        if !self.glide_enabled {
            return;
        }
        let target_bits = self.glide_target_bits();
        let glide_time = self.glide_time;
        let sample_rate = self.sample_rate;
        for voice in &mut self.voices {
            if voice.active {
                voice.set_glide_target(target_bits, glide_time, sample_rate);
            }
        }
    }

    /// The glide target, expressed as an (unrounded) pitch offset in bits.
    fn glide_target_bits(&self) -> f64 {
        multiplier_to_semitones(self.glide_target) * (1u32 << BITS_PER_OCTAVE) as f64 / 12.0
    }
}

impl Default for WavetableEngine {
    fn default() -> Self {
        Self::new()
    }
}

// -------------------------------------------------------------------------------------------------

/// Compute a voice's pitch in pitch bits from the engine tuning state.
fn pitch_bits_for(
    root_offset_semis: f64,
    semi_off: f64,
    mult_off: f64,
    midi_note: i32,
    slot: usize,
) -> i32 {
    let semitones = root_offset_semis
        + semi_off
        + multiplier_to_semitones(mult_off)
        + (midi_note - 24) as f64
        + cents_to_semitones(voice_detune_cents(slot));
    semitones_to_pitch_bits(semitones)
}

/// Normalize a 32.32 playback position into the cycle window of the frame
/// starting at `frame_start`, keeping the fractional part.
#[inline]
fn wrap_position(frame_start: i64, pos: i64) -> i64 {
    let int_pos = pos >> 32;
    let frac = pos & 0xFFFF_FFFF;
    ((((int_pos - frame_start) & (FRAME_LEN as i64 - 1)) + frame_start) << 32) | frac
}

// -------------------------------------------------------------------------------------------------
