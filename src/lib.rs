//! **mipwave** is a polyphonic wavetable synthesis engine for Rust. It renders
//! band-limited audio from single-cycle waveform tables at arbitrary host
//! sample rates, with per-voice pitch, glide and crossfaded frame switching,
//! and supports replacing the underlying wavetable live without glitches.
//!
//! ### Overview
//!
//! - **[`WavetableEngine`]** is the playback component, driven from the audio
//!   thread: `prepare` it once, then call `process` per block. Note-ons and
//!   parameter changes arrive via [`WavetableEngine::handle_event`] /
//!   [`WavetableEngine::set_parameter`], or lock-free from other threads
//!   through [`WavetableEngine::event_queue`].
//!
//! - **[`TableBuilder`]** converts committed wavetable data into a mipmap
//!   pyramid on a background thread and publishes it with an atomic pointer
//!   swap. The audio thread picks a new table up at the next block start;
//!   old tables stay alive until the last voice releases them.
//!
//! - **[`WaveBlender`]** is the producer front end: it blends up to two
//!   user-provided wavetables with equal-power weights, replicates the frames
//!   into the builder's slot and commits.
//!
//! - The [`resampler`] module holds the DSP underneath: a 64-phase polyphase
//!   FIR interpolator, the mipmap pyramid, a polyphase IIR half-band filter
//!   and the per-voice lane resampler. They are usable on their own for
//!   custom playback setups.
//!
//! ### Getting started
//!
//! ```rust,no_run
//! use mipwave::{NoteEvent, ParameterId, TableBuilder, WaveBlender, WavetableEngine};
//!
//! // Producer side: load a wavetable and let the builder publish it.
//! let mut blender = WaveBlender::new(TableBuilder::global());
//! let table = vec![0.0f32; mipwave::MAX_TABLE_SAMPLES];
//! blender.set_table(0, 1, &table)?;
//!
//! // Audio side: prepare the engine and render blocks.
//! let mut engine = WavetableEngine::new();
//! engine.prepare(48_000, 512, 2)?;
//! engine.set_parameter(ParameterId::Volume, 0.8);
//! engine.handle_event(NoteEvent::NoteOn { note: 60, velocity: 1.0 });
//!
//! let mut block = vec![0.0f32; 512 * 2];
//! engine.process(&mut block);
//! # Ok::<(), mipwave::Error>(())
//! ```

// -------------------------------------------------------------------------------------------------

// private mods (partly re-exported)

mod builder;
mod engine;
mod error;
mod wavetable;

// public, flat re-exports (common types)

pub use builder::{blend::WaveBlender, TableBuilder};
pub use engine::{NoteEvent, ParameterId, WavetableEngine, NUM_CHANNELS, NUM_VOICES, SLICE_LEN};
pub use error::Error;
pub use wavetable::{
    frame_start, replicate_frames, FRAME_LEN, MAX_FRAMES, MAX_TABLE_SAMPLES, NUM_MIP_LEVELS,
    REPLICATED_FRAME_LEN, REPLICATED_TABLE_SAMPLES,
};

// -------------------------------------------------------------------------------------------------

// public mods

pub mod resampler;
pub mod utils;
