//! Band-limited fractional resampling over mip-mapped wavetables.
//!
//! The resampler combines three pieces: a polyphase FIR interpolator
//! ([`InterpPack`](interpolator::InterpPack)) for fractional positions, a
//! [`MipMap`](mipmap::MipMap) pyramid of progressively half-band filtered
//! and decimated copies of the source for alias-free upward pitch shifts,
//! and a per-voice [`LaneResampler`](lane::LaneResampler) which picks the
//! mipmap level from the playback pitch and crossfades between levels when
//! the pitch crosses an octave boundary.

pub mod halfband;
pub mod interpolator;
pub mod lane;
pub mod mipmap;

// -------------------------------------------------------------------------------------------------

/// Number of bits per octave in the fixed-point pitch representation.
/// The integer part of `pitch >> BITS_PER_OCTAVE` directly selects a mipmap
/// level, the remainder maps to the playback step within that level.
pub const BITS_PER_OCTAVE: u32 = 16;

/// Length of the crossfade, in samples, applied when a lane switches mipmap
/// levels or when a voice switches frames.
pub const FADE_LEN: usize = 64;
