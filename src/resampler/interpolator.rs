use std::f64::consts::PI;

// -------------------------------------------------------------------------------------------------

/// Log2 of the number of discrete fractional phases.
pub const NBR_PHASES_L2: u32 = 6;
/// Number of discrete fractional phases of the interpolator.
pub const NBR_PHASES: usize = 1 << NBR_PHASES_L2;
/// Number of FIR taps evaluated per output sample.
pub const FIR_LEN: usize = 12;
/// Length of the reference impulse the phase tables are built from.
pub const IMPULSE_LEN: usize = FIR_LEN * NBR_PHASES;

// -------------------------------------------------------------------------------------------------

/// One phase of the polyphase FIR interpolator.
///
/// Holds the tap coefficients (`imp`) and the forward difference to the next
/// phase's coefficients (`dif`), both in reversed tap order so the
/// convolution walks the input window front to back.
#[derive(Clone, Copy)]
struct InterpPhase {
    imp: [f32; FIR_LEN],
    dif: [f32; FIR_LEN],
}

impl InterpPhase {
    /// Convolve one phase with the given tap window, linearly interpolating
    /// towards the next phase by `q` in `[0, 1)`.
    #[inline]
    fn convolve(&self, data: &[f32], q: f32) -> f32 {
        let d = &data[..FIR_LEN];
        let imp = &self.imp;
        let dif = &self.dif;
        // two accumulators pipeline better than a single running sum
        let mut c_0 = (imp[0] + dif[0] * q) * d[0];
        let mut c_1 = (imp[1] + dif[1] * q) * d[1];
        c_0 += (imp[2] + dif[2] * q) * d[2];
        c_1 += (imp[3] + dif[3] * q) * d[3];
        c_0 += (imp[4] + dif[4] * q) * d[4];
        c_1 += (imp[5] + dif[5] * q) * d[5];
        c_0 += (imp[6] + dif[6] * q) * d[6];
        c_1 += (imp[7] + dif[7] * q) * d[7];
        c_0 += (imp[8] + dif[8] * q) * d[8];
        c_1 += (imp[9] + dif[9] * q) * d[9];
        c_0 += (imp[10] + dif[10] * q) * d[10];
        c_1 += (imp[11] + dif[11] * q) * d[11];
        c_0 + c_1
    }
}

// -------------------------------------------------------------------------------------------------

/// The full set of 64 FIR phases, built once and shared read-only between
/// all voice lanes.
///
/// The pack is stateless: every [`Self::interpolate`] call is a pure
/// function of the input window and the fractional position, so it can be
/// used in random access over the source sample.
pub struct InterpPack {
    phases: [InterpPhase; NBR_PHASES],
}

impl InterpPack {
    /// Create a pack from the default reference impulse.
    pub fn new() -> Self {
        Self::from_impulse(&reference_impulse())
    }

    /// Build the phase tables from a centered reference impulse of
    /// [`IMPULSE_LEN`] coefficients.
    pub fn from_impulse(impulse: &[f64; IMPULSE_LEN]) -> Self {
        let mut phases = [InterpPhase {
            imp: [0.0; FIR_LEN],
            dif: [0.0; FIR_LEN],
        }; NBR_PHASES];

        // walk the dense impulse backwards so `dif` becomes the forward
        // difference towards the coefficient of the next phase
        let mut next_coef = 0.0f64;
        for fir_pos in (0..FIR_LEN).rev() {
            for phase_index in (0..NBR_PHASES).rev() {
                let coef = impulse[fir_pos * NBR_PHASES + phase_index];
                let table_pos = FIR_LEN - 1 - fir_pos;
                let phase = &mut phases[phase_index];
                phase.imp[table_pos] = coef as f32;
                phase.dif[table_pos] = (next_coef - coef) as f32;
                next_coef = coef;
            }
        }
        Self { phases }
    }

    /// Interpolate a single output sample.
    ///
    /// `data` must be the FIR tap window whose first sample sits at
    /// `int_pos - FIR_LEN / 2 + 1` of the source, `frac_pos` is the 32-bit
    /// fractional sample position: the top [`NBR_PHASES_L2`] bits select the
    /// phase table, the remaining bits become the sub-phase `q`.
    #[inline]
    pub fn interpolate(&self, data: &[f32], frac_pos: u32) -> f32 {
        const Q_SCALE: f32 = 1.0 / (65536.0 * 65536.0);
        let q = (frac_pos << NBR_PHASES_L2) as f32 * Q_SCALE;
        let phase_index = (frac_pos >> (32 - NBR_PHASES_L2)) as usize;
        self.phases[phase_index].convolve(data, q)
    }

    /// Samples of lookback required before any interpolated position.
    pub fn len_pre() -> usize {
        FIR_LEN
    }

    /// Samples of lookahead required after any interpolated position.
    pub fn len_post() -> usize {
        FIR_LEN
    }
}

impl Default for InterpPack {
    fn default() -> Self {
        Self::new()
    }
}

// -------------------------------------------------------------------------------------------------

#[inline]
fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

/// 4-term Blackman-Harris window, evaluated at `u` in `[0, 1]`.
fn blackman_harris(u: f64) -> f64 {
    const A0: f64 = 0.35875;
    const A1: f64 = 0.48829;
    const A2: f64 = 0.14128;
    const A3: f64 = 0.01168;
    A0 - A1 * (2.0 * PI * u).cos() + A2 * (4.0 * PI * u).cos() - A3 * (6.0 * PI * u).cos()
}

/// The default reference impulse: a centered windowed sinc with cutoff at a
/// quarter of the source rate, dense over all 64 phases. Per-phase DC gain
/// is unity, so playback at the mipmap transition keeps its amplitude.
pub fn reference_impulse() -> [f64; IMPULSE_LEN] {
    let mut impulse = [0.0; IMPULSE_LEN];
    let half = (IMPULSE_LEN / 2) as f64;
    for (index, value) in impulse.iter_mut().enumerate() {
        let x = (index as f64 - half) / NBR_PHASES as f64;
        *value = 0.5 * sinc(0.5 * x) * blackman_harris(index as f64 / IMPULSE_LEN as f64);
    }
    impulse
}

// -------------------------------------------------------------------------------------------------
