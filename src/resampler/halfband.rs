// -------------------------------------------------------------------------------------------------

/// Number of all-pass coefficients of the filter.
pub const NUM_COEFS: usize = 7;

/// Tiny bias injected into the filter state to keep denormals out of the
/// feedback paths.
const ANTI_DENORMAL: f32 = 1e-20;

/// Coefficients of the two all-pass cascades, interleaved: even indices
/// drive path 0, odd indices path 1. Designed for a transition band of 0.04
/// around a quarter of the input rate, with ~87 dB stopband rejection.
pub const DEFAULT_COEFS: [f64; NUM_COEFS] = [
    0.051802011461649332,
    0.18797844181961060,
    0.36505369019691541,
    0.54232737520590768,
    0.69777813051993742,
    0.82822659299557388,
    0.94312665397214224,
];

// -------------------------------------------------------------------------------------------------

/// Halves the sample rate with a two-path polyphase all-pass IIR low-pass.
///
/// [`Self::downsample_block`] doubles the signal level: the usual 0.5
/// averaging of the two paths is omitted to save a multiply per sample, so
/// callers have to compensate downstream. [`Self::phase_block`] runs the
/// same cascades with zeros fed to path 0, which leaves the rate and level
/// untouched but applies the filter's phase shift; it is used to line up a
/// non-downsampled signal with a downsampled one.
pub struct HalfBandFilter {
    coefs: [f32; NUM_COEFS],
    x: [f32; 2],
    y: [f32; NUM_COEFS],
}

impl HalfBandFilter {
    /// Create a filter with the default coefficient set.
    pub fn new() -> Self {
        Self::with_coefs(&DEFAULT_COEFS)
    }

    /// Create a filter from custom all-pass coefficients. All coefficients
    /// must lie in `(0, 1)`.
    pub fn with_coefs(coefs: &[f64; NUM_COEFS]) -> Self {
        let mut coef_arr = [0.0f32; NUM_COEFS];
        for (dest, coef) in coef_arr.iter_mut().zip(coefs) {
            debug_assert!(*coef > 0.0 && *coef < 1.0);
            *dest = *coef as f32;
        }
        Self {
            coefs: coef_arr,
            x: [0.0; 2],
            y: [0.0; NUM_COEFS],
        }
    }

    /// Clear the filter state, as if the input had been 0 forever.
    pub fn clear_buffers(&mut self) {
        self.x = [0.0; 2];
        self.y = [0.0; NUM_COEFS];
    }

    /// Filter and decimate a pair of input samples into one output sample.
    /// `path_1` is the earlier of the two samples. The output level is
    /// doubled.
    #[inline]
    fn process_sample(&mut self, path_0: f32, path_1: f32) -> f32 {
        let coefs = &self.coefs;

        let mut tmp_0 = self.x[0];
        let mut tmp_1 = self.x[1];
        self.x[0] = path_0;
        self.x[1] = path_1;

        let mut path_0 = (path_0 - self.y[0]) * coefs[0] + tmp_0;
        let mut path_1 = (path_1 - self.y[1]) * coefs[1] + tmp_1;
        tmp_0 = self.y[0];
        tmp_1 = self.y[1];
        self.y[0] = path_0;
        self.y[1] = path_1;

        path_0 = (path_0 - self.y[2]) * coefs[2] + tmp_0;
        path_1 = (path_1 - self.y[3]) * coefs[3] + tmp_1;
        tmp_0 = self.y[2];
        tmp_1 = self.y[3];
        self.y[2] = path_0;
        self.y[3] = path_1;

        path_0 = (path_0 - self.y[4]) * coefs[4] + tmp_0;
        path_1 = (path_1 - self.y[5]) * coefs[5] + tmp_1;
        tmp_0 = self.y[4];
        self.y[4] = path_0;
        self.y[5] = path_1;

        path_0 = (path_0 - self.y[6]) * coefs[6] + tmp_0;
        self.y[6] = path_0;

        path_0 + path_1
    }

    /// Downsample a block by two. `src` must hold `2 * dest.len()` samples.
    /// The output level is doubled relative to the input.
    pub fn downsample_block(&mut self, dest: &mut [f32], src: &[f32]) {
        debug_assert_eq!(src.len(), dest.len() * 2);
        for (out, pair) in dest.iter_mut().zip(src.chunks_exact(2)) {
            *out = self.process_sample(pair[1], pair[0]);
        }
    }

    /// Apply the filter's phase shift to a block without changing its rate,
    /// by feeding zeros into path 0. Processes in place.
    pub fn phase_block(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(0.0, *sample);
        }
        // flush denormals out of the idle path's feedback state
        self.y[0] += ANTI_DENORMAL;
        self.y[2] += ANTI_DENORMAL;
        self.y[4] += ANTI_DENORMAL;
        self.y[6] += ANTI_DENORMAL;
        self.y[0] -= ANTI_DENORMAL;
        self.y[2] -= ANTI_DENORMAL;
        self.y[4] -= ANTI_DENORMAL;
        self.y[6] -= ANTI_DENORMAL;
    }
}

impl Default for HalfBandFilter {
    fn default() -> Self {
        Self::new()
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::TAU;

    fn rms(buffer: &[f32]) -> f32 {
        (buffer.iter().map(|s| s * s).sum::<f32>() / buffer.len() as f32).sqrt()
    }

    #[test]
    fn passband_gain_is_doubled() {
        let mut filter = HalfBandFilter::new();
        let src: Vec<f32> = (0..16384)
            .map(|i| (TAU * 0.05 * i as f64).sin() as f32)
            .collect();
        let mut dest = vec![0.0; src.len() / 2];
        filter.downsample_block(&mut dest, &src);
        let gain = rms(&dest[1024..]) / (0.5f32).sqrt();
        assert!((gain - 2.0).abs() < 0.01, "passband gain {gain}");
    }

    #[test]
    fn stopband_is_rejected() {
        // content above half the output rate must not survive decimation
        let mut filter = HalfBandFilter::new();
        let src: Vec<f32> = (0..16384)
            .map(|i| (TAU * 0.45 * i as f64).sin() as f32)
            .collect();
        let mut dest = vec![0.0; src.len() / 2];
        filter.downsample_block(&mut dest, &src);
        let leak = dest[1024..].iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(leak < 1e-3, "stopband leak {leak}");
    }

    #[test]
    fn phase_block_keeps_level() {
        let mut filter = HalfBandFilter::new();
        let mut buffer: Vec<f32> = (0..8192)
            .map(|i| (TAU * 0.05 * i as f64).sin() as f32)
            .collect();
        let input_rms = rms(&buffer[1024..]);
        filter.phase_block(&mut buffer);
        let output_rms = rms(&buffer[1024..]);
        assert!((output_rms / input_rms - 1.0).abs() < 0.01);
    }

    #[test]
    fn clear_buffers_resets_state() {
        let mut filter = HalfBandFilter::new();
        let mut buffer = vec![1.0f32; 64];
        filter.phase_block(&mut buffer);
        filter.clear_buffers();
        let mut silence = vec![0.0f32; 64];
        filter.phase_block(&mut silence);
        assert!(silence.iter().all(|s| *s == 0.0));
    }
}
