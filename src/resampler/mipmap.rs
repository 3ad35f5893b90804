use std::f64::consts::PI;

use crate::error::Error;

use super::interpolator::FIR_LEN;

// -------------------------------------------------------------------------------------------------

/// Number of taps of the half-band FIR used to build mipmap levels.
pub const MIP_MAP_FIR_LEN: usize = 81;

/// The half-band FIR the mipmap levels are filtered with before decimation:
/// a centered windowed sinc with cutoff at a quarter of the rate. Being a
/// half-band design, every second tap off the center vanishes.
pub fn mip_map_fir() -> [f64; MIP_MAP_FIR_LEN] {
    let half = (MIP_MAP_FIR_LEN / 2) as i64;
    let mut taps = [0.0; MIP_MAP_FIR_LEN];
    for (index, tap) in taps.iter_mut().enumerate() {
        let x = index as i64 - half;
        let u = x as f64 / MIP_MAP_FIR_LEN as f64 + 0.5;
        *tap = 0.5 * sinc(0.5 * x as f64) * blackman_harris(u);
    }
    taps
}

#[inline]
fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

fn blackman_harris(u: f64) -> f64 {
    const A0: f64 = 0.35875;
    const A1: f64 = 0.48829;
    const A2: f64 = 0.14128;
    const A3: f64 = 0.01168;
    A0 - A1 * (2.0 * PI * u).cos() + A2 * (4.0 * PI * u).cos() - A3 * (6.0 * PI * u).cos()
}

// -------------------------------------------------------------------------------------------------

/// Sample data container holding the source plus successively half-band
/// filtered, 2x-decimated copies of it.
///
/// Create it with [`Self::new`], then stream the source in with
/// [`Self::fill`]. Once the expected length is reached the remaining levels
/// are built synchronously and the pyramid becomes [`Self::is_ready`].
/// Every level buffer carries pre and post padding of at least the build
/// filter's support, so FIR lookback around any in-range position needs no
/// bounds handling.
///
/// A built pyramid is immutable and can be shared between any number of
/// voice lanes.
pub struct MipMap {
    levels: Vec<Vec<f32>>,
    /// Causal half of the build kernel, center tap first. Dropped after the
    /// pyramid is built.
    filter: Vec<f32>,
    expected_len: usize,
    filled_len: usize,
    pre_pad: usize,
    post_pad: usize,
}

impl MipMap {
    /// Allocate a pyramid for a source of `len` samples with `num_levels`
    /// levels. `pre_pad`/`post_pad` request padding around each level and
    /// are raised to the build kernel's support if smaller. `kernel` is the
    /// symmetric half-band FIR used to build the levels; its length must be
    /// odd.
    pub fn new(
        len: usize,
        pre_pad: usize,
        post_pad: usize,
        num_levels: usize,
        kernel: &[f64],
    ) -> Self {
        assert!(num_levels > 0);
        assert!(kernel.len() % 2 == 1);

        let half = kernel.len() / 2;
        // the kernel is symmetric, keeping the causal half is enough
        let filter: Vec<f32> = (0..=half).map(|tap| kernel[half + tap] as f32).collect();

        let filter_support = half * 2;
        let mut mip_map = Self {
            levels: Vec::with_capacity(num_levels),
            filter,
            expected_len: len,
            filled_len: 0,
            pre_pad: pre_pad.max(filter_support),
            post_pad: post_pad.max(filter_support),
        };
        for level in 0..num_levels {
            let table_len = mip_map.pre_pad + mip_map.level_len(level) + mip_map.post_pad;
            mip_map.levels.push(vec![0.0; table_len]);
        }
        mip_map
    }

    /// Append source data into level 0. Returns `Ok(true)` while more data
    /// is needed; on the call that completes the expected length, all
    /// remaining levels are built and `Ok(false)` is returned.
    pub fn fill(&mut self, data: &[f32]) -> Result<bool, Error> {
        if self.levels.is_empty() {
            return Err(Error::NotReady);
        }
        if data.len() > self.expected_len - self.filled_len {
            return Err(Error::InputOverflow);
        }
        let offset = self.pre_pad + self.filled_len;
        self.levels[0][offset..offset + data.len()].copy_from_slice(data);
        self.filled_len += data.len();

        if self.filled_len == self.expected_len {
            for level in 1..self.levels.len() {
                self.build_level(level);
            }
            self.filter = Vec::new();
        }
        Ok(self.filled_len < self.expected_len)
    }

    /// Is the pyramid fully loaded and built?
    pub fn is_ready(&self) -> bool {
        !self.levels.is_empty() && self.filled_len == self.expected_len
    }

    /// Length of the original source, in samples.
    pub fn sample_len(&self) -> usize {
        self.expected_len
    }

    /// Number of mipmap levels.
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Unpadded length of the given level's table.
    pub fn level_len(&self, level: usize) -> usize {
        (self.expected_len + (1 << level) - 1) >> level
    }

    /// Access a level's sample data for playback. Fails with
    /// [`Error::NotReady`] until the pyramid is fully built.
    pub fn level(&self, level: usize) -> Result<MipMapLevel<'_>, Error> {
        if !self.is_ready() {
            return Err(Error::NotReady);
        }
        Ok(MipMapLevel {
            data: &self.levels[level],
            origin: self.pre_pad,
        })
    }

    fn build_level(&mut self, level: usize) {
        debug_assert!(level > 0 && level < self.levels.len());
        let half = self.filter.len() - 1;
        let quarter = (half / 2) as i64;
        let end_pos = self.level_len(level) as i64 + quarter;
        let origin = self.pre_pad as i64;

        let (head, tail) = self.levels.split_at_mut(level);
        let reference = head[level - 1].as_slice();
        let dest = &mut tail[0];

        // run a little past both ends so the padding carries filtered data
        for pos in -quarter..end_pos {
            let ref_pos = (origin + pos * 2) as usize;
            dest[(origin + pos) as usize] = filter_sample(&self.filter, reference, ref_pos);
        }
    }
}

impl Default for MipMap {
    /// An empty, never-ready pyramid. Stands in before the first real table
    /// is published.
    fn default() -> Self {
        Self {
            levels: Vec::new(),
            filter: Vec::new(),
            expected_len: 0,
            filled_len: 0,
            pre_pad: 0,
            post_pad: 0,
        }
    }
}

/// Convolve the symmetric kernel (causal half in `filter`, center first)
/// with `table` around `pos`.
#[inline]
fn filter_sample(filter: &[f32], table: &[f32], pos: usize) -> f32 {
    let half = filter.len() - 1;
    debug_assert!(pos >= half && pos + half < table.len());
    let mut sum = table[pos] * filter[0];
    for tap in 1..=half {
        sum += (table[pos - tap] + table[pos + tap]) * filter[tap];
    }
    sum
}

// -------------------------------------------------------------------------------------------------

/// Read access to one level of a [`MipMap`], with the origin offset by the
/// pre padding so positions slightly below zero stay in bounds.
#[derive(Clone, Copy)]
pub struct MipMapLevel<'a> {
    data: &'a [f32],
    origin: usize,
}

impl<'a> MipMapLevel<'a> {
    /// The FIR tap window around the given integer position. Index 0 of the
    /// window sits at `pos - FIR_LEN / 2 + 1`. Positions running past the
    /// padded table (a fading voice can overshoot its window) clamp into
    /// the padding.
    #[inline]
    pub fn fir_window(&self, pos: i64) -> &'a [f32] {
        let start = self.origin as i64 + pos - (FIR_LEN as i64 / 2 - 1);
        let start = start.clamp(0, self.data.len().saturating_sub(FIR_LEN) as i64) as usize;
        &self.data[start..start + FIR_LEN]
    }

    /// A single sample of the level. Positions in `[-pre_pad, 0)` are legal.
    #[inline]
    pub fn sample(&self, pos: i64) -> f32 {
        self.data[(self.origin as i64 + pos) as usize]
    }
}

// -------------------------------------------------------------------------------------------------
