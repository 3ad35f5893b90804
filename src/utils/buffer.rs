// -------------------------------------------------------------------------------------------------

/// Clear the given buffer to silence.
#[inline]
pub fn clear_buffer(buffer: &mut [f32]) {
    buffer.fill(0.0);
}

/// Add `source` into `dest`. Both buffers must have the same length.
#[inline]
pub fn add_buffers(dest: &mut [f32], source: &[f32]) {
    debug_assert_eq!(dest.len(), source.len());
    for (d, s) in dest.iter_mut().zip(source) {
        *d += *s;
    }
}

/// Multiply all samples in the given buffer with the given factor.
#[inline]
pub fn scale_buffer(buffer: &mut [f32], factor: f32) {
    for sample in buffer.iter_mut() {
        *sample *= factor;
    }
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_ops() {
        let mut dest = vec![1.0, 2.0, 3.0];
        add_buffers(&mut dest, &[3.0, 2.0, 1.0]);
        assert_eq!(dest, vec![4.0, 4.0, 4.0]);
        scale_buffer(&mut dest, 0.5);
        assert_eq!(dest, vec![2.0, 2.0, 2.0]);
        clear_buffer(&mut dest);
        assert_eq!(dest, vec![0.0, 0.0, 0.0]);
    }
}
