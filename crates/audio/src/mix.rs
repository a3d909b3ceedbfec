//! Channel conversion between interleaved device buffers and the mono pipeline.

use std::borrow::Cow;

/// Average interleaved channels into mono. Borrows when already mono.
pub fn downmix(samples: &[f32], channels: usize) -> Cow<'_, [f32]> {
    if channels <= 1 {
        return Cow::Borrowed(samples);
    }

    let inv_channels = 1.0 / channels as f32;
    let mut output = Vec::with_capacity(samples.len() / channels);
    for frame in samples.chunks_exact(channels) {
        let sum: f32 = frame.iter().sum();
        output.push(sum * inv_channels);
    }
    Cow::Owned(output)
}

/// Replicate mono samples into every channel of an interleaved buffer.
///
/// Frames of `output` beyond `mono.len()` are filled with silence.
pub fn upmix_into(mono: &[f32], channels: usize, output: &mut [f32]) {
    let channels = channels.max(1);
    for (i, frame) in output.chunks_mut(channels).enumerate() {
        let value = mono.get(i).copied().unwrap_or(0.0);
        frame.fill(value);
    }
}
