//! Sample-rate conversion between the capture rate, the 16 kHz analysis rate
//! and the model output rate.
//!
//! `Resampler` calls are independent: the FFT resampler is reset before each call, so the
//! output depends only on the input samples and the rate pair. `StreamResampler` keeps
//! filter state across calls for one continuous stream delivered in pieces.

use rubato::{FftFixedIn, Resampler as RubatoResampler};

/// Input chunk size handed to rubato. Larger chunks amortize the FFT setup
/// since calls are one-shot rather than continuous.
const FFT_CHUNK_SIZE: usize = 1024;

/// Sub-chunks for better quality.
const FFT_SUB_CHUNKS: usize = 2;

/// Highest rate accepted on either side of a conversion.
pub const MAX_SAMPLE_RATE: u32 = 768_000;

/// rubato sizes its FFTs from the rate ratio reduced to lowest terms. Pairs with a larger
/// term use linear interpolation instead.
const MAX_FFT_RATIO_TERM: u32 = 4096;

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn check_rate(rate: u32) -> crate::Result<()> {
    if rate == 0 || rate > MAX_SAMPLE_RATE {
        return Err(crate::AudioError::InvalidSampleRate(rate));
    }
    Ok(())
}

/// Build the FFT resampler for a rate pair, or `None` when linear interpolation is used.
fn build_fft(from_rate: u32, to_rate: u32) -> Option<FftFixedIn<f32>> {
    if from_rate == to_rate {
        return None;
    }

    let divisor = gcd(from_rate, to_rate);
    if from_rate / divisor > MAX_FFT_RATIO_TERM || to_rate / divisor > MAX_FFT_RATIO_TERM {
        tracing::warn!(
            from_rate,
            to_rate,
            "rate ratio too fine for the FFT resampler, falling back to linear interpolation"
        );
        return None;
    }

    match FftFixedIn::<f32>::new(
        from_rate as usize,
        to_rate as usize,
        FFT_CHUNK_SIZE,
        FFT_SUB_CHUNKS,
        1, // Mono channel
    ) {
        Ok(fft) => Some(fft),
        Err(e) => {
            tracing::warn!(
                from_rate,
                to_rate,
                error = %e,
                "FFT resampler unavailable, falling back to linear interpolation"
            );
            None
        }
    }
}

/// Output samples for `input_len` input samples, rounded to nearest.
fn scaled_len(input_len: u64, from_rate: u32, to_rate: u32) -> u64 {
    let from = from_rate as u64;
    (input_len * to_rate as u64 + from / 2) / from
}

/// Converts mono audio between a fixed pair of sample rates.
pub struct Resampler {
    from_rate: u32,
    to_rate: u32,
    fft: Option<FftFixedIn<f32>>,
}

impl Resampler {
    pub fn new(from_rate: u32, to_rate: u32) -> crate::Result<Self> {
        check_rate(from_rate)?;
        check_rate(to_rate)?;

        Ok(Self {
            from_rate,
            to_rate,
            fft: build_fft(from_rate, to_rate),
        })
    }

    pub fn from_rate(&self) -> u32 {
        self.from_rate
    }

    pub fn to_rate(&self) -> u32 {
        self.to_rate
    }

    pub fn is_passthrough(&self) -> bool {
        self.from_rate == self.to_rate
    }

    /// Number of output samples produced for `input_len` input samples.
    pub fn output_len(&self, input_len: usize) -> usize {
        scaled_len(input_len as u64, self.from_rate, self.to_rate) as usize
    }

    /// Resample `samples`, returning exactly `output_len(samples.len())` samples.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        if samples.is_empty() {
            return Vec::new();
        }
        if self.is_passthrough() {
            return samples.to_vec();
        }

        let expected = self.output_len(samples.len());
        match self.fft.as_mut() {
            Some(fft) => process_fft(fft, samples, expected),
            None => resample_linear(samples, self.from_rate, self.to_rate, expected),
        }
    }
}

/// Resamples one continuous stream that arrives in pieces of any size.
///
/// Input is fed to rubato in fixed chunks and the filter is never reset between calls,
/// so how the stream is split has no effect on the output. Output lags the input by up
/// to one chunk; `finish` drains it so the stream's total output is exactly
/// `output_len(total input)`.
pub struct StreamResampler {
    from_rate: u32,
    to_rate: u32,
    fft: Option<FftFixedIn<f32>>,
    /// Input not yet consumed: a partial FFT chunk, or the linear interpolation history.
    pending: Vec<f32>,
    /// Absolute input index of `pending[0]` (linear interpolation only).
    pending_start: u64,
    consumed: u64,
    emitted: u64,
    /// Leading filter delay still to be discarded.
    to_skip: usize,
}

impl StreamResampler {
    pub fn new(from_rate: u32, to_rate: u32) -> crate::Result<Self> {
        check_rate(from_rate)?;
        check_rate(to_rate)?;

        let fft = build_fft(from_rate, to_rate);
        let to_skip = fft.as_ref().map_or(0, |fft| fft.output_delay());
        Ok(Self {
            from_rate,
            to_rate,
            fft,
            pending: Vec::new(),
            pending_start: 0,
            consumed: 0,
            emitted: 0,
            to_skip,
        })
    }

    pub fn from_rate(&self) -> u32 {
        self.from_rate
    }

    pub fn to_rate(&self) -> u32 {
        self.to_rate
    }

    pub fn is_passthrough(&self) -> bool {
        self.from_rate == self.to_rate
    }

    /// Feed the next piece of the stream; returns whatever output is ready.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        self.consumed += samples.len() as u64;
        if self.is_passthrough() {
            self.emitted += samples.len() as u64;
            return samples.to_vec();
        }

        self.pending.extend_from_slice(samples);
        let Some(fft) = self.fft.as_mut() else {
            return self.pull_linear(false);
        };

        let mut raw = Vec::new();
        while self.pending.len() >= fft.input_frames_next() {
            let needed = fft.input_frames_next();
            let chunk = [&self.pending[..needed]];
            match fft.process(&chunk[..], None) {
                Ok(frames) => {
                    if let Some(channel) = frames.first() {
                        raw.extend_from_slice(channel);
                    }
                }
                Err(e) => tracing::warn!(error = %e, "FFT resampling failed mid-stream"),
            }
            self.pending.drain(..needed);
        }
        self.accept(raw)
    }

    /// End the stream: emit the remaining output and start over for the next stream.
    pub fn finish(&mut self) -> Vec<f32> {
        let expected = scaled_len(self.consumed, self.from_rate, self.to_rate);

        let mut output = if self.is_passthrough() {
            Vec::new()
        } else if let Some(fft) = self.fft.as_mut() {
            let mut raw = Vec::new();
            if !self.pending.is_empty() {
                let chunk = [&self.pending[..]];
                if let Ok(frames) = fft.process_partial(Some(&chunk[..]), None) {
                    if let Some(channel) = frames.first() {
                        raw.extend_from_slice(channel);
                    }
                }
            }
            // Flush the filter tail with silence.
            let target = expected as usize + self.to_skip;
            while (self.emitted as usize) + raw.len() < target {
                match fft.process_partial(None::<&[&[f32]]>, None) {
                    Ok(frames) => match frames.first() {
                        Some(channel) if !channel.is_empty() => raw.extend_from_slice(channel),
                        _ => break,
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "FFT resampling failed while draining");
                        break;
                    }
                }
            }
            self.accept(raw)
        } else {
            self.pull_linear(true)
        };

        // Exact total length, whatever the filter produced.
        if self.emitted > expected {
            let excess = (self.emitted - expected) as usize;
            output.truncate(output.len().saturating_sub(excess));
        } else {
            output.resize(output.len() + (expected - self.emitted) as usize, 0.0);
        }

        self.reset();
        output
    }

    pub fn reset(&mut self) {
        if let Some(fft) = self.fft.as_mut() {
            fft.reset();
            self.to_skip = fft.output_delay();
        }
        self.pending.clear();
        self.pending_start = 0;
        self.consumed = 0;
        self.emitted = 0;
    }

    /// Drop the filter delay from the front of the stream and count what is returned.
    fn accept(&mut self, mut raw: Vec<f32>) -> Vec<f32> {
        let skip = self.to_skip.min(raw.len());
        raw.drain(..skip);
        self.to_skip -= skip;
        self.emitted += raw.len() as u64;
        raw
    }

    /// Interpolate every output sample whose neighbours have arrived.
    fn pull_linear(&mut self, finishing: bool) -> Vec<f32> {
        let step = self.from_rate as f64 / self.to_rate as f64;
        let target = if finishing {
            scaled_len(self.consumed, self.from_rate, self.to_rate)
        } else {
            u64::MAX
        };

        let mut output = Vec::new();
        while self.emitted < target {
            let position = self.emitted as f64 * step;
            let index = position.floor() as u64;
            if !finishing && index + 1 >= self.consumed {
                break;
            }
            let frac = position.fract() as f32;
            let at = |i: u64| {
                i.checked_sub(self.pending_start)
                    .and_then(|offset| self.pending.get(offset as usize))
                    .copied()
                    .unwrap_or(0.0)
            };
            let sample = if index + 1 < self.consumed {
                at(index) * (1.0 - frac) + at(index + 1) * frac
            } else {
                at(index)
            };
            output.push(sample);
            self.emitted += 1;
        }

        // Keep history from the next output's left neighbour on.
        let next = (self.emitted as f64 * step).floor() as u64;
        let drop = next.saturating_sub(self.pending_start).min(self.pending.len() as u64);
        self.pending.drain(..drop as usize);
        self.pending_start += drop;
        output
    }
}

/// Run the whole input through rubato and compensate its output delay.
fn process_fft(fft: &mut FftFixedIn<f32>, samples: &[f32], expected: usize) -> Vec<f32> {
    fft.reset();
    let delay = fft.output_delay();
    let target = expected + delay;
    let mut output = Vec::with_capacity(target + fft.output_frames_max());
    let mut pos = 0;

    while output.len() < target {
        let needed = fft.input_frames_next();
        let remaining = samples.len() - pos;

        let result = if remaining >= needed {
            let chunk = [&samples[pos..pos + needed]];
            pos += needed;
            fft.process(&chunk[..], None)
        } else if remaining > 0 {
            let chunk = [&samples[pos..]];
            pos = samples.len();
            fft.process_partial(Some(&chunk[..]), None)
        } else {
            // Flush the filter tail with silence.
            fft.process_partial(None::<&[&[f32]]>, None)
        };

        match result {
            Ok(frames) => match frames.first() {
                Some(channel) if !channel.is_empty() => output.extend_from_slice(channel),
                _ => break,
            },
            Err(e) => {
                tracing::warn!(error = %e, "FFT resampling failed mid-call");
                break;
            }
        }
    }

    output.drain(..delay.min(output.len()));
    output.resize(expected, 0.0);
    output
}

/// Linear interpolation resampling (fallback when the FFT resampler cannot be built).
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32, expected: usize) -> Vec<f32> {
    let ratio = to_rate as f64 / from_rate as f64;
    let mut output = Vec::with_capacity(expected);

    for i in 0..expected {
        let src_idx = i as f64 / ratio;
        let idx = src_idx.floor() as usize;
        let frac = src_idx.fract() as f32;
        let sample = if idx + 1 < samples.len() {
            samples[idx] * (1.0 - frac) + samples[idx + 1] * frac
        } else if idx < samples.len() {
            samples[idx]
        } else {
            0.0
        };
        output.push(sample);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_same_rate_is_identity() {
        let mut resampler = Resampler::new(22050, 22050).unwrap();
        let input = sine(440.0, 22050, 1000);
        assert_eq!(resampler.process(&input), input);
    }

    #[test]
    fn test_output_length_is_exact() {
        let mut resampler = Resampler::new(44100, 16000).unwrap();
        // 12 frames of 20ms at 44.1kHz -> 12 frames of 320 samples.
        let input = sine(220.0, 44100, 882 * 12);
        let output = resampler.process(&input);
        assert_eq!(output.len(), 320 * 12);
    }

    #[test]
    fn test_calls_are_independent() {
        let mut resampler = Resampler::new(22050, 16000).unwrap();
        let input = sine(330.0, 22050, 4410);
        let first = resampler.process(&input);
        let _ = resampler.process(&sine(1000.0, 22050, 2205));
        let second = resampler.process(&input);
        assert_eq!(first, second, "output must not depend on previous calls");
    }

    #[test]
    fn test_upsampling_preserves_level() {
        let mut resampler = Resampler::new(16000, 48000).unwrap();
        let input = sine(200.0, 16000, 16000);
        let output = resampler.process(&input);
        assert_eq!(output.len(), 48000);

        // Compare RMS away from the edges.
        let rms = |s: &[f32]| (s.iter().map(|x| x * x).sum::<f32>() / s.len() as f32).sqrt();
        let in_rms = rms(&input[1600..14400]);
        let out_rms = rms(&output[4800..43200]);
        assert!((in_rms - out_rms).abs() < 0.02, "{in_rms} vs {out_rms}");
    }

    #[test]
    fn test_empty_input() {
        let mut resampler = Resampler::new(44100, 16000).unwrap();
        assert!(resampler.process(&[]).is_empty());
    }

    #[test]
    fn test_rejects_rates_beyond_range() {
        assert!(matches!(
            Resampler::new(400_000_009, 22050),
            Err(crate::AudioError::InvalidSampleRate(400_000_009))
        ));
        assert!(matches!(
            StreamResampler::new(16000, MAX_SAMPLE_RATE + 1),
            Err(crate::AudioError::InvalidSampleRate(_))
        ));
    }

    #[test]
    fn test_coprime_rates_use_linear_interpolation() {
        // Reduced ratio 191999/22050 would need a huge FFT.
        let mut resampler = Resampler::new(191_999, 22050).unwrap();
        assert!(resampler.fft.is_none());
        let output = resampler.process(&sine(300.0, 191_999, 191_999));
        assert_eq!(output.len(), 22050);
    }

    #[test]
    fn test_linear_fallback_length() {
        let output = resample_linear(&[0.0, 1.0, 0.0, -1.0], 16000, 32000, 8);
        assert_eq!(output.len(), 8);
        assert!((output[1] - 0.5).abs() < 1e-6);
    }

    mod stream {
        use super::*;

        fn run_in_packets(
            resampler: &mut StreamResampler,
            input: &[f32],
            packet: usize,
        ) -> Vec<f32> {
            let mut output = Vec::new();
            for piece in input.chunks(packet) {
                output.extend(resampler.process(piece));
            }
            output.extend(resampler.finish());
            output
        }

        #[test]
        fn test_packet_size_does_not_change_output() {
            let input = sine(220.0, 16000, 16000);
            let mut resampler = StreamResampler::new(16000, 22050).unwrap();

            let whole = run_in_packets(&mut resampler, &input, input.len());
            let packets = run_in_packets(&mut resampler, &input, 320);
            assert_eq!(whole.len(), 22050);
            assert_eq!(whole, packets);
        }

        #[test]
        fn test_matches_one_shot_away_from_the_end() {
            let input = sine(220.0, 16000, 16000);
            let one_shot = Resampler::new(16000, 22050).unwrap().process(&input);
            let mut resampler = StreamResampler::new(16000, 22050).unwrap();
            let streamed = run_in_packets(&mut resampler, &input, 320);

            let max_diff = one_shot[..21000]
                .iter()
                .zip(&streamed[..21000])
                .map(|(a, b)| (a - b).abs())
                .fold(0.0_f32, f32::max);
            assert!(max_diff < 1e-4, "max diff {max_diff}");
        }

        #[test]
        fn test_linear_stream_is_split_invariant() {
            let input = sine(300.0, 191_999, 191_999);
            let mut resampler = StreamResampler::new(191_999, 22050).unwrap();
            assert!(resampler.fft.is_none());

            let whole = run_in_packets(&mut resampler, &input, input.len());
            let packets = run_in_packets(&mut resampler, &input, 777);
            assert_eq!(whole.len(), 22050);
            assert_eq!(whole, packets);
        }

        #[test]
        fn test_output_lags_then_finish_completes() {
            let mut resampler = StreamResampler::new(48000, 16000).unwrap();
            let ready = resampler.process(&sine(300.0, 48000, 4800));
            assert!(ready.len() < 1600);
            let rest = resampler.finish();
            assert_eq!(ready.len() + rest.len(), 1600);

            // A finished stream starts over.
            assert!(resampler.finish().is_empty());
        }

        #[test]
        fn test_same_rate_passes_through() {
            let input = sine(440.0, 16000, 1000);
            let mut resampler = StreamResampler::new(16000, 16000).unwrap();
            assert_eq!(resampler.process(&input), input);
            assert!(resampler.finish().is_empty());
        }
    }
}
