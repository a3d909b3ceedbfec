//! Fixed-length sliding window over the input, with its 16 kHz twin kept in step.

use timbre_audio::Resampler;

use crate::constants::{ANALYSIS_SAMPLE_RATE, RESAMPLE_OVERLAP_FRAMES};
use crate::error::{Result, SessionError};
use crate::planner::WindowPlan;

pub struct SlidingWindowBuffer {
    window: Vec<f32>,
    window_16k: Vec<f32>,
    block: usize,
    block_16k: usize,
    hop: usize,
    hop_16k: usize,
    /// Start of the region the model hands back (crossfade + search + block).
    return_start: usize,
    return_len: usize,
    resampler: Resampler,
}

impl SlidingWindowBuffer {
    pub fn new(plan: &WindowPlan) -> Result<Self> {
        Ok(Self {
            window: vec![0.0; plan.window_len()],
            window_16k: vec![0.0; plan.window_len_16k()],
            block: plan.samples.block,
            block_16k: plan.samples_16k.block,
            hop: plan.hop,
            hop_16k: plan.hop_16k,
            return_start: plan.samples.encoder_context,
            return_len: plan.samples.return_length(),
            resampler: Resampler::new(plan.sample_rate, ANALYSIS_SAMPLE_RATE)?,
        })
    }

    /// Slide the window by exactly one block.
    ///
    /// Only the new block plus a short overlap is resampled for the 16 kHz twin; the first
    /// resampled frame is dropped since it carries the filter's edge.
    pub fn advance(&mut self, block: &[f32]) -> Result<()> {
        if block.len() != self.block {
            return Err(SessionError::BlockSize {
                expected: self.block,
                actual: block.len(),
            });
        }

        let len = self.window.len();
        self.window.copy_within(self.block.., 0);
        self.window[len - self.block..].copy_from_slice(block);

        let len_16k = self.window_16k.len();
        self.window_16k.copy_within(self.block_16k.., 0);

        let overlap_frames = RESAMPLE_OVERLAP_FRAMES.min((len - self.block) / self.hop);
        let source = &self.window[len - self.block - overlap_frames * self.hop..];
        let resampled = self.resampler.process(source);
        let fresh = &resampled[self.hop_16k.min(resampled.len())..];
        let fresh = &fresh[fresh.len().saturating_sub(len_16k)..];
        self.window_16k[len_16k - fresh.len()..].copy_from_slice(fresh);

        Ok(())
    }

    pub fn window(&self) -> &[f32] {
        &self.window
    }

    pub fn window_16k(&self) -> &[f32] {
        &self.window_16k
    }

    /// The block written by the last `advance`.
    pub fn newest_block(&self) -> &[f32] {
        &self.window[self.window.len() - self.block..]
    }

    pub fn newest_block_16k(&self) -> &[f32] {
        &self.window_16k[self.window_16k.len() - self.block_16k..]
    }

    /// Crossfade + search + block zones at the processing rate.
    pub fn return_region(&self) -> &[f32] {
        &self.window[self.return_start..self.return_start + self.return_len]
    }

    pub fn block_len(&self) -> usize {
        self.block
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn reset(&mut self) {
        self.window.fill(0.0);
        self.window_16k.fill(0.0);
    }
}
