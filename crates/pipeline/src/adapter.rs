//! The seam between the streaming core and a voice conversion model.

use std::time::Instant;

use timbre_audio::Resampler;

use crate::config::InferenceParams;
use crate::constants::DEFAULT_FRAME_RATE;
use crate::error::InferenceError;

/// Per-voice conditioning derived once from the reference clip.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceVoiceState {
    pub voice_id: String,
    /// Seconds of reference audio the state was derived from.
    pub prompt_secs: f32,
    pub speaker_embedding: Vec<f32>,
    /// Content-conditioning prefix prepended to every window.
    pub prompt_condition: Vec<f32>,
    pub prepared_at: Instant,
}

impl ReferenceVoiceState {
    pub fn new(voice_id: impl Into<String>, prompt_secs: f32) -> Self {
        Self {
            voice_id: voice_id.into(),
            prompt_secs,
            speaker_embedding: Vec::new(),
            prompt_condition: Vec::new(),
            prepared_at: Instant::now(),
        }
    }
}

/// One call into the model: the full window plus how much of the output to keep.
///
/// `skip_head`, `skip_tail` and `return_length` are in model frames.
#[derive(Debug, Clone, Copy)]
pub struct ConversionRequest<'a> {
    pub window: &'a [f32],
    pub window_16k: &'a [f32],
    pub sample_rate: u32,
    pub skip_head: usize,
    pub skip_tail: usize,
    pub return_length: usize,
    /// Leading frames seen by the content encoder only.
    pub context_trim: usize,
    pub params: &'a InferenceParams,
}

/// A voice conversion model, treated as a black box.
///
/// Implementations must return exactly `return_length` frames of audio at
/// `output_sample_rate()`. They are shared between sessions and must not keep
/// per-session state.
pub trait InferenceAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn output_sample_rate(&self) -> u32;

    /// Model frames per second. Window zones are whole frames.
    fn frames_per_second(&self) -> u32 {
        DEFAULT_FRAME_RATE
    }

    /// Derive the conditioning for a reference clip given at `output_sample_rate()`.
    fn prepare_reference(
        &self,
        voice_id: &str,
        reference: &[f32],
    ) -> Result<ReferenceVoiceState, InferenceError>;

    fn convert(
        &self,
        reference: &ReferenceVoiceState,
        request: &ConversionRequest<'_>,
    ) -> Result<Vec<f32>, InferenceError>;
}

/// Returns the input's return region unchanged, resampled to its output rate.
///
/// Used when no model backend is configured, to exercise the plumbing end to end.
#[derive(Debug, Clone)]
pub struct PassthroughAdapter {
    sample_rate: u32,
    frame_rate: u32,
}

impl PassthroughAdapter {
    pub fn new(sample_rate: u32) -> Self {
        Self::with_frame_rate(sample_rate, DEFAULT_FRAME_RATE)
    }

    pub fn with_frame_rate(sample_rate: u32, frame_rate: u32) -> Self {
        Self {
            sample_rate,
            frame_rate,
        }
    }
}

impl InferenceAdapter for PassthroughAdapter {
    fn name(&self) -> &str {
        "passthrough"
    }

    fn output_sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frames_per_second(&self) -> u32 {
        self.frame_rate
    }

    fn prepare_reference(
        &self,
        voice_id: &str,
        reference: &[f32],
    ) -> Result<ReferenceVoiceState, InferenceError> {
        if reference.is_empty() {
            return Err(InferenceError::Reference(format!(
                "empty reference audio for '{voice_id}'"
            )));
        }
        Ok(ReferenceVoiceState::new(
            voice_id,
            reference.len() as f32 / self.sample_rate as f32,
        ))
    }

    fn convert(
        &self,
        _reference: &ReferenceVoiceState,
        request: &ConversionRequest<'_>,
    ) -> Result<Vec<f32>, InferenceError> {
        let hop = (request.sample_rate / self.frame_rate) as usize;
        let start = request.skip_head * hop;
        let end = start + request.return_length * hop;
        let region = request.window.get(start..end).ok_or_else(|| {
            InferenceError::Failed(format!(
                "window of {} samples has no return region {start}..{end}",
                request.window.len()
            ))
        })?;

        let mut resampler = Resampler::new(request.sample_rate, self.sample_rate)
            .map_err(|e| InferenceError::Failed(e.to_string()))?;
        Ok(resampler.process(region))
    }
}
