use timbre_voices::VoiceProfile;

use crate::adapter::{InferenceAdapter, ReferenceVoiceState};
use crate::error::Result;

/// Identity of a prepared reference: voice id plus prompt length in milliseconds.
type ReferenceKey = (String, u32);

/// Holds the conditioning for one session's reference voice.
///
/// Recomputed only when the voice or the prompt length changes.
#[derive(Default)]
pub struct ReferenceCache {
    key: Option<ReferenceKey>,
    state: Option<ReferenceVoiceState>,
    preparations: u64,
}

impl ReferenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ensure(
        &mut self,
        adapter: &dyn InferenceAdapter,
        voice: &VoiceProfile,
        max_prompt_secs: f32,
    ) -> Result<&ReferenceVoiceState> {
        let key = (voice.id.clone(), (max_prompt_secs * 1000.0).round() as u32);
        if self.key.as_ref() != Some(&key) || self.state.is_none() {
            self.state = None;
            let audio = timbre_voices::load_reference(
                voice,
                adapter.output_sample_rate(),
                max_prompt_secs,
            )?;
            let state = adapter.prepare_reference(&voice.id, &audio)?;
            self.preparations += 1;
            tracing::info!(
                voice_id = %voice.id,
                prompt_secs = state.prompt_secs,
                "reference voice prepared"
            );
            self.key = Some(key);
            self.state = Some(state);
        }

        self.state
            .as_ref()
            .ok_or_else(|| crate::error::InferenceError::ModelNotLoaded.into())
    }

    /// How many times the reference has been (re)computed.
    pub fn preparations(&self) -> u64 {
        self.preparations
    }

    pub fn is_ready(&self) -> bool {
        self.state.is_some()
    }

    pub fn invalidate(&mut self) {
        self.key = None;
        self.state = None;
    }
}
