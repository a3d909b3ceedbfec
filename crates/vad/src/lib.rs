use std::time::Duration;

pub use silero::{VadConfig, VadSession, VadTransition};

/// Rate the detector model runs at.
pub const VAD_SAMPLE_RATE: u32 = 16000;

#[derive(Debug, thiserror::Error)]
pub enum VadError {
    #[error("unsupported sample rate: {0}")]
    UnsupportedSampleRate(u32),
    #[error("session creation failed: {0}")]
    SessionCreationFailed(String),
    #[error("inference error: {0}")]
    InferenceError(String),
}

pub type Result<T> = std::result::Result<T, VadError>;

/// Timing knobs for the Silero session.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct VadSettings {
    /// Silence needed before speech is considered over.
    pub redemption_ms: u64,
    /// Audio kept before a detected start.
    pub pre_speech_pad_ms: u64,
    /// Audio kept after a detected end.
    pub post_speech_pad_ms: u64,
    /// Shortest run that counts as speech.
    pub min_speech_ms: u64,
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            redemption_ms: 300,
            pre_speech_pad_ms: 100,
            post_speech_pad_ms: 100,
            min_speech_ms: 60,
        }
    }
}

pub struct SileroVad {
    session: VadSession,
    sample_rate: u32,
}

impl SileroVad {
    pub fn new(sample_rate: u32) -> Result<Self> {
        Self::with_settings(sample_rate, VadSettings::default())
    }

    pub fn with_settings(sample_rate: u32, settings: VadSettings) -> Result<Self> {
        if sample_rate != 8000 && sample_rate != VAD_SAMPLE_RATE {
            return Err(VadError::UnsupportedSampleRate(sample_rate));
        }

        let config = VadConfig {
            sample_rate: sample_rate as usize,
            redemption_time: Duration::from_millis(settings.redemption_ms),
            pre_speech_pad: Duration::from_millis(settings.pre_speech_pad_ms),
            post_speech_pad: Duration::from_millis(settings.post_speech_pad_ms),
            min_speech_time: Duration::from_millis(settings.min_speech_ms),
            ..Default::default()
        };
        Self::with_config(config)
    }

    pub fn with_config(config: VadConfig) -> Result<Self> {
        let sample_rate = config.sample_rate as u32;
        let session = VadSession::new(config)
            .map_err(|e| VadError::SessionCreationFailed(e.to_string()))?;

        Ok(Self {
            session,
            sample_rate,
        })
    }

    pub fn process(&mut self, samples: &[f32]) -> Result<Vec<VadEvent>> {
        let transitions = self
            .session
            .process(samples)
            .map_err(|e| VadError::InferenceError(e.to_string()))?;

        Ok(transitions.into_iter().map(VadEvent::from).collect())
    }

    pub fn reset(&mut self) {
        self.session.reset();
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// A speech boundary reported by a detector, in stream time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadEvent {
    SpeechStart { timestamp_ms: u64 },
    SpeechEnd { start_ms: u64, end_ms: u64 },
}

impl VadEvent {
    pub fn is_start(&self) -> bool {
        matches!(self, VadEvent::SpeechStart { .. })
    }
}

impl From<VadTransition> for VadEvent {
    fn from(transition: VadTransition) -> Self {
        match transition {
            VadTransition::SpeechStart { timestamp_ms } => VadEvent::SpeechStart {
                timestamp_ms: timestamp_ms as u64,
            },
            VadTransition::SpeechEnd {
                start_timestamp_ms,
                end_timestamp_ms,
                ..
            } => VadEvent::SpeechEnd {
                start_ms: start_timestamp_ms as u64,
                end_ms: end_timestamp_ms as u64,
            },
        }
    }
}

/// Incremental speech detector: each call consumes the next stretch of 16 kHz audio and
/// returns the edges found in it. Internal state carries across calls until `reset`.
pub trait VoiceActivityDetector: Send {
    fn detect(&mut self, audio: &[f32]) -> Result<Vec<VadEvent>>;
    fn reset(&mut self);
}

impl VoiceActivityDetector for SileroVad {
    fn detect(&mut self, audio: &[f32]) -> Result<Vec<VadEvent>> {
        self.process(audio)
    }

    fn reset(&mut self) {
        self.session.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_unsupported_rate() {
        assert!(matches!(
            SileroVad::new(44100),
            Err(VadError::UnsupportedSampleRate(44100))
        ));
    }

    #[test]
    fn test_transition_maps_to_event() {
        let start = VadEvent::from(VadTransition::SpeechStart { timestamp_ms: 320 });
        assert_eq!(start, VadEvent::SpeechStart { timestamp_ms: 320 });
        assert!(start.is_start());

        let end = VadEvent::from(VadTransition::SpeechEnd {
            start_timestamp_ms: 320,
            end_timestamp_ms: 1280,
            samples: Vec::new(),
        });
        assert_eq!(
            end,
            VadEvent::SpeechEnd {
                start_ms: 320,
                end_ms: 1280
            }
        );
        assert!(!end.is_start());
    }

    #[test]
    fn test_default_settings_round_trip_through_json_defaults() {
        let settings: VadSettings = serde_json::from_str(r#"{"redemption_ms": 500}"#).unwrap();
        assert_eq!(settings.redemption_ms, 500);
        assert_eq!(settings.min_speech_ms, VadSettings::default().min_speech_ms);
    }
}
