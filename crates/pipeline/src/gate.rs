//! Speech gate with one-block deferred release.

use timbre_vad::{SileroVad, VadEvent, VoiceActivityDetector, VAD_SAMPLE_RATE};

use crate::config::SessionConfig;
use crate::constants::LOG_EVERY_N_BLOCKS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GateState {
    Silent,
    Speaking,
}

pub struct VoiceActivityGate {
    detector: Option<Box<dyn VoiceActivityDetector>>,
    state: GateState,
    /// A speech end was seen; go silent once the current block has been emitted.
    release_pending: bool,
    detector_errors: u64,
}

impl VoiceActivityGate {
    pub fn new(detector: Box<dyn VoiceActivityDetector>) -> Self {
        Self {
            detector: Some(detector),
            state: GateState::Silent,
            release_pending: false,
            detector_errors: 0,
        }
    }

    /// Gate backed by Silero when the config enables VAD.
    ///
    /// A detector that fails to initialize leaves the gate permanently open.
    pub fn for_config(config: &SessionConfig) -> Self {
        if !config.vad_enabled {
            return Self::always_open();
        }
        match SileroVad::with_settings(VAD_SAMPLE_RATE, config.vad) {
            Ok(vad) => Self::new(Box::new(vad)),
            Err(e) => {
                tracing::warn!(error = %e, "VAD initialization failed, converting every block");
                Self::always_open()
            }
        }
    }

    /// A gate that never closes.
    pub fn always_open() -> Self {
        Self {
            detector: None,
            state: GateState::Speaking,
            release_pending: false,
            detector_errors: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.detector.is_some()
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn is_speaking(&self) -> bool {
        self.state == GateState::Speaking
    }

    /// Apply the edges found in the current block, in order.
    pub fn observe(&mut self, edges: &[VadEvent]) {
        if !self.is_enabled() {
            return;
        }
        for edge in edges {
            match edge {
                VadEvent::SpeechStart { timestamp_ms } => {
                    if self.state == GateState::Silent {
                        tracing::debug!(timestamp_ms, "speech started");
                    }
                    self.state = GateState::Speaking;
                    self.release_pending = false;
                }
                VadEvent::SpeechEnd { start_ms, end_ms } => {
                    tracing::debug!(start_ms, end_ms, "speech ended");
                    self.release_pending = true;
                }
            }
        }
    }

    /// Run the detector over the current block's 16 kHz audio.
    ///
    /// Detector failures leave the state untouched.
    pub fn observe_audio(&mut self, samples_16k: &[f32]) {
        let Some(detector) = self.detector.as_mut() else {
            return;
        };

        match detector.detect(samples_16k) {
            Ok(edges) => self.observe(&edges),
            Err(e) => {
                self.detector_errors += 1;
                if self.detector_errors % LOG_EVERY_N_BLOCKS == 1 {
                    tracing::warn!(
                        error = %e,
                        total = self.detector_errors,
                        "VAD processing error"
                    );
                }
            }
        }
    }

    /// Call after the current block's output has been produced.
    pub fn finish_block(&mut self) {
        if std::mem::take(&mut self.release_pending) {
            self.state = GateState::Silent;
        }
    }

    pub fn detector_errors(&self) -> u64 {
        self.detector_errors
    }

    pub fn reset(&mut self) {
        self.release_pending = false;
        if let Some(detector) = self.detector.as_mut() {
            detector.reset();
            self.state = GateState::Silent;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use timbre_vad::VadError;

    const START: VadEvent = VadEvent::SpeechStart { timestamp_ms: 0 };
    const END: VadEvent = VadEvent::SpeechEnd {
        start_ms: 0,
        end_ms: 0,
    };

    /// Replays one scripted edge list per call.
    struct Scripted(VecDeque<timbre_vad::Result<Vec<VadEvent>>>);

    impl VoiceActivityDetector for Scripted {
        fn detect(&mut self, _audio: &[f32]) -> timbre_vad::Result<Vec<VadEvent>> {
            self.0.pop_front().unwrap_or(Ok(Vec::new()))
        }

        fn reset(&mut self) {
            self.0.clear();
        }
    }

    fn gate(script: Vec<timbre_vad::Result<Vec<VadEvent>>>) -> VoiceActivityGate {
        VoiceActivityGate::new(Box::new(Scripted(script.into())))
    }

    /// Feed one block per script entry, recording whether each block was speaking.
    fn run(gate: &mut VoiceActivityGate, blocks: usize) -> Vec<bool> {
        (0..blocks)
            .map(|_| {
                gate.observe_audio(&[0.0; 160]);
                let speaking = gate.is_speaking();
                gate.finish_block();
                speaking
            })
            .collect()
    }

    #[test]
    fn test_hysteresis_defers_release_by_one_block() {
        // start at block 2, end at block 5
        let mut script: Vec<_> = (0..8).map(|_| Ok(Vec::new())).collect();
        script[2] = Ok(vec![START]);
        script[5] = Ok(vec![END]);

        let mut g = gate(script);
        let speaking = run(&mut g, 8);
        assert_eq!(
            speaking,
            vec![false, false, true, true, true, true, false, false]
        );
    }

    #[test]
    fn test_start_after_end_in_same_block_cancels_release() {
        let mut g = gate(vec![Ok(vec![START]), Ok(vec![END, START]), Ok(vec![])]);
        assert_eq!(run(&mut g, 3), vec![true, true, true]);
    }

    #[test]
    fn test_short_utterance_within_one_block_is_heard() {
        let mut g = gate(vec![Ok(vec![START, END]), Ok(vec![])]);
        assert_eq!(run(&mut g, 2), vec![true, false]);
    }

    #[test]
    fn test_detector_error_keeps_state() {
        let mut g = gate(vec![
            Ok(vec![START]),
            Err(VadError::InferenceError("boom".into())),
            Ok(vec![]),
        ]);
        assert_eq!(run(&mut g, 3), vec![true, true, true]);
        assert_eq!(g.detector_errors(), 1);
    }

    #[test]
    fn test_disabled_config_is_open() {
        let config = SessionConfig {
            vad_enabled: false,
            ..SessionConfig::default()
        };
        let g = VoiceActivityGate::for_config(&config);
        assert!(!g.is_enabled());
        assert!(g.is_speaking());
    }

    #[test]
    fn test_without_detector_always_speaking() {
        let mut g = VoiceActivityGate::always_open();
        g.observe(&[END]);
        g.finish_block();
        assert!(g.is_speaking());
        g.reset();
        assert!(g.is_speaking());
    }

    #[test]
    fn test_reset_returns_to_silent() {
        let mut g = gate(vec![Ok(vec![START])]);
        run(&mut g, 1);
        assert!(g.is_speaking());
        g.reset();
        assert_eq!(g.state(), GateState::Silent);
    }
}
