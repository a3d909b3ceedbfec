//! Session configuration, validated once at session creation.

use std::path::Path;

use serde::{Deserialize, Serialize};
use timbre_vad::VadSettings;

use crate::constants::ANALYSIS_SAMPLE_RATE;
use crate::error::ConfigError;

/// Model hyperparameters forwarded verbatim to the inference adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InferenceParams {
    pub diffusion_steps: u32,
    pub length_adjust: f32,
    pub inference_cfg_rate: f32,
    pub top_p: f32,
    pub temperature: f32,
    pub repetition_penalty: f32,
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self {
            diffusion_steps: 10,
            length_adjust: 1.0,
            inference_cfg_rate: 0.7,
            top_p: 0.7,
            temperature: 0.7,
            repetition_penalty: 1.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Seconds of new audio consumed and emitted per step.
    pub block_time: f32,
    /// Seconds of overlap blended between consecutive outputs.
    pub crossfade_time: f32,
    /// Seconds of history fed to the content encoder.
    pub encoder_context_time: f32,
    /// Seconds of history the decoder sees. Not longer than the encoder context.
    pub decoder_context_time: f32,
    /// Seconds of future audio reserved past the current block.
    pub lookahead_time: f32,
    /// Longest slice of the reference clip used as prompt, in seconds.
    pub max_prompt_length: f32,
    /// Processing rate: the rate blocks arrive and leave at.
    pub sample_rate: u32,
    pub vad_enabled: bool,
    pub vad: VadSettings,
    pub inference: InferenceParams,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            block_time: 0.3,
            crossfade_time: 0.04,
            encoder_context_time: 2.5,
            decoder_context_time: 0.5,
            lookahead_time: 0.02,
            max_prompt_length: 3.0,
            sample_rate: 22050,
            vad_enabled: true,
            vad: VadSettings::default(),
            inference: InferenceParams::default(),
        }
    }
}

impl SessionConfig {
    /// Low-latency settings for a local device loop.
    pub fn realtime() -> Self {
        Self::default()
    }

    /// Larger chunks and more diffusion steps for network streaming.
    ///
    /// Clients stream finished utterances, so the speech gate starts disabled.
    pub fn streaming() -> Self {
        Self {
            block_time: 2.0,
            vad_enabled: false,
            inference: InferenceParams {
                diffusion_steps: 30,
                ..InferenceParams::default()
            },
            ..Self::default()
        }
    }

    /// Load a preset from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Preset(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| ConfigError::Preset(format!("{}: {e}", path.display())))
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn validate(&self, frame_rate: u32) -> Result<(), ConfigError> {
        if !self.block_time.is_finite() || self.block_time <= 0.0 {
            return Err(ConfigError::InvalidBlockTime(self.block_time));
        }

        for (field, value) in [
            ("crossfade_time", self.crossfade_time),
            ("encoder_context_time", self.encoder_context_time),
            ("decoder_context_time", self.decoder_context_time),
            ("lookahead_time", self.lookahead_time),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidDuration { field, value });
            }
        }

        if self.encoder_context_time < self.decoder_context_time {
            return Err(ConfigError::ContextTooShort {
                encoder: self.encoder_context_time,
                decoder: self.decoder_context_time,
            });
        }
        if self.lookahead_time > self.encoder_context_time {
            return Err(ConfigError::LookaheadTooLong {
                lookahead: self.lookahead_time,
                encoder: self.encoder_context_time,
            });
        }

        if !self.max_prompt_length.is_finite() || self.max_prompt_length <= 0.0 {
            return Err(ConfigError::InvalidPromptLength(self.max_prompt_length));
        }

        for rate in [self.sample_rate, ANALYSIS_SAMPLE_RATE] {
            if rate == 0 || frame_rate == 0 || rate % frame_rate != 0 {
                return Err(ConfigError::InvalidSampleRate { rate, frame_rate });
            }
        }

        self.inference.validate()
    }
}

impl InferenceParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.diffusion_steps == 0 {
            return Err(ConfigError::ZeroDiffusionSteps);
        }

        let positive = [
            ("length_adjust", self.length_adjust),
            ("temperature", self.temperature),
            ("repetition_penalty", self.repetition_penalty),
        ];
        for (field, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidParameter { field, value });
            }
        }

        if !self.inference_cfg_rate.is_finite() || self.inference_cfg_rate < 0.0 {
            return Err(ConfigError::InvalidParameter {
                field: "inference_cfg_rate",
                value: self.inference_cfg_rate,
            });
        }
        if !self.top_p.is_finite() || self.top_p <= 0.0 || self.top_p > 1.0 {
            return Err(ConfigError::InvalidParameter {
                field: "top_p",
                value: self.top_p,
            });
        }

        Ok(())
    }
}

/// Per-session overrides parsed from untyped key/value pairs.
///
/// Only the keys below are accepted; anything else is rejected rather than ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionOverrides {
    pub diffusion_steps: Option<u32>,
    pub length_adjust: Option<f32>,
    pub inference_cfg_rate: Option<f32>,
    pub top_p: Option<f32>,
    pub temperature: Option<f32>,
    pub repetition_penalty: Option<f32>,
    pub chunk_seconds: Option<f32>,
}

impl SessionOverrides {
    pub const KEYS: &'static [&'static str] = &[
        "diffusion_steps",
        "length_adjust",
        "inference_cfg_rate",
        "top_p",
        "temperature",
        "repetition_penalty",
        "chunk_seconds",
    ];

    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut overrides = Self::new();
        for (key, value) in pairs {
            overrides.set(key.as_ref(), value.as_ref())?;
        }
        Ok(overrides)
    }

    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "diffusion_steps" => self.diffusion_steps = Some(parse(key, value)?),
            "length_adjust" => self.length_adjust = Some(parse(key, value)?),
            "inference_cfg_rate" => self.inference_cfg_rate = Some(parse(key, value)?),
            "top_p" => self.top_p = Some(parse(key, value)?),
            "temperature" => self.temperature = Some(parse(key, value)?),
            "repetition_penalty" => self.repetition_penalty = Some(parse(key, value)?),
            "chunk_seconds" => self.chunk_seconds = Some(parse(key, value)?),
            _ => return Err(ConfigError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply on top of `base`. The result still needs validation.
    pub fn apply(&self, base: &SessionConfig) -> SessionConfig {
        let mut config = base.clone();
        let params = &mut config.inference;

        if let Some(v) = self.diffusion_steps {
            params.diffusion_steps = v;
        }
        if let Some(v) = self.length_adjust {
            params.length_adjust = v;
        }
        if let Some(v) = self.inference_cfg_rate {
            params.inference_cfg_rate = v;
        }
        if let Some(v) = self.top_p {
            params.top_p = v;
        }
        if let Some(v) = self.temperature {
            params.temperature = v;
        }
        if let Some(v) = self.repetition_penalty {
            params.repetition_penalty = v;
        }
        if let Some(v) = self.chunk_seconds {
            config.block_time = v;
        }
        config
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
