/// Rejected session configuration. Never defaulted around.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("block time must be a positive number of seconds, got {0}")]
    InvalidBlockTime(f32),
    #[error("{field} must be a finite, non-negative number of seconds, got {value}")]
    InvalidDuration { field: &'static str, value: f32 },
    #[error("encoder context ({encoder}s) must not be shorter than decoder context ({decoder}s)")]
    ContextTooShort { encoder: f32, decoder: f32 },
    #[error("look-ahead ({lookahead}s) must not exceed encoder context ({encoder}s)")]
    LookaheadTooLong { lookahead: f32, encoder: f32 },
    #[error("diffusion steps must be at least 1")]
    ZeroDiffusionSteps,
    #[error("max prompt length must be positive, got {0}")]
    InvalidPromptLength(f32),
    #[error("sample rate {rate} is not a multiple of the model frame rate {frame_rate}")]
    InvalidSampleRate { rate: u32, frame_rate: u32 },
    #[error("invalid value for {field}: {value}")]
    InvalidParameter { field: &'static str, value: f32 },
    #[error("unknown session parameter '{0}'")]
    UnknownKey(String),
    #[error("invalid value '{value}' for session parameter '{key}'")]
    InvalidValue { key: String, value: String },
    #[error("failed to load preset: {0}")]
    Preset(String),
}

/// Failure inside the black-box model.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("model not loaded")]
    ModelNotLoaded,
    #[error("reference preparation failed: {0}")]
    Reference(String),
    #[error("inference failed: {0}")]
    Failed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("unknown voice id '{0}'")]
    UnknownVoice(String),
    #[error("block has {actual} samples, expected {expected}")]
    BlockSize { expected: usize, actual: usize },
    #[error("generated chunk has {actual} samples, expected {expected}")]
    OutputLength { expected: usize, actual: usize },
    #[error("generated chunk contains non-finite samples")]
    NonFiniteOutput,
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    Reference(#[from] timbre_voices::CatalogError),
    #[error(transparent)]
    Audio(#[from] timbre_audio::AudioError),
    #[error("session worker has stopped")]
    WorkerStopped,
}

pub type Result<T> = std::result::Result<T, SessionError>;
