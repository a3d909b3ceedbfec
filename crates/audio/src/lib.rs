mod device;
mod duplex;
mod mix;
mod pcm;
mod resample;
mod wav;

pub use device::{list_devices, AudioDevice, DeviceDirection};
pub use duplex::{DuplexConfig, DuplexIo, DuplexStream};
pub use mix::{downmix, upmix_into};
pub use pcm::{decode_pcm16_le, encode_pcm16_le, PcmDecoder};
pub use resample::{Resampler, StreamResampler, MAX_SAMPLE_RATE};
pub use wav::{read_wav_mono, write_wav_mono};

/// Rate used for semantic analysis and voice activity detection.
pub const ANALYSIS_SAMPLE_RATE: u32 = 16000;

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("invalid sample rate: {0}")]
    InvalidSampleRate(u32),
    #[error("stream error: {0}")]
    StreamError(String),
    #[error("wav error: {0}")]
    Wav(String),
    #[error("device error: {0}")]
    DeviceError(#[from] cpal::DevicesError),
    #[error("build stream error: {0}")]
    BuildStreamError(#[from] cpal::BuildStreamError),
}

pub type Result<T> = std::result::Result<T, AudioError>;
