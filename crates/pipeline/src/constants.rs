/// Model frame rate assumed when an adapter does not declare one (20 ms hop).
pub const DEFAULT_FRAME_RATE: u32 = 50;

/// Rate of the semantic-analysis twin of the window.
pub const ANALYSIS_SAMPLE_RATE: u32 = timbre_audio::ANALYSIS_SAMPLE_RATE;

/// Width of the offset search, in frames.
pub const SEARCH_FRAMES: usize = 1;

/// Frames of already-buffered audio resampled together with each new block.
/// The first resampled frame is discarded.
pub const RESAMPLE_OVERLAP_FRAMES: usize = 2;

/// Added under the square root of the SOLA normalizer.
pub const SOLA_EPSILON: f32 = 1e-8;

/// Slack when converting seconds to frames, so 0.3 s at 50 fps is 15 frames, not 16.
pub const FRAME_ROUNDING_SLACK: f64 = 1e-3;

/// Log one of every N repeated per-block warnings.
pub const LOG_EVERY_N_BLOCKS: u64 = 50;
