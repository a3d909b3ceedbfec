//! Window geometry: exact sample counts for every region of the context window.
//!
//! The window is laid out left to right as
//! `encoder_context | crossfade | search | block | lookahead`.
//! Every zone is a whole number of model frames, rounded up from its time budget.

use crate::config::SessionConfig;
use crate::constants::{ANALYSIS_SAMPLE_RATE, FRAME_ROUNDING_SLACK, SEARCH_FRAMES};
use crate::error::ConfigError;

/// Lengths of the five window zones, in one unit (frames or samples).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Zones {
    pub encoder_context: usize,
    pub crossfade: usize,
    pub search: usize,
    pub block: usize,
    pub lookahead: usize,
}

impl Zones {
    pub fn total(&self) -> usize {
        self.encoder_context + self.crossfade + self.search + self.block + self.lookahead
    }

    /// Crossfade + search + block: what the model must hand back.
    pub fn return_length(&self) -> usize {
        self.crossfade + self.search + self.block
    }

    fn scaled(&self, factor: usize) -> Self {
        Self {
            encoder_context: self.encoder_context * factor,
            crossfade: self.crossfade * factor,
            search: self.search * factor,
            block: self.block * factor,
            lookahead: self.lookahead * factor,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WindowPlan {
    pub sample_rate: u32,
    pub frame_rate: u32,
    /// Samples per frame at the processing rate.
    pub hop: usize,
    /// Samples per frame at the analysis rate.
    pub hop_16k: usize,
    pub frames: Zones,
    pub samples: Zones,
    pub samples_16k: Zones,
    /// Encoder-only context the adapter trims before decoding.
    pub context_trim_frames: usize,
    pub context_trim_secs: f32,
}

impl WindowPlan {
    pub fn new(config: &SessionConfig, frame_rate: u32) -> Result<Self, ConfigError> {
        config.validate(frame_rate)?;

        let to_frames = |secs: f32| -> usize {
            let exact = secs as f64 * frame_rate as f64;
            (exact - FRAME_ROUNDING_SLACK).ceil().max(0.0) as usize
        };

        let frames = Zones {
            encoder_context: to_frames(config.encoder_context_time),
            crossfade: to_frames(config.crossfade_time),
            search: SEARCH_FRAMES,
            block: to_frames(config.block_time),
            lookahead: to_frames(config.lookahead_time),
        };
        if frames.block == 0 {
            return Err(ConfigError::InvalidBlockTime(config.block_time));
        }

        let decoder_frames = to_frames(config.decoder_context_time);
        let context_trim_frames = frames.encoder_context.saturating_sub(decoder_frames);

        let hop = (config.sample_rate / frame_rate) as usize;
        let hop_16k = (ANALYSIS_SAMPLE_RATE / frame_rate) as usize;

        Ok(Self {
            sample_rate: config.sample_rate,
            frame_rate,
            hop,
            hop_16k,
            frames,
            samples: frames.scaled(hop),
            samples_16k: frames.scaled(hop_16k),
            context_trim_frames,
            context_trim_secs: config.encoder_context_time - config.decoder_context_time,
        })
    }

    /// Window length at the processing rate.
    pub fn window_len(&self) -> usize {
        self.samples.total()
    }

    pub fn window_len_16k(&self) -> usize {
        self.samples_16k.total()
    }

    pub fn block_len(&self) -> usize {
        self.samples.block
    }

    /// Frames of model output discarded as pure context.
    pub fn skip_head(&self) -> usize {
        self.frames.encoder_context
    }

    /// Frames of model output reserved as look-ahead and discarded.
    pub fn skip_tail(&self) -> usize {
        self.frames.lookahead
    }

    /// Frames of model output kept.
    pub fn return_length(&self) -> usize {
        self.frames.return_length()
    }

    /// Samples the adapter must return at `output_rate`.
    pub fn output_len(&self, output_rate: u32) -> usize {
        self.return_length() * (output_rate / self.frame_rate) as usize
    }

    pub fn block_secs(&self) -> f32 {
        self.frames.block as f32 / self.frame_rate as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_FRAME_RATE;

    fn plan(config: &SessionConfig) -> WindowPlan {
        WindowPlan::new(config, DEFAULT_FRAME_RATE).unwrap()
    }

    #[test]
    fn test_default_geometry() {
        let p = plan(&SessionConfig::default());
        assert_eq!(p.hop, 441);
        assert_eq!(p.hop_16k, 320);
        assert_eq!(
            p.frames,
            Zones {
                encoder_context: 125,
                crossfade: 2,
                search: 1,
                block: 15,
                lookahead: 1,
            }
        );
        assert_eq!(p.skip_head(), 125);
        assert_eq!(p.skip_tail(), 1);
        assert_eq!(p.return_length(), 18);
        assert_eq!(p.context_trim_frames, 100);
        assert_eq!(p.block_len(), 15 * 441);
    }

    #[test]
    fn test_zones_sum_to_window_and_sit_on_frame_grid() {
        for (block, crossfade, ce, la) in [
            (0.3, 0.04, 2.5, 0.02),
            (0.25, 0.05, 1.0, 0.0),
            (0.17, 0.0, 0.33, 0.11),
            (2.0, 0.1, 2.5, 0.5),
        ] {
            let config = SessionConfig {
                block_time: block,
                crossfade_time: crossfade,
                encoder_context_time: ce,
                decoder_context_time: ce / 2.0,
                lookahead_time: la,
                ..SessionConfig::default()
            };
            let p = plan(&config);

            let s = p.samples;
            assert_eq!(
                s.encoder_context + s.crossfade + s.search + s.block + s.lookahead,
                p.window_len()
            );
            for zone in [s.encoder_context, s.crossfade, s.search, s.block, s.lookahead] {
                assert_eq!(zone % p.hop, 0);
            }
            assert_eq!(p.window_len_16k(), p.frames.total() * p.hop_16k);
        }
    }

    #[test]
    fn test_zones_round_up() {
        // 0.25 s at 50 fps is 12.5 frames.
        let config = SessionConfig {
            block_time: 0.25,
            crossfade_time: 0.05,
            ..SessionConfig::default()
        };
        let p = plan(&config);
        assert_eq!(p.frames.block, 13);
        assert_eq!(p.frames.crossfade, 3);
    }

    #[test]
    fn test_search_is_one_frame() {
        let p = plan(&SessionConfig::default());
        assert_eq!(p.samples.search, p.hop);
        assert_eq!(p.samples_16k.search, 320);
    }

    #[test]
    fn test_output_len_at_model_rate() {
        let p = plan(&SessionConfig::default());
        assert_eq!(p.output_len(22050), 18 * 441);
        assert_eq!(p.output_len(44100), 18 * 882);
    }

    #[test]
    fn test_inconsistent_budget_fails_fast() {
        let config = SessionConfig {
            encoder_context_time: 0.2,
            decoder_context_time: 0.5,
            ..SessionConfig::default()
        };
        assert!(matches!(
            WindowPlan::new(&config, DEFAULT_FRAME_RATE),
            Err(ConfigError::ContextTooShort { .. })
        ));
    }

    #[test]
    fn test_tiny_block_rounds_up_to_one_frame() {
        let config = SessionConfig {
            block_time: 0.001,
            ..SessionConfig::default()
        };
        assert_eq!(plan(&config).frames.block, 1);
    }
}
