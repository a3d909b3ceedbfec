//! One conversion stream: the per-block state machine shared by every driver.

use std::sync::Arc;
use std::time::Instant;

use timbre_audio::Resampler;
use timbre_voices::{CatalogError, VoiceCatalog, VoiceProfile};
use uuid::Uuid;

use crate::adapter::{ConversionRequest, InferenceAdapter};
use crate::config::SessionConfig;
use crate::constants::LOG_EVERY_N_BLOCKS;
use crate::error::{ConfigError, Result, SessionError};
use crate::gate::VoiceActivityGate;
use crate::planner::WindowPlan;
use crate::reference::ReferenceCache;
use crate::sola::SeamAligner;
use crate::status::SessionStatus;
use crate::window::SlidingWindowBuffer;

pub struct ConversionSession {
    id: Uuid,
    config: SessionConfig,
    plan: WindowPlan,
    voice: VoiceProfile,
    adapter: Arc<dyn InferenceAdapter>,
    buffer: SlidingWindowBuffer,
    gate: VoiceActivityGate,
    aligner: SeamAligner,
    reference: ReferenceCache,
    /// Adapter output rate to processing rate.
    output_resampler: Resampler,
    /// Samples the adapter must return per call.
    adapter_output_len: usize,
    last_inference_ms: u64,
    status: Arc<SessionStatus>,
}

impl ConversionSession {
    pub fn new(
        config: SessionConfig,
        adapter: Arc<dyn InferenceAdapter>,
        voice: VoiceProfile,
        gate: VoiceActivityGate,
    ) -> Result<Self> {
        let frame_rate = adapter.frames_per_second();
        let plan = WindowPlan::new(&config, frame_rate)?;

        let output_rate = adapter.output_sample_rate();
        if output_rate == 0 || output_rate % frame_rate != 0 {
            return Err(ConfigError::InvalidSampleRate {
                rate: output_rate,
                frame_rate,
            }
            .into());
        }

        let buffer = SlidingWindowBuffer::new(&plan)?;
        let aligner = SeamAligner::new(
            plan.samples.crossfade,
            plan.samples.search,
            plan.samples.block,
        );
        let output_resampler = Resampler::new(output_rate, plan.sample_rate)?;
        let id = Uuid::new_v4();

        tracing::info!(
            session_id = %id,
            voice_id = %voice.id,
            adapter = adapter.name(),
            sample_rate = plan.sample_rate,
            output_rate,
            block = plan.samples.block,
            window = plan.window_len(),
            vad = gate.is_enabled(),
            "conversion session created"
        );

        Ok(Self {
            id,
            adapter_output_len: plan.output_len(output_rate),
            config,
            plan,
            voice,
            adapter,
            buffer,
            gate,
            aligner,
            reference: ReferenceCache::new(),
            output_resampler,
            last_inference_ms: 0,
            status: Arc::new(SessionStatus::new()),
        })
    }

    /// Resolve `voice_id` in the catalog. An unknown voice fails session creation.
    pub fn from_catalog(
        catalog: &VoiceCatalog,
        voice_id: &str,
        config: SessionConfig,
        adapter: Arc<dyn InferenceAdapter>,
        gate: VoiceActivityGate,
    ) -> Result<Self> {
        let voice = catalog.get(voice_id).map_err(|e| match e {
            CatalogError::UnknownVoice(id) => SessionError::UnknownVoice(id),
            other => SessionError::Reference(other),
        })?;
        Self::new(config, adapter, voice.clone(), gate)
    }

    /// Convert exactly one block of processing-rate audio into one block of output.
    ///
    /// Only a wrongly sized block is an error. Model failures yield silence for the block
    /// and leave the stream running.
    pub fn process_block(&mut self, block: &[f32]) -> Result<Vec<f32>> {
        let started = Instant::now();

        self.buffer.advance(block)?;
        self.gate.observe_audio(self.buffer.newest_block_16k());

        self.last_inference_ms = 0;
        let generated = if self.gate.is_speaking() {
            self.generate()
        } else {
            self.status.record_silent();
            self.silence()
        };

        let splice = self.aligner.splice(&generated)?;
        self.gate.finish_block();

        let block_secs = self.plan.block_secs();
        self.status
            .record_block((block_secs * 1000.0).round() as u64, splice.offset);
        self.status.update_rtf(
            self.last_inference_ms,
            started.elapsed().as_secs_f32(),
            block_secs,
        );

        let blocks = self.status.blocks_processed();
        if blocks % LOG_EVERY_N_BLOCKS == 1 {
            tracing::debug!(
                session_id = %self.id,
                blocks,
                offset = splice.offset,
                elapsed_ms = started.elapsed().as_millis() as u64,
                rtf = self.status.real_time_factor(),
                "block processed"
            );
        }

        Ok(splice.block)
    }

    fn generate(&mut self) -> Vec<f32> {
        let return_len = self.plan.samples.return_length();
        let reference = match self.reference.ensure(
            self.adapter.as_ref(),
            &self.voice,
            self.config.max_prompt_length,
        ) {
            Ok(reference) => reference,
            Err(e) => {
                let total = self.status.record_reference_failure();
                if total % LOG_EVERY_N_BLOCKS == 1 {
                    tracing::warn!(
                        session_id = %self.id,
                        voice_id = %self.voice.id,
                        error = %e,
                        total,
                        "reference preparation failed, emitting silence"
                    );
                }
                return vec![0.0; return_len];
            }
        };

        let request = ConversionRequest {
            window: self.buffer.window(),
            window_16k: self.buffer.window_16k(),
            sample_rate: self.plan.sample_rate,
            skip_head: self.plan.skip_head(),
            skip_tail: self.plan.skip_tail(),
            return_length: self.plan.return_length(),
            context_trim: self.plan.context_trim_frames,
            params: &self.config.inference,
        };

        let started = Instant::now();
        let result = self.adapter.convert(reference, &request);
        self.last_inference_ms = started.elapsed().as_millis() as u64;

        match result
            .map_err(SessionError::from)
            .and_then(|output| self.check_output(output))
        {
            Ok(output) => output,
            Err(e) => {
                let total = self.status.record_inference_failure();
                if total % LOG_EVERY_N_BLOCKS == 1 {
                    tracing::warn!(
                        session_id = %self.id,
                        error = %e,
                        total,
                        "inference failed, emitting silence"
                    );
                }
                self.silence()
            }
        }
    }

    /// Reject malformed adapter output and bring it to the processing rate.
    fn check_output(&mut self, output: Vec<f32>) -> Result<Vec<f32>> {
        if output.len() != self.adapter_output_len {
            return Err(SessionError::OutputLength {
                expected: self.adapter_output_len,
                actual: output.len(),
            });
        }
        if output.iter().any(|s| !s.is_finite()) {
            return Err(SessionError::NonFiniteOutput);
        }
        if self.output_resampler.is_passthrough() {
            Ok(output)
        } else {
            Ok(self.output_resampler.process(&output))
        }
    }

    fn silence(&self) -> Vec<f32> {
        vec![0.0; self.plan.samples.return_length()]
    }

    /// Clear audio history, the crossfade tail and the gate. The reference is kept.
    pub fn reset(&mut self) {
        self.buffer.reset();
        self.aligner.reset();
        self.gate.reset();
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn plan(&self) -> &WindowPlan {
        &self.plan
    }

    pub fn voice(&self) -> &VoiceProfile {
        &self.voice
    }

    pub fn gate(&self) -> &VoiceActivityGate {
        &self.gate
    }

    pub fn block_len(&self) -> usize {
        self.plan.block_len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.plan.sample_rate
    }

    pub fn status(&self) -> Arc<SessionStatus> {
        self.status.clone()
    }

    /// Times the reference conditioning has been computed.
    pub fn reference_preparations(&self) -> u64 {
        self.reference.preparations()
    }
}
