//! Lock-free session metrics.
//!
//! Shared via `Arc<SessionStatus>` and updated from the processing thread without locks.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

#[derive(Debug)]
pub struct SessionStatus {
    blocks_processed: AtomicU64,
    /// Blocks emitted as silence because the gate was closed.
    silent_blocks: AtomicU64,
    /// Blocks emitted as silence because the adapter failed or misbehaved.
    inference_failures: AtomicU64,
    reference_failures: AtomicU64,
    /// Last adapter call duration in milliseconds.
    inference_time_ms: AtomicU64,
    /// Processing time over block duration, stored as f32 bits.
    real_time_factor_bits: AtomicU32,
    last_offset: AtomicU64,
    audio_processed_ms: AtomicU64,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            blocks_processed: AtomicU64::new(0),
            silent_blocks: AtomicU64::new(0),
            inference_failures: AtomicU64::new(0),
            reference_failures: AtomicU64::new(0),
            inference_time_ms: AtomicU64::new(0),
            real_time_factor_bits: AtomicU32::new(0.0_f32.to_bits()),
            last_offset: AtomicU64::new(0),
            audio_processed_ms: AtomicU64::new(0),
        }
    }
}

impl SessionStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocks_processed(&self) -> u64 {
        self.blocks_processed.load(Ordering::Relaxed)
    }

    pub fn silent_blocks(&self) -> u64 {
        self.silent_blocks.load(Ordering::Relaxed)
    }

    pub fn inference_failures(&self) -> u64 {
        self.inference_failures.load(Ordering::Relaxed)
    }

    pub fn reference_failures(&self) -> u64 {
        self.reference_failures.load(Ordering::Relaxed)
    }

    pub fn inference_time_ms(&self) -> u64 {
        self.inference_time_ms.load(Ordering::Relaxed)
    }

    pub fn real_time_factor(&self) -> f32 {
        f32::from_bits(self.real_time_factor_bits.load(Ordering::Relaxed))
    }

    pub fn last_offset(&self) -> u64 {
        self.last_offset.load(Ordering::Relaxed)
    }

    pub fn audio_processed_ms(&self) -> u64 {
        self.audio_processed_ms.load(Ordering::Relaxed)
    }

    pub(crate) fn record_block(&self, block_ms: u64, offset: usize) {
        self.blocks_processed.fetch_add(1, Ordering::Relaxed);
        self.audio_processed_ms.fetch_add(block_ms, Ordering::Relaxed);
        self.last_offset.store(offset as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_silent(&self) {
        self.silent_blocks.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the new failure total.
    pub(crate) fn record_inference_failure(&self) -> u64 {
        self.inference_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_reference_failure(&self) -> u64 {
        self.reference_failures.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Update the real-time factor from processing and audio durations.
    pub(crate) fn update_rtf(&self, inference_ms: u64, elapsed_secs: f32, audio_secs: f32) {
        self.inference_time_ms.store(inference_ms, Ordering::Relaxed);
        if audio_secs > 0.0 {
            self.real_time_factor_bits
                .store((elapsed_secs / audio_secs).to_bits(), Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> SessionStatusSnapshot {
        SessionStatusSnapshot {
            blocks_processed: self.blocks_processed(),
            silent_blocks: self.silent_blocks(),
            inference_failures: self.inference_failures(),
            reference_failures: self.reference_failures(),
            inference_time_ms: self.inference_time_ms(),
            real_time_factor: self.real_time_factor(),
            last_offset: self.last_offset(),
            audio_processed_ms: self.audio_processed_ms(),
        }
    }
}

/// Snapshot of session status for serialization.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
pub struct SessionStatusSnapshot {
    pub blocks_processed: u64,
    pub silent_blocks: u64,
    pub inference_failures: u64,
    pub reference_failures: u64,
    pub inference_time_ms: u64,
    pub real_time_factor: f32,
    pub last_offset: u64,
    pub audio_processed_ms: u64,
}
