use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use timbre_pipeline::{InferenceAdapter, SessionConfig};
use timbre_voices::VoiceCatalog;
use tokio_util::sync::CancellationToken;

use crate::Result;

/// Shared, read-only server state. Cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<VoiceCatalog>,
    pub adapter: Arc<dyn InferenceAdapter>,
    /// Base configuration every session starts from before its overrides.
    pub template: Arc<SessionConfig>,
    active_sessions: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl AppState {
    /// The template's processing rate is pinned to the adapter's output rate, so
    /// sessions never resample model output.
    pub fn new(
        catalog: VoiceCatalog,
        adapter: Arc<dyn InferenceAdapter>,
        template: SessionConfig,
    ) -> Result<Self> {
        let template = template.with_sample_rate(adapter.output_sample_rate());
        template.validate(adapter.frames_per_second())?;

        Ok(Self {
            catalog: Arc::new(catalog),
            adapter,
            template: Arc::new(template),
            active_sessions: Arc::new(AtomicUsize::new(0)),
            shutdown: CancellationToken::new(),
        })
    }

    /// Cancelled when the server stops. Open sessions flush and close.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::Relaxed)
    }

    /// Count a session as active until the guard is dropped.
    pub(crate) fn track_session(&self) -> SessionGuard {
        let active = self.active_sessions.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::debug!(active, "session opened");
        SessionGuard {
            counter: self.active_sessions.clone(),
        }
    }
}

pub(crate) struct SessionGuard {
    counter: Arc<AtomicUsize>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let active = self.counter.fetch_sub(1, Ordering::Relaxed) - 1;
        tracing::debug!(active, "session closed");
    }
}
