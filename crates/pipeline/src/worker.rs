//! Dedicated conversion thread for one network session.
//!
//! Decouples the transport task from inference: audio is queued over a channel and
//! converted on the worker, so the socket keeps being read while a block converts.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::driver::ChunkedStreamDriver;
use crate::error::{Result, SessionError};
use crate::status::SessionStatus;
use std::sync::Arc;

/// Request sent to the session worker.
#[derive(Debug)]
pub enum WorkerRequest {
    /// Raw PCM16 LE bytes at the source rate.
    Audio(Vec<u8>),
    /// Convert the queued remainder, then report completion.
    Flush,
    Shutdown,
}

/// Output from the session worker, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerOutput {
    /// PCM16 LE at the output rate.
    Audio(Vec<u8>),
    /// All audio queued before a flush has been emitted.
    Completed,
    /// The session can no longer convert.
    Failed(String),
}

pub struct SessionWorker {
    request_tx: Sender<WorkerRequest>,
    handle: Option<JoinHandle<()>>,
    session_id: Uuid,
    output_rate: u32,
    status: Arc<SessionStatus>,
}

impl SessionWorker {
    pub fn spawn(driver: ChunkedStreamDriver) -> (Self, mpsc::UnboundedReceiver<WorkerOutput>) {
        let (request_tx, request_rx) = crossbeam_channel::unbounded::<WorkerRequest>();
        let (output_tx, output_rx) = mpsc::unbounded_channel::<WorkerOutput>();

        let session_id = driver.session().id();
        let output_rate = driver.output_rate();
        let status = driver.session().status();

        let handle = thread::Builder::new()
            .name(format!("session-{session_id}"))
            .spawn(move || worker_loop(driver, request_rx, output_tx))
            .ok();
        if handle.is_none() {
            tracing::error!(session_id = %session_id, "failed to spawn session worker");
        }

        let worker = Self {
            request_tx,
            handle,
            session_id,
            output_rate,
            status,
        };
        (worker, output_rx)
    }

    pub fn send_audio(&self, bytes: Vec<u8>) -> Result<()> {
        self.send(WorkerRequest::Audio(bytes))
    }

    pub fn flush(&self) -> Result<()> {
        self.send(WorkerRequest::Flush)
    }

    fn send(&self, request: WorkerRequest) -> Result<()> {
        if self.handle.is_none() {
            return Err(SessionError::WorkerStopped);
        }
        self.request_tx
            .send(request)
            .map_err(|_| SessionError::WorkerStopped)
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub fn status(&self) -> Arc<SessionStatus> {
        self.status.clone()
    }

    /// Stop the worker after everything already queued, and wait for it.
    pub fn shutdown(mut self) {
        let _ = self.request_tx.send(WorkerRequest::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SessionWorker {
    fn drop(&mut self) {
        // Not joined: an in-flight block finishes on the worker and is discarded.
        if self.handle.take().is_some() {
            let _ = self.request_tx.send(WorkerRequest::Shutdown);
            tracing::debug!(session_id = %self.session_id, "session worker detached");
        }
    }
}

fn worker_loop(
    mut driver: ChunkedStreamDriver,
    requests: Receiver<WorkerRequest>,
    outputs: mpsc::UnboundedSender<WorkerOutput>,
) {
    let session_id = driver.session().id();
    tracing::debug!(session_id = %session_id, "session worker started");

    while let Ok(request) = requests.recv() {
        let result = match request {
            WorkerRequest::Audio(bytes) => driver.push_pcm(&bytes).map(|messages| (messages, false)),
            WorkerRequest::Flush => driver.flush().map(|messages| (messages, true)),
            WorkerRequest::Shutdown => break,
        };

        let delivered = match result {
            Ok((messages, completed)) => {
                let mut ok = messages
                    .into_iter()
                    .all(|message| outputs.send(WorkerOutput::Audio(message)).is_ok());
                if ok && completed {
                    ok = outputs.send(WorkerOutput::Completed).is_ok();
                }
                ok
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "session worker failed");
                let _ = outputs.send(WorkerOutput::Failed(e.to_string()));
                false
            }
        };

        if !delivered {
            break;
        }
    }

    let status = driver.session().status().snapshot();
    tracing::info!(
        session_id = %session_id,
        blocks = status.blocks_processed,
        silent_blocks = status.silent_blocks,
        inference_failures = status.inference_failures,
        "session worker stopped"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::PassthroughAdapter;
    use crate::config::SessionConfig;
    use crate::gate::VoiceActivityGate;
    use crate::session::ConversionSession;
    use timbre_voices::VoiceCatalog;

    fn driver(dir: &std::path::Path) -> ChunkedStreamDriver {
        let reference = vec![0.1; 16000];
        timbre_audio::write_wav_mono(dir.join("alice.wav"), &reference, 16000).unwrap();
        let catalog = VoiceCatalog::open(dir).unwrap();
        let config = SessionConfig {
            block_time: 0.1,
            encoder_context_time: 0.2,
            decoder_context_time: 0.1,
            vad_enabled: false,
            ..SessionConfig::default()
        }
        .with_sample_rate(16000);
        let session = ConversionSession::from_catalog(
            &catalog,
            "alice",
            config,
            Arc::new(PassthroughAdapter::new(16000)),
            VoiceActivityGate::always_open(),
        )
        .unwrap();
        ChunkedStreamDriver::new(session, 16000).unwrap()
    }

    #[tokio::test]
    async fn test_audio_then_flush_then_completed() {
        let dir = tempfile::tempdir().unwrap();
        let (worker, mut outputs) = SessionWorker::spawn(driver(dir.path()));

        // 2.5 blocks of 1600 samples.
        worker.send_audio(vec![0u8; 4000 * 2]).unwrap();
        worker.flush().unwrap();

        let mut audio = Vec::new();
        loop {
            match outputs.recv().await.unwrap() {
                WorkerOutput::Audio(bytes) => audio.push(bytes.len()),
                WorkerOutput::Completed => break,
                WorkerOutput::Failed(e) => panic!("worker failed: {e}"),
            }
        }
        assert_eq!(audio, vec![3200, 3200, 1600]);

        worker.shutdown();
    }

    #[tokio::test]
    async fn test_flush_without_audio_only_completes() {
        let dir = tempfile::tempdir().unwrap();
        let (worker, mut outputs) = SessionWorker::spawn(driver(dir.path()));

        worker.flush().unwrap();
        assert_eq!(outputs.recv().await, Some(WorkerOutput::Completed));
        worker.shutdown();
    }

    #[tokio::test]
    async fn test_shutdown_closes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let (worker, mut outputs) = SessionWorker::spawn(driver(dir.path()));
        worker.shutdown();
        assert_eq!(outputs.recv().await, None);
    }
}
