//! Local device loop: microphone in, converted voice out.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use crossbeam_channel::RecvTimeoutError;
use ringbuf::traits::Producer;
use timbre_audio::{DuplexConfig, DuplexStream};
use timbre_pipeline::{ConversionSession, DeviceBlockDriver, SessionConfig, VoiceActivityGate};

use crate::cli::LiveArgs;

/// How often the loop checks for a stop request while no audio arrives.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Log one of every N playback overflows.
const LOG_EVERY_N_OVERFLOWS: u64 = 50;

pub async fn run(args: LiveArgs) -> anyhow::Result<()> {
    let stop = Arc::new(AtomicBool::new(false));

    let worker_stop = stop.clone();
    let mut device_loop = tokio::task::spawn_blocking(move || run_device_loop(args, worker_stop));

    tokio::select! {
        result = &mut device_loop => return result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received, stopping");
        }
    }

    stop.store(true, Ordering::Relaxed);
    device_loop.await?
}

/// Runs on a blocking thread: cpal streams must stay on the thread that built them.
fn run_device_loop(args: LiveArgs, stop: Arc<AtomicBool>) -> anyhow::Result<()> {
    let catalog = super::open_catalog(&args.session)?;
    let adapter = super::create_adapter(&args.session);
    let mut config = super::load_config(&args.session, SessionConfig::realtime)?;
    if let Some(block_seconds) = args.block_seconds {
        config.block_time = block_seconds;
    }
    if args.no_vad {
        config.vad_enabled = false;
    }

    let (stream, mut io) = DuplexStream::open(DuplexConfig {
        input_device: args.input_device.clone(),
        output_device: args.output_device.clone(),
        sample_rate: args.sample_rate,
        output_buffer_secs: None,
    })
    .context("cannot open audio devices")?;

    // Process at the device rate; model output is resampled to it.
    let config = config.with_sample_rate(io.sample_rate);
    let gate = VoiceActivityGate::for_config(&config);
    let session = ConversionSession::from_catalog(&catalog, &args.voice, config, adapter, gate)?;
    let status = session.status();
    let mut driver = DeviceBlockDriver::new(session, io.input_channels, io.output_channels);

    tracing::info!(
        voice_id = %args.voice,
        sample_rate = io.sample_rate,
        input_channels = io.input_channels,
        output_channels = io.output_channels,
        block = driver.session().block_len(),
        "live conversion started"
    );

    let deadline = args
        .duration
        .map(|secs| std::time::Instant::now() + Duration::from_secs_f32(secs.max(0.0)));
    let mut overflows = 0u64;

    while !stop.load(Ordering::Relaxed) {
        if deadline.is_some_and(|d| std::time::Instant::now() >= d) {
            break;
        }

        let captured = match io.input.recv_timeout(POLL_INTERVAL) {
            Ok(captured) => captured,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                tracing::warn!("capture stream ended");
                break;
            }
        };

        let output = driver.push(&captured)?;
        if output.is_empty() {
            continue;
        }

        let written = io.output.push_slice(&output);
        if written < output.len() {
            overflows += 1;
            if overflows % LOG_EVERY_N_OVERFLOWS == 1 {
                tracing::warn!(
                    dropped = output.len() - written,
                    total = overflows,
                    "playback buffer full, dropping converted audio"
                );
            }
        }
    }

    let snapshot = status.snapshot();
    tracing::info!(
        blocks = snapshot.blocks_processed,
        silent_blocks = snapshot.silent_blocks,
        inference_failures = snapshot.inference_failures,
        real_time_factor = snapshot.real_time_factor,
        underruns = stream.underruns(),
        "live conversion stopped"
    );
    Ok(())
}
