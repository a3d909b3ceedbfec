//! Offline conversion of a WAV file, block by block, exactly as a stream would see it.

use std::time::Instant;

use anyhow::Context;
use timbre_audio::{decode_pcm16_le, read_wav_mono, write_wav_mono};
use timbre_pipeline::{ChunkedStreamDriver, ConversionSession, SessionConfig, VoiceActivityGate};

use crate::cli::ConvertArgs;

/// Samples handed to the driver per call, mimicking network packets.
const FEED_SAMPLES: usize = 4096;

pub fn run(args: ConvertArgs) -> anyhow::Result<()> {
    let catalog = super::open_catalog(&args.session)?;
    let adapter = super::create_adapter(&args.session);

    let mut config = super::load_config(&args.session, SessionConfig::realtime)?;
    if let Some(block_seconds) = args.block_seconds {
        config.block_time = block_seconds;
    }
    config.vad_enabled = args.vad;
    let config = config.with_sample_rate(args.session.output_rate);

    let (source, source_rate) = read_wav_mono(&args.input)
        .with_context(|| format!("cannot read {}", args.input.display()))?;

    let gate = VoiceActivityGate::for_config(&config);
    let session = ConversionSession::from_catalog(&catalog, &args.voice, config, adapter, gate)?;
    let status = session.status();
    let mut driver = ChunkedStreamDriver::new(session, source_rate)?;

    tracing::info!(
        input = %args.input.display(),
        voice_id = %args.voice,
        source_rate,
        output_rate = driver.output_rate(),
        seconds = source.len() as f32 / source_rate as f32,
        "converting file"
    );

    let started = Instant::now();
    let mut converted = Vec::new();
    for packet in source.chunks(FEED_SAMPLES) {
        for message in driver.push_samples(packet)? {
            converted.extend(decode_pcm16_le(&message));
        }
    }
    for message in driver.flush()? {
        converted.extend(decode_pcm16_le(&message));
    }

    write_wav_mono(&args.output, &converted, driver.output_rate())
        .with_context(|| format!("cannot write {}", args.output.display()))?;

    let snapshot = status.snapshot();
    tracing::info!(
        output = %args.output.display(),
        blocks = snapshot.blocks_processed,
        silent_blocks = snapshot.silent_blocks,
        inference_failures = snapshot.inference_failures,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "conversion finished"
    );
    Ok(())
}
