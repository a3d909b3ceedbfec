//! Full-duplex device I/O: capture from one device, play to another, at one shared rate.
//!
//! Captured audio is delivered interleaved over a channel, one message per device callback.
//! Playback pulls interleaved samples from a ring buffer; when the buffer runs dry the
//! callback plays silence for the missing part and counts an underrun.

use crate::device::open_device;
use crate::DeviceDirection;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use crossbeam_channel::{Receiver, Sender};
use ringbuf::traits::{Consumer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Seconds of audio the playback ring buffer can hold.
const DEFAULT_OUTPUT_BUFFER_SECS: f32 = 2.0;

#[derive(Debug, Clone, Default)]
pub struct DuplexConfig {
    /// Input device name, or the host default.
    pub input_device: Option<String>,
    /// Output device name, or the host default.
    pub output_device: Option<String>,
    /// Shared rate for both directions. Defaults to the input device's native rate.
    pub sample_rate: Option<u32>,
    /// Playback buffer length in seconds.
    pub output_buffer_secs: Option<f32>,
}

/// The data ends of a running duplex stream.
pub struct DuplexIo {
    /// Interleaved capture callbacks, in arrival order.
    pub input: Receiver<Vec<f32>>,
    /// Interleaved samples queued for playback.
    pub output: HeapProd<f32>,
    pub sample_rate: u32,
    pub input_channels: usize,
    pub output_channels: usize,
}

pub struct DuplexStream {
    _streams: Vec<Stream>,
    sample_rate: u32,
    input_channels: usize,
    output_channels: usize,
    underruns: Arc<AtomicU64>,
}

impl DuplexStream {
    pub fn open(config: DuplexConfig) -> crate::Result<(Self, DuplexIo)> {
        let host = cpal::default_host();
        tracing::debug!(host = ?host.id(), "opening duplex stream");

        let input_device = open_device(
            &host,
            config.input_device.as_deref(),
            DeviceDirection::Input,
        )?;
        let output_device = open_device(
            &host,
            config.output_device.as_deref(),
            DeviceDirection::Output,
        )?;

        let input_default = input_device.default_input_config().map_err(|e| {
            crate::AudioError::StreamError(format!("failed to get input config: {e}"))
        })?;
        let output_default = output_device.default_output_config().map_err(|e| {
            crate::AudioError::StreamError(format!("failed to get output config: {e}"))
        })?;

        let sample_rate = config
            .sample_rate
            .unwrap_or_else(|| input_default.sample_rate().0);
        if sample_rate == 0 {
            return Err(crate::AudioError::InvalidSampleRate(sample_rate));
        }

        let input_config = StreamConfig {
            channels: input_default.channels(),
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let output_config = StreamConfig {
            channels: output_default.channels(),
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (tx, rx) = crossbeam_channel::unbounded::<Vec<f32>>();
        let input_stream =
            build_input(&input_device, &input_config, input_default.sample_format(), tx)?;

        let buffer_secs = config
            .output_buffer_secs
            .unwrap_or(DEFAULT_OUTPUT_BUFFER_SECS)
            .max(0.1);
        let capacity =
            (sample_rate as f32 * buffer_secs) as usize * output_config.channels as usize;
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();
        let underruns = Arc::new(AtomicU64::new(0));
        let output_stream = build_output(
            &output_device,
            &output_config,
            output_default.sample_format(),
            consumer,
            underruns.clone(),
        )?;

        for stream in [&input_stream, &output_stream] {
            stream.play().map_err(|e| {
                crate::AudioError::StreamError(format!("failed to start stream: {e}"))
            })?;
        }

        tracing::info!(
            sample_rate,
            input_channels = input_config.channels,
            output_channels = output_config.channels,
            buffer_samples = capacity,
            "duplex stream started"
        );

        let stream = Self {
            _streams: vec![input_stream, output_stream],
            sample_rate,
            input_channels: input_config.channels as usize,
            output_channels: output_config.channels as usize,
            underruns,
        };
        let io = DuplexIo {
            input: rx,
            output: producer,
            sample_rate,
            input_channels: input_config.channels as usize,
            output_channels: output_config.channels as usize,
        };
        Ok((stream, io))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn input_channels(&self) -> usize {
        self.input_channels
    }

    pub fn output_channels(&self) -> usize {
        self.output_channels
    }

    /// Output callbacks that found fewer samples queued than they needed.
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}

impl Drop for DuplexStream {
    fn drop(&mut self) {
        self._streams.clear();
        tracing::info!(underruns = self.underruns(), "duplex stream stopped");
    }
}

fn build_input(
    device: &Device,
    config: &StreamConfig,
    format: SampleFormat,
    tx: Sender<Vec<f32>>,
) -> crate::Result<Stream> {
    let stream = match format {
        SampleFormat::F32 => device.build_input_stream(
            config,
            move |data: &[f32], _| {
                let _ = tx.send(data.to_vec());
            },
            |err| tracing::error!("input stream error: {}", err),
            None,
        )?,
        SampleFormat::I16 => device.build_input_stream(
            config,
            move |data: &[i16], _| {
                let float: Vec<f32> = data.iter().map(|&s| s as f32 / 32768.0).collect();
                let _ = tx.send(float);
            },
            |err| tracing::error!("input stream error: {}", err),
            None,
        )?,
        format => {
            return Err(crate::AudioError::StreamError(format!(
                "unsupported input sample format: {format:?}"
            )));
        }
    };

    Ok(stream)
}

fn build_output(
    device: &Device,
    config: &StreamConfig,
    format: SampleFormat,
    consumer: HeapCons<f32>,
    underruns: Arc<AtomicU64>,
) -> crate::Result<Stream> {
    let mut playback = Playback {
        consumer,
        scratch: Vec::new(),
        underruns,
    };

    let stream = match format {
        SampleFormat::F32 => device.build_output_stream(
            config,
            move |data: &mut [f32], _| {
                let samples = playback.fill(data.len());
                data.copy_from_slice(samples);
            },
            |err| tracing::error!("output stream error: {}", err),
            None,
        )?,
        SampleFormat::I16 => device.build_output_stream(
            config,
            move |data: &mut [i16], _| {
                let samples = playback.fill(data.len());
                for (out, &s) in data.iter_mut().zip(samples) {
                    *out = (s.clamp(-1.0, 1.0) * 32767.0) as i16;
                }
            },
            |err| tracing::error!("output stream error: {}", err),
            None,
        )?,
        format => {
            return Err(crate::AudioError::StreamError(format!(
                "unsupported output sample format: {format:?}"
            )));
        }
    };

    Ok(stream)
}

struct Playback {
    consumer: HeapCons<f32>,
    scratch: Vec<f32>,
    underruns: Arc<AtomicU64>,
}

impl Playback {
    /// Samples for one output callback of `len` samples, silence-padded on underrun.
    fn fill(&mut self, len: usize) -> &[f32] {
        self.scratch.resize(len, 0.0);
        let popped = self.consumer.pop_slice(&mut self.scratch);
        if popped < len {
            self.scratch[popped..].fill(0.0);
            self.underruns.fetch_add(1, Ordering::Relaxed);
        }
        &self.scratch
    }
}
