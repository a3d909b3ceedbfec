//! Thin adapters from transport-shaped audio to `ConversionSession::process_block`.

use timbre_audio::{downmix, encode_pcm16_le, upmix_into, PcmDecoder, StreamResampler};

use crate::error::Result;
use crate::session::ConversionSession;

/// Drives a session from an audio device: interleaved blocks in, interleaved blocks out.
pub struct DeviceBlockDriver {
    session: ConversionSession,
    input_channels: usize,
    output_channels: usize,
    /// Interleaved input not yet forming a whole block.
    pending: Vec<f32>,
}

impl DeviceBlockDriver {
    pub fn new(session: ConversionSession, input_channels: usize, output_channels: usize) -> Self {
        Self {
            session,
            input_channels: input_channels.max(1),
            output_channels: output_channels.max(1),
            pending: Vec::new(),
        }
    }

    /// Interleaved input samples per block.
    pub fn input_block_len(&self) -> usize {
        self.session.block_len() * self.input_channels
    }

    /// Process one device block of exactly `input_block_len()` interleaved samples.
    pub fn process_interleaved(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let mono = downmix(input, self.input_channels);
        let converted = self.session.process_block(&mono)?;

        let mut output = vec![0.0; converted.len() * self.output_channels];
        upmix_into(&converted, self.output_channels, &mut output);
        Ok(output)
    }

    /// Accept device callbacks of any size; returns output for every block completed.
    pub fn push(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        self.pending.extend_from_slice(input);

        let block = self.input_block_len();
        let mut output = Vec::new();
        while self.pending.len() >= block {
            let chunk: Vec<f32> = self.pending.drain(..block).collect();
            output.extend(self.process_interleaved(&chunk)?);
        }
        Ok(output)
    }

    pub fn session(&self) -> &ConversionSession {
        &self.session
    }

    pub fn into_session(self) -> ConversionSession {
        self.session
    }
}

/// Drives a session from a byte stream of PCM16 LE mono at an arbitrary source rate.
///
/// Output messages are PCM16 LE mono at the session's processing rate, one per block.
/// The source is resampled as one continuous stream, so packet boundaries leave no trace.
pub struct ChunkedStreamDriver {
    session: ConversionSession,
    decoder: PcmDecoder,
    resampler: StreamResampler,
    queue: Vec<f32>,
}

impl ChunkedStreamDriver {
    pub fn new(session: ConversionSession, source_rate: u32) -> Result<Self> {
        let resampler = StreamResampler::new(source_rate, session.sample_rate())?;
        Ok(Self {
            session,
            decoder: PcmDecoder::new(),
            resampler,
            queue: Vec::new(),
        })
    }

    pub fn source_rate(&self) -> u32 {
        self.resampler.from_rate()
    }

    pub fn output_rate(&self) -> u32 {
        self.session.sample_rate()
    }

    /// Samples queued at the processing rate, short of a full block.
    pub fn pending_samples(&self) -> usize {
        self.queue.len()
    }

    pub fn push_pcm(&mut self, bytes: &[u8]) -> Result<Vec<Vec<u8>>> {
        let samples = self.decoder.decode(bytes);
        if samples.is_empty() {
            return Ok(Vec::new());
        }
        self.push_samples(&samples)
    }

    /// Queue source-rate samples and convert every whole block.
    pub fn push_samples(&mut self, samples: &[f32]) -> Result<Vec<Vec<u8>>> {
        let resampled = self.resampler.process(samples);
        self.queue.extend_from_slice(&resampled);
        self.convert_whole_blocks()
    }

    fn convert_whole_blocks(&mut self) -> Result<Vec<Vec<u8>>> {
        let block = self.session.block_len();
        let mut messages = Vec::new();
        while self.queue.len() >= block {
            let chunk: Vec<f32> = self.queue.drain(..block).collect();
            let converted = self.session.process_block(&chunk)?;
            messages.push(encode_pcm16_le(&converted));
        }
        Ok(messages)
    }

    /// End the utterance: drain the resampler, then convert whatever is queued.
    ///
    /// Whole blocks go out as usual. A remainder is zero-padded to a block for conversion
    /// and the output is cut back to the remainder's length. Nothing queued means nothing
    /// emitted.
    pub fn flush(&mut self) -> Result<Vec<Vec<u8>>> {
        self.decoder.reset();
        let tail = self.resampler.finish();
        self.queue.extend_from_slice(&tail);

        let mut messages = self.convert_whole_blocks()?;
        if self.queue.is_empty() {
            return Ok(messages);
        }

        let remainder = self.queue.len();
        let mut chunk = std::mem::take(&mut self.queue);
        chunk.resize(self.session.block_len(), 0.0);

        let mut converted = self.session.process_block(&chunk)?;
        converted.truncate(remainder);
        messages.push(encode_pcm16_le(&converted));
        Ok(messages)
    }

    pub fn session(&self) -> &ConversionSession {
        &self.session
    }
}
