//! 16-bit signed little-endian PCM, the wire format of the streaming endpoint.

const I16_SCALE_IN: f32 = 32768.0;
const I16_SCALE_OUT: f32 = 32767.0;

/// Decode a complete PCM16 LE buffer. A trailing odd byte is ignored.
pub fn decode_pcm16_le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / I16_SCALE_IN)
        .collect()
}

/// Encode float samples as PCM16 LE, clipping to [-1, 1].
pub fn encode_pcm16_le(samples: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * I16_SCALE_OUT) as i16;
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Incremental decoder for byte streams that may split a sample across messages.
#[derive(Debug, Default)]
pub struct PcmDecoder {
    pending: Option<u8>,
}

impl PcmDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the next message, joining a byte carried over from the previous one.
    pub fn decode(&mut self, bytes: &[u8]) -> Vec<f32> {
        if bytes.is_empty() {
            return Vec::new();
        }

        let mut body = bytes;
        let mut out = Vec::with_capacity((bytes.len() + 1) / 2);

        if let Some(low) = self.pending.take() {
            out.push(i16::from_le_bytes([low, body[0]]) as f32 / I16_SCALE_IN);
            body = &body[1..];
        }

        out.extend(decode_pcm16_le(body));
        if body.len() % 2 == 1 {
            self.pending = body.last().copied();
        }
        out
    }

    /// Whether half a sample is waiting for its second byte.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn reset(&mut self) {
        self.pending = None;
    }
}
