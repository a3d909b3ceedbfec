//! Synchronized overlap-add: aligns each generated chunk against the tail of the previous
//! output and crossfades across the seam.

use crate::constants::SOLA_EPSILON;
use crate::error::{Result, SessionError};

/// Result of one splice.
#[derive(Debug, Clone)]
pub struct Splice {
    /// Leading samples of the chunk dropped for alignment.
    pub offset: usize,
    /// The block to emit.
    pub block: Vec<f32>,
}

pub struct SeamAligner {
    tail: Vec<f32>,
    fade_in: Vec<f32>,
    fade_out: Vec<f32>,
    search: usize,
    block: usize,
}

impl SeamAligner {
    pub fn new(crossfade: usize, search: usize, block: usize) -> Self {
        let fade_in = fade_in_window(crossfade);
        let fade_out = fade_in.iter().map(|w| 1.0 - w).collect();
        Self {
            tail: vec![0.0; crossfade],
            fade_in,
            fade_out,
            search,
            block,
        }
    }

    /// Minimum chunk length accepted by `splice`.
    pub fn min_chunk_len(&self) -> usize {
        self.tail.len() + self.search + self.block
    }

    pub fn tail(&self) -> &[f32] {
        &self.tail
    }

    /// Offset in `[0, search]` that best lines `chunk` up with the stored tail.
    pub fn find_offset(&self, chunk: &[f32]) -> usize {
        let n = self.tail.len();
        if n == 0 || self.search == 0 {
            return 0;
        }

        let mut best = 0;
        let mut best_score = f32::NEG_INFINITY;
        for offset in 0..=self.search {
            let Some(segment) = chunk.get(offset..offset + n) else {
                break;
            };
            let dot: f32 = self.tail.iter().zip(segment).map(|(a, b)| a * b).sum();
            let energy: f32 = segment.iter().map(|s| s * s).sum();
            let score = dot / (energy + SOLA_EPSILON).sqrt();
            // Strict comparison keeps the first maximum.
            if score > best_score {
                best_score = score;
                best = offset;
            }
        }
        best
    }

    pub fn splice(&mut self, chunk: &[f32]) -> Result<Splice> {
        if chunk.len() < self.min_chunk_len() {
            return Err(SessionError::OutputLength {
                expected: self.min_chunk_len(),
                actual: chunk.len(),
            });
        }

        let offset = self.find_offset(chunk);
        let mut spliced = chunk[offset..].to_vec();

        for (i, sample) in spliced.iter_mut().take(self.tail.len()).enumerate() {
            *sample = *sample * self.fade_in[i] + self.tail[i] * self.fade_out[i];
        }

        let n = self.tail.len();
        self.tail
            .copy_from_slice(&spliced[self.block..self.block + n]);
        spliced.truncate(self.block);

        Ok(Splice {
            offset,
            block: spliced,
        })
    }

    pub fn reset(&mut self) {
        self.tail.fill(0.0);
    }
}

/// `sin²(π/2 · t)` for `t` evenly spaced over `[0, 1]`.
pub fn fade_in_window(len: usize) -> Vec<f32> {
    match len {
        0 => Vec::new(),
        1 => vec![0.0],
        _ => (0..len)
            .map(|i| {
                let t = i as f32 / (len - 1) as f32;
                (0.5 * std::f32::consts::PI * t).sin().powi(2)
            })
            .collect(),
    }
}
