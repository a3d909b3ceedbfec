//! Wire format of the conversion socket.
//!
//! Text frames carry JSON events tagged by `event`. Binary frames carry PCM16 LE mono.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use timbre_pipeline::SessionOverrides;

use crate::{Result, ServerError};

/// Source rate assumed when the client does not send `sample_rate`.
pub const DEFAULT_SOURCE_RATE: u32 = 16000;

/// Source rates a client may declare.
pub const SOURCE_RATE_RANGE: RangeInclusive<u32> = 8000..=192_000;

/// Events sent to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    Ready { target_sample_rate: u32 },
    Error { message: String },
    Completed,
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        // Plain enum of strings and integers; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Events received from the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Flush,
    /// Well-formed but not understood. Logged and ignored.
    Unknown(String),
}

#[derive(Deserialize)]
struct RawClientEvent {
    event: String,
}

impl ClientEvent {
    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawClientEvent = serde_json::from_str(text)?;
        Ok(match raw.event.as_str() {
            "flush" => Self::Flush,
            _ => Self::Unknown(raw.event),
        })
    }
}

/// Session-open parameters from the upgrade request's query string.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionParams {
    pub voice_id: String,
    /// Rate of the PCM the client will send.
    pub sample_rate: u32,
    pub overrides: SessionOverrides,
}

impl SessionParams {
    /// Later duplicates of a key win. Unknown keys are rejected.
    pub fn from_query(pairs: &[(String, String)]) -> Result<Self> {
        let mut voice_id = None;
        let mut sample_rate = DEFAULT_SOURCE_RATE;
        let mut overrides = SessionOverrides::new();

        for (key, value) in pairs {
            match key.as_str() {
                "voice_id" => voice_id = Some(value.trim().to_string()),
                "sample_rate" => {
                    sample_rate = value
                        .trim()
                        .parse::<u32>()
                        .ok()
                        .filter(|rate| SOURCE_RATE_RANGE.contains(rate))
                        .ok_or_else(|| ServerError::InvalidSampleRate(value.clone()))?;
                }
                _ => overrides.set(key, value)?,
            }
        }

        let voice_id = voice_id
            .filter(|id| !id.is_empty())
            .ok_or(ServerError::MissingVoiceId)?;

        Ok(Self {
            voice_id,
            sample_rate,
            overrides,
        })
    }
}
