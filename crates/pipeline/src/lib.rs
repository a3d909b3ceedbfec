//! Streaming voice conversion core.
//!
//! Incoming audio is cut into fixed blocks. Each block slides a context window forward,
//! the window is converted by an [`InferenceAdapter`], and the result is spliced onto the
//! previous output with a SOLA crossfade so consecutive blocks join without clicks.

mod adapter;
mod config;
pub mod constants;
mod driver;
mod error;
mod gate;
mod planner;
mod reference;
mod session;
mod sola;
mod status;
mod window;
mod worker;

pub use adapter::{ConversionRequest, InferenceAdapter, PassthroughAdapter, ReferenceVoiceState};
pub use config::{InferenceParams, SessionConfig, SessionOverrides};
pub use driver::{ChunkedStreamDriver, DeviceBlockDriver};
pub use error::{ConfigError, InferenceError, Result, SessionError};
pub use gate::{GateState, VoiceActivityGate};
pub use planner::{WindowPlan, Zones};
pub use reference::ReferenceCache;
pub use session::ConversionSession;
pub use sola::{fade_in_window, SeamAligner, Splice};
pub use status::{SessionStatus, SessionStatusSnapshot};
pub use window::SlidingWindowBuffer;
pub use worker::{SessionWorker, WorkerOutput, WorkerRequest};
