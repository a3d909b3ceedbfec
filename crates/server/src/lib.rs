//! Network front end for conversion sessions.
//!
//! `GET /ws/convert` streams PCM16 over a WebSocket, one conversion session per
//! connection. `GET /voices` and `GET /health` are plain JSON.

mod protocol;
mod routes;
mod state;
mod ws;

pub use protocol::{
    ClientEvent, ServerEvent, SessionParams, DEFAULT_SOURCE_RATE, SOURCE_RATE_RANGE,
};
pub use routes::{router, HealthResponse, VoiceEntry, VoicesResponse};
pub use state::AppState;

use tokio::net::TcpListener;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("voice_id is required")]
    MissingVoiceId,
    #[error("sample_rate must be an integer from 8000 to 192000, got '{0}'")]
    InvalidSampleRate(String),
    #[error(transparent)]
    Config(#[from] timbre_pipeline::ConfigError),
    #[error(transparent)]
    Session(#[from] timbre_pipeline::SessionError),
    #[error(transparent)]
    Catalog(#[from] timbre_voices::CatalogError),
    #[error("malformed event: {0}")]
    MalformedEvent(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// Serve until the state's shutdown token is cancelled.
///
/// Open sessions are told to flush what they have queued and close.
pub async fn serve(listener: TcpListener, state: AppState) -> Result<()> {
    let addr = listener.local_addr()?;
    let shutdown = state.shutdown_token();
    tracing::info!(
        %addr,
        voices = state.catalog.len(),
        adapter = state.adapter.name(),
        "conversion server listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    tracing::info!("conversion server stopped");
    Ok(())
}
