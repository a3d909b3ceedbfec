//! One conversion session per WebSocket connection.

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use timbre_pipeline::{
    ChunkedStreamDriver, ConversionSession, SessionError, SessionWorker, VoiceActivityGate,
    WorkerOutput,
};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::protocol::{ClientEvent, ServerEvent, SessionParams};
use crate::state::AppState;
use crate::{Result, ServerError};

pub(crate) async fn convert_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, query))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, query: Vec<(String, String)>) {
    let opened = match SessionParams::from_query(&query) {
        Ok(params) => {
            let state = state.clone();
            tokio::task::spawn_blocking(move || open_session(&state, &params))
                .await
                .unwrap_or_else(|e| Err(ServerError::Internal(e.to_string())))
        }
        Err(e) => Err(e),
    };

    let (worker, mut outputs) = match opened {
        Ok(opened) => opened,
        Err(e) => {
            reject(socket, &e).await;
            return;
        }
    };

    let _guard = state.track_session();
    let ready = ServerEvent::Ready {
        target_sample_rate: worker.output_rate(),
    };
    if send_event(&mut socket, &ready).await.is_err() {
        return;
    }

    let session_id = worker.session_id();
    let end = match run_session(&mut socket, &worker, &mut outputs, &state).await {
        SessionEnd::ServerShutdown => drain(&mut socket, &worker, &mut outputs).await,
        end => end,
    };
    tracing::info!(
        session_id = %session_id,
        reason = ?end,
        status = ?worker.status().snapshot(),
        "conversion session ended"
    );

    if end != SessionEnd::ClientGone {
        let code = match end {
            SessionEnd::WorkerFailed => close_code::ERROR,
            _ => close_code::AWAY,
        };
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code,
                reason: Utf8Bytes::from_static(""),
            })))
            .await;
    }
    // Dropping the worker detaches it; an in-flight block is discarded.
}

/// Validate everything before any audio is accepted.
fn open_session(
    state: &AppState,
    params: &SessionParams,
) -> Result<(SessionWorker, UnboundedReceiver<WorkerOutput>)> {
    if !state.catalog.contains(&params.voice_id) {
        return Err(SessionError::UnknownVoice(params.voice_id.clone()).into());
    }

    let config = params.overrides.apply(&state.template);
    config.validate(state.adapter.frames_per_second())?;

    let gate = VoiceActivityGate::for_config(&config);
    let session = ConversionSession::from_catalog(
        &state.catalog,
        &params.voice_id,
        config,
        state.adapter.clone(),
        gate,
    )?;
    let driver = ChunkedStreamDriver::new(session, params.sample_rate)?;

    tracing::info!(
        session_id = %driver.session().id(),
        voice_id = %params.voice_id,
        source_rate = params.sample_rate,
        output_rate = driver.output_rate(),
        block = driver.session().block_len(),
        "conversion session opened"
    );
    Ok(SessionWorker::spawn(driver))
}

async fn reject(mut socket: WebSocket, error: &ServerError) {
    tracing::warn!(error = %error, "rejecting conversion session");
    let _ = send_event(&mut socket, &ServerEvent::error(error.to_string())).await;
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: Utf8Bytes::from_static("invalid session parameters"),
        })))
        .await;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Close frame, EOF or a read error. Nothing more can be sent.
    ClientGone,
    /// A write failed.
    SendFailed,
    WorkerFailed,
    /// The server is stopping; queued audio is flushed first.
    ServerShutdown,
    /// Shutdown flush delivered.
    Drained,
}

async fn run_session(
    socket: &mut WebSocket,
    worker: &SessionWorker,
    outputs: &mut UnboundedReceiver<WorkerOutput>,
    state: &AppState,
) -> SessionEnd {
    let shutdown = state.shutdown_token();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return SessionEnd::ServerShutdown,
            incoming = socket.recv() => {
                let message = match incoming {
                    Some(Ok(message)) => message,
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "socket read failed");
                        return SessionEnd::ClientGone;
                    }
                    None => return SessionEnd::ClientGone,
                };

                match message {
                    Message::Binary(bytes) => {
                        if worker.send_audio(bytes.to_vec()).is_err() {
                            return SessionEnd::WorkerFailed;
                        }
                    }
                    Message::Text(text) => match ClientEvent::parse(text.as_str()) {
                        Ok(ClientEvent::Flush) => {
                            if worker.flush().is_err() {
                                return SessionEnd::WorkerFailed;
                            }
                        }
                        Ok(ClientEvent::Unknown(event)) => {
                            tracing::debug!(event = %event, "ignoring unknown client event");
                        }
                        Err(e) => {
                            let event = ServerEvent::error(e.to_string());
                            if send_event(socket, &event).await.is_err() {
                                return SessionEnd::SendFailed;
                            }
                        }
                    },
                    Message::Close(_) => return SessionEnd::ClientGone,
                    Message::Ping(_) | Message::Pong(_) => {}
                }
            }
            output = outputs.recv() => {
                let sent = match output {
                    Some(WorkerOutput::Audio(bytes)) => socket.send(Message::Binary(bytes.into())).await,
                    Some(WorkerOutput::Completed) => send_event(socket, &ServerEvent::Completed).await,
                    Some(WorkerOutput::Failed(message)) => {
                        let _ = send_event(socket, &ServerEvent::error(message)).await;
                        return SessionEnd::WorkerFailed;
                    }
                    None => return SessionEnd::WorkerFailed,
                };
                if sent.is_err() {
                    return SessionEnd::SendFailed;
                }
            }
        }
    }
}

/// Convert whatever is still queued and deliver it before closing.
async fn drain(
    socket: &mut WebSocket,
    worker: &SessionWorker,
    outputs: &mut UnboundedReceiver<WorkerOutput>,
) -> SessionEnd {
    if worker.flush().is_err() {
        return SessionEnd::WorkerFailed;
    }
    while let Some(output) = outputs.recv().await {
        let sent = match output {
            WorkerOutput::Audio(bytes) => socket.send(Message::Binary(bytes.into())).await,
            WorkerOutput::Completed => {
                return match send_event(socket, &ServerEvent::Completed).await {
                    Ok(()) => SessionEnd::Drained,
                    Err(_) => SessionEnd::SendFailed,
                };
            }
            WorkerOutput::Failed(_) => return SessionEnd::WorkerFailed,
        };
        if sent.is_err() {
            return SessionEnd::SendFailed;
        }
    }
    SessionEnd::WorkerFailed
}

async fn send_event(
    socket: &mut WebSocket,
    event: &ServerEvent,
) -> std::result::Result<(), axum::Error> {
    socket.send(Message::Text(event.to_json().into())).await
}
