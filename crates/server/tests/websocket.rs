//! Integration tests for the conversion socket.
//!
//! Runs a real server on an ephemeral port and drives it with a WebSocket client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tempfile::TempDir;
use timbre_audio::encode_pcm16_le;
use timbre_pipeline::{PassthroughAdapter, SessionConfig};
use timbre_server::{AppState, ServerEvent};
use timbre_voices::VoiceCatalog;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RATE: u32 = 16000;
/// 0.2 s at 16 kHz.
const BLOCK: usize = 3200;

fn template() -> SessionConfig {
    SessionConfig {
        block_time: 0.2,
        crossfade_time: 0.04,
        encoder_context_time: 0.5,
        decoder_context_time: 0.2,
        lookahead_time: 0.02,
        ..SessionConfig::streaming()
    }
}

fn tone(samples: usize) -> Vec<u8> {
    let audio: Vec<f32> = (0..samples)
        .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / RATE as f32).sin() * 0.5)
        .collect();
    encode_pcm16_le(&audio)
}

async fn start_server() -> (SocketAddr, AppState, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let reference: Vec<f32> = (0..RATE).map(|i| (i as f32 * 0.03).sin() * 0.3).collect();
    timbre_audio::write_wav_mono(dir.path().join("narrator.wav"), &reference, RATE).unwrap();

    let state = AppState::new(
        VoiceCatalog::open(dir.path()).unwrap(),
        Arc::new(PassthroughAdapter::new(RATE)),
        template(),
    )
    .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(timbre_server::serve(listener, state.clone()));
    (addr, state, dir)
}

async fn connect(addr: SocketAddr, query: &str) -> Client {
    let url = format!("ws://{addr}/ws/convert?{query}");
    let (client, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    client
}

async fn next_message(client: &mut Client) -> Message {
    tokio::time::timeout(Duration::from_secs(10), client.next())
        .await
        .expect("timed out waiting for the server")
        .expect("connection ended")
        .expect("read failed")
}

async fn next_event(client: &mut Client) -> ServerEvent {
    match next_message(client).await {
        Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
        other => panic!("expected an event, got {other:?}"),
    }
}

async fn expect_ready(client: &mut Client) {
    assert_eq!(
        next_event(client).await,
        ServerEvent::Ready {
            target_sample_rate: RATE
        }
    );
}

/// Audio message lengths in bytes up to and including `completed`.
async fn collect_until_completed(client: &mut Client) -> Vec<usize> {
    let mut lengths = Vec::new();
    loop {
        match next_message(client).await {
            Message::Binary(bytes) => lengths.push(bytes.len()),
            Message::Text(text) => {
                let event: ServerEvent = serde_json::from_str(text.as_str()).unwrap();
                assert_eq!(event, ServerEvent::Completed);
                return lengths;
            }
            other => panic!("unexpected message {other:?}"),
        }
    }
}

async fn expect_close(client: &mut Client, code: u16) {
    match next_message(client).await {
        Message::Close(Some(frame)) => assert_eq!(u16::from(frame.code), code),
        other => panic!("expected close, got {other:?}"),
    }
}

// =============================================================================
// Session open
// =============================================================================

#[tokio::test]
async fn test_unknown_voice_rejected() {
    let (addr, state, _dir) = start_server().await;
    let mut client = connect(addr, "voice_id=unknown").await;

    match next_event(&mut client).await {
        ServerEvent::Error { message } => assert!(message.contains("unknown"), "{message}"),
        other => panic!("expected error, got {other:?}"),
    }
    expect_close(&mut client, 1008).await;
    assert_eq!(state.active_sessions(), 0);
}

#[tokio::test]
async fn test_missing_voice_rejected() {
    let (addr, _state, _dir) = start_server().await;
    let mut client = connect(addr, "sample_rate=16000").await;

    assert_eq!(
        next_event(&mut client).await,
        ServerEvent::error("voice_id is required")
    );
    expect_close(&mut client, 1008).await;
}

#[tokio::test]
async fn test_unknown_parameter_rejected() {
    let (addr, _state, _dir) = start_server().await;
    let mut client = connect(addr, "voice_id=narrator&block_time=0.5").await;

    assert!(matches!(
        next_event(&mut client).await,
        ServerEvent::Error { .. }
    ));
    expect_close(&mut client, 1008).await;
}

#[tokio::test]
async fn test_out_of_range_sample_rate_rejected() {
    let (addr, state, _dir) = start_server().await;
    let mut client = connect(addr, "voice_id=narrator&sample_rate=400000009").await;

    match next_event(&mut client).await {
        ServerEvent::Error { message } => assert!(message.contains("sample_rate"), "{message}"),
        other => panic!("expected error, got {other:?}"),
    }
    expect_close(&mut client, 1008).await;
    assert_eq!(state.active_sessions(), 0);

    // The server is still serving.
    let mut client = connect(addr, "voice_id=narrator").await;
    expect_ready(&mut client).await;
}

#[tokio::test]
async fn test_invalid_chunk_seconds_rejected() {
    let (addr, _state, _dir) = start_server().await;
    let mut client = connect(addr, "voice_id=narrator&chunk_seconds=0").await;

    assert!(matches!(
        next_event(&mut client).await,
        ServerEvent::Error { .. }
    ));
    expect_close(&mut client, 1008).await;
}

// =============================================================================
// Streaming
// =============================================================================

#[tokio::test]
async fn test_flush_partial_chunk_emits_one_message() {
    let (addr, _state, _dir) = start_server().await;
    let mut client = connect(addr, "voice_id=narrator&sample_rate=16000").await;
    expect_ready(&mut client).await;

    client.send(Message::binary(tone(1600))).await.unwrap();
    client
        .send(Message::text(r#"{"event":"flush"}"#))
        .await
        .unwrap();

    assert_eq!(collect_until_completed(&mut client).await, vec![1600 * 2]);
}

#[tokio::test]
async fn test_whole_chunks_then_flush() {
    let (addr, _state, _dir) = start_server().await;
    let mut client = connect(addr, "voice_id=narrator").await;
    expect_ready(&mut client).await;

    // Two and a half blocks, split at an odd byte boundary.
    let audio = tone(BLOCK * 2 + BLOCK / 2);
    let (head, tail) = audio.split_at(5001);
    client.send(Message::binary(head.to_vec())).await.unwrap();
    client.send(Message::binary(tail.to_vec())).await.unwrap();
    client
        .send(Message::text(r#"{"event":"flush"}"#))
        .await
        .unwrap();

    assert_eq!(
        collect_until_completed(&mut client).await,
        vec![BLOCK * 2, BLOCK * 2, BLOCK]
    );
}

#[tokio::test]
async fn test_source_rate_is_resampled() {
    let (addr, _state, _dir) = start_server().await;
    let mut client = connect(addr, "voice_id=narrator&sample_rate=8000").await;
    expect_ready(&mut client).await;

    // 0.4 s at 8 kHz is two 0.2 s blocks at the output rate.
    client.send(Message::binary(tone(3200))).await.unwrap();
    client
        .send(Message::text(r#"{"event":"flush"}"#))
        .await
        .unwrap();

    assert_eq!(
        collect_until_completed(&mut client).await,
        vec![BLOCK * 2, BLOCK * 2]
    );
}

#[tokio::test]
async fn test_chunk_seconds_override() {
    let (addr, _state, _dir) = start_server().await;
    let mut client = connect(addr, "voice_id=narrator&chunk_seconds=0.1&diffusion_steps=5").await;
    expect_ready(&mut client).await;

    client.send(Message::binary(tone(BLOCK))).await.unwrap();
    client
        .send(Message::text(r#"{"event":"flush"}"#))
        .await
        .unwrap();

    assert_eq!(
        collect_until_completed(&mut client).await,
        vec![BLOCK, BLOCK]
    );
}

#[tokio::test]
async fn test_malformed_event_keeps_session_open() {
    let (addr, _state, _dir) = start_server().await;
    let mut client = connect(addr, "voice_id=narrator").await;
    expect_ready(&mut client).await;

    client.send(Message::text("not json")).await.unwrap();
    assert!(matches!(
        next_event(&mut client).await,
        ServerEvent::Error { .. }
    ));

    client
        .send(Message::text(r#"{"event":"pause"}"#))
        .await
        .unwrap();
    client
        .send(Message::text(r#"{"event":"flush"}"#))
        .await
        .unwrap();
    assert!(collect_until_completed(&mut client).await.is_empty());
}

#[tokio::test]
async fn test_server_shutdown_flushes_and_closes() {
    let (addr, state, _dir) = start_server().await;
    let mut client = connect(addr, "voice_id=narrator").await;
    expect_ready(&mut client).await;
    assert_eq!(state.active_sessions(), 1);

    state.shutdown_token().cancel();

    collect_until_completed(&mut client).await;
    expect_close(&mut client, 1001).await;
}
