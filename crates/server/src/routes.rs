use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::state::AppState;
use crate::ws::convert_socket;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/voices", get(list_voices))
        .route("/ws/convert", get(convert_socket))
        .with_state(state)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceEntry {
    pub id: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoicesResponse {
    pub voices: Vec<VoiceEntry>,
}

/// Catalog voices sorted by title.
async fn list_voices(State(state): State<AppState>) -> Json<VoicesResponse> {
    let voices = state
        .catalog
        .list()
        .into_iter()
        .map(|voice| VoiceEntry {
            id: voice.id.clone(),
            title: voice.title.clone(),
        })
        .collect();
    Json(VoicesResponse { voices })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use timbre_pipeline::{PassthroughAdapter, SessionConfig};
    use timbre_voices::VoiceCatalog;

    #[tokio::test]
    async fn test_health() {
        let Json(body) = health().await;
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"status":"ok"}"#);
    }

    #[tokio::test]
    async fn test_voices_sorted_by_title() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["zed_voice", "alto-2", "Bright"] {
            let path = dir.path().join(format!("{name}.wav"));
            timbre_audio::write_wav_mono(&path, &[0.0; 160], 16000).unwrap();
        }
        let state = AppState::new(
            VoiceCatalog::open(dir.path()).unwrap(),
            Arc::new(PassthroughAdapter::new(22050)),
            SessionConfig::streaming(),
        )
        .unwrap();

        let Json(body) = list_voices(State(state)).await;
        let titles: Vec<&str> = body.voices.iter().map(|v| v.title.as_str()).collect();
        assert_eq!(titles, vec!["Alto 2", "Bright", "Zed Voice"]);
        assert_eq!(body.voices[0].id, "alto-2");

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["voices"][2]["id"], "zed_voice");
    }
}
