pub mod convert;
pub mod devices;
pub mod live;
pub mod serve;

use std::sync::Arc;

use anyhow::Context;
use timbre_pipeline::{PassthroughAdapter, SessionConfig};
use timbre_voices::VoiceCatalog;

use crate::cli::SessionArgs;

/// The preset file when given, otherwise `fallback`.
pub fn load_config(args: &SessionArgs, fallback: fn() -> SessionConfig) -> anyhow::Result<SessionConfig> {
    match &args.preset {
        Some(path) => {
            let config = SessionConfig::from_json_file(path)?;
            tracing::info!(preset = %path.display(), "loaded session preset");
            Ok(config)
        }
        None => Ok(fallback()),
    }
}

pub fn open_catalog(args: &SessionArgs) -> anyhow::Result<VoiceCatalog> {
    let catalog = VoiceCatalog::open(&args.voices_dir).with_context(|| {
        format!("cannot open voices directory {}", args.voices_dir.display())
    })?;
    if catalog.is_empty() {
        tracing::warn!(root = %catalog.root().display(), "voice catalog is empty");
    }
    Ok(catalog)
}

/// No model backend is linked in, so sessions run the pass-through adapter.
pub fn create_adapter(args: &SessionArgs) -> Arc<PassthroughAdapter> {
    tracing::info!(
        output_rate = args.output_rate,
        "no model backend configured, using pass-through conversion"
    );
    Arc::new(PassthroughAdapter::new(args.output_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args(preset: Option<PathBuf>) -> SessionArgs {
        SessionArgs {
            voices_dir: PathBuf::from("voices"),
            preset,
            output_rate: 22050,
        }
    }

    #[test]
    fn test_fallback_without_preset() {
        let config = load_config(&args(None), SessionConfig::streaming).unwrap();
        assert_eq!(config, SessionConfig::streaming());
    }

    #[test]
    fn test_preset_overrides_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fast.json");
        std::fs::write(&path, r#"{"block_time": 0.18, "vad_enabled": false}"#).unwrap();

        let config = load_config(&args(Some(path)), SessionConfig::streaming).unwrap();
        assert_eq!(config.block_time, 0.18);
        assert!(!config.vad_enabled);
        assert_eq!(config.inference.diffusion_steps, 10);
    }

    #[test]
    fn test_missing_voices_dir_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let args = SessionArgs {
            voices_dir: dir.path().join("missing"),
            ..args(None)
        };
        assert!(open_catalog(&args).is_err());
    }
}
