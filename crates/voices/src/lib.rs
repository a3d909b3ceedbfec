//! Reference voices available for zero-shot conversion.
//!
//! The catalog is a snapshot of one directory taken at startup. It is read-only afterwards
//! and safe to share between sessions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use timbre_audio::Resampler;

pub const DEFAULT_EXTENSIONS: &[&str] = &["wav"];

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("voice directory '{0}' does not exist")]
    MissingDirectory(PathBuf),
    #[error("unknown voice id '{0}'")]
    UnknownVoice(String),
    #[error("failed to load reference audio for '{id}': {source}")]
    Audio {
        id: String,
        #[source]
        source: timbre_audio::AudioError,
    },
    #[error("reference audio for '{0}' is empty")]
    EmptyReference(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CatalogError>;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct VoiceProfile {
    pub id: String,
    pub title: String,
    #[serde(skip)]
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct VoiceCatalog {
    root: PathBuf,
    profiles: HashMap<String, VoiceProfile>,
}

impl VoiceCatalog {
    /// Scan `root` (non-recursively) for `.wav` files.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        Self::with_extensions(root, DEFAULT_EXTENSIONS)
    }

    pub fn with_extensions(root: impl AsRef<Path>, extensions: &[&str]) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(CatalogError::MissingDirectory(root.to_path_buf()));
        }

        let mut profiles = HashMap::new();
        for entry in std::fs::read_dir(root)? {
            let path = entry?.path();
            if !path.is_file() || !has_extension(&path, extensions) {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let path = path.canonicalize().unwrap_or(path.clone());
            let profile = VoiceProfile {
                id: id.to_string(),
                title: slug_to_title(id),
                path,
            };
            if let Some(previous) = profiles.insert(profile.id.clone(), profile) {
                tracing::warn!(id = %previous.id, path = %previous.path.display(), "duplicate voice id, keeping the later file");
            }
        }

        tracing::info!(root = %root.display(), voices = profiles.len(), "voice catalog loaded");

        Ok(Self {
            root: root.to_path_buf(),
            profiles,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All profiles, sorted by title.
    pub fn list(&self) -> Vec<&VoiceProfile> {
        let mut profiles: Vec<&VoiceProfile> = self.profiles.values().collect();
        profiles.sort_by(|a, b| a.title.cmp(&b.title).then_with(|| a.id.cmp(&b.id)));
        profiles
    }

    pub fn get(&self, id: &str) -> Result<&VoiceProfile> {
        self.profiles
            .get(id)
            .ok_or_else(|| CatalogError::UnknownVoice(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.profiles.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// Load a reference clip as mono audio at `sample_rate`, keeping at most `max_seconds`.
pub fn load_reference(
    profile: &VoiceProfile,
    sample_rate: u32,
    max_seconds: f32,
) -> Result<Vec<f32>> {
    let audio_err = |source| CatalogError::Audio {
        id: profile.id.clone(),
        source,
    };

    let (samples, native_rate) = timbre_audio::read_wav_mono(&profile.path).map_err(audio_err)?;
    if samples.is_empty() {
        return Err(CatalogError::EmptyReference(profile.id.clone()));
    }

    let mut resampler = Resampler::new(native_rate, sample_rate).map_err(audio_err)?;
    let mut resampled = resampler.process(&samples);

    let limit = (max_seconds.max(0.0) * sample_rate as f32) as usize;
    resampled.truncate(limit);

    tracing::debug!(
        voice_id = %profile.id,
        native_rate,
        sample_rate,
        samples = resampled.len(),
        "reference audio loaded"
    );
    Ok(resampled)
}

/// `"deep_male-voice"` -> `"Deep Male Voice"`.
pub fn slug_to_title(slug: &str) -> String {
    let words: Vec<String> = slug
        .split(['_', '-', ' '])
        .filter(|w| !w.is_empty())
        .map(capitalize)
        .collect();

    if words.is_empty() {
        slug.to_string()
    } else {
        words.join(" ")
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(|c| c.to_lowercase()))
            .collect(),
        None => String::new(),
    }
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            extensions
                .iter()
                .any(|want| want.trim_start_matches('.').eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_tone(path: &Path, rate: u32, seconds: f32) {
        let len = (rate as f32 * seconds) as usize;
        let samples: Vec<f32> = (0..len)
            .map(|i| (i as f32 * 0.05).sin() * 0.3)
            .collect();
        timbre_audio::write_wav_mono(path, &samples, rate).unwrap();
    }

    mod titles {
        use super::*;

        #[test]
        fn test_slug_to_title() {
            assert_eq!(slug_to_title("deep_male-voice"), "Deep Male Voice");
            assert_eq!(slug_to_title("ALICE"), "Alice");
            assert_eq!(slug_to_title("__"), "__");
        }
    }

    mod catalog {
        use super::*;

        #[test]
        fn test_missing_directory_is_error() {
            let dir = tempdir().unwrap();
            let missing = dir.path().join("nope");
            assert!(matches!(
                VoiceCatalog::open(&missing),
                Err(CatalogError::MissingDirectory(_))
            ));
        }

        #[test]
        fn test_lists_wav_files_sorted_by_title() {
            let dir = tempdir().unwrap();
            write_tone(&dir.path().join("zed_voice.wav"), 16000, 0.1);
            write_tone(&dir.path().join("alice.wav"), 16000, 0.1);
            std::fs::write(dir.path().join("notes.txt"), "not audio").unwrap();
            std::fs::create_dir(dir.path().join("nested")).unwrap();
            write_tone(&dir.path().join("nested").join("bob.wav"), 16000, 0.1);

            let catalog = VoiceCatalog::open(dir.path()).unwrap();
            let titles: Vec<&str> = catalog.list().iter().map(|p| p.title.as_str()).collect();
            assert_eq!(titles, vec!["Alice", "Zed Voice"]);
            assert!(!catalog.contains("bob"));
        }

        #[test]
        fn test_get_unknown_voice() {
            let dir = tempdir().unwrap();
            let catalog = VoiceCatalog::open(dir.path()).unwrap();
            assert!(catalog.is_empty());
            assert!(matches!(
                catalog.get("unknown"),
                Err(CatalogError::UnknownVoice(id)) if id == "unknown"
            ));
        }
    }

    mod reference {
        use super::*;

        #[test]
        fn test_load_resamples_and_truncates() {
            let dir = tempdir().unwrap();
            write_tone(&dir.path().join("alice.wav"), 16000, 5.0);
            let catalog = VoiceCatalog::open(dir.path()).unwrap();
            let profile = catalog.get("alice").unwrap();

            let samples = load_reference(profile, 22050, 3.0).unwrap();
            assert_eq!(samples.len(), 3 * 22050);
        }

        #[test]
        fn test_short_reference_is_not_padded() {
            let dir = tempdir().unwrap();
            write_tone(&dir.path().join("short.wav"), 22050, 1.0);
            let catalog = VoiceCatalog::open(dir.path()).unwrap();

            let samples = load_reference(catalog.get("short").unwrap(), 22050, 3.0).unwrap();
            assert_eq!(samples.len(), 22050);
        }
    }
}
