use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{MoodTunesError, Result};

pub const ENV_CLIENT_ID: &str = "SPOTIPY_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "SPOTIPY_CLIENT_SECRET";
pub const ENV_REDIRECT_URI: &str = "SPOTIPY_REDIRECT_URI";
pub const ENV_CAMERA_INDEX: &str = "MOODTUNES_CAMERA_INDEX";

/// Upper bound for tracks requested per playlist.
pub const MAX_TRACK_LIMIT: usize = 5;

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub camera: CameraConfig,
    pub spotify: SpotifyConfig,
}

impl AppConfig {
    /// Loads the configuration from a JSON file, falling back to defaults when
    /// the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|err| MoodTunesError::Config(format!("{}: {err}", path.display())))
    }

    /// Overrides values from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Overrides values using the provided variable lookup. Empty values are
    /// ignored.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = lookup(ENV_CLIENT_ID) {
            self.spotify.client_id = value;
        }
        if let Some(value) = lookup(ENV_CLIENT_SECRET) {
            self.spotify.client_secret = value;
        }
        if let Some(value) = lookup(ENV_REDIRECT_URI) {
            self.spotify.redirect_uri = value;
        }
        if let Some(value) = lookup(ENV_CAMERA_INDEX) {
            self.camera.device_index = value.trim().parse().map_err(|_| {
                MoodTunesError::Config(format!("{ENV_CAMERA_INDEX} must be an integer, got `{value}`"))
            })?;
        }

        Ok(())
    }

    /// Checks values that can be verified before the camera is opened.
    pub fn validate(&self) -> Result<()> {
        self.spotify.check_track_limit()
    }
}

/// Configuration for the camera and the vision collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub device_index: i32,
    pub window_title: String,
    /// Haar cascade used for frontal face detection.
    pub cascade_path: PathBuf,
    /// ONNX emotion model (FER+ layout: 64x64 grayscale in, 8 scores out).
    pub emotion_model_path: PathBuf,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_index: 0,
            window_title: "Emotion Detection".to_string(),
            cascade_path: PathBuf::from("haarcascade_frontalface_default.xml"),
            emotion_model_path: PathBuf::from("emotion-ferplus-8.onnx"),
        }
    }
}

/// Credentials and limits for the Spotify integration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub token_cache_path: PathBuf,
    pub track_limit: usize,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
            token_cache_path: PathBuf::from(".cache"),
            track_limit: MAX_TRACK_LIMIT,
        }
    }
}

impl SpotifyConfig {
    pub fn check_track_limit(&self) -> Result<()> {
        if (1..=MAX_TRACK_LIMIT).contains(&self.track_limit) {
            Ok(())
        } else {
            Err(MoodTunesError::Config(format!(
                "spotify.track_limit must be between 1 and {MAX_TRACK_LIMIT}, got {}",
                self.track_limit
            )))
        }
    }

    /// Ensures the track limit is in range and all three caller-supplied
    /// credentials are present.
    pub fn validate(&self) -> Result<()> {
        self.check_track_limit()?;

        let missing: Vec<&str> = [
            (ENV_CLIENT_ID, &self.client_id),
            (ENV_CLIENT_SECRET, &self.client_secret),
            (ENV_REDIRECT_URI, &self.redirect_uri),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(MoodTunesError::Auth(format!(
                "missing Spotify credentials: {}",
                missing.join(", ")
            )))
        }
    }
}
