//! Core library for MoodTunes.
//!
//! A capture loop watches the webcam until the user confirms the detected
//! emotion, which is then mapped to a genre and turned into a private Spotify
//! playlist. Face detection, emotion classification and the catalog are
//! external collaborators behind traits; the `opencv` feature provides the
//! concrete camera, detector, classifier and window.
//!
//! `opencv` is off by default because it needs a system OpenCV installation.
//! Without it the binary has no camera backend and every run ends with
//! [`MoodTunesError::DeviceUnavailable`]; build with `--features opencv` to
//! capture from a real webcam.

pub mod capture;
pub mod config;
pub mod emotion;
pub mod error;
pub mod mapping;
pub mod playlist;
pub mod session;
pub mod spotify;
#[cfg(feature = "opencv")]
pub mod vision;

pub use capture::{
    CaptureLoop, CaptureOutcome, Command, DetectionParams, EmotionClassifier, FaceDetector,
    FaceRegion, FrameSource, LoopState, OutputSurface,
};
pub use config::{AppConfig, CameraConfig, SpotifyConfig};
pub use emotion::{EmotionLabel, EmotionScores};
pub use error::{MoodTunesError, Result};
pub use mapping::{genre_for, GenreTag, DEFAULT_GENRE};
pub use playlist::{playlist_name, PlaylistBuilder};
pub use session::{run_session, NO_EMOTION_MESSAGE};
pub use spotify::{
    CreatedPlaylist, MusicService, SpotifyClient, SpotifyOAuth, TokenCache, TokenInfo, TrackId,
};
