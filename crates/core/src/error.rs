/// Result alias that carries the custom [`MoodTunesError`] type.
pub type Result<T> = std::result::Result<T, MoodTunesError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum MoodTunesError {
    /// The camera could not be opened. Fatal for the run.
    #[error("camera device unavailable: {0}")]
    DeviceUnavailable(String),
    /// Face detection, classification or the output surface failed.
    #[error("vision backend error: {0}")]
    Vision(String),
    /// Credentials were missing or rejected by the music service.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// The music service could not be reached or answered with an error.
    #[error("music service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl MoodTunesError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for MoodTunesError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for MoodTunesError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<reqwest::Error> for MoodTunesError {
    fn from(value: reqwest::Error) -> Self {
        match value.status() {
            Some(status) if status.as_u16() == 401 || status.as_u16() == 403 => {
                Self::Auth(value.to_string())
            }
            _ => Self::ServiceUnavailable(value.to_string()),
        }
    }
}

#[cfg(feature = "opencv")]
impl From<opencv::Error> for MoodTunesError {
    fn from(value: opencv::Error) -> Self {
        Self::Vision(value.to_string())
    }
}
