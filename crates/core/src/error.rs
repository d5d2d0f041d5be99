/// Result alias that carries the custom [`SonifyError`] type.
pub type Result<T> = std::result::Result<T, SonifyError>;

/// Common error type for the core crate.
///
/// Every variant is recoverable: callers surface a message and allow a retry.
#[derive(Debug, thiserror::Error)]
pub enum SonifyError {
    /// A caller supplied a value outside the accepted contract, such as a
    /// non-positive bucket width or an unknown category name.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// No synthesis backend could be reached when playback was requested.
    #[error("audio unavailable: {0}")]
    AudioUnavailable(String),
    /// Playback was requested for an empty event sequence.
    #[error("no playable data")]
    NoPlayableData,
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Wrapper around JSON (de)serialisation errors.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Spectral analysis of a rendered buffer failed.
    #[error("spectral analysis failed: {0}")]
    Spectrum(#[from] realfft::FftError),
}

impl SonifyError {
    /// Creates an [`SonifyError::InvalidArgument`] from any message.
    pub fn invalid<T: Into<String>>(msg: T) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Creates an [`SonifyError::AudioUnavailable`] from any message.
    pub fn unavailable<T: Into<String>>(msg: T) -> Self {
        Self::AudioUnavailable(msg.into())
    }
}
