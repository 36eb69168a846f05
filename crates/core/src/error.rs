/// Result alias that carries the custom [`ThereminError`] type.
pub type Result<T> = std::result::Result<T, ThereminError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum ThereminError {
    /// Free-form failure that does not fit one of the typed variants.
    #[error("{0}")]
    Message(String),
    /// The user declined camera access. Recoverable through the browser or
    /// OS settings followed by a restart of the session.
    #[error("camera access was denied")]
    PermissionDenied,
    /// The face detector could not load its model assets.
    #[error("face detector failed to load: {0}")]
    DetectorLoad(String),
    /// A single detection call failed. Logged per tick, never fatal.
    #[error("face detection failed: {0}")]
    Detection(String),
    /// The audio device is missing or refused to resume.
    #[error("audio output unavailable: {0}")]
    AudioUnavailable(String),
    /// Mapping ranges that would produce non-finite frequencies.
    #[error("invalid mapping: {0}")]
    InvalidMapping(&'static str),
    /// Melody data referencing a note name that is not in the table.
    #[error("unknown note `{0}`")]
    UnknownNote(String),
    /// Another frequency producer currently owns the tone engine.
    #[error("{0} is already driving the tone engine")]
    SourceBusy(&'static str),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Malformed configuration or trace files.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    /// Planner or buffer mismatch inside the reverb convolver.
    #[error("{0}")]
    Fft(#[from] realfft::FftError),
}

impl ThereminError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for ThereminError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for ThereminError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
