//! Error types for the live session engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for live session operations.
pub type Result<T> = std::result::Result<T, LiveError>;

/// Errors that can occur while driving a live session.
#[derive(Error, Debug)]
pub enum LiveError {
    /// Transport could not be opened or the handshake failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The connection went away underneath an operation.
    #[error("Disconnected: {0}")]
    Disconnected(String),

    /// `connect()` was called on a session that is already connected or connecting.
    #[error("Session already connected")]
    AlreadyConnected,

    /// An operation that needs a live connection was called while disconnected.
    #[error("Session not connected")]
    NotConnected,

    /// Capture was started twice.
    #[error("Audio capture already recording")]
    AlreadyRecording,

    /// Microphone stream failure.
    #[error("Audio recording error: {0}")]
    AudioRecording(String),

    /// Audio sink failure.
    #[error("Audio playback error: {0}")]
    AudioPlayback(String),

    /// A message could not be encoded or written.
    #[error("Message format error: {0}")]
    MessageFormat(String),

    /// The server reported an error frame.
    #[error("API error: {message}")]
    Api {
        /// Numeric error code from the server, if any.
        code: Option<i64>,
        /// Human-readable message.
        message: String,
        /// Status string (e.g. `INVALID_ARGUMENT`), if any.
        status: Option<String>,
    },

    /// Microphone or speaker access was refused by the host.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Timeout waiting for the server.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Anything else.
    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Coarse error categories reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConnectionFailed,
    Disconnected,
    AudioRecordingError,
    AudioPlaybackError,
    MessageFormatError,
    ApiError,
    PermissionDenied,
    Timeout,
    Unknown,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ConnectionFailed => "connection_failed",
            Self::Disconnected => "disconnected",
            Self::AudioRecordingError => "audio_recording_error",
            Self::AudioPlaybackError => "audio_playback_error",
            Self::MessageFormatError => "message_format_error",
            Self::ApiError => "api_error",
            Self::PermissionDenied => "permission_denied",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A cloneable error description carried on event channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    /// Error category.
    pub kind: ErrorKind,
    /// Rendered error message.
    pub message: String,
}

impl ErrorEvent {
    /// Create a new error event.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

impl From<&LiveError> for ErrorEvent {
    fn from(err: &LiveError) -> Self {
        Self { kind: err.kind(), message: err.to_string() }
    }
}

impl LiveError {
    /// Create a new connection error.
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::ConnectionFailed(msg.into())
    }

    /// Create a new message format error.
    pub fn format<S: Into<String>>(msg: S) -> Self {
        Self::MessageFormat(msg.into())
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new playback error.
    pub fn playback<S: Into<String>>(msg: S) -> Self {
        Self::AudioPlayback(msg.into())
    }

    /// Create a new recording error.
    pub fn recording<S: Into<String>>(msg: S) -> Self {
        Self::AudioRecording(msg.into())
    }

    /// Create a new timeout error.
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Map this error onto its observer-facing category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ConnectionFailed(_) | Self::AlreadyConnected => ErrorKind::ConnectionFailed,
            Self::Disconnected(_) | Self::NotConnected => ErrorKind::Disconnected,
            Self::AudioRecording(_) | Self::AlreadyRecording => ErrorKind::AudioRecordingError,
            Self::AudioPlayback(_) => ErrorKind::AudioPlaybackError,
            Self::MessageFormat(_) | Self::Config(_) | Self::Serialization(_) => {
                ErrorKind::MessageFormatError
            }
            Self::Api { .. } => ErrorKind::ApiError,
            Self::PermissionDenied(_) => ErrorKind::PermissionDenied,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Unknown(_) => ErrorKind::Unknown,
        }
    }
}
