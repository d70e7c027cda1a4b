//! Session state snapshots and the pure transition function.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transport-level connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Conversational audio state, derived from observed events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioState {
    #[default]
    Idle,
    Listening,
    Processing,
    Speaking,
}

impl std::fmt::Display for AudioState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Listening => write!(f, "listening"),
            Self::Processing => write!(f, "processing"),
            Self::Speaking => write!(f, "speaking"),
        }
    }
}

/// Immutable snapshot of a session.
///
/// `error_message` is `Some` exactly when `connection` is
/// [`ConnectionState::Error`]. `connected_at` is set once the current
/// lifecycle has reached [`ConnectionState::Connected`] and is cleared when a
/// new lifecycle starts at [`ConnectionState::Connecting`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub connection: ConnectionState,
    pub audio: AudioState,
    pub error_message: Option<String>,
    pub connected_at: Option<DateTime<Utc>>,
    /// Frames written since the lifecycle started.
    pub messages_sent: u64,
    /// Frames routed after the handshake.
    pub messages_received: u64,
}

/// A partial update; `None` fields carry over from the previous snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionUpdate {
    pub connection: Option<ConnectionState>,
    pub audio: Option<AudioState>,
    pub error_message: Option<String>,
    pub connected_at: Option<DateTime<Utc>>,
    /// Added to `messages_sent`.
    pub sent_delta: u64,
    /// Added to `messages_received`.
    pub received_delta: u64,
}

impl SessionUpdate {
    /// Move to a connection state.
    pub fn connection(state: ConnectionState) -> Self {
        Self { connection: Some(state), ..Default::default() }
    }

    /// Move to the error state with a message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            connection: Some(ConnectionState::Error),
            error_message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Move to the error state and stop all audio activity.
    pub fn failed(message: impl Into<String>) -> Self {
        Self { audio: Some(AudioState::Idle), ..Self::error(message) }
    }

    /// Move to an audio state.
    pub fn audio(state: AudioState) -> Self {
        Self { audio: Some(state), ..Default::default() }
    }

    /// Count one sent message.
    pub fn sent() -> Self {
        Self { sent_delta: 1, ..Default::default() }
    }

    /// Count one received message.
    pub fn received() -> Self {
        Self { received_delta: 1, ..Default::default() }
    }
}

impl SessionState {
    /// Whether the connection is up.
    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    /// Apply an update and return the next snapshot.
    pub fn transition(&self, update: SessionUpdate) -> SessionState {
        let connection = update.connection.unwrap_or(self.connection);
        let starting = connection == ConnectionState::Connecting
            && self.connection != ConnectionState::Connecting;

        let error_message = if connection == ConnectionState::Error {
            update
                .error_message
                .or_else(|| self.error_message.clone())
                .or_else(|| Some("unknown error".to_string()))
        } else {
            None
        };

        let connected_at = if starting {
            None
        } else if connection == ConnectionState::Connected && self.connected_at.is_none() {
            Some(update.connected_at.unwrap_or_else(Utc::now))
        } else {
            self.connected_at
        };

        let (sent, received) =
            if starting { (0, 0) } else { (self.messages_sent, self.messages_received) };

        SessionState {
            connection,
            audio: update.audio.unwrap_or(self.audio),
            error_message,
            connected_at,
            messages_sent: sent + update.sent_delta,
            messages_received: received + update.received_delta,
        }
    }
}
