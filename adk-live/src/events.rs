//! Typed observer channels.
//!
//! Each category of session activity has its own broadcast channel, so any
//! number of UI surfaces can subscribe independently. Slow subscribers lag
//! (see [`tokio::sync::broadcast::error::RecvError::Lagged`]) rather than
//! blocking the dispatch loop.

use crate::error::ErrorEvent;
use crate::response::{ApiErrorInfo, FunctionCall, UsageMetadata};
use crate::state::AudioState;
use bytes::Bytes;
use std::time::Duration;
use tokio::sync::broadcast;

/// Default per-channel buffer.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Why a connection ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called.
    UserRequested,
    /// The server or network closed the socket.
    ClosedByPeer,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UserRequested => write!(f, "user requested"),
            Self::ClosedByPeer => write!(f, "closed by peer"),
        }
    }
}

/// Connection lifecycle notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    Connecting,
    Connected { session_id: String },
    Disconnected { reason: DisconnectReason },
    Failed(ErrorEvent),
}

/// Model output notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentEvent {
    /// Joined, trimmed text of one `serverContent` frame.
    Text(String),
    /// One inline or binary audio payload.
    Audio(Bytes),
    InputTranscript(String),
    OutputTranscript(String),
    TurnComplete,
    Interrupted,
    GenerationComplete,
}

/// Tool invocation notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolEvent {
    Call(FunctionCall),
    Cancellation { ids: Vec<String> },
}

/// Advisory and error notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum DiagnosticEvent {
    ApiError(ApiErrorInfo),
    SessionResumption { handle: Option<String>, resumable: bool },
    GoAway { time_left: Option<Duration> },
    Usage(UsageMetadata),
    /// An inbound frame was dropped.
    FrameDropped { reason: String },
    Error(ErrorEvent),
}

/// Fan-out hub holding one broadcast channel per event category.
#[derive(Debug, Clone)]
pub struct EventHub {
    connection: broadcast::Sender<ConnectionEvent>,
    audio: broadcast::Sender<AudioState>,
    content: broadcast::Sender<ContentEvent>,
    tool: broadcast::Sender<ToolEvent>,
    diagnostic: broadcast::Sender<DiagnosticEvent>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl EventHub {
    /// Create a hub whose channels each buffer `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            connection: broadcast::channel(capacity).0,
            audio: broadcast::channel(capacity).0,
            content: broadcast::channel(capacity).0,
            tool: broadcast::channel(capacity).0,
            diagnostic: broadcast::channel(capacity).0,
        }
    }

    /// Connection lifecycle events.
    pub fn subscribe_connection(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.connection.subscribe()
    }

    /// Every [`AudioState`] change.
    pub fn subscribe_audio(&self) -> broadcast::Receiver<AudioState> {
        self.audio.subscribe()
    }

    /// Model text, audio, transcripts and turn markers.
    pub fn subscribe_content(&self) -> broadcast::Receiver<ContentEvent> {
        self.content.subscribe()
    }

    /// Tool calls and cancellations.
    pub fn subscribe_tool(&self) -> broadcast::Receiver<ToolEvent> {
        self.tool.subscribe()
    }

    /// Advisory notices and non-fatal errors.
    pub fn subscribe_diagnostic(&self) -> broadcast::Receiver<DiagnosticEvent> {
        self.diagnostic.subscribe()
    }

    // A send with no live receivers is not an error for observers.

    pub(crate) fn connection(&self, event: ConnectionEvent) {
        let _ = self.connection.send(event);
    }

    pub(crate) fn audio(&self, state: AudioState) {
        let _ = self.audio.send(state);
    }

    pub(crate) fn content(&self, event: ContentEvent) {
        let _ = self.content.send(event);
    }

    pub(crate) fn tool(&self, event: ToolEvent) {
        let _ = self.tool.send(event);
    }

    pub(crate) fn diagnostic(&self, event: DiagnosticEvent) {
        let _ = self.diagnostic.send(event);
    }
}
