//! # adk-live
//!
//! Live session engine for the Gemini Live (`BidiGenerateContent`) protocol.
//!
//! A [`LiveSession`] holds one persistent, bidirectional connection over which
//! it streams text turns, microphone audio and tool results up, and receives
//! model text, 24 kHz speech, transcripts and tool calls back.
//!
//! ## Architecture
//!
//! ```text
//!  MicrophoneSource ─► CaptureRelay ─► LiveSession ─► codec::encode ─► FrameSink
//!                                          │
//!  FrameStream ─► response::parse ─► dispatch loop ─► EventHub (connection, audio,
//!                                          │           content, tool, diagnostic)
//!                                          └─► PlaybackBuffer ─► AudioSink
//! ```
//!
//! - **Pure core**: [`codec`], [`response`] and [`state`] do no I/O.
//! - **Typed events**: one broadcast channel per category, many subscribers.
//! - **Pluggable transport**: anything implementing [`Connector`]; the
//!   `websocket` feature (default) ships a `tokio-tungstenite` connector.
//!
//! ## Example
//!
//! ```rust,ignore
//! use adk_live::{ContentEvent, LiveConfig, LiveSession};
//!
//! #[tokio::main]
//! async fn main() -> adk_live::Result<()> {
//!     let config = LiveConfig::from_env()?.with_text_only();
//!     let session = LiveSession::with_websocket(config);
//!     let mut content = session.events().subscribe_content();
//!
//!     session.connect().await?;
//!     session.send_text("Hello").await?;
//!
//!     while let Ok(event) = content.recv().await {
//!         match event {
//!             ContentEvent::Text(text) => println!("{}", text),
//!             ContentEvent::TurnComplete => break,
//!             _ => {}
//!         }
//!     }
//!     session.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod audio;
pub mod capture;
pub mod codec;
pub mod config;
pub mod error;
pub mod events;
pub mod playback;
pub mod response;
pub mod session;
pub mod state;
pub mod telemetry;
pub mod transport;

// Re-exports
pub use audio::{AudioEncoding, AudioFormat, CAPTURE_FORMAT, PLAYBACK_FORMAT};
pub use capture::{AudioOutlet, AudioStream, CaptureEvent, CaptureRelay, MicrophoneSource};
pub use codec::OutgoingMessage;
pub use config::{GenerationParams, LiveConfig, ToolDefinition};
pub use error::{ErrorEvent, ErrorKind, LiveError, Result};
pub use events::{
    ConnectionEvent, ContentEvent, DiagnosticEvent, DisconnectReason, EventHub, ToolEvent,
};
pub use playback::{
    AudioSink, PlaybackBuffer, PlaybackConfig, PlaybackEvent, PlaybackMode, PlaybackStatus,
};
pub use response::{
    ApiErrorInfo, Frame, FunctionCall, IncomingResponse, ParsedFrame, ServerContent, UsageMetadata,
};
pub use session::LiveSession;
pub use state::{AudioState, ConnectionState, SessionState, SessionUpdate};
#[cfg(feature = "websocket")]
pub use transport::WebSocketConnector;
pub use transport::{Connector, FrameSink, FrameStream};
