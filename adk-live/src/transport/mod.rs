//! Transport seam between the engine and a framed socket.
//!
//! The engine never touches sockets directly: a [`Connector`] opens the
//! connection and hands back a write half ([`FrameSink`]) and a read half
//! ([`FrameStream`]). The stream ending means the peer closed the socket.

use crate::error::Result;
use crate::response::Frame;
use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use url::Url;

#[cfg(feature = "websocket")]
mod websocket;

#[cfg(feature = "websocket")]
pub use websocket::WebSocketConnector;

/// Inbound half of a connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame>> + Send>>;

/// Outbound half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Write a text frame.
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Write a binary frame.
    async fn send_binary(&mut self, data: Bytes) -> Result<()>;

    /// Close the connection.
    async fn close(&mut self) -> Result<()>;
}

/// Opens connections to the Live endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to `url`.
    async fn connect(&self, url: &Url) -> Result<(Box<dyn FrameSink>, FrameStream)>;
}
