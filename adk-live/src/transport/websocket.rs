use super::{Connector, FrameSink, FrameStream};
use crate::error::{LiveError, Result};
use crate::response::Frame;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// [`Connector`] backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    /// Create a connector using the default rustls configuration.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &Url) -> Result<(Box<dyn FrameSink>, FrameStream)> {
        // Already installed is fine.
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

        let request = url.as_str().into_client_request().map_err(|e| {
            LiveError::connection(format!("Failed to create client request: {}", e))
        })?;

        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| LiveError::connection(format!("WebSocket connect error: {}", e)))?;

        tracing::debug!(host = url.host_str().unwrap_or_default(), "WebSocket connected");

        let (sink, source) = stream.split();
        Ok((Box::new(WebSocketSink { sink }), Box::pin(inbound_frames(source))))
    }
}

struct WebSocketSink {
    sink: WsSink,
}

#[async_trait]
impl FrameSink for WebSocketSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| LiveError::connection(format!("Send error: {}", e)))
    }

    async fn send_binary(&mut self, data: Bytes) -> Result<()> {
        self.sink
            .send(Message::Binary(data.to_vec()))
            .await
            .map_err(|e| LiveError::connection(format!("Send error: {}", e)))
    }

    async fn close(&mut self) -> Result<()> {
        self.sink
            .send(Message::Close(None))
            .await
            .map_err(|e| LiveError::connection(format!("Close error: {}", e)))
    }
}

fn inbound_frames(mut source: WsSource) -> impl Stream<Item = Result<Frame>> + Send {
    async_stream::stream! {
        while let Some(message) = source.next().await {
            match message {
                Ok(Message::Text(text)) => yield Ok(Frame::Text(text)),
                Ok(Message::Binary(data)) => yield Ok(Frame::Binary(Bytes::from(data))),
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "WebSocket close frame received");
                    break;
                }
                // tungstenite answers pings itself
                Ok(_) => continue,
                Err(e) => {
                    yield Err(LiveError::connection(format!("Receive error: {}", e)));
                    break;
                }
            }
        }
    }
}
