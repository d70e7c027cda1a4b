//! Shared fixtures: an in-memory connector driven by a scripted server.

#![allow(dead_code)]

use adk_live::{
    Connector, Frame, FrameSink, FrameStream, LiveConfig, LiveError, LiveSession, Result,
};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;
use url::Url;

pub const WAIT: Duration = Duration::from_secs(2);

struct Halves {
    sink: Box<dyn FrameSink>,
    stream: FrameStream,
}

/// Hands out one pre-built in-memory connection.
pub struct MockConnector {
    halves: Mutex<Option<Halves>>,
    attempts: AtomicUsize,
    last_url: Mutex<Option<Url>>,
}

impl MockConnector {
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn last_url(&self) -> Option<Url> {
        self.last_url.lock().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &Url) -> Result<(Box<dyn FrameSink>, FrameStream)> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        *self.last_url.lock() = Some(url.clone());
        let halves = self
            .halves
            .lock()
            .take()
            .ok_or_else(|| LiveError::connection("no scripted connection left"))?;
        Ok((halves.sink, halves.stream))
    }
}

struct MockSink {
    outbound: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
    reject: Arc<AtomicBool>,
}

#[async_trait]
impl FrameSink for MockSink {
    async fn send_text(&mut self, text: String) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LiveError::connection("sink closed"));
        }
        if self.reject.load(Ordering::SeqCst) {
            return Err(LiveError::connection("write rejected"));
        }
        self.outbound.send(text).map_err(|_| LiveError::connection("server gone"))
    }

    async fn send_binary(&mut self, _data: Bytes) -> Result<()> {
        Err(LiveError::format("binary frames are not used by the client"))
    }

    async fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// The server side of a [`MockConnector`] connection.
pub struct ScriptedServer {
    inbound: Option<mpsc::UnboundedSender<Result<Frame>>>,
    outbound: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
    reject: Arc<AtomicBool>,
}

impl ScriptedServer {
    pub fn send_json(&self, value: Value) {
        self.send_frame(Frame::Text(value.to_string()));
    }

    pub fn send_raw(&self, text: &str) {
        self.send_frame(Frame::Text(text.to_string()));
    }

    pub fn send_binary(&self, data: Vec<u8>) {
        self.send_frame(Frame::Binary(Bytes::from(data)));
    }

    pub fn fail(&self, err: LiveError) {
        if let Some(inbound) = &self.inbound {
            let _ = inbound.send(Err(err));
        }
    }

    fn send_frame(&self, frame: Frame) {
        if let Some(inbound) = &self.inbound {
            let _ = inbound.send(Ok(frame));
        }
    }

    /// End the inbound stream, as a peer close would.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Next text frame the client wrote, parsed as JSON.
    pub async fn next_outbound(&mut self) -> Value {
        let text = tokio::time::timeout(WAIT, self.outbound.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("client sink dropped");
        serde_json::from_str(&text).expect("client wrote invalid JSON")
    }

    pub fn try_outbound(&mut self) -> Option<Value> {
        self.outbound.try_recv().ok().map(|text| serde_json::from_str(&text).unwrap())
    }

    /// Make every client write fail until switched back off.
    pub fn reject_writes(&self, reject: bool) {
        self.reject.store(reject, Ordering::SeqCst);
    }

    /// Whether the client closed its sink.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

pub fn mock_connection() -> (Arc<MockConnector>, ScriptedServer) {
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    let reject = Arc::new(AtomicBool::new(false));

    let sink = MockSink { outbound: outbound_tx, closed: closed.clone(), reject: reject.clone() };
    let stream: FrameStream = Box::pin(UnboundedReceiverStream::new(inbound_rx));
    let connector = Arc::new(MockConnector {
        halves: Mutex::new(Some(Halves { sink: Box::new(sink), stream })),
        attempts: AtomicUsize::new(0),
        last_url: Mutex::new(None),
    });
    let server =
        ScriptedServer { inbound: Some(inbound_tx), outbound: outbound_rx, closed, reject };
    (connector, server)
}

pub fn test_config() -> LiveConfig {
    LiveConfig::new().with_api_key("test-key").with_text_only()
}

/// A session that has completed the handshake. The setup frame has been
/// consumed from the server's outbound queue.
pub async fn connected_session() -> (LiveSession, ScriptedServer) {
    let (connector, mut server) = mock_connection();
    let session = LiveSession::new(test_config(), connector);
    server.send_json(serde_json::json!({ "setupComplete": {} }));
    session.connect().await.expect("connect");
    let setup = server.next_outbound().await;
    assert!(setup.get("setup").is_some());
    (session, server)
}

/// Receive the next event, failing the test after [`WAIT`].
pub async fn recv<T: Clone>(rx: &mut broadcast::Receiver<T>) -> T {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("channel closed")
}
