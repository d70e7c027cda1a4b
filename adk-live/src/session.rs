//! Connection lifecycle manager.
//!
//! [`LiveSession`] owns one logical session: it opens the transport, performs
//! the setup handshake, runs the inbound dispatch loop as a background task,
//! and publishes everything it observes on the [`EventHub`] and the
//! [`SessionState`] watch channel.
//!
//! ```rust,ignore
//! let session = LiveSession::with_websocket(LiveConfig::from_env()?.with_text_only());
//! let mut content = session.events().subscribe_content();
//! session.connect().await?;
//! session.send_text("Hello").await?;
//! while let Ok(event) = content.recv().await {
//!     if event == ContentEvent::TurnComplete { break; }
//! }
//! session.disconnect().await;
//! ```

use crate::capture::AudioOutlet;
use crate::codec::{self, OutgoingMessage};
use crate::config::{GenerationParams, LiveConfig};
use crate::error::{ErrorEvent, LiveError, Result};
use crate::events::{
    ConnectionEvent, ContentEvent, DiagnosticEvent, DisconnectReason, EventHub, ToolEvent,
};
use crate::playback::{PlaybackBuffer, PlaybackEvent};
use crate::response::{self, ApiErrorInfo, IncomingResponse, ParsedFrame, ServerContent};
use crate::state::{AudioState, ConnectionState, SessionState, SessionUpdate};
use crate::transport::{Connector, FrameSink, FrameStream};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type SharedSink = Arc<Mutex<Box<dyn FrameSink>>>;

struct ActiveConnection {
    session_id: String,
    sink: SharedSink,
}

struct AttachedPlayback {
    buffer: Arc<PlaybackBuffer>,
    watcher: JoinHandle<()>,
}

/// State shared between the public handle and the dispatch task.
struct Shared {
    state: parking_lot::Mutex<SessionState>,
    snapshots: watch::Sender<SessionState>,
    events: EventHub,
    connection: Mutex<Option<ActiveConnection>>,
    dispatch_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
    playback: parking_lot::Mutex<Option<AttachedPlayback>>,
    capture_active: AtomicBool,
    resumption_handle: parking_lot::Mutex<Option<String>>,
    session_id: parking_lot::Mutex<Option<String>>,
}

/// A bidirectional streaming session with the Live API.
pub struct LiveSession {
    config: LiveConfig,
    connector: Arc<dyn Connector>,
    shared: Arc<Shared>,
}

impl LiveSession {
    /// Create a session that opens connections through `connector`.
    pub fn new(config: LiveConfig, connector: Arc<dyn Connector>) -> Self {
        let (snapshots, _) = watch::channel(SessionState::default());
        Self {
            config,
            connector,
            shared: Arc::new(Shared {
                state: parking_lot::Mutex::new(SessionState::default()),
                snapshots,
                events: EventHub::default(),
                connection: Mutex::new(None),
                dispatch_task: parking_lot::Mutex::new(None),
                playback: parking_lot::Mutex::new(None),
                capture_active: AtomicBool::new(false),
                resumption_handle: parking_lot::Mutex::new(None),
                session_id: parking_lot::Mutex::new(None),
            }),
        }
    }

    /// Create a session over the built-in WebSocket transport.
    #[cfg(feature = "websocket")]
    pub fn with_websocket(config: LiveConfig) -> Self {
        Self::new(config, Arc::new(crate::transport::WebSocketConnector::new()))
    }

    /// Settings this session connects with.
    pub fn config(&self) -> &LiveConfig {
        &self.config
    }

    /// Observer channels.
    pub fn events(&self) -> &EventHub {
        &self.shared.events
    }

    /// Current state snapshot.
    pub fn state(&self) -> SessionState {
        self.shared.state.lock().clone()
    }

    /// Receive every state snapshot as it is published.
    ///
    /// Do not hold a borrow of the receiver while calling back into the
    /// session.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.snapshots.subscribe()
    }

    /// Whether the handshake has completed and the transport is open.
    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().is_connected()
    }

    /// Id of the current (or last) connection.
    pub fn session_id(&self) -> Option<String> {
        self.shared.session_id.lock().clone()
    }

    /// Latest resumable handle issued by the server.
    pub fn resumption_handle(&self) -> Option<String> {
        self.shared.resumption_handle.lock().clone()
    }

    /// Open the transport and complete the setup handshake.
    ///
    /// Fails with [`LiveError::AlreadyConnected`] without touching the
    /// transport when a connection is up or being opened.
    pub async fn connect(&self) -> Result<()> {
        self.shared.begin_connect()?;

        let prepared = self.config.validate().and_then(|_| {
            let url = self.config.connection_url()?;
            let setup = codec::encode_setup(&self.config)?;
            Ok((url, setup))
        });
        let (url, setup) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => return Err(self.shared.fail_connect(e)),
        };

        info!(
            model = %self.config.model,
            endpoint = %self.config.endpoint,
            "Connecting to Live API"
        );
        let (sink, stream) = match self.connector.connect(&url).await {
            Ok(halves) => halves,
            Err(e) => {
                let err = match e {
                    LiveError::ConnectionFailed(_) => e,
                    other => LiveError::connection(other.to_string()),
                };
                return Err(self.shared.fail_connect(err));
            }
        };

        let session_id = uuid::Uuid::new_v4().to_string();
        let sink: SharedSink = Arc::new(Mutex::new(sink));
        let (ready_tx, ready_rx) = oneshot::channel();
        *self.shared.connection.lock().await =
            Some(ActiveConnection { session_id: session_id.clone(), sink: sink.clone() });
        let dispatch =
            tokio::spawn(dispatch_loop(self.shared.clone(), stream, ready_tx, session_id.clone()));
        if let Some(previous) = self.shared.dispatch_task.lock().replace(dispatch) {
            previous.abort();
        }
        *self.shared.session_id.lock() = Some(session_id.clone());

        let written = sink.lock().await.send_text(setup).await;
        if let Err(e) = written {
            self.shared.teardown().await;
            return Err(self.shared.fail_connect(LiveError::connection(format!(
                "failed to send setup: {}",
                e
            ))));
        }
        info!(session_id = %session_id, "Sent setup message");

        match tokio::time::timeout(self.config.handshake_timeout, ready_rx).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => {
                self.shared.teardown().await;
                let err = LiveError::connection("connection closed before setup completed");
                return Err(self.shared.fail_connect(err));
            }
            Err(_) => {
                self.shared.teardown().await;
                let err = LiveError::timeout(format!(
                    "no setupComplete within {:?}",
                    self.config.handshake_timeout
                ));
                warn!(session_id = %session_id, error = %err, "Handshake timed out");
                self.shared.apply(SessionUpdate {
                    connection: Some(ConnectionState::Disconnected),
                    audio: Some(AudioState::Idle),
                    ..Default::default()
                });
                self.shared.events.connection(ConnectionEvent::Failed(ErrorEvent::from(&err)));
                return Err(err);
            }
        }

        let connected = self.shared.update_with(|state| {
            (state.connection == ConnectionState::Connecting)
                .then(|| SessionUpdate::connection(ConnectionState::Connected))
        });
        match connected {
            Some(_) => {
                info!(session_id = %session_id, "Live session connected");
                self.shared.events.connection(ConnectionEvent::Connected { session_id });
                Ok(())
            }
            None => {
                // The dispatch loop already ended the connection.
                let message = self.state().error_message;
                Err(LiveError::connection(
                    message.unwrap_or_else(|| "connection closed during setup".to_string()),
                ))
            }
        }
    }

    /// Close the connection. A no-op when not connected.
    pub async fn disconnect(&self) {
        if !self.is_connected() {
            return;
        }
        self.shared.teardown().await;
        let (old, new) = self.shared.apply(SessionUpdate {
            connection: Some(ConnectionState::Disconnected),
            audio: Some(AudioState::Idle),
            ..Default::default()
        });
        if old.connection != new.connection {
            info!(reason = %DisconnectReason::UserRequested, "Live session disconnected");
            self.shared.events.connection(ConnectionEvent::Disconnected {
                reason: DisconnectReason::UserRequested,
            });
        }
    }

    /// Tear everything down and return to a fresh disconnected state.
    pub async fn dispose(&self) {
        let was_connected = self.is_connected();
        self.shared.teardown().await;

        if let Some(attached) = self.shared.playback.lock().take() {
            attached.watcher.abort();
            attached.buffer.stop();
        }
        self.shared.capture_active.store(false, Ordering::SeqCst);
        *self.shared.resumption_handle.lock() = None;
        *self.shared.session_id.lock() = None;

        {
            let mut state = self.shared.state.lock();
            let old = std::mem::take(&mut *state);
            self.shared.publish(&old, &state);
        }
        if was_connected {
            self.shared.events.connection(ConnectionEvent::Disconnected {
                reason: DisconnectReason::UserRequested,
            });
        }
        debug!("Live session disposed");
    }

    /// Encode and write one message.
    pub async fn send(&self, message: OutgoingMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(LiveError::NotConnected);
        }
        let sink = {
            let connection = self.shared.connection.lock().await;
            connection.as_ref().map(|c| c.sink.clone()).ok_or(LiveError::NotConnected)?
        };

        let frame = codec::encode(&message)?;
        let bytes = frame.len();
        sink.lock()
            .await
            .send_text(frame)
            .await
            .map_err(|e| LiveError::format(format!("write failed: {}", e)))?;

        self.shared.apply(SessionUpdate::sent());
        debug!(kind = message.kind(), bytes, "Sent message");

        if message.ends_turn() {
            self.shared.set_audio(AudioState::Processing);
        }
        if matches!(message, OutgoingMessage::Interrupt) {
            self.shared.interrupt_playback();
            self.shared.settle_audio();
        }
        Ok(())
    }

    /// Send a complete user text turn.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.send(OutgoingMessage::text(text)).await
    }

    /// Send one chunk of 16 kHz PCM.
    pub async fn send_audio(&self, pcm: impl Into<Bytes>) -> Result<()> {
        self.send(OutgoingMessage::audio(pcm)).await
    }

    /// Answer a tool call.
    pub async fn send_tool_result(&self, call_id: impl Into<String>, output: Value) -> Result<()> {
        self.send(OutgoingMessage::tool_result(call_id, output)).await
    }

    /// Report a failed tool call.
    pub async fn send_tool_error(
        &self,
        call_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Result<()> {
        self.send(OutgoingMessage::tool_error(call_id, error)).await
    }

    /// Change modalities or sampling parameters mid-session.
    pub async fn update_config(
        &self,
        modalities: Option<Vec<String>>,
        generation: Option<GenerationParams>,
    ) -> Result<()> {
        self.send(OutgoingMessage::ConfigUpdate { modalities, generation }).await
    }

    /// Hand the turn to the model.
    pub async fn end_turn(&self) -> Result<()> {
        self.send(OutgoingMessage::EndOfTurn).await
    }

    /// Ask the model to stop and drop any queued playback.
    pub async fn interrupt(&self) -> Result<()> {
        self.send(OutgoingMessage::Interrupt).await
    }

    /// Route inbound audio into `buffer`.
    ///
    /// Replaces any previously attached buffer. Must be called from within a
    /// tokio runtime.
    pub fn attach_playback(&self, buffer: Arc<PlaybackBuffer>) {
        let mut events = buffer.subscribe();
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        let watcher = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(PlaybackEvent::Completed) => {
                        let Some(shared) = shared.upgrade() else { break };
                        let target = shared.resting_audio();
                        shared.update_with(|state| {
                            (state.audio == AudioState::Speaking)
                                .then(|| SessionUpdate::audio(target))
                        });
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let previous = self.shared.playback.lock().replace(AttachedPlayback { buffer, watcher });
        if let Some(previous) = previous {
            previous.watcher.abort();
        }
    }

    /// Stop routing inbound audio. Returns the buffer that was attached.
    pub fn detach_playback(&self) -> Option<Arc<PlaybackBuffer>> {
        self.shared.playback.lock().take().map(|attached| {
            attached.watcher.abort();
            attached.buffer
        })
    }
}

#[async_trait]
impl AudioOutlet for LiveSession {
    async fn send_audio(&self, pcm: Bytes) -> Result<()> {
        self.send(OutgoingMessage::audio(pcm)).await
    }

    fn capture_state_changed(&self, active: bool) {
        self.shared.capture_active.store(active, Ordering::SeqCst);
        self.shared.update_with(|state| match (active, state.audio) {
            (true, AudioState::Idle) => Some(SessionUpdate::audio(AudioState::Listening)),
            (false, AudioState::Listening) => Some(SessionUpdate::audio(AudioState::Idle)),
            _ => None,
        });
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        self.shared.abort_dispatch();
        if let Some(attached) = self.shared.playback.lock().take() {
            attached.watcher.abort();
        }
    }
}

impl Shared {
    /// Apply one update and publish the result.
    fn apply(&self, update: SessionUpdate) -> (SessionState, SessionState) {
        let mut state = self.state.lock();
        let old = state.clone();
        let new = old.transition(update);
        *state = new.clone();
        self.publish(&old, &new);
        (old, new)
    }

    /// Apply the update `decide` returns for the current state, if any.
    fn update_with<F>(&self, decide: F) -> Option<(SessionState, SessionState)>
    where
        F: FnOnce(&SessionState) -> Option<SessionUpdate>,
    {
        let mut state = self.state.lock();
        let update = decide(&state)?;
        let old = state.clone();
        let new = old.transition(update);
        *state = new.clone();
        self.publish(&old, &new);
        Some((old, new))
    }

    /// Must be called with the `state` lock held so snapshots and audio
    /// events go out in transition order.
    fn publish(&self, old: &SessionState, new: &SessionState) {
        self.snapshots.send_replace(new.clone());
        if old.audio != new.audio {
            debug!(from = %old.audio, to = %new.audio, "Audio state changed");
            self.events.audio(new.audio);
        }
    }

    fn begin_connect(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if matches!(state.connection, ConnectionState::Connected | ConnectionState::Connecting)
            {
                return Err(LiveError::AlreadyConnected);
            }
            let old = state.clone();
            *state = old.transition(SessionUpdate::connection(ConnectionState::Connecting));
            self.publish(&old, &state);
        }
        self.events.connection(ConnectionEvent::Connecting);
        Ok(())
    }

    /// Record a failed connect attempt and hand the error back.
    fn fail_connect(&self, err: LiveError) -> LiveError {
        warn!(error = %err, "Connect failed");
        self.apply(SessionUpdate::failed(err.to_string()));
        self.events.connection(ConnectionEvent::Failed(ErrorEvent::from(&err)));
        err
    }

    async fn take_connection(&self) -> Option<ActiveConnection> {
        self.connection.lock().await.take()
    }

    fn abort_dispatch(&self) {
        if let Some(handle) = self.dispatch_task.lock().take() {
            handle.abort();
        }
    }

    /// Stop the dispatch task and close the transport.
    async fn teardown(&self) {
        self.abort_dispatch();
        if let Some(active) = self.take_connection().await {
            close_sink(&active.sink, &active.session_id).await;
        }
    }

    fn set_audio(&self, target: AudioState) {
        self.update_with(|state| (state.audio != target).then(|| SessionUpdate::audio(target)));
    }

    fn resting_audio(&self) -> AudioState {
        if self.capture_active.load(Ordering::SeqCst) {
            AudioState::Listening
        } else {
            AudioState::Idle
        }
    }

    /// Return to the resting audio state.
    fn settle_audio(&self) {
        self.set_audio(self.resting_audio());
    }

    fn attached_playback(&self) -> Option<Arc<PlaybackBuffer>> {
        self.playback.lock().as_ref().map(|attached| attached.buffer.clone())
    }

    fn interrupt_playback(&self) {
        if let Some(buffer) = self.attached_playback() {
            buffer.interrupt();
        }
    }

    fn report(&self, err: &LiveError) {
        self.events.diagnostic(DiagnosticEvent::Error(ErrorEvent::from(err)));
    }

    /// Route one post-handshake frame. Returns `false` when dispatch must stop.
    async fn dispatch(&self, parsed: ParsedFrame) -> bool {
        self.apply(SessionUpdate::received());

        if let Some(usage) = parsed.usage {
            self.events.diagnostic(DiagnosticEvent::Usage(usage));
        }

        match parsed.response {
            IncomingResponse::SetupComplete => debug!("Ignoring repeated setupComplete"),
            IncomingResponse::ServerContent(content) => self.route_content(content),
            IncomingResponse::ToolCall { calls } => {
                for call in calls {
                    debug!(name = %call.name, id = %call.id, "Tool call");
                    self.events.tool(ToolEvent::Call(call));
                }
            }
            IncomingResponse::ToolCallCancellation { ids } => {
                debug!(count = ids.len(), "Tool calls cancelled");
                self.events.tool(ToolEvent::Cancellation { ids });
            }
            IncomingResponse::BinaryAudio(pcm) => self.route_audio(pcm),
            IncomingResponse::ApiError(info) => {
                self.events.diagnostic(DiagnosticEvent::ApiError(info.clone()));
                self.api_failed(info).await;
                return false;
            }
            IncomingResponse::SessionResumptionUpdate { handle, resumable } => {
                if resumable {
                    if let Some(handle) = &handle {
                        *self.resumption_handle.lock() = Some(handle.clone());
                    }
                }
                debug!(resumable, "Session resumption update");
                self.events.diagnostic(DiagnosticEvent::SessionResumption { handle, resumable });
            }
            IncomingResponse::GoAway { time_left } => {
                warn!(time_left = ?time_left, "Server will close the connection soon");
                self.events.diagnostic(DiagnosticEvent::GoAway { time_left });
            }
            IncomingResponse::UsageMetadata(_) => {}
            IncomingResponse::Unknown => debug!("Ignoring unknown frame"),
        }
        true
    }

    fn route_content(&self, content: ServerContent) {
        if let Some(transcript) = &content.input_transcript {
            self.events.content(ContentEvent::InputTranscript(transcript.clone()));
        }
        if let Some(text) = content.joined_text() {
            self.events.content(ContentEvent::Text(text));
        }
        for pcm in &content.audio_parts {
            self.route_audio(pcm.clone());
        }
        if let Some(transcript) = &content.output_transcript {
            self.events.content(ContentEvent::OutputTranscript(transcript.clone()));
        }
        if content.interrupted {
            debug!("Model output interrupted");
            self.events.content(ContentEvent::Interrupted);
            self.interrupt_playback();
            self.settle_audio();
        }
        if content.generation_complete {
            self.events.content(ContentEvent::GenerationComplete);
        }
        if content.turn_complete {
            self.events.content(ContentEvent::TurnComplete);
            self.finish_turn();
        }
    }

    fn route_audio(&self, pcm: Bytes) {
        debug!(bytes = pcm.len(), "Received audio");
        self.set_audio(AudioState::Speaking);
        if let Some(buffer) = self.attached_playback() {
            if let Err(e) = buffer.enqueue(pcm.clone()) {
                warn!(error = %e, "Failed to queue playback audio");
                self.report(&e);
            }
        }
        self.events.content(ContentEvent::Audio(pcm));
    }

    fn finish_turn(&self) {
        match self.attached_playback() {
            Some(buffer) => {
                if let Err(e) = buffer.flush() {
                    warn!(error = %e, "Failed to flush playback");
                    self.report(&e);
                }
                if !buffer.is_playing() {
                    self.settle_audio();
                }
            }
            None => self.settle_audio(),
        }
    }

    async fn api_failed(&self, info: ApiErrorInfo) {
        let err = LiveError::from(info);
        warn!(error = %err, "Server reported an error");
        if let Some(active) = self.take_connection().await {
            close_sink(&active.sink, &active.session_id).await;
        }
        self.apply(SessionUpdate::failed(err.to_string()));
        self.events.connection(ConnectionEvent::Failed(ErrorEvent::from(&err)));
    }

    async fn transport_failed(&self, err: LiveError) {
        if self.take_connection().await.is_none() {
            return;
        }
        warn!(error = %err, "Transport failed");
        self.apply(SessionUpdate::failed(err.to_string()));
        self.events.connection(ConnectionEvent::Failed(ErrorEvent::from(&err)));
    }

    async fn peer_closed(&self) {
        // No connection left means disconnect() got here first.
        if self.take_connection().await.is_none() {
            return;
        }
        let changed = self.update_with(|state| {
            let open =
                state.is_connected() || state.connection == ConnectionState::Connecting;
            open.then(|| SessionUpdate {
                connection: Some(ConnectionState::Disconnected),
                audio: Some(AudioState::Idle),
                ..Default::default()
            })
        });
        if changed.is_some() {
            info!(reason = %DisconnectReason::ClosedByPeer, "Live session disconnected");
            self.events.connection(ConnectionEvent::Disconnected {
                reason: DisconnectReason::ClosedByPeer,
            });
        }
    }
}

async fn close_sink(sink: &SharedSink, session_id: &str) {
    if let Err(e) = sink.lock().await.close().await {
        warn!(session_id = %session_id, error = %e, "Failed to close transport");
    }
}

/// Inbound loop: resolve the handshake, then route every frame.
async fn dispatch_loop(
    shared: Arc<Shared>,
    mut stream: FrameStream,
    ready: oneshot::Sender<()>,
    session_id: String,
) {
    let mut ready = Some(ready);

    while let Some(item) = stream.next().await {
        let frame = match item {
            Ok(frame) => frame,
            Err(e) => {
                if ready.is_some() {
                    warn!(session_id = %session_id, error = %e, "Transport error during handshake");
                    return;
                }
                shared.transport_failed(e).await;
                return;
            }
        };

        let parsed = match response::parse(&frame) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    bytes = frame.len(),
                    error = %e,
                    "Dropping malformed frame"
                );
                if ready.is_none() {
                    let reason = e.to_string();
                    shared.events.diagnostic(DiagnosticEvent::FrameDropped { reason });
                }
                continue;
            }
        };

        if let Some(tx) = ready.take() {
            if matches!(parsed.response, IncomingResponse::SetupComplete) {
                info!(session_id = %session_id, "Setup complete");
                let _ = tx.send(());
            } else {
                debug!(kind = parsed.response.kind(), "Discarding frame before setupComplete");
                ready = Some(tx);
            }
            continue;
        }

        if !shared.dispatch(parsed).await {
            return;
        }
    }

    if ready.is_none() {
        shared.peer_closed().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_error_kind_of_api_failure() {
        let err = LiveError::from(ApiErrorInfo {
            code: Some(403),
            message: "denied".to_string(),
            status: None,
        });
        assert_eq!(err.kind(), ErrorKind::ApiError);
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        struct Unreachable;

        #[async_trait]
        impl Connector for Unreachable {
            async fn connect(&self, _url: &url::Url) -> Result<(Box<dyn FrameSink>, FrameStream)> {
                Err(LiveError::connection("unreachable"))
            }
        }

        let session = LiveSession::new(LiveConfig::new().with_api_key("k"), Arc::new(Unreachable));
        let err = session.send_text("hi").await.unwrap_err();
        assert!(matches!(err, LiveError::NotConnected));
        assert_eq!(session.state().messages_sent, 0);
    }

    #[tokio::test]
    async fn test_open_failure_enters_error_state() {
        struct Refused;

        #[async_trait]
        impl Connector for Refused {
            async fn connect(&self, _url: &url::Url) -> Result<(Box<dyn FrameSink>, FrameStream)> {
                Err(LiveError::Unknown("refused".to_string()))
            }
        }

        let session = LiveSession::new(LiveConfig::new().with_api_key("k"), Arc::new(Refused));
        let mut connection = session.events().subscribe_connection();

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, LiveError::ConnectionFailed(_)));

        let state = session.state();
        assert_eq!(state.connection, ConnectionState::Error);
        assert!(state.error_message.unwrap().contains("refused"));
        assert_eq!(connection.try_recv().unwrap(), ConnectionEvent::Connecting);
        match connection.try_recv().unwrap() {
            ConnectionEvent::Failed(event) => assert_eq!(event.kind, ErrorKind::ConnectionFailed),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_drop_aborts_dispatch_while_connection_is_locked() {
        struct Idle;

        #[async_trait]
        impl Connector for Idle {
            async fn connect(&self, _url: &url::Url) -> Result<(Box<dyn FrameSink>, FrameStream)> {
                Err(LiveError::connection("idle"))
            }
        }

        let session = LiveSession::new(LiveConfig::new().with_api_key("k"), Arc::new(Idle));
        let shared = session.shared.clone();
        let (mut alive, parked) = oneshot::channel::<()>();
        *shared.dispatch_task.lock() = Some(tokio::spawn(async move {
            let _ = parked.await;
        }));

        let _held = shared.connection.lock().await;
        drop(session);

        tokio::time::timeout(std::time::Duration::from_secs(1), alive.closed())
            .await
            .expect("dispatch task should be aborted");
        assert!(shared.dispatch_task.lock().is_none());
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_io() {
        struct Unused;

        #[async_trait]
        impl Connector for Unused {
            async fn connect(&self, _url: &url::Url) -> Result<(Box<dyn FrameSink>, FrameStream)> {
                panic!("connector must not be called");
            }
        }

        let session = LiveSession::new(LiveConfig::new(), Arc::new(Unused));
        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, LiveError::Config(_)));
        assert_eq!(session.state().connection, ConnectionState::Error);
    }
}
