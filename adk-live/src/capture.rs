//! Microphone capture relay.
//!
//! A [`CaptureRelay`] pulls PCM chunks from a [`MicrophoneSource`] and
//! forwards each one to an [`AudioOutlet`] (normally a
//! [`LiveSession`](crate::LiveSession)) as a realtime audio message.

use crate::audio::{AudioFormat, CAPTURE_FORMAT};
use crate::error::{ErrorEvent, LiveError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Stream of captured PCM chunks.
pub type AudioStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// A host audio input device.
#[async_trait]
pub trait MicrophoneSource: Send + Sync {
    /// Open the device and begin producing chunks in `format`.
    async fn start(&self, format: AudioFormat) -> Result<AudioStream>;

    /// Close the device.
    async fn stop(&self) -> Result<()>;
}

/// Destination for captured audio.
#[async_trait]
pub trait AudioOutlet: Send + Sync {
    /// Deliver one captured chunk.
    async fn send_audio(&self, pcm: Bytes) -> Result<()>;

    /// Capture started or stopped.
    fn capture_state_changed(&self, _active: bool) {}
}

/// Capture notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    Started,
    Stopped,
    /// The microphone stream failed or ended; capture has stopped.
    Error(ErrorEvent),
}

struct Relay {
    source: Arc<dyn MicrophoneSource>,
    outlet: Arc<dyn AudioOutlet>,
    recording: AtomicBool,
    chunks_sent: AtomicU64,
    events: broadcast::Sender<CaptureEvent>,
}

impl Relay {
    async fn forward(self: Arc<Self>, mut stream: AudioStream) {
        while let Some(item) = stream.next().await {
            if !self.recording.load(Ordering::SeqCst) {
                return;
            }
            match item {
                Ok(chunk) if chunk.is_empty() => continue,
                Ok(chunk) => match self.outlet.send_audio(chunk).await {
                    Ok(()) => {
                        self.chunks_sent.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(LiveError::NotConnected) => {
                        tracing::trace!("Dropping captured chunk, session not connected");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to forward captured audio");
                    }
                },
                Err(e) => {
                    self.fail(e).await;
                    return;
                }
            }
        }
        self.fail(LiveError::recording("microphone stream ended")).await;
    }

    async fn fail(&self, err: LiveError) {
        if !self.recording.swap(false, Ordering::SeqCst) {
            return;
        }
        tracing::error!(error = %err, "Audio capture stopped");
        self.outlet.capture_state_changed(false);
        if let Err(e) = self.source.stop().await {
            tracing::debug!(error = %e, "Microphone stop after failure");
        }
        let _ = self.events.send(CaptureEvent::Error(ErrorEvent::from(&err)));
    }
}

/// Couples a microphone to an outlet.
pub struct CaptureRelay {
    relay: Arc<Relay>,
    format: AudioFormat,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CaptureRelay {
    /// Relay 16 kHz mono PCM16 from `source` to `outlet`.
    pub fn new(source: Arc<dyn MicrophoneSource>, outlet: Arc<dyn AudioOutlet>) -> Self {
        Self::with_format(source, outlet, CAPTURE_FORMAT)
    }

    /// Relay from `source` in an explicit format.
    pub fn with_format(
        source: Arc<dyn MicrophoneSource>,
        outlet: Arc<dyn AudioOutlet>,
        format: AudioFormat,
    ) -> Self {
        Self {
            relay: Arc::new(Relay {
                source,
                outlet,
                recording: AtomicBool::new(false),
                chunks_sent: AtomicU64::new(0),
                events: broadcast::channel(32).0,
            }),
            format,
            task: Mutex::new(None),
        }
    }

    /// Subscribe to capture notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.relay.events.subscribe()
    }

    /// Whether chunks are currently being forwarded.
    pub fn is_recording(&self) -> bool {
        self.relay.recording.load(Ordering::SeqCst)
    }

    /// Chunks delivered to the outlet so far.
    pub fn chunks_sent(&self) -> u64 {
        self.relay.chunks_sent.load(Ordering::Relaxed)
    }

    /// Open the microphone and start forwarding.
    pub async fn start(&self) -> Result<()> {
        let claimed =
            self.relay.recording.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst);
        if claimed.is_err() {
            return Err(LiveError::AlreadyRecording);
        }

        let stream = match self.relay.source.start(self.format).await {
            Ok(stream) => stream,
            Err(e) => {
                self.relay.recording.store(false, Ordering::SeqCst);
                let _ = self.relay.events.send(CaptureEvent::Error(ErrorEvent::from(&e)));
                return Err(e);
            }
        };

        tracing::info!(sample_rate = self.format.sample_rate, "Audio capture started");
        self.relay.outlet.capture_state_changed(true);
        let _ = self.relay.events.send(CaptureEvent::Started);

        let handle = tokio::spawn(self.relay.clone().forward(stream));
        if let Some(previous) = self.task.lock().replace(handle) {
            previous.abort();
        }
        Ok(())
    }

    /// Stop forwarding and close the microphone. A no-op when not recording.
    pub async fn stop(&self) -> Result<()> {
        if !self.relay.recording.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
        self.relay.outlet.capture_state_changed(false);
        let _ = self.relay.events.send(CaptureEvent::Stopped);
        tracing::info!(chunks_sent = self.chunks_sent(), "Audio capture stopped");
        self.relay.source.stop().await
    }
}

impl Drop for CaptureRelay {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}
