//! Pre-buffered streaming playback.
//!
//! [`PlaybackBuffer`] turns bursty network audio into a steady feed for an
//! [`AudioSink`]. Chunks queue up until `pre_buffer_chunks` are waiting, then
//! the sink is initialized (once), the queue is drained into it, and further
//! chunks are handed over one at a time whenever the sink calls
//! [`PlaybackBuffer::on_demand`]. An empty queue at demand time ends the
//! utterance with a single [`PlaybackEvent::Completed`]; the server sends no
//! explicit end-of-audio marker.
//!
//! All queue and flag mutations happen under one mutex. The sink is called
//! with that mutex held, so a sink must not call back into the buffer from
//! inside `setup`, `feed` or `release`.

use crate::audio::{AudioFormat, PLAYBACK_FORMAT};
use crate::config::{DEFAULT_PRE_BUFFER_CHUNKS, LiveConfig};
use crate::error::{LiveError, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use tokio::sync::broadcast;

/// A streaming output device.
pub trait AudioSink: Send {
    /// Prepare the device for `format`. Called once per initialization.
    fn setup(&mut self, format: AudioFormat) -> Result<()>;

    /// Hand one chunk of PCM to the device.
    fn feed(&mut self, pcm: &[u8]) -> Result<()>;

    /// Release the device.
    fn release(&mut self);
}

/// When queued chunks reach the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackMode {
    /// Chunks wait in the queue until the sink asks for more.
    #[default]
    Pull,
    /// While playing, chunks go straight to the sink on arrival.
    Push,
}

/// Playback buffer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackConfig {
    /// Chunks queued before playback starts on its own.
    pub pre_buffer_chunks: usize,
    /// Output format passed to [`AudioSink::setup`].
    pub format: AudioFormat,
    /// Whether the sink pulls chunks or has them pushed on arrival.
    pub mode: PlaybackMode,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            pre_buffer_chunks: DEFAULT_PRE_BUFFER_CHUNKS,
            format: PLAYBACK_FORMAT,
            mode: PlaybackMode::Pull,
        }
    }
}

impl From<&LiveConfig> for PlaybackConfig {
    fn from(config: &LiveConfig) -> Self {
        Self::default().with_pre_buffer_chunks(config.pre_buffer_chunks)
    }
}

impl PlaybackConfig {
    /// Set the auto-start threshold. Values below 1 are raised to 1.
    pub fn with_pre_buffer_chunks(mut self, chunks: usize) -> Self {
        self.pre_buffer_chunks = chunks.max(1);
        self
    }

    /// Set the delivery mode.
    pub fn with_mode(mut self, mode: PlaybackMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Playback notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started,
    /// The queue ran dry while playing.
    Completed,
    /// Playback was stopped or interrupted and the queue cleared.
    Stopped,
}

/// Point-in-time view of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackStatus {
    /// Chunks waiting for the sink.
    pub queued: usize,
    /// Between start and completion (or stop).
    pub is_playing: bool,
    /// The sink has been set up and not yet released.
    pub is_initialized: bool,
}

struct Inner {
    queue: VecDeque<Bytes>,
    is_playing: bool,
    is_initialized: bool,
    sink: Box<dyn AudioSink>,
}

impl Inner {
    fn status(&self) -> PlaybackStatus {
        PlaybackStatus {
            queued: self.queue.len(),
            is_playing: self.is_playing,
            is_initialized: self.is_initialized,
        }
    }

    /// Returns `true` when this call started playback.
    fn start(&mut self, format: AudioFormat) -> Result<bool> {
        if self.is_playing {
            return Ok(false);
        }
        if !self.is_initialized {
            self.sink.setup(format)?;
            self.is_initialized = true;
        }
        while let Some(chunk) = self.queue.pop_front() {
            if let Err(e) = self.sink.feed(&chunk) {
                self.queue.push_front(chunk);
                return Err(e);
            }
        }
        self.is_playing = true;
        Ok(true)
    }

    fn queued_ms(&self, format: AudioFormat) -> f64 {
        format.duration_ms(self.queue.iter().map(Bytes::len).sum())
    }

    fn release(&mut self) {
        self.queue.clear();
        self.is_playing = false;
        if self.is_initialized {
            self.sink.release();
            self.is_initialized = false;
        }
    }
}

/// Jitter-absorbing queue in front of an [`AudioSink`].
pub struct PlaybackBuffer {
    config: PlaybackConfig,
    inner: Mutex<Inner>,
    events: broadcast::Sender<PlaybackEvent>,
}

impl PlaybackBuffer {
    /// Create a buffer with default settings.
    pub fn new(sink: impl AudioSink + 'static) -> Self {
        Self::with_config(sink, PlaybackConfig::default())
    }

    /// Create a buffer with explicit settings.
    pub fn with_config(sink: impl AudioSink + 'static, config: PlaybackConfig) -> Self {
        let config =
            PlaybackConfig { pre_buffer_chunks: config.pre_buffer_chunks.max(1), ..config };
        Self {
            config,
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                is_playing: false,
                is_initialized: false,
                sink: Box::new(sink),
            }),
            events: broadcast::channel(64).0,
        }
    }

    /// Settings in effect.
    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    /// Subscribe to playback notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the queue and flags.
    pub fn status(&self) -> PlaybackStatus {
        self.inner.lock().status()
    }

    /// Whether the sink is being fed.
    pub fn is_playing(&self) -> bool {
        self.inner.lock().is_playing
    }

    /// Queue one chunk. Empty chunks are discarded.
    ///
    /// Reaching the pre-buffer threshold while idle starts playback.
    pub fn enqueue(&self, chunk: impl Into<Bytes>) -> Result<()> {
        let chunk = chunk.into();
        if chunk.is_empty() {
            tracing::trace!("Discarding empty playback chunk");
            return Ok(());
        }

        let mut inner = self.inner.lock();
        if inner.is_playing {
            if self.config.mode == PlaybackMode::Push && inner.queue.is_empty() {
                return inner.sink.feed(&chunk);
            }
            inner.queue.push_back(chunk);
            return Ok(());
        }

        inner.queue.push_back(chunk);
        if inner.queue.len() >= self.config.pre_buffer_chunks {
            tracing::debug!(
                queued = inner.queue.len(),
                buffered_ms = inner.queued_ms(self.config.format),
                "Pre-buffer filled, starting playback"
            );
            self.start_locked(&mut inner)?;
        }
        Ok(())
    }

    /// Start playback now. Idempotent.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        self.start_locked(&mut inner)
    }

    /// Start playback even below the threshold, e.g. once the turn is complete.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.is_playing || inner.queue.is_empty() {
            return Ok(());
        }
        tracing::debug!(
            queued = inner.queue.len(),
            buffered_ms = inner.queued_ms(self.config.format),
            "Flushing playback below pre-buffer threshold"
        );
        self.start_locked(&mut inner)
    }

    /// Sink callback: its internal buffer is running low.
    ///
    /// Feeds the next chunk, or completes the utterance when nothing is
    /// queued. A no-op while not playing.
    pub fn on_demand(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if !inner.is_playing {
            return Ok(());
        }
        match inner.queue.pop_front() {
            Some(chunk) => inner.sink.feed(&chunk),
            None => {
                inner.is_playing = false;
                drop(inner);
                tracing::debug!("Playback queue drained");
                let _ = self.events.send(PlaybackEvent::Completed);
                Ok(())
            }
        }
    }

    /// Clear the queue and release the sink.
    pub fn stop(&self) {
        self.inner.lock().release();
        let _ = self.events.send(PlaybackEvent::Stopped);
    }

    /// Barge-in: drop everything queued so stale audio never plays.
    pub fn interrupt(&self) {
        tracing::debug!("Interrupting playback");
        self.stop();
    }

    fn start_locked(&self, inner: &mut Inner) -> Result<()> {
        let started = inner.start(self.config.format).map_err(|e| match e {
            LiveError::AudioPlayback(_) => e,
            other => LiveError::playback(other.to_string()),
        })?;
        if started {
            let _ = self.events.send(PlaybackEvent::Started);
        }
        Ok(())
    }
}

impl Drop for PlaybackBuffer {
    fn drop(&mut self) {
        self.inner.get_mut().release();
    }
}

impl std::fmt::Debug for PlaybackBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackBuffer")
            .field("config", &self.config)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Default)]
    struct Record {
        setups: usize,
        releases: usize,
        fed: Vec<Vec<u8>>,
    }

    #[derive(Clone, Default)]
    struct RecordingSink(Arc<Mutex<Record>>);

    impl AudioSink for RecordingSink {
        fn setup(&mut self, format: AudioFormat) -> Result<()> {
            assert_eq!(format, PLAYBACK_FORMAT);
            self.0.lock().setups += 1;
            Ok(())
        }

        fn feed(&mut self, pcm: &[u8]) -> Result<()> {
            self.0.lock().fed.push(pcm.to_vec());
            Ok(())
        }

        fn release(&mut self) {
            self.0.lock().releases += 1;
        }
    }

    struct BrokenSink;

    impl AudioSink for BrokenSink {
        fn setup(&mut self, _format: AudioFormat) -> Result<()> {
            Err(LiveError::playback("no output device"))
        }

        fn feed(&mut self, _pcm: &[u8]) -> Result<()> {
            Ok(())
        }

        fn release(&mut self) {}
    }

    /// Fails the `n`th feed once, then accepts everything.
    #[derive(Clone)]
    struct FlakySink {
        record: Arc<Mutex<Record>>,
        fail_at: Arc<Mutex<Option<usize>>>,
    }

    impl AudioSink for FlakySink {
        fn setup(&mut self, _format: AudioFormat) -> Result<()> {
            self.record.lock().setups += 1;
            Ok(())
        }

        fn feed(&mut self, pcm: &[u8]) -> Result<()> {
            let mut fail_at = self.fail_at.lock();
            if *fail_at == Some(0) {
                *fail_at = None;
                return Err(LiveError::playback("device underrun"));
            }
            if let Some(n) = fail_at.as_mut() {
                *n -= 1;
            }
            self.record.lock().fed.push(pcm.to_vec());
            Ok(())
        }

        fn release(&mut self) {
            self.record.lock().releases += 1;
        }
    }

    fn chunk(tag: u8) -> Vec<u8> {
        vec![tag; 4]
    }

    #[test]
    fn test_below_threshold_does_not_start() {
        let sink = RecordingSink::default();
        let buffer = PlaybackBuffer::new(sink.clone());
        let mut events = buffer.subscribe();

        for tag in 0..3 {
            buffer.enqueue(chunk(tag)).unwrap();
        }

        assert!(!buffer.is_playing());
        assert_eq!(buffer.status().queued, 3);
        assert_eq!(sink.0.lock().setups, 0);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_threshold_starts_exactly_once() {
        let sink = RecordingSink::default();
        let buffer = PlaybackBuffer::new(sink.clone());
        let mut events = buffer.subscribe();

        for tag in 0..4 {
            buffer.enqueue(chunk(tag)).unwrap();
        }
        assert!(buffer.is_playing());
        assert_eq!(events.try_recv().unwrap(), PlaybackEvent::Started);

        // Appending while playing queues without re-draining.
        buffer.enqueue(chunk(4)).unwrap();
        buffer.enqueue(chunk(5)).unwrap();
        assert!(events.try_recv().is_err());

        let record = sink.0.lock();
        assert_eq!(record.setups, 1);
        assert_eq!(record.fed, vec![chunk(0), chunk(1), chunk(2), chunk(3)]);
        drop(record);
        assert_eq!(buffer.status().queued, 2);
    }

    #[test]
    fn test_demand_drains_fifo_and_completes_once() {
        let sink = RecordingSink::default();
        let buffer = PlaybackBuffer::new(sink.clone());
        let mut events = buffer.subscribe();

        buffer.start().unwrap();
        for tag in 10..13 {
            buffer.enqueue(chunk(tag)).unwrap();
        }
        assert_eq!(events.try_recv().unwrap(), PlaybackEvent::Started);

        for _ in 0..3 {
            buffer.on_demand().unwrap();
        }
        assert_eq!(sink.0.lock().fed, vec![chunk(10), chunk(11), chunk(12)]);

        buffer.on_demand().unwrap();
        assert_eq!(events.try_recv().unwrap(), PlaybackEvent::Completed);
        assert!(!buffer.is_playing());

        buffer.on_demand().unwrap();
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_start_is_idempotent() {
        let sink = RecordingSink::default();
        let buffer = PlaybackBuffer::new(sink.clone());
        buffer.enqueue(chunk(1)).unwrap();
        buffer.start().unwrap();
        buffer.start().unwrap();
        let record = sink.0.lock();
        assert_eq!(record.setups, 1);
        assert_eq!(record.fed.len(), 1);
    }

    #[test]
    fn test_sink_initialized_once_per_session() {
        let sink = RecordingSink::default();
        let config = PlaybackConfig::default().with_pre_buffer_chunks(1);
        let buffer = PlaybackBuffer::with_config(sink.clone(), config);

        buffer.enqueue(chunk(1)).unwrap();
        buffer.on_demand().unwrap();
        buffer.enqueue(chunk(2)).unwrap();
        assert!(buffer.is_playing());
        assert_eq!(sink.0.lock().setups, 1);
    }

    #[test]
    fn test_flush_starts_short_utterance() {
        let sink = RecordingSink::default();
        let buffer = PlaybackBuffer::new(sink.clone());
        buffer.enqueue(chunk(7)).unwrap();
        assert!(!buffer.is_playing());

        buffer.flush().unwrap();
        assert!(buffer.is_playing());
        assert_eq!(sink.0.lock().fed, vec![chunk(7)]);
    }

    #[test]
    fn test_flush_with_empty_queue_is_noop() {
        let sink = RecordingSink::default();
        let buffer = PlaybackBuffer::new(sink.clone());
        buffer.flush().unwrap();
        assert!(!buffer.is_playing());
        assert_eq!(sink.0.lock().setups, 0);
    }

    #[test]
    fn test_threshold_from_live_config() {
        let config = PlaybackConfig::from(&LiveConfig::new().with_pre_buffer_chunks(2));
        assert_eq!(config.pre_buffer_chunks, 2);
        assert_eq!(config.mode, PlaybackMode::Pull);
    }

    #[test]
    fn test_empty_chunks_are_discarded() {
        let buffer = PlaybackBuffer::new(RecordingSink::default());
        buffer.enqueue(Vec::new()).unwrap();
        assert_eq!(buffer.status().queued, 0);
    }

    #[test]
    fn test_interrupt_clears_and_releases() {
        let sink = RecordingSink::default();
        let buffer = PlaybackBuffer::new(sink.clone());
        let mut events = buffer.subscribe();
        for tag in 0..6 {
            buffer.enqueue(chunk(tag)).unwrap();
        }
        buffer.interrupt();

        let status = buffer.status();
        assert_eq!(status, PlaybackStatus { queued: 0, is_playing: false, is_initialized: false });
        assert_eq!(sink.0.lock().releases, 1);
        assert_eq!(events.try_recv().unwrap(), PlaybackEvent::Started);
        assert_eq!(events.try_recv().unwrap(), PlaybackEvent::Stopped);

        // The next utterance re-initializes the sink.
        for tag in 0..4 {
            buffer.enqueue(chunk(tag)).unwrap();
        }
        assert_eq!(sink.0.lock().setups, 2);
    }

    #[test]
    fn test_push_mode_feeds_on_arrival() {
        let sink = RecordingSink::default();
        let config =
            PlaybackConfig::default().with_pre_buffer_chunks(2).with_mode(PlaybackMode::Push);
        let buffer = PlaybackBuffer::with_config(sink.clone(), config);

        buffer.enqueue(chunk(1)).unwrap();
        buffer.enqueue(chunk(2)).unwrap();
        buffer.enqueue(chunk(3)).unwrap();

        assert_eq!(sink.0.lock().fed, vec![chunk(1), chunk(2), chunk(3)]);
        assert_eq!(buffer.status().queued, 0);
    }

    #[test]
    fn test_setup_failure_is_playback_error() {
        let config = PlaybackConfig::default().with_pre_buffer_chunks(1);
        let buffer = PlaybackBuffer::with_config(BrokenSink, config);
        let err = buffer.enqueue(chunk(1)).unwrap_err();
        assert!(matches!(err, LiveError::AudioPlayback(_)));
        let status = buffer.status();
        assert!(!status.is_playing);
        assert!(!status.is_initialized);
    }

    #[test]
    fn test_feed_failure_during_start_keeps_chunk_and_stays_idle() {
        let sink = FlakySink {
            record: Arc::new(Mutex::new(Record::default())),
            fail_at: Arc::new(Mutex::new(Some(1))),
        };
        let config = PlaybackConfig::default().with_pre_buffer_chunks(3);
        let buffer = PlaybackBuffer::with_config(sink.clone(), config);
        let mut events = buffer.subscribe();

        buffer.enqueue(chunk(1)).unwrap();
        buffer.enqueue(chunk(2)).unwrap();
        let err = buffer.enqueue(chunk(3)).unwrap_err();
        assert!(matches!(err, LiveError::AudioPlayback(_)));

        let status = buffer.status();
        assert!(!status.is_playing);
        assert!(status.is_initialized);
        assert_eq!(status.queued, 2);
        assert!(events.try_recv().is_err());

        // A retry resumes with the chunk that failed and announces the start.
        buffer.start().unwrap();
        assert_eq!(events.try_recv().unwrap(), PlaybackEvent::Started);
        assert_eq!(sink.record.lock().fed, vec![chunk(1), chunk(2), chunk(3)]);
        assert_eq!(sink.record.lock().setups, 1);

        buffer.on_demand().unwrap();
        assert_eq!(events.try_recv().unwrap(), PlaybackEvent::Completed);
    }

    #[test]
    fn test_drop_releases_sink() {
        let sink = RecordingSink::default();
        {
            let buffer = PlaybackBuffer::new(sink.clone());
            buffer.start().unwrap();
        }
        assert_eq!(sink.0.lock().releases, 1);
    }
}
