//! Audio format definitions and utilities.
//!
//! The Live protocol fixes both directions to 16-bit little-endian mono PCM:
//! capture runs at 16 kHz and playback at 24 kHz.

use serde::{Deserialize, Serialize};

/// MIME type used for outgoing PCM chunks.
pub const PCM_MIME_TYPE: &str = "audio/pcm";

/// Microphone format expected by the server.
pub const CAPTURE_FORMAT: AudioFormat = AudioFormat::pcm16(16000);

/// Speaker format produced by the server.
pub const PLAYBACK_FORMAT: AudioFormat = AudioFormat::pcm16(24000);

/// Audio encodings understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AudioEncoding {
    /// 16-bit signed little-endian PCM.
    #[serde(rename = "pcm16")]
    #[default]
    Pcm16,
}

impl std::fmt::Display for AudioEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pcm16 => write!(f, "pcm16"),
        }
    }
}

/// Complete audio format specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of audio channels (1 = mono).
    pub channels: u8,
    /// Bits per sample.
    pub bits_per_sample: u8,
    /// Audio encoding format.
    pub encoding: AudioEncoding,
}

impl Default for AudioFormat {
    fn default() -> Self {
        PLAYBACK_FORMAT
    }
}

impl AudioFormat {
    /// Mono PCM16 at the given sample rate.
    pub const fn pcm16(sample_rate: u32) -> Self {
        Self { sample_rate, channels: 1, bits_per_sample: 16, encoding: AudioEncoding::Pcm16 }
    }

    /// Calculate bytes per second for this format.
    pub fn bytes_per_second(&self) -> u32 {
        self.sample_rate * self.channels as u32 * (self.bits_per_sample / 8) as u32
    }

    /// Calculate duration in milliseconds for a given number of bytes.
    pub fn duration_ms(&self, bytes: usize) -> f64 {
        let bytes_per_ms = self.bytes_per_second() as f64 / 1000.0;
        bytes as f64 / bytes_per_ms
    }
}
