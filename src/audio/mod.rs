//! Dual-sink audio playback
//!
//! Decodes a synthesized WAV utterance and plays it to the default speaker
//! and, when present, a virtual cable device in lock-step so an avatar
//! application listening on the cable can lip-sync to the same audio.

pub mod backend;
pub mod cpal_backend;
pub mod decoder;
pub mod device;
pub mod orchestrator;
pub mod player;

use thiserror::Error;

pub use backend::{AudioBackend, Interrupt, OutputStream, StreamError};
pub use cpal_backend::CpalBackend;
pub use decoder::{CHUNK_FRAMES, PcmChunks, decode};
pub use device::{DeviceRegistry, ResolvedCable, find_by_name_fragment};
pub use orchestrator::Speaker;
pub use player::{DualSinkPlayer, PlaybackSummary, SecondaryOutcome};

/// PCM layout shared by every stream opened for one utterance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    /// Bytes per stored sample (1, 2, 3 or 4)
    pub sample_width: u16,

    /// Interleaved channel count
    pub channels: u16,

    /// Frames per second
    pub sample_rate: u32,

    /// Samples are IEEE float rather than integer PCM
    pub float: bool,
}

impl AudioFormat {
    /// Bytes in one frame (one sample for every channel)
    #[must_use]
    pub const fn frame_size(&self) -> usize {
        self.sample_width as usize * self.channels as usize
    }

    /// Playback duration of `bytes` of payload in milliseconds
    #[must_use]
    pub fn duration_ms(&self, bytes: usize) -> u64 {
        let frame_size = self.frame_size();
        if frame_size == 0 || self.sample_rate == 0 {
            return 0;
        }
        (bytes / frame_size) as u64 * 1000 / u64::from(self.sample_rate)
    }
}

/// One audio sink known to the host audio subsystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEndpoint {
    /// Position in the host's enumeration order
    pub index: usize,

    /// Display name reported by the host
    pub name: String,

    /// Maximum number of output channels (0 for input-only devices)
    pub output_channels: u16,
}

impl OutputEndpoint {
    /// Create an endpoint record
    #[must_use]
    pub fn new(index: usize, name: impl Into<String>, output_channels: u16) -> Self {
        Self {
            index,
            name: name.into(),
            output_channels,
        }
    }
}

/// The audio buffer is not a well-formed WAV container
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Header or payload is malformed or truncated
    #[error("malformed audio: {0}")]
    Malformed(String),
}

/// Errors raised while playing one utterance
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// An output stream could not be opened
    #[error("failed to open output device {device:?}: {reason}")]
    DeviceOpenFailed {
        /// Device display name
        device: String,
        /// Host-reported cause
        reason: String,
    },

    /// Writing to the speaker stream failed after it was opened
    #[error("speaker write failed: {0}")]
    PrimaryWriteFailed(String),

    /// Writing to the cable stream failed after it was opened
    #[error("cable write failed: {0}")]
    SecondaryWriteFailed(String),

    /// Playback was stopped by an interrupt signal
    #[error("playback interrupted")]
    Interrupted,
}
