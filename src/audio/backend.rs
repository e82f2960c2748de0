//! Host audio subsystem abstraction
//!
//! One backend is created at startup and shared by the device registry and
//! the player. Streams are released by dropping them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::Notify;

use super::{AudioFormat, OutputEndpoint};

/// Failure reported by the host for a single stream operation
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StreamError(pub String);

impl StreamError {
    /// Create a stream error from any displayable cause
    pub fn new(reason: impl ToString) -> Self {
        Self(reason.to_string())
    }
}

/// Process-scoped handle to the host audio subsystem
pub trait AudioBackend {
    /// Open output stream type
    type Stream: OutputStream;

    /// List output-capable endpoints in host enumeration order
    ///
    /// # Errors
    ///
    /// Returns error if the host cannot enumerate devices
    fn output_endpoints(&self) -> Result<Vec<OutputEndpoint>, StreamError>;

    /// The host's default output (the speaker), if any
    fn default_output(&self) -> Option<OutputEndpoint>;

    /// Open a started output stream on `endpoint` with exactly `format`
    ///
    /// # Errors
    ///
    /// Returns error if the device is gone or rejects the format
    fn open_output(
        &self,
        endpoint: &OutputEndpoint,
        format: AudioFormat,
    ) -> Result<Self::Stream, StreamError>;
}

impl<B: AudioBackend + ?Sized> AudioBackend for Arc<B> {
    type Stream = B::Stream;

    fn output_endpoints(&self) -> Result<Vec<OutputEndpoint>, StreamError> {
        (**self).output_endpoints()
    }

    fn default_output(&self) -> Option<OutputEndpoint> {
        (**self).default_output()
    }

    fn open_output(
        &self,
        endpoint: &OutputEndpoint,
        format: AudioFormat,
    ) -> Result<Self::Stream, StreamError> {
        (**self).open_output(endpoint, format)
    }
}

/// An open, running output stream
///
/// Dropping the stream stops it and releases the device.
pub trait OutputStream {
    /// Queue PCM bytes, blocking until the device has room for them
    ///
    /// # Errors
    ///
    /// Returns error if the device reported a failure
    fn write(&mut self, chunk: &[u8]) -> Result<(), StreamError>;

    /// Block until everything written so far has been played
    ///
    /// # Errors
    ///
    /// Returns error if the device failed while draining
    fn drain(&mut self) -> Result<(), StreamError>;
}

/// Shared flag set when the user asks the process to stop
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<InterruptState>);

#[derive(Debug, Default)]
struct InterruptState {
    raised: AtomicBool,
    notify: Notify,
}

impl Interrupt {
    /// Create a cleared flag
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that in-flight playback stop at the next chunk
    pub fn trigger(&self) {
        self.0.raised.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    /// Whether an interrupt has been requested
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.0.raised.load(Ordering::SeqCst)
    }

    /// Wait until the interrupt is triggered
    pub async fn triggered(&self) {
        let notified = self.0.notify.notified();
        if self.is_triggered() {
            return;
        }
        notified.await;
    }
}
