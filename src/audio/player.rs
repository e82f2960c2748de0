//! Lock-step playback to a speaker and an optional cable device
//!
//! Both streams are fed from a single chunk cursor: every chunk is read
//! once and written to the speaker, then the same bytes to the cable. The
//! speaker's blocking writes pace the loop, so the two outputs stay phase
//! aligned without a queue of their own.
//!
//! A cable write failure drops the cable for the rest of the utterance and
//! keeps the speaker playing. Every stream that was opened is released when
//! [`DualSinkPlayer::play`] returns, whatever the outcome.

use super::{
    AudioBackend, AudioFormat, Interrupt, OutputEndpoint, OutputStream, PcmChunks, PlaybackError,
};

/// What happened to the cable stream during one playback
#[derive(Debug)]
pub enum SecondaryOutcome {
    /// No cable endpoint was given
    NotRequested,
    /// Cable received every chunk
    Completed,
    /// Cable could not be opened; speaker played alone
    OpenFailed(PlaybackError),
    /// Cable failed mid-utterance and was dropped
    Dropped(PlaybackError),
}

impl SecondaryOutcome {
    /// Whether the cable received the whole utterance
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Result of a successful playback
#[derive(Debug)]
pub struct PlaybackSummary {
    /// Chunks written to the speaker
    pub chunks: usize,

    /// Bytes written to the speaker
    pub bytes: usize,

    /// Cable stream outcome
    pub secondary: SecondaryOutcome,
}

/// Plays decoded audio to one or two output endpoints
pub struct DualSinkPlayer<B> {
    backend: B,
    interrupt: Interrupt,
}

impl<B: AudioBackend> DualSinkPlayer<B> {
    /// Create a player over `backend`, stopping early when `interrupt` fires
    pub const fn new(backend: B, interrupt: Interrupt) -> Self {
        Self { backend, interrupt }
    }

    /// Play every chunk to `primary` and, if it opens, to `secondary`
    ///
    /// Blocks for the real-time duration of the audio.
    ///
    /// # Errors
    ///
    /// Returns `DeviceOpenFailed` if the speaker cannot be opened,
    /// `PrimaryWriteFailed` if the speaker fails mid-utterance, and
    /// `Interrupted` if the interrupt flag was raised. Cable failures are
    /// reported in the summary instead.
    pub fn play(
        &self,
        format: AudioFormat,
        mut chunks: PcmChunks<'_>,
        primary: &OutputEndpoint,
        secondary: Option<&OutputEndpoint>,
    ) -> Result<PlaybackSummary, PlaybackError> {
        let primary_stream = self.backend.open_output(primary, format).map_err(|e| {
            PlaybackError::DeviceOpenFailed {
                device: primary.name.clone(),
                reason: e.to_string(),
            }
        })?;

        let mut session = PlaybackSession {
            primary: primary_stream,
            secondary: None,
        };

        let mut outcome = match secondary {
            None => SecondaryOutcome::NotRequested,
            Some(endpoint) => match self.backend.open_output(endpoint, format) {
                Ok(stream) => {
                    session.secondary = Some(stream);
                    SecondaryOutcome::Completed
                }
                Err(e) => {
                    tracing::warn!(
                        device = %endpoint.name,
                        error = %e,
                        "failed to open cable stream, playing to speaker only"
                    );
                    SecondaryOutcome::OpenFailed(PlaybackError::DeviceOpenFailed {
                        device: endpoint.name.clone(),
                        reason: e.to_string(),
                    })
                }
            },
        };

        tracing::debug!(
            speaker = %primary.name,
            cable = secondary.map(|e| e.name.as_str()),
            sample_rate = format.sample_rate,
            channels = format.channels,
            "playback started"
        );

        let mut written = 0;
        let mut bytes = 0;

        loop {
            if self.interrupt.is_triggered() {
                tracing::debug!(chunks = written, "playback interrupted");
                return Err(PlaybackError::Interrupted);
            }

            let Some(chunk) = chunks.next() else {
                break;
            };

            session
                .primary
                .write(chunk)
                .map_err(|e| PlaybackError::PrimaryWriteFailed(e.to_string()))?;

            if let Some(stream) = session.secondary.as_mut()
                && let Err(e) = stream.write(chunk)
            {
                tracing::warn!(
                    error = %e,
                    chunk = written,
                    "cable write failed, dropping cable for this utterance"
                );
                session.secondary = None;
                outcome = SecondaryOutcome::Dropped(PlaybackError::SecondaryWriteFailed(
                    e.to_string(),
                ));
            }

            written += 1;
            bytes += chunk.len();
        }

        session
            .primary
            .drain()
            .map_err(|e| PlaybackError::PrimaryWriteFailed(e.to_string()))?;

        if let Some(stream) = session.secondary.as_mut()
            && let Err(e) = stream.drain()
        {
            tracing::warn!(error = %e, "cable drain failed");
            outcome = SecondaryOutcome::Dropped(PlaybackError::SecondaryWriteFailed(e.to_string()));
        }

        tracing::debug!(
            chunks = written,
            bytes,
            duration_ms = format.duration_ms(bytes),
            "playback complete"
        );

        Ok(PlaybackSummary {
            chunks: written,
            bytes,
            secondary: outcome,
        })
    }
}

/// Streams opened for one utterance
///
/// Fields drop (and so release their devices) on every exit from `play`,
/// including early returns and unwinding.
struct PlaybackSession<S: OutputStream> {
    primary: S,
    secondary: Option<S>,
}
