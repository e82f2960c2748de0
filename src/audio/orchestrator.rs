//! Per-turn entry point: synthesize, decode, resolve devices, play

use std::sync::Arc;

use super::{
    AudioBackend, DeviceRegistry, DualSinkPlayer, Interrupt, PlaybackError, PlaybackSummary,
    ResolvedCable, SecondaryOutcome, decode,
};
use crate::voice::Synthesizer;
use crate::{Error, Result};

/// Speaks replies to the speaker and the avatar's cable device
///
/// The cable device is looked up once, on the first utterance, and the
/// result is reused for the lifetime of the speaker.
pub struct Speaker<B> {
    registry: DeviceRegistry<Arc<B>>,
    player: DualSinkPlayer<Arc<B>>,
    cable_hint: String,
    cable: ResolvedCable,
}

impl<B: AudioBackend> Speaker<B> {
    /// Create a speaker that mirrors audio to the device matching `cable_hint`
    pub fn new(backend: Arc<B>, cable_hint: impl Into<String>, interrupt: Interrupt) -> Self {
        Self {
            registry: DeviceRegistry::new(Arc::clone(&backend)),
            player: DualSinkPlayer::new(backend, interrupt),
            cable_hint: cable_hint.into(),
            cable: ResolvedCable::default(),
        }
    }

    /// Synthesize `text` and play it
    ///
    /// Never fails: synthesis, decode and playback errors are logged and the
    /// turn ends without audio. Must run on a multi-threaded runtime since
    /// playback blocks the current worker.
    pub async fn speak<S>(&mut self, text: &str, synthesizer: &S)
    where
        S: Synthesizer + ?Sized,
    {
        let audio = match synthesizer.synthesize(text).await {
            Ok(audio) => audio,
            Err(e) => {
                tracing::warn!(error = %e, "speech synthesis failed, skipping audio");
                return;
            }
        };

        tokio::task::block_in_place(|| {
            self.play_logged(&audio);
        });
    }

    /// Play a WAV buffer, logging instead of returning failures
    pub fn play_logged(&mut self, audio: &[u8]) -> Option<PlaybackSummary> {
        match self.play_wav(audio) {
            Ok(summary) => Some(summary),
            Err(Error::Playback(PlaybackError::Interrupted)) => {
                tracing::debug!("playback stopped by interrupt");
                None
            }
            Err(Error::Playback(e @ PlaybackError::DeviceOpenFailed { .. })) => {
                tracing::warn!(error = %e, "speaker unavailable, no audio this turn");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "audio playback failed");
                None
            }
        }
    }

    /// Decode a WAV buffer and play it to the speaker and cable
    ///
    /// # Errors
    ///
    /// Returns error if the buffer is malformed, there is no speaker, or
    /// speaker playback fails
    pub fn play_wav(&mut self, audio: &[u8]) -> Result<PlaybackSummary> {
        let (format, chunks) = decode(audio)?;

        let cable = self.cable.resolve(&self.registry, &self.cable_hint).cloned();

        let speaker = self
            .registry
            .default_output()
            .ok_or_else(|| PlaybackError::DeviceOpenFailed {
                device: "default output".to_string(),
                reason: "no output device available".to_string(),
            })?;

        // Default output may itself be the cable
        let cable = cable.filter(|c| c.name != speaker.name);

        let summary = self.player.play(format, chunks, &speaker, cable.as_ref())?;

        match &summary.secondary {
            SecondaryOutcome::OpenFailed(e) | SecondaryOutcome::Dropped(e) => {
                tracing::debug!(error = %e, "cable missed part of this utterance");
            }
            SecondaryOutcome::NotRequested | SecondaryOutcome::Completed => {}
        }

        Ok(summary)
    }

    /// Memoized cable lookup state
    #[must_use]
    pub const fn cable(&self) -> &ResolvedCable {
        &self.cable
    }
}
