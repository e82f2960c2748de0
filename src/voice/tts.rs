//! Text-to-speech (TTS) through a VOICEVOX engine

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Timeout for the engine version probe
const VERSION_TIMEOUT: Duration = Duration::from_secs(3);

/// Timeout for building the audio query
const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for waveform synthesis
const SYNTHESIS_TIMEOUT: Duration = Duration::from_secs(60);

/// Why no audio is available for a reply
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// Engine refused or dropped the connection
    #[error("TTS engine unreachable: {0}")]
    Unreachable(String),

    /// Engine answered with a non-success status
    #[error("TTS engine returned {status}: {body}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// Response body, if readable
        body: String,
    },

    /// Request did not complete in time
    #[error("TTS request timed out")]
    Timeout,

    /// Any other transport or decoding failure
    #[error("TTS error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for SynthesisError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Unreachable(e.to_string())
        } else {
            Self::Other(e.to_string())
        }
    }
}

/// Turns reply text into a complete WAV buffer
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Synthesize `text` into WAV bytes
    ///
    /// # Errors
    ///
    /// Returns error if no audio could be produced
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError>;
}

/// Client for a VOICEVOX engine's HTTP API
pub struct Voicevox {
    client: reqwest::Client,
    host: String,
    speaker_id: u32,
}

impl Voicevox {
    /// Create a client for the engine at `host` using voice `speaker_id`
    #[must_use]
    pub fn new(host: impl Into<String>, speaker_id: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: host.into().trim_end_matches('/').to_string(),
            speaker_id,
        }
    }

    /// Probe the engine and return its version string
    ///
    /// # Errors
    ///
    /// Returns error if the engine is not reachable
    pub async fn check_connection(&self) -> Result<String, SynthesisError> {
        let response = self
            .client
            .get(format!("{}/version", self.host))
            .timeout(VERSION_TIMEOUT)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        let version = response.text().await?;
        let version = version.trim().trim_matches('"').to_string();

        tracing::info!(host = %self.host, version = %version, "VOICEVOX connected");
        Ok(version)
    }

    /// Engine base URL
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Voice used for synthesis
    #[must_use]
    pub const fn speaker_id(&self) -> u32 {
        self.speaker_id
    }
}

#[async_trait]
impl Synthesizer for Voicevox {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, SynthesisError> {
        let speaker = self.speaker_id.to_string();
        tracing::debug!(chars = text.chars().count(), speaker = %speaker, "building audio query");

        let response = self
            .client
            .post(format!("{}/audio_query", self.host))
            .query(&[("text", text), ("speaker", speaker.as_str())])
            .timeout(QUERY_TIMEOUT)
            .send()
            .await?;
        let query: serde_json::Value = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| SynthesisError::Other(format!("invalid audio query: {e}")))?;

        let response = self
            .client
            .post(format!("{}/synthesis", self.host))
            .query(&[("speaker", speaker.as_str())])
            .json(&query)
            .timeout(SYNTHESIS_TIMEOUT)
            .send()
            .await?;
        let audio = ensure_success(response).await?.bytes().await?;

        tracing::debug!(bytes = audio.len(), "speech synthesized");
        Ok(audio.to_vec())
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, SynthesisError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    tracing::error!(status = %status, body = %body, "VOICEVOX API error");
    Err(SynthesisError::HttpStatus {
        status: status.as_u16(),
        body,
    })
}
