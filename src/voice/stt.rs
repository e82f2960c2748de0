//! Speech-to-text (STT) through the Google Speech REST API

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use super::capture::{SAMPLE_RATE, encode_linear16};
use crate::{Error, Result};

const RECOGNIZE_URL: &str = "https://speech.googleapis.com/v1/speech:recognize";

#[derive(Serialize)]
struct RecognizeRequest<'a> {
    config: RecognitionConfig<'a>,
    audio: RecognitionAudio,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RecognitionConfig<'a> {
    encoding: &'static str,
    sample_rate_hertz: u32,
    language_code: &'a str,
}

#[derive(Serialize)]
struct RecognitionAudio {
    content: String,
}

#[derive(Deserialize, Default)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<RecognitionResult>,
}

#[derive(Deserialize)]
struct RecognitionResult {
    #[serde(default)]
    alternatives: Vec<RecognitionAlternative>,
}

#[derive(Deserialize)]
struct RecognitionAlternative {
    #[serde(default)]
    transcript: String,
}

impl RecognizeResponse {
    /// Best transcript across result segments, `None` if nothing was heard
    fn transcript(&self) -> Option<String> {
        let text: String = self
            .results
            .iter()
            .filter_map(|r| r.alternatives.first())
            .map(|a| a.transcript.trim())
            .collect();

        (!text.is_empty()).then_some(text)
    }
}

/// Transcribes 16kHz mono utterances
pub struct SpeechRecognizer {
    client: reqwest::Client,
    api_key: String,
    language: String,
}

impl SpeechRecognizer {
    /// Create a recognizer for `language` (BCP-47, e.g. `ja-JP`)
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: String, language: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "Google Speech API key required for voice input".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            language,
        })
    }

    /// Transcribe one utterance
    ///
    /// Returns `None` when the service heard no words.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the service rejects it
    pub async fn recognize(&self, samples: &[f32]) -> Result<Option<String>> {
        let pcm = encode_linear16(samples);
        tracing::debug!(audio_bytes = pcm.len(), language = %self.language, "starting transcription");

        let request = RecognizeRequest {
            config: RecognitionConfig {
                encoding: "LINEAR16",
                sample_rate_hertz: SAMPLE_RATE,
                language_code: &self.language,
            },
            audio: RecognitionAudio {
                content: STANDARD.encode(&pcm),
            },
        };

        let response = self
            .client
            .post(RECOGNIZE_URL)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "speech request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "speech API error");
            return Err(Error::Stt(format!("speech API error {status}: {body}")));
        }

        let result: RecognizeResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse speech response");
            e
        })?;

        let transcript = result.transcript();
        match &transcript {
            Some(text) => tracing::info!(transcript = %text, "transcription complete"),
            None => tracing::debug!("no speech recognized"),
        }
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_rejected() {
        assert!(SpeechRecognizer::new(String::new(), "ja-JP".to_string()).is_err());
    }

    #[test]
    fn test_request_shape() {
        let request = RecognizeRequest {
            config: RecognitionConfig {
                encoding: "LINEAR16",
                sample_rate_hertz: SAMPLE_RATE,
                language_code: "ja-JP",
            },
            audio: RecognitionAudio {
                content: STANDARD.encode([0u8, 1]),
            },
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["config"]["encoding"], "LINEAR16");
        assert_eq!(json["config"]["sampleRateHertz"], 16000);
        assert_eq!(json["config"]["languageCode"], "ja-JP");
        assert_eq!(json["audio"]["content"], "AAE=");
    }

    #[test]
    fn test_transcript_joins_segments() {
        let body = r#"{"results":[
            {"alternatives":[{"transcript":"こんにちは","confidence":0.9},{"transcript":"こんにちわ"}]},
            {"alternatives":[{"transcript":" 元気？"}]}
        ]}"#;
        let response: RecognizeResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.transcript().as_deref(), Some("こんにちは元気？"));
    }

    #[test]
    fn test_empty_response_is_none() {
        let response: RecognizeResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(response.transcript(), None);

        let response: RecognizeResponse =
            serde_json::from_str(r#"{"results":[{"alternatives":[]}]}"#).unwrap();
        assert_eq!(response.transcript(), None);
    }
}
