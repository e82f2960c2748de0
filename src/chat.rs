//! Character chat through the Gemini `generateContent` API
//!
//! The session keeps the running history and resends it with every turn,
//! so the model sees the whole conversation under the character prompt.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Reply used when the model cannot be reached
pub const FALLBACK_REPLY: &str = "あれ、ちょっと調子悪いかも... もう一回言って？♡";

/// A conversational model that answers one user turn at a time
#[async_trait]
pub trait ChatModel: Send {
    /// Send a user message and return the model's reply
    ///
    /// # Errors
    ///
    /// Returns error if no reply could be produced; the history must be
    /// left as it was before the call
    async fn send_message(&mut self, text: &str) -> Result<String>;
}

/// Speaker of a turn in the history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

/// One turn of conversation history
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    role: Role,
    parts: Vec<Part>,
}

impl Content {
    fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part { text: text.into() }],
        }
    }
}

#[derive(Serialize)]
struct SystemInstruction<'a> {
    parts: [PartRef<'a>; 1],
}

#[derive(Serialize)]
struct PartRef<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: SystemInstruction<'a>,
    contents: &'a [Content],
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

impl GenerateResponse {
    fn text(&self) -> Option<String> {
        let text: String = self
            .candidates
            .first()?
            .content
            .as_ref()?
            .parts
            .iter()
            .map(|p| p.text.as_str())
            .collect();

        let text = text.trim();
        (!text.is_empty()).then(|| text.to_string())
    }
}

/// Multi-turn chat with a Gemini model under a fixed system prompt
pub struct ChatSession {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    system_prompt: String,
    history: Vec<Content>,
}

impl ChatSession {
    /// Start an empty session
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: String, model: String, system_prompt: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("Gemini API key required".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: API_BASE.to_string(),
            api_key,
            model,
            system_prompt,
            history: Vec::new(),
        })
    }

    /// Send requests to another API root (a proxy or a local stub)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Number of turns (user and model) kept in the history
    #[must_use]
    pub fn turns(&self) -> usize {
        self.history.len()
    }

    /// Model name
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_request<'a>(&'a self, contents: &'a [Content]) -> GenerateRequest<'a> {
        GenerateRequest {
            system_instruction: SystemInstruction {
                parts: [PartRef {
                    text: &self.system_prompt,
                }],
            },
            contents,
        }
    }
}

#[async_trait]
impl ChatModel for ChatSession {
    async fn send_message(&mut self, text: &str) -> Result<String> {
        let mut contents = self.history.clone();
        contents.push(Content::new(Role::User, text));

        tracing::debug!(model = %self.model, turns = contents.len(), "sending chat request");

        let response = self
            .client
            .post(format!("{}/{}:generateContent", self.base_url, self.model))
            .query(&[("key", self.api_key.as_str())])
            .json(&self.build_request(&contents))
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Gemini request failed");
                e
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Gemini API error");
            return Err(Error::Chat(format!("Gemini API error {status}: {body}")));
        }

        let result: GenerateResponse = response.json().await.map_err(|e| {
            tracing::error!(error = %e, "failed to parse Gemini response");
            e
        })?;

        let reply = result
            .text()
            .ok_or_else(|| Error::Chat("Gemini returned no text".to_string()))?;

        contents.push(Content::new(Role::Model, reply.as_str()));
        self.history = contents;

        tracing::debug!(chars = reply.chars().count(), "chat reply received");
        Ok(reply)
    }
}
