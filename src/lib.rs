//! avatar-voice - spoken character chat for a lip-synced desktop avatar
//!
//! The user talks (or types), a Gemini model answers in character, VOICEVOX
//! synthesizes the reply and the audio is played to the speakers and to a
//! virtual cable device that the avatar application uses as its microphone.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    Conversation                       │
//! │   TextInput │ VoiceInput (capture → detect → STT)     │
//! └────────────────────┬─────────────────────────────────┘
//!                      │ text
//! ┌────────────────────▼─────────────────────────────────┐
//! │        ChatSession (Gemini)  →  Voicevox (TTS)        │
//! └────────────────────┬─────────────────────────────────┘
//!                      │ WAV
//! ┌────────────────────▼─────────────────────────────────┐
//! │  Speaker: decode │ resolve cable │ dual-sink player   │
//! │        default output        +      CABLE Input       │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod chat;
pub mod config;
pub mod conversation;
pub mod error;
pub mod voice;

pub use audio::{AudioBackend, AudioFormat, CpalBackend, Interrupt, OutputEndpoint, Speaker};
pub use chat::{ChatModel, ChatSession};
pub use config::Config;
pub use conversation::{Conversation, InputSource, TextInput, UserInput, VoiceInput};
pub use error::{Error, Result};
