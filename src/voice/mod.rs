//! Voice processing module
//!
//! Microphone capture and utterance detection feed speech recognition;
//! replies are synthesized by a VOICEVOX engine and played by `audio`.

mod capture;
mod listener;
mod stt;
mod tts;

pub use capture::{AudioCapture, SAMPLE_RATE, encode_linear16};
pub use listener::{DetectorEvent, DetectorState, Heard, ListenSettings, Listener, UtteranceDetector};
pub use stt::SpeechRecognizer;
pub use tts::{SynthesisError, Synthesizer, Voicevox};
