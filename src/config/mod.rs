//! Configuration management for avatar-voice
//!
//! Precedence is environment, then the TOML file, then defaults. A `.env`
//! file in the working directory is loaded into the environment first.

pub mod file;

use std::path::PathBuf;

use crate::{Error, Result};

use file::AvatarConfigFile;

/// Character prompt compiled into the binary
pub const DEFAULT_SYSTEM_PROMPT: &str = include_str!("../../prompts/system.txt");

/// Default cable name fragment (VB-Audio Virtual Cable)
pub const DEFAULT_CABLE_DEVICE: &str = "CABLE Input";

const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_VOICEVOX_HOST: &str = "http://localhost:50021";
const DEFAULT_STT_LANGUAGE: &str = "ja-JP";

/// avatar-voice configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Chat model configuration
    pub gemini: GeminiConfig,

    /// Speech synthesis configuration
    pub voicevox: VoicevoxConfig,

    /// Speech recognition configuration
    pub stt: SttConfig,

    /// Name fragment identifying the avatar's virtual cable output
    pub cable_device: String,

    /// Character prompt sent as the system instruction
    pub system_prompt: String,
}

/// Gemini chat configuration
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key (empty when unset)
    pub api_key: String,
    /// Model identifier
    pub model: String,
}

/// VOICEVOX engine configuration
#[derive(Debug, Clone)]
pub struct VoicevoxConfig {
    /// Engine base URL
    pub host: String,
    /// Voice style identifier
    pub speaker_id: u32,
}

/// Speech recognition configuration
#[derive(Debug, Clone)]
pub struct SttConfig {
    /// API key for the Google Speech API
    pub api_key: String,
    /// BCP-47 language code
    pub language: String,
}

impl Config {
    /// Load configuration from `.env`, the config file and the environment
    ///
    /// # Errors
    ///
    /// Returns error if the system prompt file cannot be read or a numeric
    /// setting is invalid
    pub fn load() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env file"),
            Err(e) if e.not_found() => {}
            Err(e) => tracing::warn!(error = %e, "failed to load .env file"),
        }

        Self::from_sources(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// # Errors
    ///
    /// Returns error if the system prompt file cannot be read or a numeric
    /// setting is invalid
    pub fn from_sources<F>(fc: AvatarConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let gemini = GeminiConfig {
            api_key: var("GEMINI_API_KEY").or(fc.gemini.api_key).unwrap_or_default(),
            model: var("GEMINI_MODEL")
                .or(fc.gemini.model)
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
        };

        let speaker_id = match var("VOICEVOX_SPEAKER_ID") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                Error::Config(format!("VOICEVOX_SPEAKER_ID must be a number, got {raw:?}"))
            })?,
            None => fc.voicevox.speaker_id.unwrap_or(0),
        };

        let voicevox = VoicevoxConfig {
            host: var("VOICEVOX_HOST")
                .or(fc.voicevox.host)
                .unwrap_or_else(|| DEFAULT_VOICEVOX_HOST.to_string()),
            speaker_id,
        };

        let stt = SttConfig {
            api_key: var("GOOGLE_SPEECH_API_KEY")
                .or(fc.stt.api_key)
                .unwrap_or_else(|| gemini.api_key.clone()),
            language: var("STT_LANGUAGE")
                .or(fc.stt.language)
                .unwrap_or_else(|| DEFAULT_STT_LANGUAGE.to_string()),
        };

        let cable_device = var("AVATAR_CABLE_DEVICE")
            .or(fc.cable_device)
            .unwrap_or_else(|| DEFAULT_CABLE_DEVICE.to_string());

        let system_prompt = match fc.system_prompt_path {
            Some(path) => load_prompt(path)?,
            None => DEFAULT_SYSTEM_PROMPT.to_string(),
        };

        Ok(Self {
            gemini,
            voicevox,
            stt,
            cable_device,
            system_prompt,
        })
    }

    /// Fail unless a Gemini API key is configured
    ///
    /// # Errors
    ///
    /// Returns error if `GEMINI_API_KEY` is unset
    pub fn require_api_key(&self) -> Result<()> {
        if self.gemini.api_key.is_empty() {
            return Err(Error::Config("GEMINI_API_KEY is not set".to_string()));
        }
        Ok(())
    }
}

fn load_prompt(path: PathBuf) -> Result<String> {
    let prompt = std::fs::read_to_string(&path).map_err(|e| {
        Error::Config(format!("failed to read system prompt {}: {e}", path.display()))
    })?;
    tracing::debug!(path = %path.display(), "using custom system prompt");
    Ok(prompt)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_sources(AvatarConfigFile::default(), env_from(&[])).unwrap();
        assert_eq!(config.gemini.model, "gemini-2.0-flash");
        assert_eq!(config.voicevox.host, "http://localhost:50021");
        assert_eq!(config.voicevox.speaker_id, 0);
        assert_eq!(config.stt.language, "ja-JP");
        assert_eq!(config.cable_device, "CABLE Input");
        assert_eq!(config.system_prompt, DEFAULT_SYSTEM_PROMPT);
        assert!(config.require_api_key().is_err());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut fc = AvatarConfigFile::default();
        fc.cable_device = Some("FromFile".to_string());
        fc.voicevox.speaker_id = Some(8);
        fc.gemini.model = Some("file-model".to_string());

        let config = Config::from_sources(
            fc,
            env_from(&[
                ("GEMINI_API_KEY", "secret"),
                ("AVATAR_CABLE_DEVICE", "FromEnv"),
                ("VOICEVOX_SPEAKER_ID", "3"),
            ]),
        )
        .unwrap();

        assert_eq!(config.cable_device, "FromEnv");
        assert_eq!(config.voicevox.speaker_id, 3);
        assert_eq!(config.gemini.model, "file-model");
        assert!(config.require_api_key().is_ok());
    }

    #[test]
    fn test_speech_key_falls_back_to_gemini_key() {
        let config =
            Config::from_sources(AvatarConfigFile::default(), env_from(&[("GEMINI_API_KEY", "k")]))
                .unwrap();
        assert_eq!(config.stt.api_key, "k");

        let config = Config::from_sources(
            AvatarConfigFile::default(),
            env_from(&[("GEMINI_API_KEY", "k"), ("GOOGLE_SPEECH_API_KEY", "s")]),
        )
        .unwrap();
        assert_eq!(config.stt.api_key, "s");
    }

    #[test]
    fn test_invalid_speaker_id() {
        let result = Config::from_sources(
            AvatarConfigFile::default(),
            env_from(&[("VOICEVOX_SPEAKER_ID", "zundamon")]),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_custom_prompt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompt.txt");
        std::fs::write(&path, "あなたは猫です").unwrap();

        let mut fc = AvatarConfigFile::default();
        fc.system_prompt_path = Some(path);
        let config = Config::from_sources(fc, env_from(&[])).unwrap();
        assert_eq!(config.system_prompt, "あなたは猫です");

        let mut fc = AvatarConfigFile::default();
        fc.system_prompt_path = Some(dir.path().join("missing.txt"));
        assert!(Config::from_sources(fc, env_from(&[])).is_err());
    }
}
