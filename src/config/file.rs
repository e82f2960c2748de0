//! TOML configuration file loading
//!
//! Supports `~/.config/avatar-voice/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct AvatarConfigFile {
    /// Name fragment of the virtual cable output (e.g. "CABLE Input")
    pub cable_device: Option<String>,

    /// Replace the embedded character prompt with this file
    pub system_prompt_path: Option<PathBuf>,

    /// Chat model configuration
    #[serde(default)]
    pub gemini: GeminiFileConfig,

    /// Speech synthesis configuration
    #[serde(default)]
    pub voicevox: VoicevoxFileConfig,

    /// Speech recognition configuration
    #[serde(default)]
    pub stt: SttFileConfig,
}

/// Gemini chat configuration
#[derive(Debug, Default, Deserialize)]
pub struct GeminiFileConfig {
    pub api_key: Option<String>,

    /// Model identifier (e.g. "gemini-2.0-flash")
    pub model: Option<String>,
}

/// VOICEVOX engine configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoicevoxFileConfig {
    /// Engine base URL
    pub host: Option<String>,

    /// Voice style identifier
    pub speaker_id: Option<u32>,
}

/// Speech recognition configuration
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    /// BCP-47 language code
    pub language: Option<String>,

    pub api_key: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `AvatarConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> AvatarConfigFile {
    config_file_path().map_or_else(AvatarConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from `path`, falling back to defaults
pub fn load_config_file_from(path: &Path) -> AvatarConfigFile {
    if !path.exists() {
        return AvatarConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                AvatarConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            AvatarConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/avatar-voice/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("avatar-voice").join("config.toml"))
}
