use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;
use thiserror::Error;

use crate::classifier::ChatSettings;
use crate::taxonomy::default_instructions;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Environment variable {0} is not set (API key for the classification service)")]
    MissingApiKey(String),
    #[error("Failed to read instructions file {path}: {source}")]
    Instructions {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Application configuration loaded from TOML config file.
/// All fields have sensible defaults; the config file is optional.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory of input batch files (`*.json`).
    pub input_dir: PathBuf,
    /// Directory that receives one checkpoint per classified batch.
    pub output_dir: PathBuf,
    /// Merged library written at the end of a run.
    pub merged_file: PathBuf,
    /// Classification service settings.
    pub service: ServiceConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("./jsonlist"),
            output_dir: PathBuf::from("./jsonlistWithData"),
            merged_file: PathBuf::from("./library.json"),
            service: ServiceConfig::default(),
        }
    }
}

/// Classification service configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Base URL of an OpenAI-compatible API.
    pub api_base: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Replace the built-in instruction text with this file's contents.
    pub instructions_file: Option<PathBuf>,
    /// Pause after each request in milliseconds.
    pub pacing_ms: u64,
    /// Ask for temperature 0.
    pub deterministic: bool,
    /// Whole-request timeout in seconds. 0 = none.
    pub timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".into(),
            model: "gpt-4o".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            instructions_file: None,
            pacing_ms: 500,
            deterministic: true,
            timeout_secs: 0,
        }
    }
}

impl ServiceConfig {
    /// Instruction text: the configured file if any, else the built-in taxonomy prompt.
    pub fn instructions(&self) -> Result<String, ConfigError> {
        match &self.instructions_file {
            Some(path) => std::fs::read_to_string(path).map_err(|source| {
                ConfigError::Instructions {
                    path: path.clone(),
                    source,
                }
            }),
            None => Ok(default_instructions()),
        }
    }

    /// Everything the chat classifier needs, with the API key taken from `api_key`
    /// (normally `std::env::var(&self.api_key_env).ok()`).
    pub fn chat_settings(&self, api_key: Option<String>) -> Result<ChatSettings, ConfigError> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey(self.api_key_env.clone()))?;

        Ok(ChatSettings {
            api_base: self.api_base.clone(),
            api_key,
            model: self.model.clone(),
            instructions: self.instructions()?,
            pacing: Duration::from_millis(self.pacing_ms),
            deterministic: self.deterministic,
            timeout: (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)),
        })
    }
}

impl AppConfig {
    /// Load config from `path`, or `~/.config/crateclass/config.toml` when `None`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load(path: Option<&Path>) -> Self {
        let config_path = path.map(Path::to_path_buf).or_else(Self::config_path);
        match config_path {
            Some(path) if path.exists() => match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        config
                    }
                    Err(e) => {
                        log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                        Self::default()
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
