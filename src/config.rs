//! Configuration loading and management

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::Result;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Model client configuration
    #[serde(default)]
    pub model: ModelConfig,

    /// Target automation platform configuration
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Checkpoint persistence settings
    #[serde(default)]
    pub checkpoints: CheckpointConfig,
}

impl Config {
    /// Load configuration from file or default locations
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(PathBuf::from)
            .or_else(|| {
                // Try .flowwright/config.toml in current directory
                let local = PathBuf::from(".flowwright/config.toml");
                if local.exists() {
                    return Some(local);
                }

                // Try ~/.flowwright/config.toml
                dirs::home_dir().map(|h| h.join(".flowwright/config.toml"))
            });

        match config_path {
            Some(p) if p.exists() => {
                let content = std::fs::read_to_string(&p)?;
                let config: Config = toml::from_str(&content)?;
                Ok(config)
            }
            _ => Ok(Config::default()),
        }
    }
}

/// Model client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// OpenAI-compatible API base URL
    #[serde(default = "default_model_base")]
    pub base_url: String,

    /// API key (can also be in the environment)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model name for every stage call
    #[serde(default = "default_model_name")]
    pub model: String,

    /// Sampling temperature
    #[serde(default)]
    pub temperature: Option<f32>,
}

fn default_model_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model_name() -> String {
    "gpt-4o".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: default_model_base(),
            api_key: None,
            model: default_model_name(),
            temperature: None,
        }
    }
}

/// Target platform configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Platform base URL
    #[serde(default = "default_platform_base")]
    pub base_url: String,

    /// Static API key sent on every request
    #[serde(default)]
    pub api_key: Option<String>,

    /// Header the API key travels in
    #[serde(default = "default_api_key_header")]
    pub api_key_header: String,

    /// Bound on the executor's workflow-creation call, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_platform_base() -> String {
    "http://localhost:5678".to_string()
}

fn default_api_key_header() -> String {
    "X-API-KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: default_platform_base(),
            api_key: None,
            api_key_header: default_api_key_header(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl PlatformConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Checkpoint persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Directory for file-backed checkpoints
    #[serde(default = "default_checkpoint_dir")]
    pub directory: PathBuf,
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from(".flowwright/checkpoints")
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            directory: default_checkpoint_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.platform.api_key_header, "X-API-KEY");
        assert_eq!(config.platform.timeout(), Duration::from_secs(30));
        assert!(config.model.api_key.is_none());
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml = r#"
            [platform]
            base_url = "http://n8n.internal:5678"
            api_key = "secret"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.platform.base_url, "http://n8n.internal:5678");
        assert_eq!(config.platform.api_key.as_deref(), Some("secret"));
        // Untouched sections keep defaults
        assert_eq!(config.model.model, "gpt-4o");
    }
}
