
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::analysis::MAX_IMAGE_BYTES;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub upload: UploadConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Gemini model id, with or without the `models/` prefix
    #[serde(default = "default_model_name")]
    pub name: String,

    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// API key, usually `"${GEMINI_API_KEY}"`. Falls back to the
    /// GEMINI_API_KEY environment variable when unset.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Maximum image size in bytes (default and ceiling: 5 MiB)
    #[serde(default = "default_max_file_size_bytes")]
    pub max_file_size_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_model_name() -> String {
    "gemini-1.5-flash".to_string()
}
fn default_api_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}
fn default_timeout_seconds() -> u64 {
    60
}
fn default_max_file_size_bytes() -> u64 {
    MAX_IMAGE_BYTES
}
fn default_port() -> u16 {
    31340
}
fn default_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            api_base: default_api_base(),
            api_key: None,
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: default_max_file_size_bytes(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Load from `path`, or from `~/.dermalens/config.toml` when `None`.
    /// A missing file at the default location is created from the template.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let path = match path {
            Some(p) => PathBuf::from(shellexpand::tilde(p).to_string()),
            None => {
                let path = Self::config_path()?;
                if !path.exists() {
                    Self::write_template(&path)?;
                    return Ok(Config::default());
                }
                path
            }
        };

        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
    }

    /// Load without `${VAR}` expansion, for editing the file in place
    /// without writing secrets back into it.
    pub fn load_unexpanded(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content).context("Invalid config file")?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content).context("Invalid config file")?;

        config.expand_env_vars();

        config
            .validate()
            .context("Configuration validation failed")?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.name.trim().is_empty() {
            anyhow::bail!("model.name cannot be empty");
        }

        if !self.model.api_base.starts_with("http://") && !self.model.api_base.starts_with("https://") {
            anyhow::bail!(
                "model.api_base must be an http(s) URL (got {})",
                self.model.api_base
            );
        }

        if self.model.timeout_seconds == 0 {
            anyhow::bail!("model.timeout_seconds must be greater than 0");
        }

        if self.upload.max_file_size_bytes == 0 || self.upload.max_file_size_bytes > MAX_IMAGE_BYTES {
            anyhow::bail!(
                "upload.max_file_size_bytes must be between 1 and {} (got {})",
                MAX_IMAGE_BYTES,
                self.upload.max_file_size_bytes
            );
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid logging.level: {}. Expected one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            );
        }

        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;

        Ok(())
    }

    /// Write the commented default config (first-time setup)
    pub fn write_template(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, DEFAULT_CONFIG_TEMPLATE)?;
        eprintln!("Created default config at {}", path.display());

        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let base = directories::BaseDirs::new()
            .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;

        Ok(base.home_dir().join(".dermalens").join("config.toml"))
    }

    fn expand_env_vars(&mut self) {
        if let Some(ref mut key) = self.model.api_key {
            *key = expand_env(key);
        }
    }

    pub fn get_value(&self, key: &str) -> Result<String> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["model", "name"] => Ok(self.model.name.clone()),
            ["model", "api_base"] => Ok(self.model.api_base.clone()),
            ["model", "timeout_seconds"] => Ok(self.model.timeout_seconds.to_string()),
            ["upload", "max_file_size_bytes"] => Ok(self.upload.max_file_size_bytes.to_string()),
            ["server", "port"] => Ok(self.server.port.to_string()),
            ["server", "bind"] => Ok(self.server.bind.clone()),
            ["logging", "level"] => Ok(self.logging.level.clone()),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = key.split('.').collect();

        match parts.as_slice() {
            ["model", "name"] => self.model.name = value.to_string(),
            ["model", "api_base"] => self.model.api_base = value.to_string(),
            ["model", "timeout_seconds"] => self.model.timeout_seconds = value.parse()?,
            ["upload", "max_file_size_bytes"] => self.upload.max_file_size_bytes = value.parse()?,
            ["server", "port"] => self.server.port = value.parse()?,
            ["server", "bind"] => self.server.bind = value.to_string(),
            ["logging", "level"] => self.logging.level = value.to_string(),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }

        Ok(())
    }
}

fn expand_env(s: &str) -> String {
    if let Some(var_name) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        std::env::var(var_name).unwrap_or_else(|_| s.to_string())
    } else if let Some(var_name) = s.strip_prefix('$') {
        std::env::var(var_name).unwrap_or_else(|_| s.to_string())
    } else {
        s.to_string()
    }
}

/// Default config template with helpful comments (used for first-time setup)
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# dermalens configuration
# Auto-created on first run. Edit as needed.

[model]
# Gemini model used for image analysis
name = "gemini-1.5-flash"
api_base = "https://generativelanguage.googleapis.com/v1beta"
# Read from the environment at startup; GEMINI_API_KEY is also used when this is unset
api_key = "${GEMINI_API_KEY}"
timeout_seconds = 60

[upload]
# Images above this size are rejected (maximum 5 MiB)
max_file_size_bytes = 5242880

[server]
port = 31340
bind = "127.0.0.1"

[logging]
level = "info"
"#;
