//! Configuration management for voice-relay.
//!
//! Loads config from YAML files in standard locations. Every section falls
//! back to its defaults, so an empty or missing file yields a working relay
//! in no-push mode.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Environment variable consulted when `push.access_token` is empty.
pub const ACCESS_TOKEN_ENV: &str = "FCM_ACCESS_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_yml::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8000,
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    pub enabled: bool,
    pub project_id: String,
    pub access_token: String,
    pub endpoint: String,
    pub timeout_secs: u64,
    pub notification_title: String,
    pub channel_id: String,
    pub welcome_message: String,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            project_id: String::new(),
            access_token: String::new(),
            endpoint: "https://fcm.googleapis.com".into(),
            timeout_secs: 10,
            notification_title: "Voice Assistant".into(),
            channel_id: "voice_assistant_channel".into(),
            welcome_message:
                "Welcome! Your Voice Assistant is now connected and ready to receive notifications."
                    .into(),
        }
    }
}

// Hand-written so the access token never reaches a log line.
impl std::fmt::Debug for PushConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushConfig")
            .field("enabled", &self.enabled)
            .field("project_id", &self.project_id)
            .field(
                "access_token",
                &if self.access_token.is_empty() { "<unset>" } else { "<redacted>" },
            )
            .field("endpoint", &self.endpoint)
            .field("timeout_secs", &self.timeout_secs)
            .field("channel_id", &self.channel_id)
            .finish()
    }
}

impl PushConfig {
    /// The access token from the file, or from `FCM_ACCESS_TOKEN` when the
    /// file leaves it empty.
    pub fn resolved_access_token(&self) -> Option<String> {
        let token = if self.access_token.trim().is_empty() {
            std::env::var(ACCESS_TOKEN_ENV).unwrap_or_default()
        } else {
            self.access_token.clone()
        };
        let token = token.trim().to_string();
        (!token.is_empty()).then_some(token)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub filtering_enabled: bool,
    pub ai_rewrite_enabled: bool,
    pub blocked_apps: Vec<String>,
    pub allowed_apps: Vec<String>,
    pub spam_keywords: Vec<String>,
    pub spam_threshold: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            filtering_enabled: true,
            ai_rewrite_enabled: false,
            blocked_apps: ["Facebook", "Instagram", "TikTok", "Twitter", "X"]
                .into_iter()
                .map(String::from)
                .collect(),
            allowed_apps: vec![],
            spam_keywords: [
                "free",
                "winner",
                "congratulations",
                "urgent",
                "limited time",
                "act now",
                "click here",
                "prize",
                "lottery",
                "million",
                "claim",
                "cash",
                "guaranteed",
                "offer",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            spam_threshold: 2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub model: String,
    pub host: String,
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            model: "llama3.2:3b".into(),
            host: "http://localhost:11434".into(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub enabled: bool,
    pub url: String,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "http://127.0.0.1:8767".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    /// Empty means `~/.voice-relay-history`.
    pub dir: String,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: String::new(),
        }
    }
}

impl HistoryConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        if self.dir.is_empty() {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".voice-relay-history")
        } else {
            PathBuf::from(&self.dir)
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub push: PushConfig,
    pub classifier: ClassifierConfig,
    pub ollama: OllamaConfig,
    pub speech: SpeechConfig,
    pub history: HistoryConfig,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/voice-relay/config.yaml
    /// 3. /etc/voice-relay/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::home_dir().map(|h| h.join(".config/voice-relay/config.yaml")),
                Some(PathBuf::from("/etc/voice-relay/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match Self::from_file(&config_path) {
            Ok(config) => {
                info!("Loaded config from {}", config_path.display());
                config
            }
            Err(e) => {
                tracing::warn!("{e}, using defaults");
                Self::default()
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yml::Error> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yml::from_str(contents)
    }
}
