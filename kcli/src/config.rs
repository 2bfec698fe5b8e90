//! YAML configuration under the `K-CLI` key.
//!
//! ```rust
//! use kcli::KcliConfig;
//!
//! let config = KcliConfig::from_yaml_str("K-CLI:\n  provider: Ollama\n  model: llama3.2\n")
//!     .expect("config should parse");
//!
//! assert_eq!(config.model, "llama3.2");
//! assert_eq!(config.max_turns, 10);
//! assert_eq!(config.effective_base_url(), "http://localhost:11434");
//! ```

use std::path::{Path, PathBuf};

use kprovider::ProviderId;
use kstore::{ChatStoreOptions, expand_user};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

pub const CONFIG_KEY: &str = "K-CLI";
pub const DEFAULT_CONFIG_PATH: &str = "~/.config/k-cli/config.yaml";
pub const DEFAULT_PROVIDER: &str = "OpenAI";
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_CUSTOM_API_PATH: &str = "/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "deepseek/deepseek-chat-v3.1:free";
pub const DEFAULT_MAX_TOKENS: u32 = 32768;
pub const DEFAULT_MAX_TURNS: usize = 10;
pub const DEFAULT_REASONING_EFFORT: &str = "medium";
pub const DEFAULT_CHAT_PATH: &str = "~/.config/k-cli/chats.jsonl";
pub const DEFAULT_MCP_SERVER_PATH: &str = "~/.config/k-cli/mcp_servers.jsonl";
pub const DEFAULT_PROMPT_PATH: &str = "~/.config/k-cli/prompts.jsonl";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KcliConfig {
    pub provider: String,
    pub base_url: String,
    pub custom_api_path: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub max_turns: usize,
    pub reasoning_effort: String,
    pub stream: bool,
    pub chat_path: String,
    pub mcp_server_path: String,
    pub prompt_path: String,
    pub store_workers: i64,
    pub store_queue_capacity: i64,
}

impl Default for KcliConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            custom_api_path: DEFAULT_CUSTOM_API_PATH.to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            max_turns: DEFAULT_MAX_TURNS,
            reasoning_effort: DEFAULT_REASONING_EFFORT.to_string(),
            stream: true,
            chat_path: DEFAULT_CHAT_PATH.to_string(),
            mcp_server_path: DEFAULT_MCP_SERVER_PATH.to_string(),
            prompt_path: DEFAULT_PROMPT_PATH.to_string(),
            store_workers: kstore::DEFAULT_WORKER_COUNT as i64,
            store_queue_capacity: kstore::DEFAULT_QUEUE_CAPACITY as i64,
        }
    }
}

impl std::fmt::Debug for KcliConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KcliConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("custom_api_path", &self.custom_api_path)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "[REDACTED]" })
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("max_turns", &self.max_turns)
            .field("reasoning_effort", &self.reasoning_effort)
            .field("stream", &self.stream)
            .field("chat_path", &self.chat_path)
            .field("mcp_server_path", &self.mcp_server_path)
            .field("prompt_path", &self.prompt_path)
            .field("store_workers", &self.store_workers)
            .field("store_queue_capacity", &self.store_queue_capacity)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(rename = "K-CLI", default)]
    kcli: KcliConfig,
}

/// Repository files with `~` expanded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    pub chats: PathBuf,
    pub mcp_servers: PathBuf,
    pub prompts: PathBuf,
}

impl KcliConfig {
    /// Reads and validates `path`, or the default location when `None`.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => expand_user(DEFAULT_CONFIG_PATH)?,
        };

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(error) => {
                return Err(ConfigError::io(format!(
                    "failed to read {}: {error}",
                    path.display()
                )));
            }
        };

        let config = Self::from_yaml_str(&text)
            .map_err(|error| ConfigError::parse(format!("{}: {}", path.display(), error.message)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str::<ConfigFile>(text)
            .map(|file| file.kcli)
            .map_err(|error| ConfigError::parse(error.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.provider_id()?;
        if self.model.trim().is_empty() {
            return Err(ConfigError::invalid("model must not be empty"));
        }
        if self.max_turns == 0 {
            return Err(ConfigError::invalid("max_turns must be greater than zero"));
        }
        if self.base_url.trim().is_empty() {
            return Err(ConfigError::invalid("base_url must not be empty"));
        }
        Ok(())
    }

    pub fn provider_id(&self) -> Result<ProviderId, ConfigError> {
        match self.provider.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderId::OpenAi),
            "ollama" => Ok(ProviderId::Ollama),
            other => Err(ConfigError::invalid(format!(
                "unknown provider '{other}', expected OpenAI or Ollama"
            ))),
        }
    }

    /// Ollama falls back to the local daemon when `base_url` was left at the
    /// OpenRouter default.
    pub fn effective_base_url(&self) -> &str {
        match self.provider_id() {
            Ok(ProviderId::Ollama) if self.base_url == DEFAULT_BASE_URL => DEFAULT_OLLAMA_BASE_URL,
            _ => &self.base_url,
        }
    }

    pub fn paths(&self) -> Result<ConfigPaths, ConfigError> {
        Ok(ConfigPaths {
            chats: expand_user(&self.chat_path)?,
            mcp_servers: expand_user(&self.mcp_server_path)?,
            prompts: expand_user(&self.prompt_path)?,
        })
    }

    pub fn store_options(&self) -> ChatStoreOptions {
        ChatStoreOptions::new(
            usize::try_from(self.store_workers).unwrap_or(0),
            usize::try_from(self.store_queue_capacity).unwrap_or(0),
        )
    }
}
