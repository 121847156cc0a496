use chat::credential::Credentials;
use chat::openrouter::DEFAULT_BASE_URL;
use chat::storage::{KeyValueStore, default_state_path};
use proto::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Top-level CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Endpoint and credential configuration.
    #[serde(default)]
    pub api: ApiConfig,

    /// Chat behaviour toggles.
    #[serde(default)]
    pub chat: ChatConfig,

    /// Persistent state location.
    #[serde(default)]
    pub storage: StorageConfig,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

/// Endpoint/credential config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL serving `/chat/completions` and `/models`.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API key (env overrides applied at load time; see `Config::load`).
    /// Empty means "use the persisted key".
    #[serde(default)]
    pub api_key: String,
    /// Model id. Empty means "use the persisted selection".
    #[serde(default)]
    pub model: String,
    /// Request timeout. Unset keeps the HTTP client default.
    pub timeout_secs: Option<u64>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            model: String::new(),
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatConfig {
    /// Mark the user message as `error` when its request fails.
    #[serde(default)]
    pub mark_failed_messages: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// State file path. Defaults to `~/.parley/state.json`.
    pub path: Option<String>,
}

impl StorageConfig {
    pub fn effective_path(&self) -> PathBuf {
        match &self.path {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => default_state_path(),
        }
    }
}

impl Config {
    /// Loads configuration from explicit path, fallback locations, and env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = path.map(|p| p.to_path_buf()).or_else(|| {
            // Look in current dir, then home dir
            let cwd = std::env::current_dir().ok()?.join("parley.toml");
            if cwd.exists() {
                return Some(cwd);
            }
            let home = std::env::var("HOME").ok()?;
            let home_config = PathBuf::from(home).join(".parley").join("config.toml");
            if home_config.exists() {
                return Some(home_config);
            }
            None
        });
        debug!(path = ?config_path, "Config file resolved");

        let mut config = if let Some(path) = config_path {
            let content = std::fs::read_to_string(&path).map_err(ConfigError::Io)?;
            toml::from_str(&content).map_err(|e| ConfigError::Toml(e.to_string()))?
        } else {
            Config::default()
        };

        // Environment variable overrides
        if let Ok(key) = std::env::var("PARLEY_API_KEY") {
            config.api.api_key = key;
        } else if config.api.api_key.is_empty()
            && let Ok(key) = std::env::var("OPENROUTER_API_KEY")
        {
            config.api.api_key = key;
        }
        if let Ok(model) = std::env::var("PARLEY_MODEL") {
            config.api.model = model;
        }
        if let Ok(url) = std::env::var("PARLEY_BASE_URL") {
            config.api.base_url = url;
        }
        if let Ok(path) = std::env::var("PARLEY_STATE_PATH") {
            config.storage.path = Some(path);
        }

        config.validate()?;
        debug!(
            base_url = %config.api.base_url,
            model = %config.api.model,
            "Config loaded"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let url = self.api.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                field: "api.base_url".to_string(),
                reason: format!("expected an http(s) URL, got {url:?}"),
            });
        }
        if self.api.timeout_secs == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "api.timeout_secs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Resolves the startup credential pairing.
    ///
    /// Each value comes from config/env when set, otherwise from what the last
    /// `/save` persisted.
    pub fn resolve_credentials(&self, store: &dyn KeyValueStore) -> Credentials {
        let persisted = Credentials::load_from(store);
        let api_key = if self.api.api_key.is_empty() {
            debug!(source = "storage", "API key resolved");
            persisted.api_key
        } else {
            debug!(source = "config", "API key resolved");
            self.api.api_key.clone()
        };
        let model = if self.api.model.is_empty() {
            persisted.model
        } else {
            self.api.model.clone()
        };
        Credentials::new(api_key, model)
    }
}
