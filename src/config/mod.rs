//! Configuration management for geochat

use crate::location::{LocationMethod, LocationResult};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Print the resolution method and the full message sent to the agent
    pub debug: bool,
    pub location: LocationConfig,
    pub chat: ChatConfig,
    pub endpoints: EndpointsConfig,
}

/// Which provider the resolver tries first
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MethodPreference {
    /// Map-vendor reverse-IP lookup, falling back to plain IP lookup
    #[default]
    Amap,
    /// Plain IP geolocation only
    Ip,
}

impl MethodPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            MethodPreference::Amap => "amap",
            MethodPreference::Ip => "ip",
        }
    }
}

impl std::str::FromStr for MethodPreference {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "amap" => Ok(MethodPreference::Amap),
            "ip" => Ok(MethodPreference::Ip),
            other => anyhow::bail!("Unknown location method: {}. Supported: amap, ip", other),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub method: MethodPreference,
    pub amap_api_key: String,
    /// Returned when every provider fails
    pub default: LocationResult,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            method: MethodPreference::Amap,
            amap_api_key: String::new(),
            default: LocationResult {
                latitude: 27.9087,
                longitude: 112.6112,
                city: "湘潭".to_string(),
                region: "湖南".to_string(),
                method: LocationMethod::Default,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub api_token: String,
    pub bot_id: String,
    pub user_id: String,
    pub base_url: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            bot_id: String::new(),
            user_id: "123".to_string(),
            base_url: "https://api.coze.cn".to_string(),
        }
    }
}

/// Base URLs of the geolocation services
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub ip_echo_url: String,
    pub amap_base_url: String,
    pub ip_api_base_url: String,
    pub ipapi_co_base_url: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            ip_echo_url: "https://httpbin.org/ip".to_string(),
            amap_base_url: "https://restapi.amap.com".to_string(),
            ip_api_base_url: "http://ip-api.com".to_string(),
            ipapi_co_base_url: "https://ipapi.co".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from an explicit path; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Config::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "geochat") {
            Ok(proj_dirs.config_dir().join("config.toml"))
        } else {
            Ok(PathBuf::from("config.toml"))
        }
    }

    /// Secrets may come from the environment instead of the config file
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = non_empty("COZE_API_TOKEN") {
            self.chat.api_token = token;
        }
        if let Some(bot_id) = non_empty("COZE_BOT_ID") {
            self.chat.bot_id = bot_id;
        }
        if let Some(key) = non_empty("AMAP_API_KEY") {
            self.location.amap_api_key = key;
        }
    }

    /// Check that the agent credentials needed for chat are present
    pub fn ensure_chat_credentials(&self) -> Result<()> {
        if self.chat.api_token.is_empty() {
            anyhow::bail!(
                "Agent API token not configured. Set chat.api_token in {} or COZE_API_TOKEN",
                Self::config_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|_| "config.toml".to_string())
            );
        }
        if self.chat.bot_id.is_empty() {
            anyhow::bail!("Agent bot id not configured. Set chat.bot_id or COZE_BOT_ID");
        }
        Ok(())
    }
}
