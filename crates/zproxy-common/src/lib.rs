use serde::{Deserialize, Serialize};

pub mod env;
pub mod file;

pub const DEFAULT_BASE_URL: &str = "https://api.z.ai/api/coding/paas/v4";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 11434;

const API_KEY_MASK: &str = "********";

#[derive(Debug, thiserror::Error)]
pub enum GlobalConfigError {
    #[error("invalid key: {0}. Valid keys are: api_key, base_url, host, port")]
    InvalidKey(String),
    #[error("invalid {key} value: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("cannot resolve config directory: neither XDG_CONFIG_HOME nor HOME is set")]
    NoConfigDir,
    #[error("failed to access config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Final, merged configuration used by the running process.
///
/// Merge order: CLI > ENV > config file > defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    pub api_key: String,
    pub base_url: String,
    pub host: String,
    pub port: u16,
    pub debug: bool,
    /// Optional outbound proxy (for upstream egress).
    pub proxy: Option<String>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        GlobalConfigPatch::default().into_config()
    }
}

impl GlobalConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Value for `config get`. The API key is always masked; unset values are `None`.
    pub fn get_key(&self, key: &str) -> Result<Option<String>, GlobalConfigError> {
        let value = match key {
            "api_key" => self.has_api_key().then(|| API_KEY_MASK.to_string()),
            "base_url" => Some(self.base_url.clone()),
            "host" => Some(self.host.clone()),
            "port" => (self.port != 0).then(|| self.port.to_string()),
            other => return Err(GlobalConfigError::InvalidKey(other.to_string())),
        };
        Ok(value.filter(|value| !value.is_empty()))
    }
}

/// Echo form of a value written by `config set`.
pub fn display_value(key: &str, value: &str) -> String {
    if key == "api_key" && !value.is_empty() {
        API_KEY_MASK.to_string()
    } else {
        value.to_string()
    }
}

/// Optional layer used for merging global config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
}

impl GlobalConfigPatch {
    pub fn overlay(&mut self, other: GlobalConfigPatch) {
        if other.api_key.is_some() {
            self.api_key = other.api_key;
        }
        if other.base_url.is_some() {
            self.base_url = other.base_url;
        }
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.debug.is_some() {
            self.debug = other.debug;
        }
        if other.proxy.is_some() {
            self.proxy = other.proxy;
        }
    }

    /// Writes one settable key into this layer, leaving every other key unset
    /// so unspecified values keep following the built-in defaults.
    pub fn set_key(&mut self, key: &str, value: &str) -> Result<(), GlobalConfigError> {
        match key {
            "api_key" => self.api_key = Some(value.to_string()),
            "base_url" => self.base_url = Some(value.trim_end_matches('/').to_string()),
            "host" => self.host = Some(value.to_string()),
            "port" => {
                let port = value
                    .trim()
                    .parse()
                    .map_err(|_| GlobalConfigError::InvalidValue {
                        key: "port",
                        value: value.to_string(),
                    })?;
                self.port = Some(port);
            }
            other => return Err(GlobalConfigError::InvalidKey(other.to_string())),
        }
        Ok(())
    }

    pub fn into_config(self) -> GlobalConfig {
        GlobalConfig {
            api_key: self.api_key.unwrap_or_default(),
            base_url: self
                .base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            host: self.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: self.port.unwrap_or(DEFAULT_PORT),
            debug: self.debug.unwrap_or(false),
            proxy: self
                .proxy
                .map(|proxy| proxy.trim().to_string())
                .filter(|proxy| !proxy.is_empty()),
        }
    }
}
