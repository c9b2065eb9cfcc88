use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

use crate::cursor::{CursorOptions, DONE_SENTINEL};
use crate::error::{CoreResult, StreamError};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ApiCfg {
    /// Scheme and host of the API, without the `/v1` path.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Name of the environment variable that contains the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub organization: Option<String>,
}

impl Default for ApiCfg {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            organization: None,
        }
    }
}

impl ApiCfg {
    /// Read the API key from the configured environment variable.
    pub fn api_key(&self) -> CoreResult<SecretString> {
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(SecretString::new(key.into())),
            _ => Err(StreamError::Config(format!(
                "environment variable {} is not set",
                self.api_key_env
            ))),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HttpCfg {
    /// TCP connect timeout in milliseconds (default 5000ms)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Total request timeout in milliseconds, covering the whole stream (default 300000ms)
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Optional per-host idle connection pool cap (None = reqwest default)
    #[serde(default)]
    pub pool_max_idle_per_host: Option<usize>,
}

impl Default for HttpCfg {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            pool_max_idle_per_host: None,
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}
fn default_request_timeout_ms() -> u64 {
    300_000
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StreamCfg {
    #[serde(default = "default_done_sentinel")]
    pub done_sentinel: String,
}

impl Default for StreamCfg {
    fn default() -> Self {
        Self {
            done_sentinel: default_done_sentinel(),
        }
    }
}

impl StreamCfg {
    pub fn cursor_options(&self) -> CursorOptions {
        CursorOptions {
            done_sentinel: self.done_sentinel.clone(),
        }
    }
}

fn default_done_sentinel() -> String {
    DONE_SENTINEL.to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Config {
    #[serde(default)]
    pub api: ApiCfg,
    /// HTTP client configuration (timeouts, pooling). Missing → defaults.
    #[serde(default)]
    pub http: HttpCfg,
    #[serde(default)]
    pub stream: StreamCfg,
    /// Model used when the caller does not name one.
    #[serde(default)]
    pub model: Option<String>,
}

impl Config {
    /// Load a Config from a file path (JSON or TOML by extension). If the
    /// extension is missing or unrecognized, try JSON first, then TOML.
    pub fn from_path<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let s = std::str::from_utf8(&bytes)
            .map_err(|e| StreamError::Config(format!("{}: {e}", path.display())))?;
        let parse_json = |s: &str| {
            serde_json::from_str::<Self>(s)
                .map_err(|e| StreamError::Config(format!("{}: {e}", path.display())))
        };
        let parse_toml = |s: &str| {
            toml::from_str::<Self>(s)
                .map_err(|e| StreamError::Config(format!("{}: {e}", path.display())))
        };
        let cfg = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => parse_json(s)?,
            Some("toml") => parse_toml(s)?,
            _ => parse_json(s).or_else(|_| parse_toml(s))?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> CoreResult<()> {
        if self.stream.done_sentinel.trim().is_empty() {
            return Err(StreamError::Config(
                "stream.done_sentinel must not be empty".into(),
            ));
        }
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(StreamError::Config(format!(
                "api.base_url must be an http(s) URL, got '{}'",
                self.api.base_url
            )));
        }
        Ok(())
    }
}
