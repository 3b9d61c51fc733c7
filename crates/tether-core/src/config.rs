//! Configuration module for tether services.
//!
//! Configuration is resolved once at startup, in increasing precedence:
//! built-in defaults, an optional TOML file named by `TETHER_CONFIG`, then
//! `TETHER__SECTION__KEY` environment variables (for example
//! `TETHER__STORE__BACKEND=redis`). The plain `INSTANCE_ID` and `REDIS_URL`
//! variables are honored as fallbacks when the corresponding settings were
//! left at their defaults.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, TetherError};

/// Environment variable naming an optional TOML configuration file.
pub const CONFIG_PATH_ENV: &str = "TETHER_CONFIG";

/// Prefix for structured environment overrides.
const ENV_PREFIX: &str = "TETHER";

/// Instance id used when none is configured.
pub const DEFAULT_INSTANCE_ID: &str = "unknown";

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// The address to bind the HTTP server to.
    #[serde(default = "default_address")]
    pub address: SocketAddr,
    /// Identity reported in every response ("which server answered").
    #[serde(default = "default_instance_id")]
    pub instance_id: String,
}

fn default_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8000))
}

fn default_instance_id() -> String {
    DEFAULT_INSTANCE_ID.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { address: default_address(), instance_id: default_instance_id() }
    }
}

/// Which session store implementation to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Volatile in-process store (single instance only).
    #[default]
    Memory,
    /// Shared networked store.
    Redis,
}

/// Session store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Backend selection.
    #[serde(default)]
    pub backend: StoreBackend,
    /// Connection URL for the networked backend (e.g. `redis://localhost:6379`).
    #[serde(default)]
    pub url: Option<String>,
    /// Per-command timeout for the networked backend, in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    2000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { backend: StoreBackend::default(), url: None, timeout_ms: default_timeout_ms() }
    }
}

/// Session lifetime configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Idle seconds after the last write before a session's state expires.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_ttl_secs() -> u64 {
    1800 // 30 minutes, matches the load balancer's affinity table expiry
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl_secs: default_ttl_secs() }
    }
}

impl SessionConfig {
    /// Session TTL as a duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Root configuration for tether.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Session store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Session lifetime configuration.
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML for this schema or
    /// fails validation.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| TetherError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the file named by `TETHER_CONFIG` (if any)
    /// and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or validation fails.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    /// Load configuration from an explicit file (if any) and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or validation fails.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: Self = builder
            .build()
            .and_then(config::Config::try_deserialize)
            .map_err(|e| TetherError::Config(e.to_string()))?;
        config.apply_fallback_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Fill defaulted settings from the plain `INSTANCE_ID` / `REDIS_URL`
    /// variables, looked up through `lookup`.
    pub fn apply_fallback_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.server.instance_id == DEFAULT_INSTANCE_ID {
            if let Some(id) = lookup("INSTANCE_ID").filter(|id| !id.is_empty()) {
                self.server.instance_id = id;
            }
        }
        if self.store.backend == StoreBackend::Memory && self.store.url.is_none() {
            if let Some(url) = lookup("REDIS_URL").filter(|url| !url.is_empty()) {
                self.store.backend = StoreBackend::Redis;
                self.store.url = Some(url);
            }
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `TetherError::Config` if any value is unusable.
    pub fn validate(&self) -> Result<()> {
        if self.session.ttl_secs == 0 {
            return Err(TetherError::Config("session.ttl_secs must be greater than 0".to_string()));
        }
        if self.store.timeout_ms == 0 {
            return Err(TetherError::Config("store.timeout_ms must be greater than 0".to_string()));
        }
        if self.store.backend == StoreBackend::Redis
            && self.store.url.as_deref().is_none_or(str::is_empty)
        {
            return Err(TetherError::Config("store.url is required for the redis backend".to_string()));
        }
        if self.server.instance_id.trim().is_empty() {
            return Err(TetherError::Config("server.instance_id must not be empty".to_string()));
        }
        Ok(())
    }
}
