//! Client configuration
//! Reads the server pairing details from the environment at construction
//! time; the runtime itself never touches files or environment variables.

use std::env;

use crate::error::{CompanionError, Result};
use crate::identity::ServerIdentity;

/// Everything needed to construct a client for one server pairing.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub identity: ServerIdentity,
    /// Chat prefix that marks messages as commands; `None` disables command
    /// dispatch entirely.
    pub command_prefix: Option<String>,
    /// Relay settings for servers not directly reachable.
    pub proxy: Option<ProxyConfig>,
}

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Base URL of the relay, e.g. `wss://relay.example.com`.
    pub base_url: String,
    /// HTTP endpoint answering the relay version query.
    pub version_url: String,
}

impl ClientConfig {
    pub fn new(identity: ServerIdentity) -> Self {
        Self {
            identity,
            command_prefix: None,
            proxy: None,
        }
    }

    pub fn with_command_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.command_prefix = Some(prefix.into());
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Load configuration from the environment (and a `.env` file when
    /// present). Malformed values abort startup with a `ConfigError`.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let host = require_env("COMPANION_HOST")?;
        let port = match env::var("COMPANION_PORT") {
            Ok(raw) => Some(raw.parse::<u16>().map_err(|_| {
                CompanionError::ConfigError(format!("COMPANION_PORT is not a valid port: {}", raw))
            })?),
            Err(_) => None,
        };
        let account_id = require_env("COMPANION_ACCOUNT_ID")?
            .parse::<u64>()
            .map_err(|_| {
                CompanionError::ConfigError("COMPANION_ACCOUNT_ID must be numeric".to_string())
            })?;
        let account_token = require_env("COMPANION_ACCOUNT_TOKEN")?
            .parse::<i64>()
            .map_err(|_| {
                CompanionError::ConfigError("COMPANION_ACCOUNT_TOKEN must be numeric".to_string())
            })?;
        let secure = env::var("COMPANION_SECURE")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let mut config = Self::new(ServerIdentity::new(
            host,
            port,
            account_id,
            account_token,
            secure,
        ));

        if let Ok(prefix) = env::var("COMPANION_COMMAND_PREFIX") {
            if !prefix.is_empty() {
                config.command_prefix = Some(prefix);
            }
        }

        if let (Ok(base_url), Ok(version_url)) = (
            env::var("COMPANION_PROXY_URL"),
            env::var("COMPANION_PROXY_VERSION_URL"),
        ) {
            config.proxy = Some(ProxyConfig {
                base_url,
                version_url,
            });
        }

        Ok(config)
    }
}

fn require_env(name: &str) -> Result<String> {
    env::var(name)
        .map_err(|_| CompanionError::ConfigError(format!("{} must be set", name)))
}
