//! Global configuration parsing, validation, and secret loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// Environment variable holding the continuation-token signing secret.
pub const TOKEN_SECRET_ENV: &str = "PI_PULL_NEXT_SECRET";

/// Development fallback used when [`TOKEN_SECRET_ENV`] is absent.
const DEV_TOKEN_SECRET: &str = "changeme-secret";

/// Which identity-verification variant the transport layer enforces.
///
/// Both variants produce the same verified-identity result; they differ only
/// in which request header carries the caller's subject.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IdentityMode {
    /// Trust the client-certificate subject forwarded by the TLS-terminating
    /// proxy.
    ForwardedCertificate,
    /// Trust a simulation header, for environments without mTLS.
    HeaderSimulation,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,
    /// Listen port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    4000
}

/// Identity-verification and token-signing settings.
///
/// The signing secret is loaded at runtime from the environment, not from
/// the TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SecurityConfig {
    /// Whether a verified identity is required on every request.
    #[serde(default)]
    pub mtls_required: bool,
    /// Which identity-verification variant is active.
    #[serde(default = "default_identity_mode")]
    pub identity_mode: IdentityMode,
    /// Continuation-token signing secret (populated at runtime).
    #[serde(skip)]
    pub token_secret: String,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            mtls_required: false,
            identity_mode: default_identity_mode(),
            token_secret: String::new(),
        }
    }
}

fn default_identity_mode() -> IdentityMode {
    IdentityMode::HeaderSimulation
}

/// Stream-protocol tuning knobs.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct StreamConfig {
    /// Deployment region scoping stream and cursor keys.
    #[serde(default = "default_region")]
    pub region: String,
    /// Thread-slot lease TTL in seconds.
    #[serde(default = "default_slot_ttl_seconds")]
    pub slot_ttl_seconds: u64,
    /// Continuation-token validity window in seconds.
    #[serde(default = "default_token_ttl_seconds")]
    pub token_ttl_seconds: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            slot_ttl_seconds: default_slot_ttl_seconds(),
            token_ttl_seconds: default_token_ttl_seconds(),
        }
    }
}

fn default_region() -> String {
    "sa-east-1".into()
}

fn default_slot_ttl_seconds() -> u64 {
    30
}

fn default_token_ttl_seconds() -> u64 {
    300
}

fn default_service_name() -> String {
    "pix-outgoing-stream".into()
}

fn default_environment() -> String {
    "development".into()
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Service name reported by the health endpoint and logs.
    #[serde(default = "default_service_name")]
    pub service_name: String,
    /// Deployment environment label.
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Path to the `SQLite` database file, or `:memory:`.
    pub db_path: PathBuf,
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Identity and token-signing settings.
    #[serde(default)]
    pub security: SecurityConfig,
    /// Stream-protocol settings.
    #[serde(default)]
    pub stream: StreamConfig,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the token-signing secret from [`TOKEN_SECRET_ENV`].
    ///
    /// Falls back to a development default with a warning when the variable
    /// is absent or empty; production deployments must set it.
    pub fn load_secret(&mut self) {
        match env::var(TOKEN_SECRET_ENV) {
            Ok(value) if !value.is_empty() => self.security.token_secret = value,
            _ => {
                warn!(
                    env = TOKEN_SECRET_ENV,
                    "token secret not set, using development default"
                );
                self.security.token_secret = DEV_TOKEN_SECRET.into();
            }
        }
    }

    /// Thread-slot lease TTL.
    #[must_use]
    pub fn slot_ttl(&self) -> Duration {
        Duration::from_secs(self.stream.slot_ttl_seconds)
    }

    /// Continuation-token validity window.
    #[must_use]
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.stream.token_ttl_seconds)
    }

    /// `SQLite` connection URL derived from `db_path`.
    #[must_use]
    pub fn db_url(&self) -> String {
        if self.db_path.as_os_str() == ":memory:" {
            "sqlite::memory:".into()
        } else {
            format!("sqlite://{}?mode=rwc", self.db_path.display())
        }
    }

    fn validate(&self) -> Result<()> {
        if self.stream.slot_ttl_seconds == 0 {
            return Err(AppError::Config(
                "stream.slot_ttl_seconds must be greater than zero".into(),
            ));
        }
        if self.stream.token_ttl_seconds == 0 {
            return Err(AppError::Config(
                "stream.token_ttl_seconds must be greater than zero".into(),
            ));
        }
        if self.db_path.as_os_str().is_empty() {
            return Err(AppError::Config("db_path must not be empty".into()));
        }
        Ok(())
    }
}
