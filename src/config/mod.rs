//! Configuration Module
//!
//! Provides TOML-based configuration for sensorctl with support for:
//! - Broker address and connection parameters
//! - Device credentials (username and a JWT password, given or minted)
//! - Target device hostname for OTA notifications
//! - Firmware server settings
//! - Environment variable overrides (SENSORCTL__* prefix)

use std::net::{Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;

use crate::codec::MAX_FIELD_LENGTH;
use crate::protocol::ConnectRequest;
use crate::token::{self, DeviceClaims, TokenError, DEFAULT_LIFETIME};

/// Substitute environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").expect("static regex");
    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}


/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Config crate error
    Config(config::ConfigError),
    /// Validation error
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,
    /// Broker connection
    pub broker: BrokerConfig,
    /// Credentials presented in CONNECT
    pub credentials: CredentialsConfig,
    /// Target device
    pub device: DeviceConfig,
    /// Firmware server
    pub firmware: FirmwareConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Broker connection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Broker address (host:port or just host)
    #[serde(default = "default_broker_address")]
    pub address: String,
    /// Connect and reply timeout
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Keep alive in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive: u16,
    /// Ask the broker to discard prior session state
    #[serde(default = "default_true")]
    pub clean_session: bool,
}

fn default_broker_address() -> String {
    "localhost:1883".to_string()
}
fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_keep_alive() -> u16 {
    60
}
fn default_true() -> bool {
    true
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            address: default_broker_address(),
            connect_timeout: default_connect_timeout(),
            keep_alive: default_keep_alive(),
            clean_session: true,
        }
    }
}

impl BrokerConfig {
    /// Address with the default MQTT port applied when none is given.
    ///
    /// A bare IPv6 literal is bracketed first.
    pub fn socket_address(&self) -> String {
        if let Ok(ip) = self.address.parse::<Ipv6Addr>() {
            return format!("[{}]:1883", ip);
        }
        if let Some((_, port)) = self.address.rsplit_once(':') {
            if port.parse::<u16>().is_ok() {
                return self.address.clone();
            }
        }
        format!("{}:1883", self.address)
    }
}

/// Credentials configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Client identifier
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Username, typically the device MAC without separators
    pub username: Option<String>,
    /// Password, typically a JWT
    pub password: Option<String>,
    /// HS256 secret used to mint a token when no password is set
    pub jwt_secret: Option<String>,
    /// Lifetime of minted tokens
    #[serde(default = "default_token_lifetime", with = "humantime_serde")]
    pub token_lifetime: Duration,
}

fn default_token_lifetime() -> Duration {
    DEFAULT_LIFETIME
}

fn default_client_id() -> String {
    format!("sensorctl-{}", std::process::id())
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            username: None,
            password: None,
            jwt_secret: None,
            token_lifetime: default_token_lifetime(),
        }
    }
}

/// Target device configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Device hostname, the prefix of its topics
    pub hostname: Option<String>,
    /// `device_id` claim of minted tokens
    #[serde(default = "default_device_id")]
    pub device_id: String,
}

fn default_device_id() -> String {
    "esp32s3_sensor_01".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            hostname: None,
            device_id: default_device_id(),
        }
    }
}

/// Firmware server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FirmwareConfig {
    /// Directory holding images and the version manifest
    #[serde(default = "default_firmware_dir")]
    pub dir: PathBuf,
    /// HTTP bind address
    #[serde(default = "default_firmware_bind")]
    pub bind: SocketAddr,
    /// Public base URL written into a generated manifest
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_firmware_dir() -> PathBuf {
    PathBuf::from("firmware")
}
fn default_firmware_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}
fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

impl Default for FirmwareConfig {
    fn default() -> Self {
        Self {
            dir: default_firmware_dir(),
            bind: default_firmware_bind(),
            base_url: default_base_url(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file with environment variable overrides.
    ///
    /// Supports two forms of environment variable usage:
    /// 1. In-file substitution: `${VAR}` or `${VAR:-default}` syntax in the TOML file
    /// 2. Override via env vars: `SENSORCTL__` prefix with double underscores for nesting:
    ///    - `SENSORCTL__BROKER__ADDRESS=192.168.1.48:1883` overrides `broker.address`
    ///    - `SENSORCTL__CREDENTIALS__PASSWORD=eyJ...` overrides `credentials.password`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("log.level", "info")?
            .set_default("broker.address", "localhost:1883")?
            .set_default("broker.connect_timeout", "5s")?
            .set_default("broker.keep_alive", 60)?
            .set_default("broker.clean_session", true)?
            .set_default("credentials.token_lifetime", "1h")?
            .set_default("device.device_id", "esp32s3_sensor_01")?
            .set_default("firmware.dir", "firmware")?
            .set_default("firmware.bind", "0.0.0.0:8080")?
            .set_default("firmware.base_url", "http://localhost:8080")?;

        // Load from file with env var substitution
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let substituted = substitute_env_vars(&content);
                builder = builder.add_source(File::from_str(&substituted, FileFormat::Toml));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File doesn't exist, use defaults
            }
            Err(e) => return Err(ConfigError::Io(e)),
        }

        let cfg = builder
            .add_source(
                Environment::with_prefix("SENSORCTL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = cfg.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides only (no file).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Path::new(""))
    }

    /// Parse configuration from a string (for testing, no env var support)
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.address.trim().is_empty() {
            return Err(ConfigError::Validation(
                "broker.address must not be empty".to_string(),
            ));
        }

        if self.broker.connect_timeout.is_zero() {
            return Err(ConfigError::Validation(
                "broker.connect_timeout must be greater than zero".to_string(),
            ));
        }

        if self.credentials.client_id.is_empty() {
            return Err(ConfigError::Validation(
                "credentials.client_id must not be empty".to_string(),
            ));
        }

        let fields = [
            ("credentials.client_id", Some(&self.credentials.client_id)),
            ("credentials.username", self.credentials.username.as_ref()),
            ("credentials.password", self.credentials.password.as_ref()),
            ("credentials.jwt_secret", self.credentials.jwt_secret.as_ref()),
        ];
        for (name, value) in fields {
            if let Some(value) = value {
                if value.len() > MAX_FIELD_LENGTH {
                    return Err(ConfigError::Validation(format!(
                        "{} is {} bytes, MQTT allows at most {}",
                        name,
                        value.len(),
                        MAX_FIELD_LENGTH
                    )));
                }
            }
        }

        let has_password =
            self.credentials.password.is_some() || self.credentials.jwt_secret.is_some();
        if has_password && self.credentials.username.is_none() {
            // MQTT-3.1.2-22
            return Err(ConfigError::Validation(
                "credentials.password and credentials.jwt_secret require credentials.username"
                    .to_string(),
            ));
        }

        if self.credentials.jwt_secret.is_some() && self.credentials.token_lifetime.is_zero() {
            return Err(ConfigError::Validation(
                "credentials.token_lifetime must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Claims for a token issued at `now`.
    ///
    /// The subject is the device hostname, or the client id when no hostname
    /// is configured.
    pub fn device_claims(&self, now: u64) -> DeviceClaims {
        let hostname = self
            .device
            .hostname
            .as_deref()
            .unwrap_or(&self.credentials.client_id);
        DeviceClaims::new(
            hostname,
            self.device.device_id.as_str(),
            self.credentials.username.as_deref().unwrap_or_default(),
            now,
            self.credentials.token_lifetime,
        )
    }

    /// The configured password, or a token minted from `jwt_secret`
    pub fn password(&self) -> Result<Option<String>, TokenError> {
        if let Some(password) = &self.credentials.password {
            return Ok(Some(password.clone()));
        }
        match &self.credentials.jwt_secret {
            Some(secret) => {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                let token = token::mint(&self.device_claims(now), secret.as_bytes())?;
                Ok(Some(token))
            }
            None => Ok(None),
        }
    }

    /// Build the CONNECT request described by this configuration
    pub fn connect_request(&self) -> Result<ConnectRequest, TokenError> {
        Ok(ConnectRequest {
            client_id: self.credentials.client_id.clone(),
            username: self.credentials.username.clone(),
            password: self.password()?.map(Into::into),
            keep_alive: self.broker.keep_alive,
            clean_session: self.broker.clean_session,
        })
    }
}
