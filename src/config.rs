//! `key=value` configuration files, one per binary role.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::smtp::auth::Credential;

/// Sample credential pair used when a config file does not provision one.
pub const SAMPLE_IDENTITY: &str = "7D444D";
pub const SAMPLE_SECRET: &str = "b4b52156ba5213240a2315b0bc5412ed";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Unreadable {
        path: String,
        source: std::io::Error,
    },

    #[error("missing required key `{0}`")]
    MissingKey(&'static str),

    #[error("`{0}` must be a TCP port number")]
    InvalidPort(&'static str),

    #[error("`{0}` must name an existing directory")]
    NotADirectory(&'static str),
}

/// Parse a config file into its key/value pairs. Lines without `=` are
/// ignored; a repeated key keeps its last value.
pub fn read_config(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
        path: path.display().to_string(),
        source,
    })?;
    let mut values = HashMap::new();
    for line in text.lines() {
        if let Some((key, value)) = line.trim().split_once('=') {
            values.insert(key.to_string(), value.to_string());
        }
    }
    Ok(values)
}

fn require_port(values: &HashMap<String, String>, key: &'static str) -> Result<u16, ConfigError> {
    let value = values.get(key).ok_or(ConfigError::MissingKey(key))?;
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(ConfigError::InvalidPort(key));
    }
    value.parse().map_err(|_| ConfigError::InvalidPort(key))
}

fn require_dir(values: &HashMap<String, String>, key: &'static str) -> Result<PathBuf, ConfigError> {
    let value = values.get(key).ok_or(ConfigError::MissingKey(key))?;
    let path = expand_user(value);
    if !path.is_dir() {
        return Err(ConfigError::NotADirectory(key));
    }
    Ok(path)
}

fn expand_user(value: &str) -> PathBuf {
    if let Some(rest) = value.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(value)
}

fn credential(values: &HashMap<String, String>) -> Credential {
    let identity = values
        .get("personal_id")
        .map_or(SAMPLE_IDENTITY, String::as_str);
    let secret = values
        .get("personal_secret")
        .map_or(SAMPLE_SECRET, String::as_str);
    Credential::new(identity, secret)
}

/// Configuration for the receiving servers.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub inbox_dir: PathBuf,
    pub credential: Credential,
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let values = read_config(path)?;
        Ok(Self {
            port: require_port(&values, "server_port")?,
            inbox_dir: require_dir(&values, "inbox_path")?,
            credential: credential(&values),
        })
    }
}

/// Configuration for the batch submission client.
#[derive(Debug, Clone)]
pub struct SendConfig {
    pub server_port: u16,
    pub send_dir: PathBuf,
    pub credential: Credential,
}

impl SendConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let values = read_config(path)?;
        Ok(Self {
            server_port: require_port(&values, "server_port")?,
            send_dir: require_dir(&values, "send_path")?,
            credential: credential(&values),
        })
    }
}

/// Configuration for the relay: where the real server listens, where we
/// listen for the real client, and where spied transactions land.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub server_port: u16,
    pub client_port: u16,
    pub spy_dir: PathBuf,
}

impl RelayConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let values = read_config(path)?;
        Ok(Self {
            server_port: require_port(&values, "server_port")?,
            client_port: require_port(&values, "client_port")?,
            spy_dir: require_dir(&values, "spy_path")?,
        })
    }
}
