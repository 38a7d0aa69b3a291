//! Process configuration (`config.toml`).

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Top-level process configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub system: SystemConfig,
}

/// Listener and filesystem layout.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the client listener binds to.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Directory holding `users/` and the MOTD file.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> ServerConfig {
        ServerConfig {
            listen: default_listen(),
            data_dir: default_data_dir(),
        }
    }
}

/// System-wide session policy, shared by every account.
#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    /// Store and compare passwords as MD5 hex digests (legacy format).
    #[serde(default)]
    pub md5: bool,
    /// Minimum spacing in seconds between any two outbound server
    /// connection attempts, process-wide.
    #[serde(default = "default_interval")]
    pub interval: u64,
    /// Default bind address for outbound connections; per-account
    /// `user.ip` overrides it.
    #[serde(default)]
    pub vhost: Option<String>,
    /// One-line message of the day, delivered as a notice on attach.
    #[serde(default)]
    pub motd: Option<String>,
    /// Fallback realname for accounts without `user.realname`.
    #[serde(default = "default_realname")]
    pub realname: String,
    /// Enable the certificate allow list subsystem. When off, every
    /// account gets a no-op certificate store with the same interface.
    #[serde(default = "default_true")]
    pub certificates: bool,
}

impl Default for SystemConfig {
    fn default() -> SystemConfig {
        SystemConfig {
            md5: false,
            interval: default_interval(),
            vhost: None,
            motd: None,
            realname: default_realname(),
            certificates: default_true(),
        }
    }
}

impl Config {
    /// Load configuration from a toml file. A missing file yields the
    /// defaults so a fresh install starts without ceremony.
    pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Config::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Directory that holds per-account `.conf`, `.log` and `.pem` files.
    pub fn users_dir(&self) -> PathBuf {
        self.server.data_dir.join("users")
    }

    /// Path of the global MOTD file played on attach.
    pub fn motd_path(&self) -> PathBuf {
        self.server.data_dir.join("ironbnc.motd")
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

fn default_listen() -> String {
    "127.0.0.1:9000".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_interval() -> u64 {
    15
}

fn default_realname() -> String {
    "ironbnc user".to_string()
}

fn default_true() -> bool {
    true
}
