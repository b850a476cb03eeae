//! Central configuration, loaded from `$HPS_HOME/client.json` when present

use std::path::{Path, PathBuf};
use std::time::Duration;

use hps_proto::ble::{BODY_MAX_OCTETS, DEVICE_NAME, HEADERS_MAX_OCTETS};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local name of the peripheral to scan for, matched case-insensitively
    pub device_name: String,
    pub connect_timeout_ms: u64,
    /// How long to wait for the status notification after the control write
    pub response_timeout_ms: u64,
    /// Cap on the encoded request headers
    pub headers_max_octets: usize,
    /// Cap on the request body written to the peripheral
    pub body_max_octets: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_name: DEVICE_NAME.to_string(),
            connect_timeout_ms: 5000,
            response_timeout_ms: 10000,
            headers_max_octets: HEADERS_MAX_OCTETS,
            body_max_octets: BODY_MAX_OCTETS,
        }
    }
}

impl Config {
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let path = default_path();
                if path.exists() {
                    Self::load(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_name.is_empty() {
            return Err(ConfigError::Invalid("device_name must not be empty"));
        }
        if self.headers_max_octets == 0 {
            return Err(ConfigError::Invalid("headers_max_octets must be positive"));
        }
        if self.body_max_octets == 0 {
            return Err(ConfigError::Invalid("body_max_octets must be positive"));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Whole seconds from the command line, clamped instead of overflowing
    pub fn set_response_timeout_secs(&mut self, secs: u64) {
        self.response_timeout_ms = secs.saturating_mul(1000);
    }
}

/// `$HPS_HOME/client.json`, defaulting `HPS_HOME` to `<config dir>/hps`
pub fn default_path() -> PathBuf {
    std::env::var("HPS_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("hps")
        })
        .join("client.json")
}
