//! Peripheral configuration, loaded from `$HPS_HOME/server.json` when present

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
    /// Local name to advertise
    pub device_name: String,
    /// Cap on the encoded response headers, beyond it HeadersTruncated is set
    pub headers_max_octets: usize,
    /// Cap on the response body, beyond it BodyTruncated is set
    pub body_max_octets: usize,
    /// Upper bound on one upstream HTTP exchange
    pub upstream_timeout_secs: u64,
    /// How long to advertise, 0 for indefinitely
    pub advertise_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_name: DEVICE_NAME.to_string(),
            headers_max_octets: HEADERS_MAX_OCTETS,
            body_max_octets: BODY_MAX_OCTETS,
            upstream_timeout_secs: 30,
            advertise_secs: 0,
        }
    }
}

impl Config {
    /// Load from `path`, or from the default location if it exists, falling
    /// back to defaults otherwise
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
        if self.headers_max_octets == 0 || self.body_max_octets == 0 {
            return Err(ConfigError::Invalid("size caps must be positive"));
        }
        if self.upstream_timeout_secs == 0 {
            return Err(ConfigError::Invalid("upstream_timeout_secs must be positive"));
        }
        Ok(())
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }

    /// None means advertise until interrupted
    pub fn advertise_duration(&self) -> Option<Duration> {
        (self.advertise_secs > 0).then(|| Duration::from_secs(self.advertise_secs))
    }
}

/// `$HPS_HOME/server.json`, defaulting `HPS_HOME` to `<config dir>/hps`
pub fn default_path() -> PathBuf {
    hps_home().join("server.json")
}

fn hps_home() -> PathBuf {
    std::env::var("HPS_HOME").map(PathBuf::from).unwrap_or_else(|_| {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("hps")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config: Config = serde_json::from_str(r#"{"device_name": "Gopher"}"#).unwrap();
        assert_eq!(config.device_name, "Gopher");
        assert_eq!(config.headers_max_octets, 512);
        assert_eq!(config.body_max_octets, 512);
        assert_eq!(config.upstream_timeout(), Duration::from_secs(30));
        assert_eq!(config.advertise_duration(), None);
    }

    #[test]
    fn load_rejects_zero_caps() {
        let path = std::env::temp_dir().join(format!("hps-server-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"body_max_octets": 0}"#).unwrap();
        let err = Config::load(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn load_reports_parse_errors() {
        let path = std::env::temp_dir().join(format!("hps-server-bad-{}.json", std::process::id()));
        std::fs::write(&path, "not json").unwrap();
        let err = Config::load(&path).unwrap_err();
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
