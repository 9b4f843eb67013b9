//! Configuration for electrumx_rpc.
//!
//! The server address is resolved from, in order: the `-p/--port` flag, the
//! `RPC_PORT` environment variable, `~/.config/electrumx_rpc/config.toml`,
//! and finally the built-in defaults.

use serde::{Deserialize, Serialize};
use std::num::ParseIntError;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Environment variable holding the default RPC port.
pub const PORT_ENV: &str = "RPC_PORT";

/// Port used when neither the environment nor the config file names one.
pub const DEFAULT_PORT: u16 = 8000;

/// Host the client connects to unless the config file says otherwise.
pub const DEFAULT_HOST: &str = "localhost";

/// Errors raised while resolving configuration.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("invalid RPC_PORT value '{value}': {source}")]
    InvalidPort {
        value: String,
        #[source]
        source: ParseIntError,
    },
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: Arc<std::io::Error>,
    },
    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: Arc<toml::de::Error>,
    },
}

/// Contents of the optional config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    /// Host the server listens on.
    #[serde(default)]
    pub host: Option<String>,
    /// RPC port, used when `RPC_PORT` is unset.
    #[serde(default)]
    pub port: Option<u16>,
}

/// Resolved client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Host the dispatcher connects to.
    pub host: String,
    port_env: Option<String>,
    file_port: Option<u16>,
    /// Why the config file could not be used, reported if its port is needed.
    file_error: Option<ConfigError>,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_sources(None, FileConfig::default())
    }
}

impl Config {
    /// Get the config directory path.
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("electrumx_rpc"))
    }

    /// Get the config file path.
    pub fn config_path() -> Option<PathBuf> {
        Self::config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Load configuration from the environment and the config file.
    ///
    /// An unreadable config file does not fail here; the built-in host is
    /// used and the error surfaces from [`Config::default_port`].
    pub fn load() -> Self {
        let port_env = std::env::var(PORT_ENV).ok();
        let file = match Self::config_path() {
            Some(path) if path.exists() => Self::read_file(&path),
            _ => Ok(FileConfig::default()),
        };
        match file {
            Ok(file) => Self::from_sources(port_env, file),
            Err(e) => {
                debug!("Ignoring config file: {}", e);
                Self::from_broken_file(port_env, e)
            }
        }
    }

    /// Parse a config file.
    pub fn read_file(path: &Path) -> Result<FileConfig, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source: Arc::new(source),
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source: Arc::new(source),
        })
    }

    /// Combine the raw `RPC_PORT` value with the file settings.
    ///
    /// A blank `RPC_PORT` counts as unset.
    pub fn from_sources(port_env: Option<String>, file: FileConfig) -> Self {
        Self {
            host: file.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port_env: port_env.filter(|value| !value.trim().is_empty()),
            file_port: file.port,
            file_error: None,
        }
    }

    /// Like [`Config::from_sources`] for a config file that failed to load.
    pub fn from_broken_file(port_env: Option<String>, error: ConfigError) -> Self {
        Self {
            file_error: Some(error),
            ..Self::from_sources(port_env, FileConfig::default())
        }
    }

    /// The port to use when none was given on the command line.
    ///
    /// `RPC_PORT` is only parsed here, so a bad value (or a broken config
    /// file) is ignored when the port is passed explicitly.
    pub fn default_port(&self) -> Result<u16, ConfigError> {
        match &self.port_env {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|source| ConfigError::InvalidPort {
                    value: value.clone(),
                    source,
                }),
            None => match &self.file_error {
                Some(e) => Err(e.clone()),
                None => Ok(self.file_port.unwrap_or(DEFAULT_PORT)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.default_port().unwrap(), 8000);
    }

    #[test]
    fn test_env_port_wins_over_file() {
        let file = FileConfig {
            host: None,
            port: Some(50001),
        };
        let config = Config::from_sources(Some("8001".to_string()), file.clone());
        assert_eq!(config.default_port().unwrap(), 8001);

        let config = Config::from_sources(None, file);
        assert_eq!(config.default_port().unwrap(), 50001);
    }

    #[test]
    fn test_blank_env_port_is_unset() {
        let config = Config::from_sources(Some("  ".to_string()), FileConfig::default());
        assert_eq!(config.default_port().unwrap(), DEFAULT_PORT);
    }

    #[test]
    fn test_invalid_env_port() {
        for bad in ["eight", "70000", "-1"] {
            let config = Config::from_sources(Some(bad.to_string()), FileConfig::default());
            let err = config.default_port().unwrap_err();
            assert!(matches!(err, ConfigError::InvalidPort { .. }));
            assert!(err.to_string().contains(bad));
        }
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
host = "127.0.0.1"
port = 8002
"#;
        let file: FileConfig = toml::from_str(toml).unwrap();
        assert_eq!(file.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(file.port, Some(8002));

        let config = Config::from_sources(None, file);
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn test_broken_file_only_fails_port_lookup() {
        let err = ConfigError::Read {
            path: PathBuf::from("/nonexistent/config.toml"),
            source: Arc::new(std::io::Error::from(std::io::ErrorKind::PermissionDenied)),
        };
        let config = Config::from_broken_file(None, err.clone());
        assert_eq!(config.host, DEFAULT_HOST);
        assert!(matches!(config.default_port(), Err(ConfigError::Read { .. })));

        let config = Config::from_broken_file(Some("8004".to_string()), err);
        assert_eq!(config.default_port().unwrap(), 8004);
    }

    #[test]
    fn test_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "port = 8003\n").unwrap();
        let file = Config::read_file(&path).unwrap();
        assert_eq!(file.port, Some(8003));
        assert!(file.host.is_none());

        std::fs::write(&path, "port = \"not a port\"\n").unwrap();
        assert!(matches!(
            Config::read_file(&path),
            Err(ConfigError::Parse { .. })
        ));

        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            Config::read_file(&missing),
            Err(ConfigError::Read { .. })
        ));
    }
}
