use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

/// Base URL used when the config file does not name an endpoint.
pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1";

/// Errors that can occur while loading or saving configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML.
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Failed to write the configuration file.
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "Failed to read config at {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(
                    f,
                    "Failed to parse config at {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Write { path, source } => {
                write!(
                    f,
                    "Failed to write config at {}: {}",
                    path.display(),
                    source
                )
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::Read { source, .. } | ConfigError::Write { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

#[derive(Serialize, Deserialize, Default, Clone, Debug)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl Config {
    /// Load from the platform config directory; a missing file is an empty
    /// config, not an error.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from_path(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_owned(),
            source,
        })
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let Some(path) = Self::config_path() else {
            return Err(ConfigError::Write {
                path: PathBuf::from("<config dir>"),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no platform config directory available",
                ),
            });
        };
        self.save_to_path(&path)
    }

    /// Write the config atomically: serialize to a sibling temp file, then
    /// rename over the destination.
    pub fn save_to_path(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source: std::io::Error| ConfigError::Write {
            path: path.to_owned(),
            source,
        };

        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(write_err)?;

        let serialized = toml::to_string_pretty(self).map_err(|source| ConfigError::Write {
            path: path.to_owned(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, source),
        })?;

        let mut temp_file = NamedTempFile::new_in(parent).map_err(write_err)?;
        temp_file.write_all(serialized.as_bytes()).map_err(write_err)?;
        temp_file.flush().map_err(write_err)?;
        temp_file
            .persist(path)
            .map_err(|err| write_err(err.error))?;
        Ok(())
    }

    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("org", "permacommons", "causerie")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Endpoint base URL, falling back to the OpenAI-compatible default.
    pub fn base_url(&self) -> &str {
        self.api_url.as_deref().unwrap_or(DEFAULT_API_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_api_url_falls_back_to_default() {
        let config = Config::default();
        assert_eq!(config.base_url(), DEFAULT_API_URL);
    }

    #[test]
    fn configured_api_url_wins() {
        let config = Config {
            api_url: Some("https://llm.example.net/v2".to_string()),
        };
        assert_eq!(config.base_url(), "https://llm.example.net/v2");
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = Config {
            api_url: Some("https://llm.example.net/v1".to_string()),
        };
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.api_url.as_deref(), Some("https://llm.example.net/v1"));
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "api_url = [not toml").unwrap();

        match Config::load_from_path(&path) {
            Err(ConfigError::Parse { .. }) => {}
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn empty_config_serializes_without_nulls() {
        let serialized = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(!serialized.contains("api_url"));
    }
}
