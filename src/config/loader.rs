//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::raw::RawConfig;
use crate::config::schema::DaemonSettings;
use crate::config::validation::{validate_settings, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load and validate daemon settings from a TOML file.
pub fn load_settings(path: &Path) -> Result<DaemonSettings, ConfigError> {
    let content = read(path)?;
    let settings: DaemonSettings = toml::from_str(&content)?;

    validate_settings(&settings).map_err(ConfigError::Validation)?;

    Ok(settings)
}

/// Something that can produce a fresh raw snapshot on demand.
pub trait RawSourceLoader: Send + Sync {
    fn load(&self) -> Result<RawConfig, ConfigError>;

    /// Human-readable origin, for logs.
    fn describe(&self) -> String;
}

/// Loads the raw source from a TOML file, from scratch on every call.
#[derive(Debug, Clone)]
pub struct FileLoader {
    path: PathBuf,
}

impl FileLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RawSourceLoader for FileLoader {
    fn load(&self) -> Result<RawConfig, ConfigError> {
        let content = read(&self.path)?;
        RawConfig::from_toml_str(&content)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
