//! Loader for YAML documents such as the notification settings file.
//!
//! Documents are parsed with `serde_yaml`, so keys keep their case and may
//! contain dots (`defaultTriggers`, `example.com/team`).

use std::{fs, path::PathBuf, time::SystemTime};

use serde::de::DeserializeOwned;
use thiserror::Error;

/// Errors that can occur while loading a YAML document.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The file could not be read.
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    /// The file is not valid YAML or does not match the expected shape.
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// The requested top-level key is absent.
    #[error("Missing key '{0}'")]
    MissingKey(String),

    /// The file extension is neither `.yaml` nor `.yml`.
    #[error("Unsupported configuration format")]
    UnsupportedFormat,
}

/// Reads and deserializes a single YAML file.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    /// Creates a loader for the file at `path`.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The file this loader reads.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Deserializes the whole document into `T`. An empty file reads as an
    /// empty mapping.
    pub fn load<T: DeserializeOwned>(&self) -> Result<T, LoaderError> {
        Ok(serde_yaml::from_value(self.read()?)?)
    }

    /// Deserializes the value under the top-level `key` into `T`.
    pub fn load_key<T: DeserializeOwned>(&self, key: &str) -> Result<T, LoaderError> {
        let value = self.read()?.get(key).cloned().ok_or_else(|| LoaderError::MissingKey(key.to_string()))?;
        Ok(serde_yaml::from_value(value)?)
    }

    /// Last modification time of the file, used to detect edits.
    pub fn modified(&self) -> Result<SystemTime, LoaderError> {
        Ok(fs::metadata(&self.path)?.modified()?)
    }

    fn read(&self) -> Result<serde_yaml::Value, LoaderError> {
        if !self.is_yaml_file() {
            return Err(LoaderError::UnsupportedFormat);
        }
        let source = fs::read_to_string(&self.path)?;
        match serde_yaml::from_str(&source)? {
            serde_yaml::Value::Null => Ok(serde_yaml::Value::Mapping(Default::default())),
            value => Ok(value),
        }
    }

    fn is_yaml_file(&self) -> bool {
        matches!(self.path.extension().and_then(|ext| ext.to_str()), Some("yaml") | Some("yml"))
    }
}
