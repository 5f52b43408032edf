use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    common::{Result, SourceError},
    configs::*,
};

const CONFIG_PATHS: [&str; 2] = ["media-source.toml", "media-source.default.toml"];

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    pub logging: Option<LoggingConfig>,
}

impl Config {
    /// Loads the first config file found in the working directory, or the
    /// defaults when there is none.
    pub fn load() -> Result<Self> {
        match CONFIG_PATHS.iter().map(Path::new).find(|p| p.exists()) {
            Some(path) => Self::from_path(path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path)
            .map_err(|e| SourceError::Config(format!("{}: {}", path.display(), e)))?;
        if config_str.trim().is_empty() {
            return Err(SourceError::Config(format!("{} is empty", path.display())));
        }
        Self::parse(&config_str)
    }

    pub fn parse(config_str: &str) -> Result<Self> {
        toml::from_str(config_str).map_err(|e| SourceError::Config(e.to_string()))
    }
}
