//! TOML configuration parser for devkit config files.

use serde::Deserialize;
use shpk_resolve::{AnalysisConfig, ConfigValidationError};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Parsed devkit configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisConfigFile {
    /// Settings handed to `MaterialAnalysis::compute`
    pub analysis: AnalysisConfig,
    /// Directory of overlay documents, relative paths resolved against the config file
    pub overlay_dir: Option<PathBuf>,
}

/// Raw TOML structure.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawConfigFile {
    analysis: AnalysisConfig,
    devkit: RawDevkit,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RawDevkit {
    overlay_dir: Option<PathBuf>,
}

impl AnalysisConfigFile {
    /// Parse from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_str(&content)?;

        if let Some(dir) = &config.overlay_dir
            && dir.is_relative()
            && let Some(base) = path.parent()
        {
            config.overlay_dir = Some(base.join(dir));
        }
        Ok(config)
    }

    /// Parse from a TOML string.
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let raw: RawConfigFile = toml::from_str(content)?;
        raw.analysis.validate()?;
        Ok(Self {
            analysis: raw.analysis,
            overlay_dir: raw.devkit.overlay_dir,
        })
    }
}

/// Errors from loading a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("validation error: {0}")]
    Validation(#[from] ConfigValidationError),
}
