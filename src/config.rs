//! Analysis configuration.
//!
//! Deserialised from the `[analysis]` table of a TOML file by the devkit
//! crate; every field has a default so an empty table is valid.

use serde::Deserialize;
use thiserror::Error;

use crate::enumerate::DEFAULT_EXHAUSTIVE_LIMIT;
use crate::layout::DEFAULT_PARAM_PREFIX;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Ceiling on enumerated key combinations before shaders are reported unknown.
    pub exhaustive_limit: u64,
    /// Display prefix for generated constant names.
    pub parameter_prefix: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            exhaustive_limit: DEFAULT_EXHAUSTIVE_LIMIT,
            parameter_prefix: DEFAULT_PARAM_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("exhaustive_limit must be at least 1")]
    ZeroLimit,
    #[error("parameter_prefix must not be empty")]
    EmptyPrefix,
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.exhaustive_limit == 0 {
            return Err(ConfigValidationError::ZeroLimit);
        }
        if self.parameter_prefix.trim().is_empty() {
            return Err(ConfigValidationError::EmptyPrefix);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = AnalysisConfig::default();
        assert_eq!(config.exhaustive_limit, 65_536);
        assert_eq!(config.parameter_prefix, "g_MaterialParameter");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_degenerate_values() {
        let zero = AnalysisConfig {
            exhaustive_limit: 0,
            ..Default::default()
        };
        assert_eq!(zero.validate(), Err(ConfigValidationError::ZeroLimit));

        let blank = AnalysisConfig {
            parameter_prefix: "  ".into(),
            ..Default::default()
        };
        assert_eq!(blank.validate(), Err(ConfigValidationError::EmptyPrefix));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: AnalysisConfig = serde_json::from_str(r#"{ "exhaustive_limit": 8 }"#).unwrap();
        assert_eq!(config.exhaustive_limit, 8);
        assert_eq!(config.parameter_prefix, DEFAULT_PARAM_PREFIX);
    }
}
