//! File loading for shpk-resolve.
//!
//! This crate provides tools for:
//! - Parsing devkit config files (`[analysis]` and `[devkit]` tables)
//! - Parsing overlay documents (JSON)
//! - Keeping a directory of overlays, one per shader package, reloadable
//!
//! # Usage
//!
//! ```ignore
//! let config = shpk_resolve_devkit::load_config("devkit.toml")?;
//! let library = OverlayLibrary::open(config.overlay_dir.unwrap_or_default())?;
//! let analysis = MaterialAnalysis::compute(
//!     &state,
//!     &material,
//!     library.get("character").as_deref(),
//!     &config.analysis,
//! );
//! ```

mod config_file;
mod library;

pub use config_file::{AnalysisConfigFile, ConfigError};
pub use library::OverlayLibrary;

use shpk_resolve::{OverlayError, OverlayTree};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Load a devkit config file.
pub fn load_config(path: impl AsRef<Path>) -> Result<AnalysisConfigFile, DevkitError> {
    let path = path.as_ref();
    let config = AnalysisConfigFile::from_file(path)?;
    info!(
        path = %path.display(),
        exhaustive_limit = config.analysis.exhaustive_limit,
        "config loaded"
    );
    Ok(config)
}

/// Load one overlay document.
///
/// Entries dropped while parsing are logged; only an unreadable file or a
/// document that is not a JSON object fails.
pub fn load_overlay(path: impl AsRef<Path>) -> Result<OverlayTree, DevkitError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| DevkitError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let tree = parse_overlay(&content).map_err(|source| DevkitError::Overlay {
        path: path.to_path_buf(),
        source,
    })?;
    if !tree.diagnostics().is_empty() {
        warn!(
            path = %path.display(),
            dropped = tree.diagnostics().len(),
            "overlay has malformed entries"
        );
    }
    Ok(tree)
}

/// Parse an overlay document from a JSON string.
#[inline]
pub fn parse_overlay(content: &str) -> Result<OverlayTree, OverlayError> {
    OverlayTree::from_json_str(content)
}

/// Errors that can occur while loading devkit files.
#[derive(Debug, Error)]
pub enum DevkitError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid overlay {}: {source}", path.display())]
    Overlay {
        path: PathBuf,
        #[source]
        source: OverlayError,
    },
}
