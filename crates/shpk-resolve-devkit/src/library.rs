//! Directory of overlay documents, one per shader package.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use shpk_resolve::OverlayTree;
use tracing::{info, warn};

use crate::{DevkitError, load_overlay};

/// Overlay documents indexed by file stem.
///
/// A document named `character.json` is the overlay of the `character`
/// shader package.
#[derive(Debug, Clone)]
pub struct OverlayLibrary {
    dir: PathBuf,
    overlays: BTreeMap<String, Arc<OverlayTree>>,
}

impl OverlayLibrary {
    /// Index every `*.json` document in `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, DevkitError> {
        let mut library = Self {
            dir: dir.into(),
            overlays: BTreeMap::new(),
        };
        library.reload()?;
        Ok(library)
    }

    #[inline]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Shared overlay of one shader package.
    #[inline]
    pub fn get(&self, name: &str) -> Option<Arc<OverlayTree>> {
        self.overlays.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.overlays.keys().map(String::as_str)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    /// Re-read every document and return the names that were added, removed
    /// or changed, ascending.
    ///
    /// Unreadable documents are skipped with a warning and count as removed.
    /// Unchanged documents keep their existing `Arc`.
    pub fn reload(&mut self) -> Result<Vec<String>, DevkitError> {
        // 1. Scan
        let mut fresh = BTreeMap::new();
        for path in self.documents()? {
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match load_overlay(&path) {
                Ok(tree) => {
                    fresh.insert(name.to_string(), tree);
                }
                Err(error) => warn!(%error, "skipping overlay document"),
            }
        }

        // 2. Diff
        let mut changed: Vec<String> = self
            .overlays
            .keys()
            .filter(|name| !fresh.contains_key(*name))
            .cloned()
            .collect();
        let mut overlays = BTreeMap::new();
        for (name, tree) in fresh {
            let shared = match self.overlays.get(&name) {
                Some(old) if **old == tree => Arc::clone(old),
                _ => {
                    changed.push(name.clone());
                    Arc::new(tree)
                }
            };
            overlays.insert(name, shared);
        }
        changed.sort();

        self.overlays = overlays;
        info!(
            dir = %self.dir.display(),
            documents = self.overlays.len(),
            changed = changed.len(),
            "overlay library loaded"
        );
        Ok(changed)
    }

    fn documents(&self) -> Result<Vec<PathBuf>, DevkitError> {
        let io = |source| DevkitError::Io {
            path: self.dir.clone(),
            source,
        };
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(io)? {
            let path = entry.map_err(io)?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}
