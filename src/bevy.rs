//! Bevy integration for material analysis.
//!
//! Provides:
//! - `MaterialAnalysisPlugin`: installs [`AnalysisSettings`] and the refresh system
//! - `MaterialSource`: the package, material and overlay an entity is edited from
//! - `MaterialAnalysisCache`: the derived analysis, kept in step with its source
//!
//! # Example
//!
//! ```ignore
//! use bevy::prelude::*;
//! use shpk_resolve::bevy::*;
//!
//! fn main() {
//!     App::new()
//!         .add_plugins(MaterialAnalysisPlugin::default())
//!         .add_systems(Startup, open_material)
//!         .run();
//! }
//!
//! fn open_material(mut commands: Commands) {
//!     commands.spawn(MaterialSource::new(PackageState::Loading, Material::default()));
//! }
//! ```

use std::sync::Arc;

use bevy::prelude::*;
use tracing::warn;

use crate::analysis::{Material, MaterialAnalysis};
use crate::config::AnalysisConfig;
use crate::overlay::OverlayTree;
use crate::package::PackageState;

// =============================================================================
// Plugin
// =============================================================================

/// Bevy plugin for material analysis.
///
/// ```ignore
/// App::new().add_plugins(MaterialAnalysisPlugin::with_config(config))
/// ```
#[derive(Default)]
pub struct MaterialAnalysisPlugin {
    config: AnalysisConfig,
}

impl MaterialAnalysisPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `config` instead of the defaults.
    ///
    /// An invalid config is replaced by the defaults when the plugin is built.
    pub fn with_config(config: AnalysisConfig) -> Self {
        Self { config }
    }
}

impl Plugin for MaterialAnalysisPlugin {
    fn build(&self, app: &mut App) {
        let config = match self.config.validate() {
            Ok(()) => self.config.clone(),
            Err(error) => {
                warn!(%error, "invalid analysis config; using defaults");
                AnalysisConfig::default()
            }
        };

        app.insert_resource(AnalysisSettings { config });
        app.add_systems(Update, refresh_material_analysis);
    }
}

/// Analysis settings shared by every material entity.
///
/// Changing them recomputes every cache on the next update.
#[derive(Resource, Clone, Debug, Default)]
pub struct AnalysisSettings {
    pub config: AnalysisConfig,
}

// =============================================================================
// Components
// =============================================================================

/// Inputs of one material's analysis.
///
/// Mutating any field (through `Mut`) marks the cache stale.
#[derive(Component, Clone, Debug)]
pub struct MaterialSource {
    pub package: PackageState,
    pub material: Material,
    pub overlay: Option<Arc<OverlayTree>>,
}

impl MaterialSource {
    #[inline]
    pub fn new(package: PackageState, material: Material) -> Self {
        Self {
            package,
            material,
            overlay: None,
        }
    }

    /// Builder method: attach an overlay.
    #[inline]
    pub fn with_overlay(mut self, overlay: Arc<OverlayTree>) -> Self {
        self.overlay = Some(overlay);
        self
    }

    fn analyze(&self, config: &AnalysisConfig) -> MaterialAnalysis {
        MaterialAnalysis::compute(
            &self.package,
            &self.material,
            self.overlay.as_deref(),
            config,
        )
    }
}

/// Analysis derived from the entity's [`MaterialSource`].
#[derive(Component, Clone, Debug)]
pub struct MaterialAnalysisCache {
    analysis: MaterialAnalysis,
}

impl MaterialAnalysisCache {
    #[inline]
    pub fn analysis(&self) -> &MaterialAnalysis {
        &self.analysis
    }
}

// =============================================================================
// Systems
// =============================================================================

fn refresh_material_analysis(
    mut commands: Commands,
    settings: Res<AnalysisSettings>,
    sources: Query<(Entity, Ref<MaterialSource>)>,
) {
    let all = settings.is_changed();
    for (entity, source) in &sources {
        if !all && !source.is_changed() {
            continue;
        }
        let analysis = source.analyze(&settings.config);
        commands
            .entity(entity)
            .insert(MaterialAnalysisCache { analysis });
    }
}

// =============================================================================
// Tests
// =============================================================================
