//! # Shader Package Resolution (shpk-resolve)
//!
//! Answers two questions about a material bound to a shader package:
//!
//! - which vertex/pixel shaders it renders with, over every system, scene and
//!   sub-view key combination;
//! - how its flat constant buffer maps onto the parameters the package
//!   declares, and how an optional overlay document labels and types them.
//!
//! ## Selectors
//!
//! Key values are packed mixed-radix, first key fastest, using each value's
//! index in its key's ascending domain:
//!
//! ```text
//! selector = i[0] + n[0] * (i[1] + n[1] * (i[2] + ...))
//! ```
//!
//! Group selectors are packed the same way into one full selector:
//!
//! ```text
//! ┌──────────┬──────────┬──────────┬──────────┐
//! │ System   │ Scene    │ Material │ SubView  │
//! │ fastest  │          │          │ slowest  │
//! └──────────┴──────────┴──────────┴──────────┘
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use shpk_resolve::{AnalysisConfig, Material, MaterialAnalysis, PackageState};
//!
//! let analysis = MaterialAnalysis::compute(&state, &material, overlay.as_ref(), &AnalysisConfig::default());
//! if analysis.resolution.shaders_known {
//!     println!("{:?}", analysis.resolution.pixel_shaders());
//! }
//! ```

pub mod analysis;
pub mod bevy;
pub mod config;
pub mod editor;
pub mod enumerate;
pub mod layout;
pub mod names;
pub mod overlay;
pub mod package;
pub mod resolve;
pub mod selector;

pub use analysis::{ConstantView, KeyView, Material, MaterialAnalysis};
pub use config::{AnalysisConfig, ConfigValidationError};
pub use editor::{ConstantEditor, EditorError, EditorType, IntWidth};
pub use enumerate::{AllSelectors, DEFAULT_EXHAUSTIVE_LIMIT, all_selectors, is_exhaustive_feasible};
pub use layout::{
    CoverageSet, DEFAULT_PARAM_PREFIX, Lane, LayoutEntry, LayoutReport, MalformedEntry,
    MalformedReason, MaterialConstant, reconcile, reconcile_with_prefix,
};
pub use names::range_name;
pub use overlay::{OverlayError, OverlayPayload, OverlayTree, overlay};
pub use package::{
    KeyAssignment, KeyGroup, MaterialParam, Node, PackageDef, PackageError, PackageState, Pass,
    ShaderKey, ShaderPackage,
};
pub use resolve::{ResolutionResult, resolve, resolve_state};
pub use selector::{combine, pack, unpack};

/// Packed key values of one group, or of all four groups combined.
pub type Selector = u64;

/// Bytes per constant buffer lane.
pub const LANE_SIZE: u32 = 4;
