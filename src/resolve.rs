//! Node/pass resolution: which shaders a material can execute.
//!
//! System, scene and sub-view keys are enumerated exhaustively; material keys
//! are fixed to the material's current values. Every combination is looked
//! up in the package and the passes of each matching node are collected.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::enumerate::{all_selectors, is_exhaustive_feasible};
use crate::package::{KeyAssignment, KeyGroup, PackageState, ShaderPackage};

/// Shader indices reachable by a material, grouped by pass id.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolutionResult {
    /// Every enumerated combination had a node.
    pub shaders_known: bool,
    pub vertex_shaders_by_pass: BTreeMap<u32, BTreeSet<u32>>,
    pub pixel_shaders_by_pass: BTreeMap<u32, BTreeSet<u32>>,
}

impl ResolutionResult {
    /// Explicit "unknown" result: nothing collected, nothing known.
    pub fn unknown() -> Self {
        Self::default()
    }

    /// All vertex shader indices across passes.
    pub fn vertex_shaders(&self) -> BTreeSet<u32> {
        self.vertex_shaders_by_pass.values().flatten().copied().collect()
    }

    /// All pixel shader indices across passes.
    pub fn pixel_shaders(&self) -> BTreeSet<u32> {
        self.pixel_shaders_by_pass.values().flatten().copied().collect()
    }
}

/// Resolve against a package that may still be loading.
pub fn resolve_state(material: &KeyAssignment, state: &PackageState, limit: u64) -> ResolutionResult {
    match state.ready() {
        Some(package) => resolve(material, package, limit),
        None => ResolutionResult::unknown(),
    }
}

/// Collect the vertex/pixel shaders of every node reachable by `material`.
///
/// If the enumerated space exceeds `limit` combinations, enumeration is
/// skipped and the unknown result is returned. Missing nodes mark the result
/// as not fully known but keep whatever was collected.
pub fn resolve(material: &KeyAssignment, package: &ShaderPackage, limit: u64) -> ResolutionResult {
    let enumerated = [KeyGroup::System, KeyGroup::Scene, KeyGroup::SubView];
    let sizes = enumerated.map(|group| package.domain_sizes(group));
    if !is_exhaustive_feasible(&sizes, limit) {
        debug!(limit, "key space exceeds exhaustive limit; shaders unknown");
        return ResolutionResult::unknown();
    }

    let Some(material_selector) = package.group_selector(KeyGroup::Material, material) else {
        debug!("material key value outside its declared domain; shaders unknown");
        return ResolutionResult::unknown();
    };

    let mut result = ResolutionResult {
        shaders_known: true,
        ..Default::default()
    };

    let systems = all_selectors(package.domain_sizes(KeyGroup::System));
    let scenes = all_selectors(package.domain_sizes(KeyGroup::Scene));
    let sub_views = all_selectors(package.domain_sizes(KeyGroup::SubView));

    for sub_view in sub_views {
        for scene in scenes.clone() {
            for system in systems.clone() {
                let selector =
                    package.full_selector(&[system, scene, material_selector, sub_view]);
                let Some(node) = package.node_for_selector(selector) else {
                    debug!(selector, "no node for key combination");
                    result.shaders_known = false;
                    continue;
                };
                for pass in &node.passes {
                    result
                        .vertex_shaders_by_pass
                        .entry(pass.id)
                        .or_default()
                        .insert(pass.vertex_shader);
                    result
                        .pixel_shaders_by_pass
                        .entry(pass.id)
                        .or_default()
                        .insert(pass.pixel_shader);
                }
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enumerate::DEFAULT_EXHAUSTIVE_LIMIT;
    use crate::package::{Node, PackageDef, Pass, ShaderKey};

    const SYS: u32 = 0x1000;
    const MAT: u32 = 0x2000;

    /// System key {0, 1} × material key {0, 1, 2}; node (s, m) renders pass 7
    /// with vertex shader `10 * m + s` and pixel shader `100 + 10 * m + s`.
    fn synthetic(skip: Option<(u32, u32)>) -> ShaderPackage {
        let mut nodes = Vec::new();
        for m in 0..3 {
            for s in 0..2 {
                if skip == Some((s, m)) {
                    continue;
                }
                nodes.push(Node {
                    key_values: vec![s, m],
                    passes: vec![Pass::new(7, 10 * m + s, 100 + 10 * m + s)],
                });
            }
        }
        ShaderPackage::build(PackageDef {
            system_keys: vec![ShaderKey::new(SYS, 0, [0, 1])],
            material_keys: vec![ShaderKey::new(MAT, 0, [0, 1, 2])],
            nodes,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn full_coverage_is_known() {
        let pkg = synthetic(None);
        for m in 0..3 {
            let keys: KeyAssignment = [(MAT, m)].into();
            let result = resolve(&keys, &pkg, DEFAULT_EXHAUSTIVE_LIMIT);
            assert!(result.shaders_known);
            assert_eq!(
                result.vertex_shaders_by_pass[&7],
                BTreeSet::from([10 * m, 10 * m + 1])
            );
            assert_eq!(
                result.pixel_shaders_by_pass[&7],
                BTreeSet::from([100 + 10 * m, 101 + 10 * m])
            );
        }
    }

    #[test]
    fn missing_node_is_best_effort() {
        let pkg = synthetic(Some((1, 2)));
        let keys: KeyAssignment = [(MAT, 2)].into();
        let result = resolve(&keys, &pkg, DEFAULT_EXHAUSTIVE_LIMIT);
        assert!(!result.shaders_known);
        assert_eq!(result.vertex_shaders_by_pass[&7], BTreeSet::from([20]));
        assert_eq!(result.pixel_shaders(), BTreeSet::from([120]));

        // Other material selectors are unaffected by the hole.
        let keys: KeyAssignment = [(MAT, 1)].into();
        assert!(resolve(&keys, &pkg, DEFAULT_EXHAUSTIVE_LIMIT).shaders_known);
    }

    #[test]
    fn unassigned_material_key_uses_default() {
        let pkg = synthetic(None);
        let result = resolve(&KeyAssignment::new(), &pkg, DEFAULT_EXHAUSTIVE_LIMIT);
        assert_eq!(result.vertex_shaders(), BTreeSet::from([0, 1]));
    }

    #[test]
    fn infeasible_space_is_unknown() {
        let pkg = synthetic(None);
        let result = resolve(&KeyAssignment::new(), &pkg, 1);
        assert_eq!(result, ResolutionResult::unknown());
    }

    #[test]
    fn out_of_domain_material_value_is_unknown() {
        let pkg = synthetic(None);
        let keys: KeyAssignment = [(MAT, 9)].into();
        let result = resolve(&keys, &pkg, DEFAULT_EXHAUSTIVE_LIMIT);
        assert!(!result.shaders_known);
        assert!(result.vertex_shaders_by_pass.is_empty());
    }

    #[test]
    fn loading_package_is_unknown() {
        let result = resolve_state(&KeyAssignment::new(), &PackageState::Loading, 16);
        assert!(!result.shaders_known);
        assert!(result.pixel_shaders_by_pass.is_empty());
    }

    #[test]
    fn passes_are_grouped_by_id() {
        let pkg = ShaderPackage::build(PackageDef {
            scene_keys: vec![ShaderKey::new(1, 0, [0, 1])],
            nodes: vec![
                Node {
                    key_values: vec![0],
                    passes: vec![Pass::new(0, 1, 2), Pass::new(1, 3, 4)],
                },
                Node {
                    key_values: vec![1],
                    passes: vec![Pass::new(0, 5, 2)],
                },
            ],
            ..Default::default()
        })
        .unwrap();
        let result = resolve(&KeyAssignment::new(), &pkg, DEFAULT_EXHAUSTIVE_LIMIT);
        assert!(result.shaders_known);
        assert_eq!(result.vertex_shaders_by_pass[&0], BTreeSet::from([1, 5]));
        assert_eq!(result.vertex_shaders_by_pass[&1], BTreeSet::from([3]));
        assert_eq!(result.pixel_shaders_by_pass[&0], BTreeSet::from([2]));
    }
}
