//! Shader package model: keys, nodes, passes and material parameters.
//!
//! A [`ShaderPackage`] is built once from already-parsed declarations and
//! indexes every node by its full selector. It is never mutated afterwards.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use thiserror::Error;

use crate::selector::{GROUP_COUNT, combine, domain_product, pack};
use crate::{LANE_SIZE, Selector};

/// Current key values of a material: key id → value.
///
/// Keys absent from the map take the package default.
pub type KeyAssignment = BTreeMap<u32, u32>;

/// The four independent key groups that make up a full selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyGroup {
    System,
    Scene,
    Material,
    SubView,
}

impl KeyGroup {
    /// All groups in full-selector order (fastest varying first).
    pub const ALL: [KeyGroup; GROUP_COUNT] = [
        KeyGroup::System,
        KeyGroup::Scene,
        KeyGroup::Material,
        KeyGroup::SubView,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        match self {
            KeyGroup::System => 0,
            KeyGroup::Scene => 1,
            KeyGroup::Material => 2,
            KeyGroup::SubView => 3,
        }
    }
}

impl fmt::Display for KeyGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            KeyGroup::System => "system",
            KeyGroup::Scene => "scene",
            KeyGroup::Material => "material",
            KeyGroup::SubView => "sub-view",
        };
        f.write_str(name)
    }
}

/// A package-declared configuration switch.
///
/// The value domain always contains the default value. Domain indices follow
/// ascending value order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderKey {
    pub id: u32,
    pub default_value: u32,
    values: BTreeSet<u32>,
}

impl ShaderKey {
    pub fn new(id: u32, default_value: u32, values: impl IntoIterator<Item = u32>) -> Self {
        let mut values: BTreeSet<u32> = values.into_iter().collect();
        values.insert(default_value);
        Self {
            id,
            default_value,
            values,
        }
    }

    /// Legal values in ascending order.
    pub fn values(&self) -> impl Iterator<Item = u32> + '_ {
        self.values.iter().copied()
    }

    #[inline]
    pub fn domain_size(&self) -> u32 {
        self.values.len() as u32
    }

    /// Position of `value` in the domain.
    pub fn index_of(&self, value: u32) -> Option<u32> {
        if !self.values.contains(&value) {
            return None;
        }
        Some(self.values.range(..value).count() as u32)
    }

    /// Value at domain position `index`.
    pub fn value_at(&self, index: u32) -> Option<u32> {
        self.values.iter().nth(index as usize).copied()
    }
}

/// One rendering stage of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Pass {
    pub id: u32,
    pub vertex_shader: u32,
    pub pixel_shader: u32,
}

impl Pass {
    pub const fn new(id: u32, vertex_shader: u32, pixel_shader: u32) -> Self {
        Self {
            id,
            vertex_shader,
            pixel_shader,
        }
    }
}

/// Association between one full key combination and its render passes.
///
/// `key_values` holds raw key values in group order: system, scene,
/// material, sub-view; each group in its declaration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub key_values: Vec<u32>,
    pub passes: Vec<Pass>,
}

/// Shader-declared region of the material constant buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MaterialParam {
    pub id: u32,
    pub byte_offset: u16,
    pub byte_size: u16,
}

impl MaterialParam {
    pub const fn new(id: u32, byte_offset: u16, byte_size: u16) -> Self {
        Self {
            id,
            byte_offset,
            byte_size,
        }
    }

    /// Offset and size are whole lanes.
    #[inline]
    pub const fn is_aligned(&self) -> bool {
        self.byte_offset as u32 % LANE_SIZE == 0 && self.byte_size as u32 % LANE_SIZE == 0
    }

    /// Lane range in the package's parameter block. Only meaningful when aligned.
    #[inline]
    pub fn lanes(&self) -> Range<u32> {
        let start = self.byte_offset as u32 / LANE_SIZE;
        start..start + self.byte_size as u32 / LANE_SIZE
    }
}

/// Declarations handed over by the package decoder.
#[derive(Clone, Debug, Default)]
pub struct PackageDef {
    pub system_keys: Vec<ShaderKey>,
    pub scene_keys: Vec<ShaderKey>,
    pub material_keys: Vec<ShaderKey>,
    pub sub_view_keys: Vec<ShaderKey>,
    pub nodes: Vec<Node>,
    pub params: Vec<MaterialParam>,
    /// Default value per lane of the package's parameter block.
    pub param_defaults: Vec<u32>,
}

impl PackageDef {
    fn keys_mut(&mut self, group: KeyGroup) -> &mut Vec<ShaderKey> {
        match group {
            KeyGroup::System => &mut self.system_keys,
            KeyGroup::Scene => &mut self.scene_keys,
            KeyGroup::Material => &mut self.material_keys,
            KeyGroup::SubView => &mut self.sub_view_keys,
        }
    }
}

/// Errors raised while indexing a shader package.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PackageError {
    #[error("shader key {id:#010x} is declared more than once")]
    DuplicateKey { id: u32 },
    #[error("node {node} has {actual} key values, expected {expected}")]
    NodeKeyCount {
        node: usize,
        expected: usize,
        actual: usize,
    },
    #[error("node {node} uses value {value:#010x} outside the domain of key {key:#010x}")]
    ValueOutOfDomain { node: usize, key: u32, value: u32 },
    #[error("nodes {first} and {second} share selector {selector:#x}")]
    DuplicateNode {
        selector: Selector,
        first: usize,
        second: usize,
    },
    #[error("combined key domain does not fit in a selector")]
    SelectorOverflow,
}

/// A loaded shader package, indexed for node lookup.
#[derive(Clone, Debug, PartialEq)]
pub struct ShaderPackage {
    keys: [Vec<ShaderKey>; GROUP_COUNT],
    domain_sizes: [Vec<u32>; GROUP_COUNT],
    group_sizes: [Selector; GROUP_COUNT],
    key_to_slot: HashMap<u32, (KeyGroup, usize)>,
    nodes: Vec<Node>,
    selector_to_node: HashMap<Selector, usize>,
    params: Vec<MaterialParam>,
    param_defaults: Vec<u32>,
}

impl ShaderPackage {
    /// Validate declarations and index every node by its full selector.
    pub fn build(mut def: PackageDef) -> Result<Self, PackageError> {
        // 1. Key tables
        let keys: [Vec<ShaderKey>; GROUP_COUNT] =
            KeyGroup::ALL.map(|group| std::mem::take(def.keys_mut(group)));

        let mut key_to_slot = HashMap::new();
        for group in KeyGroup::ALL {
            for (slot, key) in keys[group.index()].iter().enumerate() {
                if key_to_slot.insert(key.id, (group, slot)).is_some() {
                    return Err(PackageError::DuplicateKey { id: key.id });
                }
            }
        }

        // 2. Domain sizes
        let domain_sizes: [Vec<u32>; GROUP_COUNT] =
            keys.each_ref().map(|ks| ks.iter().map(ShaderKey::domain_size).collect());
        let mut group_sizes = [0; GROUP_COUNT];
        for (size, sizes) in group_sizes.iter_mut().zip(&domain_sizes) {
            *size = domain_product(sizes).ok_or(PackageError::SelectorOverflow)?;
        }
        group_sizes
            .iter()
            .try_fold(1 as Selector, |acc, &n| acc.checked_mul(n))
            .ok_or(PackageError::SelectorOverflow)?;

        let mut package = Self {
            keys,
            domain_sizes,
            group_sizes,
            key_to_slot,
            nodes: Vec::new(),
            selector_to_node: HashMap::with_capacity(def.nodes.len()),
            params: def.params,
            param_defaults: def.param_defaults,
        };

        // 3. Node index
        let expected = package.keys.iter().map(Vec::len).sum::<usize>();
        for (idx, node) in def.nodes.iter().enumerate() {
            if node.key_values.len() != expected {
                return Err(PackageError::NodeKeyCount {
                    node: idx,
                    expected,
                    actual: node.key_values.len(),
                });
            }
            let selector = package.node_selector(idx, &node.key_values)?;
            if let Some(&first) = package.selector_to_node.get(&selector) {
                return Err(PackageError::DuplicateNode {
                    selector,
                    first,
                    second: idx,
                });
            }
            package.selector_to_node.insert(selector, idx);
        }
        package.nodes = def.nodes;

        Ok(package)
    }

    fn node_selector(&self, node: usize, key_values: &[u32]) -> Result<Selector, PackageError> {
        let mut values = key_values.iter().copied();
        let mut group_selectors = [0; GROUP_COUNT];
        for group in KeyGroup::ALL {
            let keys = &self.keys[group.index()];
            let mut indices = Vec::with_capacity(keys.len());
            for (key, value) in keys.iter().zip(values.by_ref()) {
                let index = key.index_of(value).ok_or(PackageError::ValueOutOfDomain {
                    node,
                    key: key.id,
                    value,
                })?;
                indices.push(index);
            }
            group_selectors[group.index()] = pack(&indices, &self.domain_sizes[group.index()]);
        }
        Ok(self.full_selector(&group_selectors))
    }

    /// Keys of one group, in declaration order.
    #[inline]
    pub fn keys(&self, group: KeyGroup) -> &[ShaderKey] {
        &self.keys[group.index()]
    }

    /// Look up a key of any group by id.
    pub fn key(&self, id: u32) -> Option<(KeyGroup, &ShaderKey)> {
        self.key_to_slot
            .get(&id)
            .map(|&(group, slot)| (group, &self.keys[group.index()][slot]))
    }

    /// Domain sizes of one group, in declaration order.
    #[inline]
    pub fn domain_sizes(&self, group: KeyGroup) -> &[u32] {
        &self.domain_sizes[group.index()]
    }

    /// Number of distinct selectors one group can produce.
    #[inline]
    pub fn group_domain_size(&self, group: KeyGroup) -> Selector {
        self.group_sizes[group.index()]
    }

    /// Pack the current values of one group's keys.
    ///
    /// Unassigned keys use their default. Returns `None` if an assigned value
    /// lies outside its key's domain.
    pub fn group_selector(&self, group: KeyGroup, assignment: &KeyAssignment) -> Option<Selector> {
        let keys = self.keys(group);
        let indices = keys
            .iter()
            .map(|key| {
                let value = assignment.get(&key.id).copied().unwrap_or(key.default_value);
                key.index_of(value)
            })
            .collect::<Option<Vec<u32>>>()?;
        Some(pack(&indices, self.domain_sizes(group)))
    }

    /// Combine per-group selectors (in [`KeyGroup::ALL`] order).
    #[inline]
    pub fn full_selector(&self, group_selectors: &[Selector; GROUP_COUNT]) -> Selector {
        combine(group_selectors, &self.group_sizes)
    }

    #[inline]
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Node matching a full selector, if the package defines one.
    #[inline]
    pub fn node_for_selector(&self, selector: Selector) -> Option<&Node> {
        self.selector_to_node.get(&selector).map(|&i| &self.nodes[i])
    }

    #[inline]
    pub fn params(&self) -> &[MaterialParam] {
        &self.params
    }

    pub fn param(&self, id: u32) -> Option<&MaterialParam> {
        self.params.iter().find(|p| p.id == id)
    }

    /// Default value per lane of the package's parameter block.
    #[inline]
    pub fn param_defaults(&self) -> &[u32] {
        &self.param_defaults
    }

    /// Default lanes for a declared parameter, if the defaults cover it.
    pub fn param_default(&self, id: u32) -> Option<&[u32]> {
        let param = self.param(id)?;
        if !param.is_aligned() {
            return None;
        }
        let lanes = param.lanes();
        self.param_defaults
            .get(lanes.start as usize..lanes.end as usize)
    }
}

/// Load state of the shader package associated with a material.
#[derive(Clone, Debug, Default)]
pub enum PackageState {
    /// Still being loaded by a collaborator.
    #[default]
    Loading,
    Ready(Arc<ShaderPackage>),
}

impl PackageState {
    #[inline]
    pub fn ready(&self) -> Option<&ShaderPackage> {
        match self {
            PackageState::Loading => None,
            PackageState::Ready(package) => Some(package),
        }
    }
}

impl From<ShaderPackage> for PackageState {
    fn from(package: ShaderPackage) -> Self {
        PackageState::Ready(Arc::new(package))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_key_def() -> PackageDef {
        PackageDef {
            system_keys: vec![ShaderKey::new(0xA, 10, [10, 20])],
            material_keys: vec![ShaderKey::new(0xB, 7, [5, 6, 7])],
            nodes: vec![
                Node {
                    key_values: vec![10, 5],
                    passes: vec![Pass::new(0, 1, 2)],
                },
                Node {
                    key_values: vec![20, 7],
                    passes: vec![Pass::new(0, 3, 4)],
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn key_domain_contains_default() {
        let key = ShaderKey::new(1, 9, [3, 5]);
        assert_eq!(key.values().collect::<Vec<_>>(), vec![3, 5, 9]);
        assert_eq!(key.index_of(9), Some(2));
        assert_eq!(key.index_of(4), None);
        assert_eq!(key.value_at(1), Some(5));
        assert_eq!(key.value_at(3), None);
    }

    #[test]
    fn build_indexes_nodes_by_selector() {
        let pkg = ShaderPackage::build(two_key_def()).unwrap();

        let mut material = KeyAssignment::new();
        material.insert(0xB, 7);
        let sys = pkg.group_selector(KeyGroup::System, &[(0xA, 20)].into()).unwrap();
        let mat = pkg.group_selector(KeyGroup::Material, &material).unwrap();
        let full = pkg.full_selector(&[sys, 0, mat, 0]);

        let node = pkg.node_for_selector(full).unwrap();
        assert_eq!(node.passes[0], Pass::new(0, 3, 4));
        assert_eq!(pkg.group_domain_size(KeyGroup::System), 2);
        assert_eq!(pkg.group_domain_size(KeyGroup::Scene), 1);
    }

    #[test]
    fn group_selector_uses_defaults() {
        let pkg = ShaderPackage::build(two_key_def()).unwrap();
        let empty = KeyAssignment::new();
        // Default 7 is index 2 of {5, 6, 7}.
        assert_eq!(pkg.group_selector(KeyGroup::Material, &empty), Some(2));
        assert_eq!(pkg.group_selector(KeyGroup::Material, &[(0xB, 99)].into()), None);
    }

    #[test]
    fn key_lookup_reports_group() {
        let pkg = ShaderPackage::build(two_key_def()).unwrap();
        let (group, key) = pkg.key(0xB).unwrap();
        assert_eq!(group, KeyGroup::Material);
        assert_eq!(key.default_value, 7);
        assert!(pkg.key(0xC).is_none());
    }

    #[test]
    fn rejects_duplicate_key() {
        let mut def = two_key_def();
        def.scene_keys.push(ShaderKey::new(0xA, 0, []));
        assert_eq!(
            ShaderPackage::build(def),
            Err(PackageError::DuplicateKey { id: 0xA })
        );
    }

    #[test]
    fn rejects_wrong_key_count() {
        let mut def = two_key_def();
        def.nodes[1].key_values.pop();
        assert!(matches!(
            ShaderPackage::build(def),
            Err(PackageError::NodeKeyCount { node: 1, .. })
        ));
    }

    #[test]
    fn rejects_value_outside_domain() {
        let mut def = two_key_def();
        def.nodes[0].key_values[0] = 30;
        assert!(matches!(
            ShaderPackage::build(def),
            Err(PackageError::ValueOutOfDomain { key: 0xA, value: 30, .. })
        ));
    }

    #[test]
    fn rejects_duplicate_node() {
        let mut def = two_key_def();
        def.nodes[1].key_values = vec![10, 5];
        assert!(matches!(
            ShaderPackage::build(def),
            Err(PackageError::DuplicateNode { first: 0, second: 1, .. })
        ));
    }

    #[test]
    fn param_alignment_and_defaults() {
        let def = PackageDef {
            params: vec![MaterialParam::new(1, 4, 8), MaterialParam::new(2, 2, 4)],
            param_defaults: vec![0, 11, 12, 0],
            ..Default::default()
        };
        let pkg = ShaderPackage::build(def).unwrap();
        assert!(pkg.param(1).unwrap().is_aligned());
        assert!(!pkg.param(2).unwrap().is_aligned());
        assert_eq!(pkg.param_default(1), Some(&[11, 12][..]));
        assert_eq!(pkg.param_default(2), None);
    }

    #[test]
    fn loading_state_has_no_package() {
        assert!(PackageState::Loading.ready().is_none());
        let ready: PackageState = ShaderPackage::build(PackageDef::default()).unwrap().into();
        assert!(ready.ready().is_some());
    }
}
