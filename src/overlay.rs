//! Overlay descriptors: human labels and editors layered on declared layout.
//!
//! An overlay document is a tree of `category → id → fields`, parsed once
//! into a typed [`OverlayTree`]. A node either carries its fields directly or
//! varies with the material's key values:
//!
//! ```text
//! "Constants": {
//!   "3036654635": { "Label": "Diffuse", "Type": "Color" },
//!   "1465565106": {
//!     "Vary": [ 4113354501 ],
//!     "Selectors": { "0": 0, "1": 1 },
//!     "Items": [ { "Label": "Fresnel" }, [ { "Label": "A", "Length": 1 }, ... ] ]
//!   }
//! }
//! ```
//!
//! The vary lookup selector packs the named keys' current values, so
//! `Selectors` entries are key values. Overlay data never changes offsets or
//! sizes declared by the shader package.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::Selector;
use crate::editor::{EditorType, IntWidth};
use crate::package::{KeyAssignment, ShaderPackage};
use crate::selector::pack;

/// Category holding per-key labels and value tables.
pub const SHADER_KEYS: &str = "ShaderKeys";
/// Category holding per-constant labels, sub-ranges and editors.
pub const CONSTANTS: &str = "Constants";
/// Category holding per-sampler labels.
pub const SAMPLERS: &str = "Samplers";
/// Package-level free-form notes (addressed without an id).
pub const COMMENT: &str = "Comment";

/// Errors raised while reading or resolving overlay data.
#[derive(Debug, Error)]
pub enum OverlayError {
    #[error("invalid overlay JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("overlay document root must be an object")]
    NotAnObject,
    #[error("overlay entry {path}: {message}")]
    Shape { path: String, message: String },
    #[error("vary key {key:#010x} is not declared by the shader package")]
    UnknownVaryKey { key: u32 },
    #[error("no overlay variant for selector {selector}")]
    NoVariant { selector: Selector },
    #[error("overlay variant {index} out of range ({len} items)")]
    VariantOutOfRange { index: usize, len: usize },
}

/// One labelled value (enum entry or shader key value).
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OverlayValue {
    pub label: String,
    pub value: f64,
    #[serde(default)]
    pub description: Option<String>,
}

/// Presentation fields of one overlay entry. Absent fields are neutral.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct OverlayFields {
    pub label: Option<String>,
    pub description: Option<String>,
    pub group: Option<String>,
    /// Lane offset inside the constant.
    pub offset: Option<u32>,
    /// Lane count inside the constant.
    pub length: Option<u32>,
    #[serde(rename = "Type")]
    pub editor_type: Option<EditorType>,
    pub min: Option<f32>,
    pub max: Option<f32>,
    pub step: Option<f32>,
    pub factor: Option<f32>,
    pub bias: Option<f32>,
    pub exponent: Option<f32>,
    pub width: Option<IntWidth>,
    pub hdr: bool,
    pub squared_rgb: bool,
    pub values: Vec<OverlayValue>,
}

impl OverlayFields {
    /// Label of a listed value, if any.
    pub fn value_label(&self, value: f64) -> Option<&str> {
        self.values
            .iter()
            .find(|v| v.value == value)
            .map(|v| v.label.as_str())
    }
}

/// Field sets of a resolved node: one, or one per constant sub-range.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OverlayPayload {
    Many(Vec<OverlayFields>),
    One(OverlayFields),
}

impl OverlayPayload {
    pub fn fields(&self) -> &[OverlayFields] {
        match self {
            OverlayPayload::Many(many) => many,
            OverlayPayload::One(one) => std::slice::from_ref(one),
        }
    }

    /// The first field set, for categories that expect exactly one.
    pub fn first(&self) -> Option<&OverlayFields> {
        self.fields().first()
    }
}

/// Value-dependent choice among several payloads.
#[derive(Clone, Debug, PartialEq)]
pub struct VaryClause {
    pub keys: Vec<u32>,
    pub selectors: BTreeMap<Selector, usize>,
    pub items: Vec<OverlayPayload>,
}

impl VaryClause {
    /// Pick the payload matching the current values of `keys`.
    ///
    /// The lookup selector packs the keys' raw values (package default when
    /// unassigned) with their domain sizes as radices, so `Selectors` entries
    /// are written in key values.
    pub fn select(
        &self,
        current: &KeyAssignment,
        package: &ShaderPackage,
    ) -> Result<&OverlayPayload, OverlayError> {
        let selector = self.lookup_selector(current, package)?;
        let &index = self
            .selectors
            .get(&selector)
            .ok_or(OverlayError::NoVariant { selector })?;
        self.items.get(index).ok_or(OverlayError::VariantOutOfRange {
            index,
            len: self.items.len(),
        })
    }

    /// Selector the current key values look up in `selectors`.
    pub fn lookup_selector(
        &self,
        current: &KeyAssignment,
        package: &ShaderPackage,
    ) -> Result<Selector, OverlayError> {
        let mut values = Vec::with_capacity(self.keys.len());
        let mut sizes = Vec::with_capacity(self.keys.len());
        for &id in &self.keys {
            let (_, key) = package
                .key(id)
                .ok_or(OverlayError::UnknownVaryKey { key: id })?;
            values.push(current.get(&id).copied().unwrap_or(key.default_value));
            sizes.push(key.domain_size());
        }
        Ok(pack(&values, &sizes))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum OverlayNode {
    Fixed(OverlayPayload),
    Varying(VaryClause),
}

impl OverlayNode {
    /// Resolve to a payload for the current key values.
    pub fn payload(
        &self,
        current: &KeyAssignment,
        package: &ShaderPackage,
    ) -> Result<&OverlayPayload, OverlayError> {
        match self {
            OverlayNode::Fixed(payload) => Ok(payload),
            OverlayNode::Varying(vary) => vary.select(current, package),
        }
    }

    fn from_value(path: &str, value: Value) -> Result<Self, OverlayError> {
        let shape = |e: serde_json::Error| OverlayError::Shape {
            path: path.to_string(),
            message: e.to_string(),
        };
        let is_varying = value.as_object().is_some_and(|o| o.contains_key("Vary"));
        if !is_varying {
            return serde_json::from_value(value)
                .map(OverlayNode::Fixed)
                .map_err(shape);
        }

        let raw: RawVary = serde_json::from_value(value).map_err(shape)?;
        let mut selectors = BTreeMap::new();
        for (text, index) in raw.selectors {
            let selector = parse_number(&text).ok_or_else(|| OverlayError::Shape {
                path: path.to_string(),
                message: format!("selector '{text}' is not a number"),
            })?;
            selectors.insert(selector, index);
        }
        Ok(OverlayNode::Varying(VaryClause {
            keys: raw.vary,
            selectors,
            items: raw.items,
        }))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawVary {
    vary: Vec<u32>,
    #[serde(default)]
    selectors: BTreeMap<String, usize>,
    #[serde(default)]
    items: Vec<OverlayPayload>,
}

/// Entries of one category, plus the category's own node if it has fields.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OverlayCategory {
    pub root: Option<OverlayNode>,
    pub entries: BTreeMap<u32, OverlayNode>,
}

/// Parsed overlay document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OverlayTree {
    categories: BTreeMap<String, OverlayCategory>,
    diagnostics: Vec<String>,
}

impl OverlayTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON document.
    pub fn from_json_str(text: &str) -> Result<Self, OverlayError> {
        Self::from_value(serde_json::from_str(text)?)
    }

    /// Build from an already decoded JSON value.
    ///
    /// Only a non-object root is an error. Entries with a wrong shape are
    /// dropped and recorded in [`OverlayTree::diagnostics`].
    pub fn from_value(value: Value) -> Result<Self, OverlayError> {
        let Value::Object(root) = value else {
            return Err(OverlayError::NotAnObject);
        };

        let mut tree = Self::new();
        for (name, body) in root {
            let Value::Object(body) = body else {
                tree.diagnose(OverlayError::Shape {
                    path: name,
                    message: "category must be an object".into(),
                });
                continue;
            };
            let category = tree.parse_category(&name, body);
            tree.categories.insert(name, category);
        }
        Ok(tree)
    }

    fn parse_category(&mut self, name: &str, body: Map<String, Value>) -> OverlayCategory {
        let mut category = OverlayCategory::default();
        let mut own_fields = Map::new();

        for (key, value) in body {
            let Some(id) = parse_number(&key).and_then(|n| u32::try_from(n).ok()) else {
                own_fields.insert(key, value);
                continue;
            };
            let path = format!("{name}.{key}");
            match OverlayNode::from_value(&path, value) {
                Ok(node) => {
                    category.entries.insert(id, node);
                }
                Err(e) => self.diagnose(e),
            }
        }

        if !own_fields.is_empty() {
            match OverlayNode::from_value(name, Value::Object(own_fields)) {
                Ok(node) => category.root = Some(node),
                Err(e) => self.diagnose(e),
            }
        }
        category
    }

    fn diagnose(&mut self, error: OverlayError) {
        warn!(%error, "dropping overlay entry");
        self.diagnostics.push(error.to_string());
    }

    /// Problems found while parsing the document.
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub fn category(&self, name: &str) -> Option<&OverlayCategory> {
        self.categories.get(name)
    }

    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    /// The node at `category` (and `id`, when given), without vary resolution.
    pub fn node(&self, category: &str, id: Option<u32>) -> Option<&OverlayNode> {
        let category = self.categories.get(category)?;
        match id {
            Some(id) => category.entries.get(&id),
            None => category.root.as_ref(),
        }
    }

    /// Resolve the payload at `category`/`id` for the current key values.
    ///
    /// `Ok(None)` means the overlay simply has nothing there; `Err` means the
    /// data is present but cannot be resolved.
    pub fn resolve(
        &self,
        category: &str,
        id: Option<u32>,
        current: &KeyAssignment,
        package: &ShaderPackage,
    ) -> Result<Option<&OverlayPayload>, OverlayError> {
        match self.node(category, id) {
            Some(node) => node.payload(current, package).map(Some),
            None => Ok(None),
        }
    }
}

/// Resolve an overlay entry, degrading any failure to "no overlay".
pub fn overlay<'a>(
    category: &str,
    id: Option<u32>,
    current: &KeyAssignment,
    package: &ShaderPackage,
    source: &'a OverlayTree,
) -> Option<&'a OverlayPayload> {
    match source.resolve(category, id, current, package) {
        Ok(payload) => payload,
        Err(error) => {
            warn!(category, ?id, %error, "overlay lookup failed");
            None
        }
    }
}

/// Decimal or `0x`-prefixed hexadecimal.
fn parse_number(text: &str) -> Option<u64> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::{PackageDef, ShaderKey};
    use serde_json::json;

    const KEY_A: u32 = 0xA;

    fn package() -> ShaderPackage {
        ShaderPackage::build(PackageDef {
            material_keys: vec![ShaderKey::new(KEY_A, 0, [0, 1, 2])],
            ..Default::default()
        })
        .unwrap()
    }

    fn varying_tree() -> OverlayTree {
        OverlayTree::from_value(json!({
            "Constants": {
                "5": {
                    "Vary": [KEY_A],
                    "Selectors": { "1": 0, "2": 1 },
                    "Items": [ { "Label": "First" }, { "Label": "Second" } ]
                }
            }
        }))
        .unwrap()
    }

    fn label(payload: Option<&OverlayPayload>) -> Option<&str> {
        payload?.first()?.label.as_deref()
    }

    #[test]
    fn vary_selects_item_by_current_value() {
        let tree = varying_tree();
        let pkg = package();
        let keys: KeyAssignment = [(KEY_A, 2)].into();
        assert_eq!(label(overlay(CONSTANTS, Some(5), &keys, &pkg, &tree)), Some("Second"));

        let keys: KeyAssignment = [(KEY_A, 1)].into();
        assert_eq!(label(overlay(CONSTANTS, Some(5), &keys, &pkg, &tree)), Some("First"));
    }

    #[test]
    fn vary_selects_by_value_not_domain_position() {
        let tree = varying_tree();
        // Domain {1, 2}: value 2 sits at position 1.
        let pkg = ShaderPackage::build(PackageDef {
            material_keys: vec![ShaderKey::new(KEY_A, 1, [1, 2])],
            ..Default::default()
        })
        .unwrap();

        let keys: KeyAssignment = [(KEY_A, 2)].into();
        assert_eq!(label(overlay(CONSTANTS, Some(5), &keys, &pkg, &tree)), Some("Second"));

        // Unassigned key uses the default value 1.
        let keys = KeyAssignment::new();
        assert_eq!(label(overlay(CONSTANTS, Some(5), &keys, &pkg, &tree)), Some("First"));
    }

    #[test]
    fn vary_over_two_keys_packs_values() {
        const KEY_B: u32 = 0xB;
        // Domains {0x10, 0x20} and {3, 5, 7}: radix 2 for the first key.
        let pkg = ShaderPackage::build(PackageDef {
            material_keys: vec![
                ShaderKey::new(KEY_A, 0x10, [0x20]),
                ShaderKey::new(KEY_B, 3, [5, 7]),
            ],
            ..Default::default()
        })
        .unwrap();
        // 0x20 + 2 * 7 = 46
        let tree = OverlayTree::from_value(json!({
            "Constants": {
                "5": {
                    "Vary": [KEY_A, KEY_B],
                    "Selectors": { "46": 1, "22": 0 },
                    "Items": [ { "Label": "Defaults" }, { "Label": "Both set" } ]
                }
            }
        }))
        .unwrap();

        let keys: KeyAssignment = [(KEY_A, 0x20), (KEY_B, 7)].into();
        let Some(OverlayNode::Varying(vary)) = tree.node(CONSTANTS, Some(5)) else {
            panic!("expected a varying node");
        };
        assert_eq!(vary.lookup_selector(&keys, &pkg).unwrap(), 46);
        assert_eq!(label(overlay(CONSTANTS, Some(5), &keys, &pkg, &tree)), Some("Both set"));

        // 0x10 + 2 * 3 = 22
        let defaults = KeyAssignment::new();
        assert_eq!(vary.lookup_selector(&defaults, &pkg).unwrap(), 22);
        assert_eq!(label(overlay(CONSTANTS, Some(5), &defaults, &pkg, &tree)), Some("Defaults"));
    }

    #[test]
    fn vary_without_matching_selector_has_no_overlay() {
        let tree = varying_tree();
        let pkg = package();
        // Default value 0 packs to selector 0, which is not listed.
        let keys = KeyAssignment::new();
        assert!(matches!(
            tree.resolve(CONSTANTS, Some(5), &keys, &pkg),
            Err(OverlayError::NoVariant { selector: 0 })
        ));
        assert!(overlay(CONSTANTS, Some(5), &keys, &pkg, &tree).is_none());
    }

    #[test]
    fn vary_on_undeclared_key_fails_softly() {
        let tree = OverlayTree::from_value(json!({
            "Constants": { "1": { "Vary": [99], "Selectors": { "0": 0 }, "Items": [ {} ] } }
        }))
        .unwrap();
        let pkg = package();
        assert!(matches!(
            tree.resolve(CONSTANTS, Some(1), &KeyAssignment::new(), &pkg),
            Err(OverlayError::UnknownVaryKey { key: 99 })
        ));
    }

    #[test]
    fn vary_index_out_of_range_fails_softly() {
        let tree = OverlayTree::from_value(json!({
            "Constants": { "1": { "Vary": [KEY_A], "Selectors": { "0": 3 }, "Items": [ {} ] } }
        }))
        .unwrap();
        assert!(matches!(
            tree.resolve(CONSTANTS, Some(1), &KeyAssignment::new(), &package()),
            Err(OverlayError::VariantOutOfRange { index: 3, len: 1 })
        ));
    }

    #[test]
    fn category_fields_and_entries_are_separated() {
        let tree = OverlayTree::from_value(json!({
            "Comment": { "Label": "Character shader" },
            "ShaderKeys": {
                "Label": "Keys",
                "0xA": { "Label": "Skin type", "Values": [ { "Label": "Face", "Value": 1 } ] }
            }
        }))
        .unwrap();
        let pkg = package();
        let none = KeyAssignment::new();

        let comment = tree.resolve(COMMENT, None, &none, &pkg).unwrap();
        assert_eq!(label(comment), Some("Character shader"));

        let key = tree.resolve(SHADER_KEYS, Some(KEY_A), &none, &pkg).unwrap().unwrap();
        assert_eq!(key.first().unwrap().value_label(1.0), Some("Face"));
        assert_eq!(label(tree.resolve(SHADER_KEYS, None, &none, &pkg).unwrap()), Some("Keys"));
        assert!(tree.diagnostics().is_empty());
    }

    #[test]
    fn multi_range_payload() {
        let tree = OverlayTree::from_value(json!({
            "Constants": { "7": [ { "Label": "X", "Length": 1 }, { "Label": "YZ", "Offset": 1, "Length": 2 } ] }
        }))
        .unwrap();
        let payload = tree
            .resolve(CONSTANTS, Some(7), &KeyAssignment::new(), &package())
            .unwrap()
            .unwrap();
        assert_eq!(payload.fields().len(), 2);
        assert_eq!(payload.fields()[1].offset, Some(1));
    }

    #[test]
    fn malformed_entries_are_dropped_with_diagnostics() {
        let tree = OverlayTree::from_value(json!({
            "Constants": {
                "1": { "Label": 42 },
                "2": { "Vary": "not a list" },
                "3": { "Label": "Fine", "Unknown": true }
            },
            "Samplers": "wrong"
        }))
        .unwrap();
        assert_eq!(tree.diagnostics().len(), 3);
        assert!(tree.node(CONSTANTS, Some(1)).is_none());
        assert!(tree.node(CONSTANTS, Some(2)).is_none());
        assert!(tree.node(CONSTANTS, Some(3)).is_some());
        assert!(tree.category(SAMPLERS).is_none());
    }

    #[test]
    fn missing_entries_are_not_errors() {
        let tree = OverlayTree::new();
        let result = tree.resolve(CONSTANTS, Some(1), &KeyAssignment::new(), &package());
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn non_object_root_is_rejected() {
        assert!(matches!(
            OverlayTree::from_value(json!([1, 2])),
            Err(OverlayError::NotAnObject)
        ));
        assert!(matches!(
            OverlayTree::from_json_str("{ nope"),
            Err(OverlayError::Json(_))
        ));
    }
}
