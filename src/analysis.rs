//! Per-material analysis: resolution, layout and overlay in one pass.
//!
//! [`MaterialAnalysis::compute`] is a pure function of its inputs and is
//! recomputed in full whenever the package, the key values or the overlay
//! change.

use std::collections::BTreeMap;
use std::ops::Range;

use tracing::warn;
use zerocopy::FromBytes;
use zerocopy::byteorder::little_endian::U32;

use crate::config::AnalysisConfig;
use crate::editor::{ConstantEditor, EditorError};
use crate::layout::{LayoutEntry, LayoutReport, MaterialConstant, reconcile_with_prefix};
use crate::names::range_name;
use crate::overlay::{COMMENT, CONSTANTS, OverlayFields, OverlayPayload, OverlayTree, SHADER_KEYS};
use crate::package::{KeyAssignment, KeyGroup, PackageState, ShaderPackage};
use crate::resolve::{ResolutionResult, resolve_state};

/// A material as handed over by the material decoder.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Material {
    pub keys: KeyAssignment,
    pub constants: Vec<MaterialConstant>,
    /// Flat constant buffer, one `u32` per lane.
    pub values: Vec<u32>,
}

impl Material {
    #[inline]
    pub fn lane_count(&self) -> u32 {
        self.values.len() as u32
    }

    /// Little-endian bytes of `lanes`.
    pub fn lane_bytes(&self, lanes: Range<u32>) -> Result<Vec<u8>, EditorError> {
        let slice = self.lanes(lanes)?;
        Ok(slice.iter().flat_map(|lane| lane.to_le_bytes()).collect())
    }

    /// Overwrite `lanes` with little-endian `bytes` of the same length.
    pub fn set_lane_bytes(&mut self, lanes: Range<u32>, bytes: &[u8]) -> Result<(), EditorError> {
        let source = <[U32]>::ref_from_bytes(bytes).map_err(|_| EditorError::Length {
            len: bytes.len(),
            width: 4,
        })?;
        let target = self.lanes_mut(lanes)?;
        if source.len() != target.len() {
            return Err(EditorError::ValueCount {
                expected: target.len(),
                actual: source.len(),
            });
        }
        for (lane, value) in target.iter_mut().zip(source) {
            *lane = value.get();
        }
        Ok(())
    }

    /// Displayed values of one constant view.
    pub fn read_view(&self, view: &ConstantView) -> Result<Vec<f64>, EditorError> {
        view.editor.read(&self.lane_bytes(view.lanes.clone())?)
    }

    /// Write displayed values through a constant view's editor.
    pub fn write_view(&mut self, view: &ConstantView, values: &[f64]) -> Result<(), EditorError> {
        let mut bytes = self.lane_bytes(view.lanes.clone())?;
        view.editor.write(values, &mut bytes)?;
        self.set_lane_bytes(view.lanes.clone(), &bytes)
    }

    fn lanes(&self, lanes: Range<u32>) -> Result<&[u32], EditorError> {
        let total = self.lane_count();
        self.values
            .get(lanes.start as usize..lanes.end as usize)
            .ok_or(EditorError::OutOfBuffer {
                start: lanes.start,
                end: lanes.end,
                lanes: total,
            })
    }

    fn lanes_mut(&mut self, lanes: Range<u32>) -> Result<&mut [u32], EditorError> {
        let total = self.lane_count();
        self.values
            .get_mut(lanes.start as usize..lanes.end as usize)
            .ok_or(EditorError::OutOfBuffer {
                start: lanes.start,
                end: lanes.end,
                lanes: total,
            })
    }
}

/// One editable region of a constant, labelled and typed.
#[derive(Clone, Debug, PartialEq)]
pub struct ConstantView {
    pub id: u32,
    pub label: String,
    pub description: Option<String>,
    pub group: Option<String>,
    /// Absolute lane range in the material buffer.
    pub lanes: Range<u32>,
    pub component_only: bool,
    pub editor: ConstantEditor,
}

impl ConstantView {
    fn generated(entry: &LayoutEntry) -> Self {
        Self {
            id: entry.id,
            label: entry.label.clone(),
            description: None,
            group: None,
            lanes: entry.lanes.clone(),
            component_only: entry.component_only,
            editor: ConstantEditor::default(),
        }
    }
}

/// A material key with its presentation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyView {
    pub id: u32,
    pub group: KeyGroup,
    pub label: String,
    pub description: Option<String>,
    /// Current value (assigned or default).
    pub value: u32,
    /// Label per legal value, ascending.
    pub value_labels: BTreeMap<u32, String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MaterialAnalysis {
    pub resolution: ResolutionResult,
    pub layout: LayoutReport,
    pub constants: Vec<ConstantView>,
    pub keys: Vec<KeyView>,
    /// Package-level note from the overlay.
    pub comment: Option<String>,
    /// Overlay problems met during this computation.
    pub diagnostics: Vec<String>,
}

/// Overlay lookups of one computation; failures become diagnostics.
struct OverlayLookup<'a> {
    source: Option<(&'a ShaderPackage, &'a OverlayTree)>,
    keys: &'a KeyAssignment,
    diagnostics: Vec<String>,
}

impl<'a> OverlayLookup<'a> {
    fn get(&mut self, category: &str, id: Option<u32>) -> Option<&'a OverlayPayload> {
        let (package, tree) = self.source?;
        match tree.resolve(category, id, self.keys, package) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(category, ?id, %error, "overlay lookup failed");
                self.diagnostics.push(format!("{category}: {error}"));
                None
            }
        }
    }
}

impl MaterialAnalysis {
    pub fn compute(
        state: &PackageState,
        material: &Material,
        overlay: Option<&OverlayTree>,
        config: &AnalysisConfig,
    ) -> Self {
        let package = state.ready();
        let resolution = resolve_state(&material.keys, state, config.exhaustive_limit);
        let params = package.map_or(&[][..], ShaderPackage::params);
        let layout = reconcile_with_prefix(
            params,
            &material.constants,
            material.lane_count(),
            &config.parameter_prefix,
        );

        let mut lookup = OverlayLookup {
            source: package.zip(overlay),
            keys: &material.keys,
            diagnostics: Vec::new(),
        };

        let mut constants = Vec::with_capacity(layout.entries.len());
        for entry in &layout.entries {
            let payload = lookup.get(CONSTANTS, Some(entry.id));
            constants.extend(constant_views(
                entry,
                payload,
                &config.parameter_prefix,
                &mut lookup.diagnostics,
            ));
        }

        let keys = match package {
            Some(package) => key_views(package, &material.keys, &mut lookup),
            None => Vec::new(),
        };

        let comment = lookup
            .get(COMMENT, None)
            .and_then(OverlayPayload::first)
            .and_then(|f| f.description.clone().or_else(|| f.label.clone()));

        Self {
            resolution,
            layout,
            constants,
            keys,
            comment,
            diagnostics: lookup.diagnostics,
        }
    }

    /// Adding or removing constants is only offered on a consistent layout.
    #[inline]
    pub fn allows_structural_edits(&self) -> bool {
        self.layout.allows_structural_edits()
    }

    pub fn constants_of(&self, id: u32) -> impl Iterator<Item = &ConstantView> {
        self.constants.iter().filter(move |v| v.id == id)
    }
}

fn constant_views(
    entry: &LayoutEntry,
    payload: Option<&OverlayPayload>,
    prefix: &str,
    diagnostics: &mut Vec<String>,
) -> Vec<ConstantView> {
    let Some(payload) = payload else {
        return vec![ConstantView::generated(entry)];
    };

    let len = entry.lanes.len() as u32;
    let mut views = Vec::new();
    for fields in payload.fields() {
        match sub_range(fields, len) {
            Some(sub) => views.push(overlay_view(entry, fields, sub, prefix)),
            None => diagnostics.push(format!(
                "{CONSTANTS}: overlay range {:?}+{:?} does not fit constant {:#010x} ({len} lanes)",
                fields.offset, fields.length, entry.id
            )),
        }
    }
    if views.is_empty() {
        views.push(ConstantView::generated(entry));
    }
    views
}

/// Lane sub-range of a constant named by overlay fields.
fn sub_range(fields: &OverlayFields, len: u32) -> Option<Range<u32>> {
    let offset = fields.offset.unwrap_or(0);
    let length = fields.length.unwrap_or(len.saturating_sub(offset));
    let end = offset.checked_add(length)?;
    (length > 0 && end <= len).then_some(offset..end)
}

fn overlay_view(
    entry: &LayoutEntry,
    fields: &OverlayFields,
    sub: Range<u32>,
    prefix: &str,
) -> ConstantView {
    let lanes = entry.lanes.start + sub.start..entry.lanes.start + sub.end;
    let (name, component_only) = range_name(prefix, lanes.start as i32, lanes.len() as i32);
    ConstantView {
        id: entry.id,
        label: fields.label.clone().or(name).unwrap_or_default(),
        description: fields.description.clone(),
        group: fields.group.clone(),
        lanes,
        component_only,
        editor: ConstantEditor::from_fields(fields),
    }
}

fn key_views(
    package: &ShaderPackage,
    assignment: &KeyAssignment,
    lookup: &mut OverlayLookup<'_>,
) -> Vec<KeyView> {
    package
        .keys(KeyGroup::Material)
        .iter()
        .map(|key| {
            let fields = lookup.get(SHADER_KEYS, Some(key.id)).and_then(OverlayPayload::first);
            let value_labels = key
                .values()
                .map(|v| {
                    let label = fields
                        .and_then(|f| f.value_label(v as f64))
                        .map_or_else(|| format!("0x{v:08X}"), str::to_owned);
                    (v, label)
                })
                .collect();
            KeyView {
                id: key.id,
                group: KeyGroup::Material,
                label: fields
                    .and_then(|f| f.label.clone())
                    .unwrap_or_else(|| format!("0x{:08X}", key.id)),
                description: fields.and_then(|f| f.description.clone()),
                value: assignment.get(&key.id).copied().unwrap_or(key.default_value),
                value_labels,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::editor::IntWidth;
    use crate::layout::DEFAULT_PARAM_PREFIX;
    use crate::package::{MaterialParam, PackageDef, ShaderKey};
    use serde_json::json;

    fn package() -> PackageState {
        ShaderPackage::build(PackageDef {
            material_keys: vec![ShaderKey::new(0xA, 0, [0, 1])],
            params: vec![MaterialParam::new(1, 0, 16), MaterialParam::new(2, 16, 4)],
            ..Default::default()
        })
        .unwrap()
        .into()
    }

    fn material() -> Material {
        Material {
            keys: KeyAssignment::new(),
            constants: vec![MaterialConstant::new(1, 0, 0), MaterialConstant::new(2, 16, 0)],
            values: vec![0; 8],
        }
    }

    #[test]
    fn without_overlay_views_are_generated() {
        let analysis =
            MaterialAnalysis::compute(&package(), &material(), None, &AnalysisConfig::default());
        let labels: Vec<_> = analysis.constants.iter().map(|v| v.label.as_str()).collect();
        assert_eq!(labels, vec!["g_MaterialParameter[0]", "g_MaterialParameter[1].x"]);
        assert_eq!(analysis.keys[0].label, "0x0000000A");
        assert_eq!(analysis.keys[0].value_labels[&1], "0x00000001");
        assert!(analysis.allows_structural_edits());
        assert!(analysis.diagnostics.is_empty());
    }

    #[test]
    fn overlay_splits_constants_and_labels_keys() {
        let overlay = OverlayTree::from_value(json!({
            "Comment": { "Description": "Test shader" },
            "ShaderKeys": { "10": { "Label": "Mode", "Values": [ { "Label": "Alt", "Value": 1 } ] } },
            "Constants": {
                "1": [
                    { "Label": "Tint", "Length": 3, "Type": "Color" },
                    { "Label": "Flags", "Offset": 3, "Length": 1, "Type": "Integer", "Width": "U8" },
                    { "Label": "Bad", "Offset": 3, "Length": 4 }
                ]
            }
        }))
        .unwrap();
        let analysis = MaterialAnalysis::compute(
            &package(),
            &material(),
            Some(&overlay),
            &AnalysisConfig::default(),
        );

        let views: Vec<_> = analysis.constants_of(1).collect();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].label, "Tint");
        assert_eq!(views[0].lanes, 0..3);
        assert!(views[0].component_only);
        assert!(matches!(views[0].editor, ConstantEditor::Color(_)));
        assert_eq!(views[1].lanes, 3..4);
        assert!(matches!(
            &views[1].editor,
            ConstantEditor::Integer(e) if e.width == IntWidth::U8
        ));
        assert_eq!(analysis.diagnostics.len(), 1, "the oversized range is reported");

        assert_eq!(analysis.keys[0].label, "Mode");
        assert_eq!(analysis.keys[0].value_labels[&1], "Alt");
        assert_eq!(analysis.comment.as_deref(), Some("Test shader"));
    }

    #[test]
    fn loading_package_still_reconciles_material() {
        let analysis = MaterialAnalysis::compute(
            &PackageState::Loading,
            &material(),
            None,
            &AnalysisConfig::default(),
        );
        assert!(!analysis.resolution.shaders_known);
        assert!(analysis.keys.is_empty());
        // Without shader sizes both constants have no length of their own.
        assert_eq!(analysis.layout.malformed.len(), 2);
        assert!(!analysis.allows_structural_edits());
    }

    #[test]
    fn failed_vary_falls_back_to_generated_view() {
        let overlay = OverlayTree::from_value(json!({
            "Constants": { "2": { "Vary": [0xA], "Selectors": { "1": 0 }, "Items": [ { "Label": "Alt" } ] } }
        }))
        .unwrap();
        let config = AnalysisConfig::default();
        let mut mat = material();

        let analysis = MaterialAnalysis::compute(&package(), &mat, Some(&overlay), &config);
        let view = analysis.constants_of(2).next().unwrap();
        assert_eq!(view.label, format!("{DEFAULT_PARAM_PREFIX}[1].x"));
        assert_eq!(analysis.diagnostics.len(), 1);

        mat.keys.insert(0xA, 1);
        let analysis = MaterialAnalysis::compute(&package(), &mat, Some(&overlay), &config);
        assert_eq!(analysis.constants_of(2).next().unwrap().label, "Alt");
        assert!(analysis.diagnostics.is_empty());
    }

    #[test]
    fn views_read_and_write_the_buffer() {
        let mut mat = material();
        let analysis =
            MaterialAnalysis::compute(&package(), &mat, None, &AnalysisConfig::default());
        let view = analysis.constants_of(1).next().unwrap().clone();

        mat.write_view(&view, &[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(mat.values[0], 1.0f32.to_bits());
        assert_eq!(mat.values[3], 4.0f32.to_bits());
        assert_eq!(mat.read_view(&view).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);

        assert_eq!(
            mat.lane_bytes(6..9),
            Err(EditorError::OutOfBuffer {
                start: 6,
                end: 9,
                lanes: 8
            })
        );
    }
}
