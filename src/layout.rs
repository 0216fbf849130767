//! Constant buffer layout: lane coverage bookkeeping.
//!
//! The material's constant buffer is a flat array of 4-byte lanes. Every
//! material constant claims a run of lanes; each lane ends up in exactly one
//! bucket:
//!
//! ```text
//! ┌──────────┬────────────────────────────────────────────────────┐
//! │ Defined  │ claimed by exactly one constant (start or continue)│
//! │ Aliased  │ claimed by two or more constants                   │
//! │ Orphaned │ claimed by none                                    │
//! └──────────┴────────────────────────────────────────────────────┘
//! ```
//!
//! Malformed constants (misaligned, zero length, out of bounds) never touch
//! coverage; they are reported and block structural edits.

use std::ops::Range;

use crate::LANE_SIZE;
use crate::names::range_name;
use crate::package::MaterialParam;

/// Default display prefix for material constant buffer lanes.
pub const DEFAULT_PARAM_PREFIX: &str = "g_MaterialParameter";

/// Material-side constant: an id and where its value run starts.
///
/// `byte_size` is the material's own record of the run length; the shader's
/// declared size for the same id takes precedence when available.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MaterialConstant {
    pub id: u32,
    pub byte_offset: u16,
    pub byte_size: u16,
}

impl MaterialConstant {
    pub const fn new(id: u32, byte_offset: u16, byte_size: u16) -> Self {
        Self {
            id,
            byte_offset,
            byte_size,
        }
    }
}

/// Coverage state of one lane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lane {
    Orphaned,
    /// Owned by one constant; `first` marks the first lane of its run.
    Defined { owner: u32, first: bool },
    /// Claimed by `writers` constants; `first_owner` claimed it first.
    Aliased { first_owner: u32, writers: u32 },
}

/// Partition of the buffer's lanes into defined, aliased and orphaned.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoverageSet {
    lanes: Vec<Lane>,
}

impl CoverageSet {
    /// All `lane_count` lanes orphaned.
    pub fn new(lane_count: u32) -> Self {
        Self {
            lanes: vec![Lane::Orphaned; lane_count as usize],
        }
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.lanes.len() as u32
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    #[inline]
    pub fn lane(&self, index: u32) -> Option<Lane> {
        self.lanes.get(index as usize).copied()
    }

    /// Claim `lanes` for `owner`. Returns the number of aliasing events.
    ///
    /// Lanes past the end of the buffer are ignored.
    pub(crate) fn claim(&mut self, lanes: Range<u32>, owner: u32) -> u32 {
        let start = lanes.start;
        let end = lanes.end.min(self.len());
        let mut aliased = 0;
        for index in start..end {
            let lane = &mut self.lanes[index as usize];
            *lane = match *lane {
                Lane::Orphaned => Lane::Defined {
                    owner,
                    first: index == start,
                },
                Lane::Defined { owner: first_owner, .. } => {
                    aliased += 1;
                    Lane::Aliased {
                        first_owner,
                        writers: 2,
                    }
                }
                Lane::Aliased {
                    first_owner,
                    writers,
                } => {
                    aliased += 1;
                    Lane::Aliased {
                        first_owner,
                        writers: writers + 1,
                    }
                }
            };
        }
        aliased
    }

    pub fn defined_count(&self) -> u32 {
        self.count(|lane| matches!(lane, Lane::Defined { .. }))
    }

    pub fn aliased_lane_count(&self) -> u32 {
        self.count(|lane| matches!(lane, Lane::Aliased { .. }))
    }

    pub fn orphaned_count(&self) -> u32 {
        self.count(|lane| matches!(lane, Lane::Orphaned))
    }

    fn count(&self, pred: impl Fn(&Lane) -> bool) -> u32 {
        self.lanes.iter().filter(|lane| pred(lane)).count() as u32
    }

    /// Indices of orphaned lanes, ascending.
    pub fn orphaned_lanes(&self) -> impl Iterator<Item = u32> + '_ {
        self.lanes
            .iter()
            .enumerate()
            .filter(|(_, lane)| matches!(lane, Lane::Orphaned))
            .map(|(i, _)| i as u32)
    }

    /// Orphaned lanes grouped into maximal contiguous runs.
    pub fn orphan_runs(&self) -> Vec<Range<u32>> {
        let mut runs: Vec<Range<u32>> = Vec::new();
        for lane in self.orphaned_lanes() {
            match runs.last_mut() {
                Some(run) if run.end == lane => run.end += 1,
                _ => runs.push(lane..lane + 1),
            }
        }
        runs
    }
}

/// Which declaration a malformed report refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayoutSubject {
    /// Shader-declared parameter.
    Param,
    /// Material-declared constant.
    Constant,
}

/// Why a declaration cannot be mapped onto lanes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MalformedReason {
    /// Offset or size is not a multiple of 4 bytes.
    Misaligned,
    /// Declared size is zero.
    ZeroLength,
    /// No shader declaration and no length of its own.
    UnknownLength,
    /// Range ends past the buffer.
    OutOfBounds,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MalformedEntry {
    pub subject: LayoutSubject,
    pub id: u32,
    pub reason: MalformedReason,
}

/// One well-formed constant mapped onto the buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayoutEntry {
    pub id: u32,
    pub lanes: Range<u32>,
    /// Generated range name.
    pub label: String,
    /// Range fits in one vector; edits are component-wise.
    pub component_only: bool,
}

impl LayoutEntry {
    /// First lane of the constant.
    #[inline]
    pub fn element_offset(&self) -> u32 {
        self.lanes.start
    }
}

/// Result of reconciling declared parameters against material constants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LayoutReport {
    pub coverage: CoverageSet,
    pub entries: Vec<LayoutEntry>,
    /// Aliasing events: each claim of an already claimed lane counts once.
    pub aliased_count: u32,
    /// Declared parameters the material does not define yet.
    pub missing: Vec<MaterialParam>,
    pub malformed: Vec<MalformedEntry>,
}

impl LayoutReport {
    #[inline]
    pub fn has_malformed(&self) -> bool {
        !self.malformed.is_empty()
    }

    /// Adding or removing constants is only safe on a consistent layout.
    #[inline]
    pub fn allows_structural_edits(&self) -> bool {
        !self.has_malformed() && self.aliased_count == 0
    }

    pub fn entry(&self, id: u32) -> Option<&LayoutEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Orphaned runs with their generated names.
    pub fn orphan_ranges(&self, prefix: &str) -> Vec<(Range<u32>, String)> {
        self.coverage
            .orphan_runs()
            .into_iter()
            .map(|run| {
                let (name, _) = range_name(prefix, run.start as i32, run.len() as i32);
                (run, name.unwrap_or_default())
            })
            .collect()
    }
}

fn check_range(offset: u32, size: u32, lane_count: u32) -> Result<Range<u32>, MalformedReason> {
    if size == 0 {
        return Err(MalformedReason::ZeroLength);
    }
    if offset % LANE_SIZE != 0 || size % LANE_SIZE != 0 {
        return Err(MalformedReason::Misaligned);
    }
    let start = offset / LANE_SIZE;
    let end = start + size / LANE_SIZE;
    if end > lane_count {
        return Err(MalformedReason::OutOfBounds);
    }
    Ok(start..end)
}

/// [`reconcile_with_prefix`] using [`DEFAULT_PARAM_PREFIX`].
pub fn reconcile(
    declared_params: &[MaterialParam],
    constants: &[MaterialConstant],
    lane_count: u32,
) -> LayoutReport {
    reconcile_with_prefix(declared_params, constants, lane_count, DEFAULT_PARAM_PREFIX)
}

/// Map material constants onto `lane_count` lanes.
///
/// A constant's length comes from the shader parameter with the same id when
/// one is declared, otherwise from the constant itself.
pub fn reconcile_with_prefix(
    declared_params: &[MaterialParam],
    constants: &[MaterialConstant],
    lane_count: u32,
    prefix: &str,
) -> LayoutReport {
    let mut coverage = CoverageSet::new(lane_count);
    let mut entries = Vec::with_capacity(constants.len());
    let mut malformed = Vec::new();
    let mut aliased_count = 0;

    // 1. Shader declarations
    for param in declared_params {
        if let Err(reason) =
            check_range(param.byte_offset as u32, param.byte_size as u32, lane_count)
        {
            malformed.push(MalformedEntry {
                subject: LayoutSubject::Param,
                id: param.id,
                reason,
            });
        }
    }

    // 2. Material constants
    for constant in constants {
        let declared = declared_params.iter().find(|p| p.id == constant.id);
        let size = declared.map_or(constant.byte_size, |p| p.byte_size) as u32;
        let checked = if declared.is_none() && size == 0 {
            Err(MalformedReason::UnknownLength)
        } else {
            check_range(constant.byte_offset as u32, size, lane_count)
        };
        let lanes = match checked {
            Ok(lanes) => lanes,
            Err(reason) => {
                malformed.push(MalformedEntry {
                    subject: LayoutSubject::Constant,
                    id: constant.id,
                    reason,
                });
                continue;
            }
        };

        aliased_count += coverage.claim(lanes.clone(), constant.id);
        let (label, component_only) =
            range_name(prefix, lanes.start as i32, lanes.len() as i32);
        entries.push(LayoutEntry {
            id: constant.id,
            lanes,
            label: label.unwrap_or_default(),
            component_only,
        });
    }

    // 3. Declared but not defined by the material
    let missing = declared_params
        .iter()
        .filter(|p| !constants.iter().any(|c| c.id == p.id))
        .copied()
        .collect();

    LayoutReport {
        coverage,
        entries,
        aliased_count,
        missing,
        malformed,
    }
}
