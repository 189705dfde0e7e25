//! Alias summaries for refinements.
//!
//! Alias analysis itself happens upstream; this module only carries its
//! results. Each refinement gets an [`AliasInfo`] naming the base storage it
//! refines plus the access polytope's shape and per-dim extents, and
//! [`AliasInfo::compare`] classifies a pair of summaries as provably
//! disjoint, exactly equal, or possibly overlapping.

use std::collections::BTreeMap;

use smallvec::SmallVec;

use crate::affine::Affine;
use crate::block::Block;
use crate::shape::TensorShape;

/// Inclusive per-dimension element bounds of an access polytope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub min: i64,
    pub max: i64,
}

/// Aliasing summary for one refinement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasInfo {
    /// Identity of the underlying storage. Refinements with different bases
    /// never alias.
    pub base_ref: String,
    pub access: SmallVec<[Affine; 4]>,
    pub shape: TensorShape,
    pub extents: SmallVec<[Extent; 4]>,
}

/// Result of comparing two alias summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasRelation {
    /// Provably disjoint.
    None,
    /// May overlap.
    Partial,
    /// Identical access to identical storage.
    Exact,
}

impl AliasInfo {
    /// Classify the overlap between two summaries.
    pub fn compare(a: &AliasInfo, b: &AliasInfo) -> AliasRelation {
        if a.base_ref != b.base_ref {
            return AliasRelation::None;
        }
        if a.access == b.access && a.shape == b.shape {
            return AliasRelation::Exact;
        }
        if a.extents.len() == b.extents.len() {
            let disjoint = a
                .extents
                .iter()
                .zip(&b.extents)
                .any(|(ea, eb)| ea.max < eb.min || eb.max < ea.min);
            if disjoint {
                return AliasRelation::None;
            }
        }
        AliasRelation::Partial
    }
}

/// Refinement name → alias summary for one block.
#[derive(Debug, Clone, Default)]
pub struct AliasMap {
    infos: BTreeMap<String, AliasInfo>,
}

impl AliasMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, info: AliasInfo) {
        self.infos.insert(name.into(), info);
    }

    pub fn info(&self, name: &str) -> Option<&AliasInfo> {
        self.infos.get(name)
    }

    /// Register the trivial self-alias of a block refinement: the refinement
    /// is its own base and covers its whole shape.
    pub fn insert_whole_ref(&mut self, block: &Block, name: &str) {
        let r = block
            .ref_by_into(name)
            .unwrap_or_else(|| panic!("no refinement {name:?} on block {:?}", block.name));
        let extents = r
            .interior_shape
            .dims
            .iter()
            .map(|d| Extent { min: 0, max: d.size.saturating_sub(1) as i64 })
            .collect();
        self.insert(
            name,
            AliasInfo {
                base_ref: name.to_string(),
                access: r.access.clone(),
                shape: r.interior_shape.clone(),
                extents,
            },
        );
    }
}
