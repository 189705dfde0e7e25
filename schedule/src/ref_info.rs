//! Per-refinement scheduling state.
//!
//! One [`RefInfo`] exists per refinement visible to the scheduled block. It
//! carries the refinement's cache footprint, precomputed swap-block
//! templates, its alias group, and the mutable state the reverse scan
//! threads through: the live cache entry the runtime-future expects, the
//! earliest writer, accumulated swap-in readers, and the final-write flag.

use std::collections::BTreeMap;
use std::fmt;

use smallvec::SmallVec;
use strata_ir::{Affine, AliasInfo, AliasMap, AliasRelation, Block, Index, Refinement, StmtId, TensorShape};

use crate::cache::EntId;

/// Stable handle to a [`RefInfo`] in the registry.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefInfoId(u32);

impl RefInfoId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for RefInfoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Scheduling state for one backing refinement.
#[derive(Debug, Clone)]
pub struct RefInfo {
    /// The backing refinement, copied out of the block so the block's refs
    /// vector can be rebuilt freely at the end of the pass.
    pub backing: Refinement,
    pub alias_info: AliasInfo,

    /// The refinement's shape restrided to dense packing: the layout of its
    /// data while resident in cache, exterior to any sub-statement.
    pub exterior_cache_shape: TensorShape,
    /// Byte footprint of `exterior_cache_shape`.
    pub size: u64,

    /// Swap-block templates: one index per dim sized by the cache shape, and
    /// single-element tile shapes/accesses for the backing and cache sides.
    pub swap_idxs: Vec<Index>,
    pub ref_swap_access: SmallVec<[Affine; 4]>,
    pub cache_swap_access: SmallVec<[Affine; 4]>,
    pub ref_swap_shape: TensorShape,
    pub cache_swap_shape: TensorShape,

    /// Sticky-true once any swap refers to the backing memory; only used
    /// refinements survive onto the output block.
    pub used: bool,

    /// True once the swap-out covering the runtime-last write has been
    /// emitted; earlier writes may then elide their swap-outs.
    pub saw_final_write: bool,

    /// The live cache entry the runtime-future of the scan position expects
    /// to read this value from.
    pub cache_entry: Option<EntId>,

    /// Swap-in statements reading the backing memory; any swap-out of this
    /// refinement must order before all of them.
    pub swap_in_readers: std::collections::BTreeSet<StmtId>,

    /// Counter feeding `name^n` cache-entry names.
    pub next_cache_entry: usize,

    /// Registry members sharing this refinement's base ref (including self).
    pub aliases: Vec<RefInfoId>,

    /// Runtime-earliest statement writing this refinement, if any.
    pub earliest_writer: Option<StmtId>,

    /// The refinement's local name.
    pub name: String,
}

impl RefInfo {
    fn new(backing: Refinement, alias_info: AliasInfo) -> Self {
        let name = backing.into.clone();
        tracing::trace!(ref.name = %name, shape = %backing.interior_shape, "creating ref info");

        let exterior_cache_shape = backing.interior_shape.with_dense_strides();
        let size = exterior_cache_shape.byte_size();

        let mut swap_idxs = Vec::new();
        let mut ref_swap_access = SmallVec::new();
        let mut cache_swap_access = SmallVec::new();
        for (i, dim_size) in exterior_cache_shape.sizes().into_iter().enumerate() {
            let iname = format!("i{i}");
            swap_idxs.push(Index::range(iname.clone(), dim_size));
            ref_swap_access.push(Affine::index(iname.clone()));
            cache_swap_access.push(Affine::index(iname));
        }

        let ref_swap_shape = backing.interior_shape.with_unit_sizes();
        let cache_swap_shape = exterior_cache_shape.with_unit_sizes();

        Self {
            backing,
            alias_info,
            exterior_cache_shape,
            size,
            swap_idxs,
            ref_swap_access,
            cache_swap_access,
            ref_swap_shape,
            cache_swap_shape,
            used: false,
            saw_final_write: false,
            cache_entry: None,
            swap_in_readers: Default::default(),
            next_cache_entry: 0,
            aliases: Vec::new(),
            earliest_writer: None,
            name,
        }
    }
}

/// All [`RefInfo`]s for one pass, with name lookup.
#[derive(Debug, Default)]
pub struct RefRegistry {
    infos: Vec<RefInfo>,
    by_name: BTreeMap<String, RefInfoId>,
}

impl RefRegistry {
    /// Build the registry for `block`: one info per refinement, earliest
    /// writers scanned from the statement order, alias groups keyed by base
    /// ref.
    pub fn build(block: &Block, alias_map: &AliasMap) -> Self {
        let mut reg = Self::default();
        for r in &block.refs {
            let alias = alias_map
                .info(&r.into)
                .unwrap_or_else(|| panic!("no alias info for refinement {:?}", r.into))
                .clone();
            let id = RefInfoId(reg.infos.len() as u32);
            reg.by_name.insert(r.into.clone(), id);
            reg.infos.push(RefInfo::new(r.clone(), alias));
        }

        for (sid, stmt) in block.stmts.iter() {
            for written in stmt.kind.buffer_writes() {
                let ri = reg.lookup(written);
                let info = reg.get_mut(ri);
                if info.earliest_writer.is_none() {
                    info.earliest_writer = Some(sid);
                }
            }
        }

        let mut groups: BTreeMap<String, Vec<RefInfoId>> = BTreeMap::new();
        for (i, info) in reg.infos.iter().enumerate() {
            groups.entry(info.alias_info.base_ref.clone()).or_default().push(RefInfoId(i as u32));
        }
        for group in groups.values() {
            for &id in group {
                reg.infos[id.index()].aliases = group.clone();
            }
            // Distinct refinements writing the same storage under an Exact
            // alias route their swap-out elision through separate final-write
            // flags; surface such inputs instead of mis-eliding silently.
            for (i, &a) in group.iter().enumerate() {
                for &b in &group[i + 1..] {
                    let exact = AliasInfo::compare(&reg.infos[a.index()].alias_info, &reg.infos[b.index()].alias_info)
                        == AliasRelation::Exact;
                    if exact
                        && reg.infos[a.index()].earliest_writer.is_some()
                        && reg.infos[b.index()].earliest_writer.is_some()
                    {
                        tracing::warn!(
                            lhs = %reg.infos[a.index()].name,
                            rhs = %reg.infos[b.index()].name,
                            "distinct refinements write the same storage with exact aliasing; \
                             swap-out elision is tracked per refinement"
                        );
                    }
                }
            }
        }
        reg
    }

    pub fn get(&self, id: RefInfoId) -> &RefInfo {
        &self.infos[id.index()]
    }

    pub fn get_mut(&mut self, id: RefInfoId) -> &mut RefInfo {
        &mut self.infos[id.index()]
    }

    /// Resolve a refinement name. Unknown names are a caller bug.
    pub fn lookup(&self, name: &str) -> RefInfoId {
        *self
            .by_name
            .get(name)
            .unwrap_or_else(|| panic!("statement references unknown refinement {name:?}"))
    }

    pub fn iter(&self) -> impl Iterator<Item = &RefInfo> {
        self.infos.iter()
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }
}
