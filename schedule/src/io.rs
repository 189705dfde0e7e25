//! Per-statement IO gathering and post-placement name binding.
//!
//! [`gather_ios`] lists the refinements a statement touches, with the
//! interior shape and access for sub-blocks so partial placements can be
//! considered. [`bind_statement`] is the deferred rewrite: once a placement
//! plan has been applied, it repoints the statement's refinement-name
//! fields at the assigned cache entries. Binding resolves the statement's
//! still-original names, so it must happen while the registry still
//! reflects the current statement, before the scan moves on.

use std::collections::BTreeMap;

use smallvec::SmallVec;
use strata_ir::{Affine, Location, RefDir, Statement, StmtKind, TensorShape};

use crate::cache::EntArena;
use crate::ref_info::{RefInfoId, RefRegistry};

/// One unit of IO performed by a statement.
#[derive(Debug, Clone)]
pub struct Io {
    pub ri: RefInfoId,
    pub dir: RefDir,
    /// The shape the statement accesses, densely restrided. Equals the
    /// exterior cache shape except for sub-block refinements.
    pub interior_shape: TensorShape,
    /// The sub-block's local name for the refinement (empty otherwise).
    pub interior_name: String,
    /// Sub-block access affines; empty for non-block statements.
    pub access: SmallVec<[Affine; 4]>,
}

impl Io {
    fn whole(ri: RefInfoId, dir: RefDir, reg: &RefRegistry) -> Self {
        Self {
            ri,
            dir,
            interior_shape: reg.get(ri).exterior_cache_shape.clone(),
            interior_name: String::new(),
            access: SmallVec::new(),
        }
    }
}

/// List the IO a statement performs.
pub fn gather_ios(stmt: &Statement, reg: &RefRegistry) -> Vec<Io> {
    match &stmt.kind {
        StmtKind::Load { from, .. } => vec![Io::whole(reg.lookup(from), RefDir::In, reg)],
        StmtKind::Store { into, .. } => vec![Io::whole(reg.lookup(into), RefDir::Out, reg)],
        StmtKind::Special { inputs, outputs, .. } => {
            let mut accesses: BTreeMap<RefInfoId, RefDir> = BTreeMap::new();
            for name in inputs {
                let ri = reg.lookup(name);
                let dir = accesses.entry(ri).or_insert(RefDir::None);
                *dir = dir.union(RefDir::In);
            }
            for name in outputs {
                let ri = reg.lookup(name);
                let dir = accesses.entry(ri).or_insert(RefDir::None);
                *dir = dir.union(RefDir::Out);
            }
            accesses.into_iter().map(|(ri, dir)| Io::whole(ri, dir, reg)).collect()
        }
        StmtKind::Block(block) => block
            .refs
            .iter()
            .filter(|r| r.dir != RefDir::None)
            .map(|r| Io {
                ri: reg.lookup(&r.from),
                dir: r.dir,
                interior_shape: r.interior_shape.with_dense_strides(),
                interior_name: r.into.clone(),
                access: r.access.clone(),
            })
            .collect(),
        StmtKind::Constant { .. } | StmtKind::Intrinsic { .. } => vec![],
    }
}

/// Rewrite a statement's refinement references to the cache entries its
/// placements resolved to.
pub fn bind_statement(stmt: &mut Statement, reg: &RefRegistry, ents: &EntArena, mem_loc: &Location) {
    let entry_name = |name: &str| -> String {
        let info = reg.get(reg.lookup(name));
        let ent = info
            .cache_entry
            .unwrap_or_else(|| panic!("binding {name:?} before a cache entry was placed"));
        ents.get(ent).name.clone()
    };

    match &mut stmt.kind {
        StmtKind::Load { from, .. } => *from = entry_name(from),
        StmtKind::Store { into, .. } => *into = entry_name(into),
        StmtKind::Special { inputs, outputs, .. } => {
            for name in inputs.iter_mut().chain(outputs.iter_mut()) {
                *name = entry_name(name);
            }
        }
        StmtKind::Block(block) => {
            let mut bound = Vec::new();
            for r in block.refs.iter_mut().filter(|r| r.dir != RefDir::None) {
                let id = reg.lookup(&r.from);
                let info = reg.get(id);
                let ent_id = info
                    .cache_entry
                    .unwrap_or_else(|| panic!("binding {:?} before a cache entry was placed", r.from));
                let ent = ents.get(ent_id);

                r.from = ent.name.clone();
                r.location = mem_loc.clone();
                if let Some(unit) = &info.backing.cache_unit {
                    r.location.unit = unit.clone();
                }
                if ent.is_internal {
                    // The sub-block sees only its local tile.
                    r.interior_shape = ent.shape.clone();
                    for access in r.access.iter_mut() {
                        *access = Affine::default();
                    }
                } else {
                    for (dim, cache_dim) in r.interior_shape.dims.iter_mut().zip(&info.exterior_cache_shape.dims) {
                        dim.stride = cache_dim.stride;
                    }
                }
                bound.push(r.into.clone());
            }
            for name in bound {
                block.fixup_refs(&name);
            }
        }
        StmtKind::Constant { .. } | StmtKind::Intrinsic { .. } => {}
    }
}
