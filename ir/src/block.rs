//! Blocks and refinements.
//!
//! A [`Block`] is the unit the scheduler operates on: named index variables,
//! a refinement table, and an ordered statement body. A [`Refinement`] binds a
//! local name (`into`) to a view of a parent-scope refinement (`from`) with an
//! affine access, an interior shape, and a memory locality.

use std::collections::BTreeSet;

use smallvec::SmallVec;
use snafu::ensure;

use crate::affine::Affine;
use crate::error::{AccessRankMismatchSnafu, DanglingRefNameSnafu, DuplicateRefinementSnafu, Error};
use crate::shape::TensorShape;
use crate::stmt::{StmtKind, StmtList};
use crate::types::{Index, Location, RefDir};

/// A named view of tensor storage visible to one block.
#[derive(Debug, Clone)]
pub struct Refinement {
    pub dir: RefDir,
    /// Name of the backing refinement in the parent scope. Empty for
    /// refinements that introduce storage themselves.
    pub from: String,
    /// Local name within the owning block.
    pub into: String,
    /// Per-dim affine access offsets into the backing refinement.
    pub access: SmallVec<[Affine; 4]>,
    pub interior_shape: TensorShape,
    pub location: Location,
    /// Byte offset within the location.
    pub offset: u64,
    pub is_const: bool,
    /// Overrides the locality unit when this refinement is cached.
    pub cache_unit: Option<Affine>,
}

impl Refinement {
    /// A whole-tensor refinement: zero access, zero offset.
    pub fn whole(dir: RefDir, name: impl Into<String>, shape: TensorShape, location: Location) -> Self {
        let access = shape.dims.iter().map(|_| Affine::default()).collect();
        Self {
            dir,
            from: String::new(),
            into: name.into(),
            access,
            interior_shape: shape,
            location,
            offset: 0,
            is_const: false,
            cache_unit: None,
        }
    }
}

/// An ordered sequence of statements over a refinement table.
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub name: String,
    pub location: Location,
    pub idxs: Vec<Index>,
    pub refs: Vec<Refinement>,
    pub stmts: StmtList,
}

impl Block {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn ref_by_into(&self, name: &str) -> Option<&Refinement> {
        self.refs.iter().find(|r| r.into == name)
    }

    pub fn ref_by_into_mut(&mut self, name: &str) -> Option<&mut Refinement> {
        self.refs.iter_mut().find(|r| r.into == name)
    }

    /// A refinement name based on `base` that no current refinement uses.
    pub fn unique_ref_name(&self, base: &str) -> String {
        if self.ref_by_into(base).is_none() {
            return base.to_string();
        }
        (0..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| self.ref_by_into(candidate).is_none())
            .unwrap()
    }

    /// An index name based on `base` that no current index uses.
    pub fn unique_idx_name(&self, base: &str) -> String {
        let taken = |name: &str| self.idxs.iter().any(|idx| idx.name == name);
        if !taken(base) {
            return base.to_string();
        }
        (0..).map(|n| format!("{base}_{n}")).find(|candidate| !taken(candidate)).unwrap()
    }

    /// Propagate the named refinement's location into nested sub-blocks whose
    /// refinements are backed by it, recursively.
    pub fn fixup_refs(&mut self, name: &str) {
        let Some(location) = self.ref_by_into(name).map(|r| r.location.clone()) else {
            return;
        };
        let ids: Vec<_> = self.stmts.ids().collect();
        for id in ids {
            let StmtKind::Block(inner) = &mut self.stmts.get_mut(id).kind else {
                continue;
            };
            let mut locals = Vec::new();
            for r in inner.refs.iter_mut().filter(|r| r.from == name) {
                r.location = location.clone();
                locals.push(r.into.clone());
            }
            for local in locals {
                inner.fixup_refs(&local);
            }
        }
    }

    /// Structural checks: refinement names are unique, every refinement name
    /// a statement mentions resolves on this block, access ranks match shape
    /// ranks. Recurses into sub-blocks.
    pub fn validate(&self) -> Result<(), Error> {
        let mut seen = BTreeSet::new();
        for r in &self.refs {
            ensure!(seen.insert(r.into.as_str()), DuplicateRefinementSnafu { name: r.into.clone() });
            ensure!(
                r.access.len() == r.interior_shape.rank(),
                AccessRankMismatchSnafu {
                    name: r.into.clone(),
                    access_rank: r.access.len(),
                    shape_rank: r.interior_shape.rank(),
                }
            );
        }
        for (_, stmt) in self.stmts.iter() {
            for name in stmt.kind.buffer_reads().into_iter().chain(stmt.kind.buffer_writes()) {
                ensure!(
                    seen.contains(name),
                    DanglingRefNameSnafu { stmt: self.name.clone(), name: name.to_string() }
                );
            }
            if let StmtKind::Block(inner) = &stmt.kind {
                inner.validate()?;
            }
        }
        Ok(())
    }
}
