//! Construction of swap blocks: the generated sub-blocks that move data
//! between backing memory and cache.
//!
//! A whole-ref swap covers a full cache entry with one index per dimension
//! and single-element tiles. A sub-block swap moves a partial tile at the
//! head or tail of the enclosing block, offsetting the backing access by the
//! tile's access affines.

use std::collections::BTreeSet;

use smallvec::SmallVec;
use strata_ir::{Affine, Block, Index, Location, RefDir, Refinement, StmtKind, TensorShape};

use crate::cache::CacheEntry;
use crate::ref_info::RefInfo;

/// Transfer direction of a swap block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapDir {
    /// Backing memory → cache.
    In,
    /// Cache → backing memory.
    Out,
}

/// The cache-side locality: `mem_loc` with the source's unit override.
fn banked_mem_loc(ri: &RefInfo, mem_loc: &Location) -> Location {
    let mut loc = mem_loc.clone();
    if let Some(unit) = &ri.backing.cache_unit {
        loc.unit = unit.clone();
    }
    loc
}

/// One side of a swap block, before it is named `src` or `dst`.
struct Side {
    from: String,
    access: SmallVec<[Affine; 4]>,
    shape: TensorShape,
    location: Location,
}

/// Assemble the block body: the two refinements in transfer order and the
/// element copy statements.
fn finish(block: &mut Block, dir: SwapDir, backing: Side, cache: Side, is_const: bool) {
    let (src, dst) = match dir {
        SwapDir::In => (backing, cache),
        SwapDir::Out => (cache, backing),
    };
    for (side, name, side_dir) in [(src, "src", RefDir::In), (dst, "dst", RefDir::Out)] {
        block.refs.push(Refinement {
            dir: side_dir,
            from: side.from,
            into: name.into(),
            access: side.access,
            interior_shape: side.shape,
            location: side.location,
            offset: 0,
            is_const,
            cache_unit: None,
        });
    }
    block.stmts.push_back(StmtKind::Load { from: "src".into(), into: "$X".into() });
    block.stmts.push_back(StmtKind::Store { from: "$X".into(), into: "dst".into() });
}

/// Build a whole-ref transfer block between a backing refinement and one of
/// its cache entries.
pub fn whole_ref_swap(dir: SwapDir, ri: &RefInfo, ent: &CacheEntry, mem_loc: &Location, xfer_loc: &Location) -> Block {
    let mut block = Block::new(match dir {
        SwapDir::In => format!("swap_in_{}", ent.name),
        SwapDir::Out => format!("swap_out_{}", ent.name),
    });
    block.location = xfer_loc.clone();
    block.idxs = ri.swap_idxs.clone();

    let backing = Side {
        from: ri.backing.into.clone(),
        access: ri.ref_swap_access.clone(),
        shape: ri.ref_swap_shape.clone(),
        location: ri.backing.location.clone(),
    };
    let cache = Side {
        from: ent.name.clone(),
        access: ri.cache_swap_access.clone(),
        shape: ri.cache_swap_shape.clone(),
        location: banked_mem_loc(ri, mem_loc),
    };
    finish(&mut block, dir, backing, cache, ri.backing.is_const);
    block
}

/// Build a partial-tile transfer block for an internal placement. Lives at
/// the head (swap-in) or tail (swap-out) of the enclosing sub-block;
/// `backing_name` is the bridging refinement on that sub-block.
pub fn subblock_swap(
    dir: SwapDir,
    ri: &RefInfo,
    ent: &CacheEntry,
    backing_name: &str,
    access: &[Affine],
    mem_loc: &Location,
    xfer_loc: &Location,
) -> Block {
    let mut block = Block::new(match dir {
        SwapDir::In => format!("read_slice_of_{}", ri.name),
        SwapDir::Out => format!("write_slice_of_{}", ri.name),
    });
    block.location = xfer_loc.clone();

    // Forward every index variable the access affines mention.
    let mut seen = BTreeSet::new();
    for affine in access {
        for var in affine.vars() {
            if seen.insert(var.to_string()) {
                block.idxs.push(Index::passthrough(var, Affine::index(var)));
            }
        }
    }

    // Tile indices ranging over the entry, offset into the backing by the
    // tile's access.
    let mut backing_access: SmallVec<[Affine; 4]> = SmallVec::new();
    let mut cache_access: SmallVec<[Affine; 4]> = SmallVec::new();
    for (i, affine) in access.iter().enumerate() {
        let iname = block.unique_idx_name(&format!("i{i}"));
        block.idxs.push(Index::range(iname.clone(), ent.shape.dims[i].size));
        backing_access.push(&Affine::index(iname.clone()) + affine);
        cache_access.push(Affine::index(iname));
    }

    let backing = Side {
        from: backing_name.to_string(),
        access: backing_access,
        shape: ri.ref_swap_shape.clone(),
        location: ri.backing.location.clone(),
    };
    let cache = Side {
        from: ent.interior_name.clone(),
        access: cache_access,
        shape: ri.cache_swap_shape.clone(),
        location: banked_mem_loc(ri, mem_loc),
    };
    finish(&mut block, dir, backing, cache, ri.backing.is_const);
    block
}
