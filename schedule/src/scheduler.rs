//! The reverse-order scheduling pass.
//!
//! Statements are scanned in reverse runtime order, so the scan's past is
//! the runtime's future: at each position the live state describes what
//! already-scheduled (runtime-later) statements expect to find in cache, and
//! the current statement must be folded in without breaking those
//! expectations. Scanning backwards lets data movement start as early as
//! possible at runtime, and keeps the state "what the future needs" instead
//! of a past that would need fixing up.
//!
//! Reverse traversal is part of the data-structure contract, not an
//! implementation detail: [`RefInfo::cache_entry`](crate::ref_info::RefInfo)
//! means "the entry the runtime-future reads from", `saw_earliest_writer`
//! means "the entry's runtime-first writer has been scanned", and every
//! placement strategy assumes that reading.

use std::collections::{BTreeMap, BTreeSet};

use strata_ir::{
    Affine, AliasInfo, AliasMap, AliasRelation, Block, Pos, RefDir, Refinement, StmtId, StmtKind,
};

use crate::cache::{ActiveIndex, EntArena, EntId};
use crate::deps::rebuild_transitive_deps;
use crate::error::{ResourceExhaustedSnafu, Result};
use crate::io::{bind_statement, gather_ios};
use crate::mem::{overlaps_any, subtract_range};
use crate::options::ScheduleOptions;
use crate::placement::Planner;
use crate::ref_info::{RefInfoId, RefRegistry};
use crate::swap::{SwapDir, subblock_swap, whole_ref_swap};

/// Rewrite `block` so its statements address cache-resident refinements,
/// inserting swap blocks as needed.
///
/// On return, statement refinement names refer to generated cache entries,
/// the block's refs vector holds exactly the used backing refinements plus
/// one `dir=None` refinement per cache entry (sorted by name), and statement
/// deps are transitively minimal.
///
/// The pass is not idempotent: a block must be scheduled at most once.
/// Missing alias info or dangling refinement names are caller bugs and
/// panic; the only recoverable failure is
/// [`ResourceExhausted`](crate::Error::ResourceExhausted).
pub fn schedule(alias_map: &AliasMap, block: &mut Block, options: &ScheduleOptions) -> Result<()> {
    debug_assert!(
        block.refs.iter().all(|r| !r.into.contains('^')),
        "block {:?} appears to already be scheduled",
        block.name
    );
    Scheduler {
        mem_loc: options.mem_loc.clone(),
        mem_bytes: options.mem_bytes(),
        alignment: options.effective_alignment(),
        xfer_loc: options.xfer_loc.clone(),
        reg: RefRegistry::build(block, alias_map),
        ents: EntArena::default(),
        active: ActiveIndex::default(),
        block,
    }
    .run()
}

struct Scheduler<'a> {
    block: &'a mut Block,
    mem_loc: strata_ir::Location,
    mem_bytes: u64,
    alignment: u64,
    xfer_loc: strata_ir::Location,
    reg: RefRegistry,
    ents: EntArena,
    active: ActiveIndex,
}

impl Scheduler<'_> {
    fn run(mut self) -> Result<()> {
        let mut cursor = self.block.stmts.last();
        while let Some(si) = cursor {
            // Swaps insert after `si`, never before it, so the predecessor
            // link is stable across the statement's processing.
            cursor = self.block.stmts.prev(si);
            self.schedule_statement(si)?;
        }
        self.finish();
        Ok(())
    }

    fn schedule_statement(&mut self, si: StmtId) -> Result<()> {
        // Insertion point for statements that must run after `si`:
        // swap-ins of invalidated aliases, and the current write's swap-out.
        let mut si_next: Pos = self.block.stmts.next(si);

        let stmt = self.block.stmts.get(si);
        let is_block = matches!(stmt.kind, StmtKind::Block(_));
        if let StmtKind::Block(b) = &stmt.kind {
            tracing::debug!(block = %b.name, "scheduling");
        } else {
            tracing::debug!(stmt = ?si, "scheduling");
        }

        let ios = gather_ios(stmt, &self.reg);

        // Writes invalidate live cache entries of aliased refinements: the
        // runtime-future readers of each alias must be served by a fresh
        // entry filled after this write. Collect, per written ref, the
        // swap-in statements across its alias set that will read the backing
        // memory; a swap-out of the write must order before all of them.
        let mut pending: BTreeMap<RefInfoId, BTreeSet<StmtId>> = BTreeMap::new();
        for io in &ios {
            if !io.dir.is_write() {
                continue;
            }
            let ri = io.ri;
            let mut readers = pending.remove(&ri).unwrap_or_default();
            for alias in self.reg.get(ri).aliases.clone() {
                let related = alias == ri
                    || AliasInfo::compare(&self.reg.get(ri).alias_info, &self.reg.get(alias).alias_info)
                        != AliasRelation::None;
                if !related {
                    continue;
                }
                if alias != ri
                    && let Some(ent) = self.reg.get(alias).cache_entry
                {
                    let swap_in = self.schedule_swap_in(si_next, ent);
                    si_next = Some(swap_in);
                    self.reg.get_mut(alias).cache_entry = None;
                }
                readers.extend(self.reg.get(alias).swap_in_readers.iter().copied());
            }
            pending.insert(ri, readers);
        }

        let planner = Planner {
            reg: &self.reg,
            ents: &self.ents,
            active: &self.active,
            mem_bytes: self.mem_bytes,
            alignment: self.alignment,
        };
        let Some(plan) = planner.try_make_plan(is_block, &ios) else {
            let block = match &self.block.stmts.get(si).kind {
                StmtKind::Block(b) => b.name.clone(),
                _ => self.block.name.clone(),
            };
            let refs: Vec<String> = ios.iter().map(|io| self.reg.get(io.ri).name.clone()).collect();
            tracing::debug!(block = %block, "no placement plan fits");
            return ResourceExhaustedSnafu { block, mem_kib: self.mem_bytes / 1024, refs }.fail();
        };

        let mut added_entries: BTreeMap<Affine, Vec<EntId>> = BTreeMap::new();
        let mut added_refs: Vec<Refinement> = Vec::new();
        let mut internal_backing_names: BTreeMap<RefInfoId, String> = BTreeMap::new();

        for (pkey, placement) in &plan {
            let ri = pkey.ri;
            let is_new = placement.entry.is_none();
            let ent_id = match placement.entry {
                Some(id) => id,
                None => {
                    let id = self.ents.alloc(pkey, placement, &mut self.reg);
                    self.reg.get_mut(ri).cache_entry = Some(id);
                    id
                }
            };

            // The statement overlapping entries must wait for; a scheduled
            // swap-out supersedes the statement itself.
            let mut reuse_dep = si;

            if placement.is_internal {
                // A partial tile cached within the sub-block. The sub-block
                // needs a bridging refinement to reach the backing storage,
                // plus head/tail slice transfers.
                self.reg.get_mut(ri).used = true;
                let backing_name = match internal_backing_names.get(&ri).cloned() {
                    Some(name) => name,
                    None => {
                        let StmtKind::Block(current) = &self.block.stmts.get(si).kind else {
                            unreachable!("internal placement for a non-block statement")
                        };
                        let info = self.reg.get(ri);
                        let name = current.unique_ref_name(&format!("{}_storage", info.name));
                        added_refs.push(Refinement {
                            dir: placement.dir,
                            from: info.backing.into.clone(),
                            into: name.clone(),
                            access: info.alias_info.access.clone(),
                            interior_shape: info.alias_info.shape.clone(),
                            location: info.backing.location.clone(),
                            offset: 0,
                            is_const: info.backing.is_const,
                            cache_unit: info.backing.cache_unit.clone(),
                        });
                        internal_backing_names.insert(ri, name.clone());
                        name
                    }
                };
                if placement.dir.is_read() {
                    let swap = subblock_swap(
                        SwapDir::In,
                        self.reg.get(ri),
                        self.ents.get(ent_id),
                        &backing_name,
                        &pkey.access,
                        &self.mem_loc,
                        &self.xfer_loc,
                    );
                    let StmtKind::Block(current) = &mut self.block.stmts.get_mut(si).kind else {
                        unreachable!()
                    };
                    let head = current.stmts.first();
                    current.stmts.insert_before(head, StmtKind::Block(swap));
                }
                if placement.dir.is_write() {
                    let swap = subblock_swap(
                        SwapDir::Out,
                        self.reg.get(ri),
                        self.ents.get(ent_id),
                        &backing_name,
                        &pkey.access,
                        &self.mem_loc,
                        &self.xfer_loc,
                    );
                    let StmtKind::Block(current) = &mut self.block.stmts.get_mut(si).kind else {
                        unreachable!()
                    };
                    current.stmts.push_back(StmtKind::Block(swap));
                }
            } else {
                // Externally visible entry, reusable across statements.
                if placement.dir.is_write() {
                    // Runtime-future readers of this memory must finish
                    // before the write unless provably disjoint.
                    let readers: Vec<(StmtId, AliasInfo)> =
                        self.ents.get(ent_id).readers.iter().map(|(id, ai)| (*id, ai.clone())).collect();
                    for (reader, reader_alias) in readers {
                        if AliasInfo::compare(&self.reg.get(ri).alias_info, &reader_alias) != AliasRelation::None {
                            self.block.stmts.get_mut(reader).deps.push(si);
                        }
                    }
                    let alias = self.reg.get(ri).alias_info.clone();
                    self.ents.get_mut(ent_id).writers.insert(si, alias);
                    if self.reg.get(ri).earliest_writer == Some(si) {
                        self.ents.get_mut(ent_id).saw_earliest_writer = true;
                    }
                }
                if placement.dir.is_read() {
                    let alias = self.reg.get(ri).alias_info.clone();
                    self.ents.get_mut(ent_id).readers.insert(si, alias);
                }
                self.ents.get_mut(ent_id).first_accessor = Some(si);

                // A write swaps out when the block boundary wants the value
                // (out/inout backing not yet finally written) or when
                // runtime-future swap-ins re-read the backing memory.
                let has_pending = pending.get(&ri).is_some_and(|readers| !readers.is_empty());
                let info = self.reg.get(ri);
                if placement.dir.is_write() && ((info.backing.dir.is_write() && !info.saw_final_write) || has_pending)
                {
                    tracing::debug!(
                        entry = %self.ents.get(ent_id).name,
                        range = %self.ents.get(ent_id).range,
                        "adding swap-out"
                    );
                    let after_si = self.block.stmts.next(si);
                    let swap_out = self.schedule_swap_out(after_si, ent_id, pending.get(&ri));
                    self.block.stmts.get_mut(swap_out).deps.push(si);
                    reuse_dep = swap_out;
                }
            }

            // Collide with runtime-future entries sharing this unit. Each
            // overlapped entry loses the overlap from its uncovered ranges;
            // entries still awaiting their first writer get re-filled by a
            // swap-in right after the overwriter.
            let unit = self.reg.get(ri).backing.location.unit.clone();
            let ent_range = self.ents.get(ent_id).range;
            for future in self.active.list(&unit).to_vec() {
                if future == ent_id || !overlaps_any(ent_range, &self.ents.get(future).uncovered_ranges) {
                    continue;
                }
                if is_new {
                    tracing::debug!(
                        new = %self.ents.get(ent_id).name,
                        existing = %self.ents.get(future).name,
                        range = %self.ents.get(future).range,
                        "cache range collision"
                    );
                    if !self.ents.get(future).saw_earliest_writer {
                        let pos = self.block.stmts.next(reuse_dep);
                        self.schedule_swap_in(pos, future);
                    }
                    for writer in self.ents.get(future).writers.keys().copied().collect::<Vec<_>>() {
                        self.block.stmts.get_mut(writer).deps.push(reuse_dep);
                    }
                    subtract_range(ent_range, &mut self.ents.get_mut(future).uncovered_ranges);
                    if self.ents.get(future).uncovered_ranges.is_empty() {
                        tracing::debug!(entry = %self.ents.get(future).name, "entry fully covered, retiring");
                        self.active.remove(&unit, future);
                        let source = self.ents.get(future).source;
                        if self.reg.get(source).cache_entry == Some(future) {
                            self.reg.get_mut(source).cache_entry = None;
                        }
                    }
                }
                for writer in self.ents.get(future).writers.keys().copied().collect::<Vec<_>>() {
                    self.block.stmts.get_mut(writer).deps.push(reuse_dep);
                }
            }

            if is_new && !placement.is_internal {
                added_entries.entry(unit).or_default().push(ent_id);
            }
        }

        for (unit, list) in added_entries {
            self.active.splice(unit, list, &self.ents);
        }

        bind_statement(self.block.stmts.get_mut(si), &self.reg, &self.ents, &self.mem_loc);
        if !added_refs.is_empty() {
            let StmtKind::Block(current) = &mut self.block.stmts.get_mut(si).kind else {
                unreachable!("bridging refinements for a non-block statement")
            };
            current.refs.extend(added_refs);
        }

        // Internal entries must not serve earlier-scheduled statements.
        for pkey in plan.keys() {
            let info = self.reg.get(pkey.ri);
            if let Some(ent) = info.cache_entry
                && self.ents.get(ent).is_internal
            {
                self.reg.get_mut(pkey.ri).cache_entry = None;
            }
        }
        Ok(())
    }

    /// Insert a swap-in for `ent` before `pos`: the swap-in becomes a writer
    /// of the entry and a swap-in reader of its source, and every known
    /// reader of the entry waits for it. Deps *onto* the swap-in are the
    /// caller's concern.
    fn schedule_swap_in(&mut self, pos: Pos, ent_id: EntId) -> StmtId {
        let source = self.ents.get(ent_id).source;
        self.reg.get_mut(source).used = true;
        tracing::debug!(entry = %self.ents.get(ent_id).name, "adding swap-in");

        let swap = whole_ref_swap(SwapDir::In, self.reg.get(source), self.ents.get(ent_id), &self.mem_loc, &self.xfer_loc);
        let id = self.block.stmts.insert_before(pos, StmtKind::Block(swap));

        let alias = self.reg.get(source).alias_info.clone();
        self.ents.get_mut(ent_id).writers.insert(id, alias);
        self.reg.get_mut(source).swap_in_readers.insert(id);
        for reader in self.ents.get(ent_id).readers.keys().copied().collect::<Vec<_>>() {
            self.block.stmts.get_mut(reader).deps.push(id);
        }
        self.ents.get_mut(ent_id).saw_earliest_writer = true;
        id
    }

    /// Insert a swap-out for `ent` before `pos`: every pending swap-in
    /// reader of the backing memory waits for it, and the source's final
    /// write is recorded. Deps *onto* the swap-out are the caller's concern.
    fn schedule_swap_out(&mut self, pos: Pos, ent_id: EntId, swap_in_readers: Option<&BTreeSet<StmtId>>) -> StmtId {
        let source = self.ents.get(ent_id).source;
        self.reg.get_mut(source).used = true;

        let swap = whole_ref_swap(SwapDir::Out, self.reg.get(source), self.ents.get(ent_id), &self.mem_loc, &self.xfer_loc);
        let id = self.block.stmts.insert_before(pos, StmtKind::Block(swap));

        if let Some(readers) = swap_in_readers {
            for &reader in readers {
                self.block.stmts.get_mut(reader).deps.push(id);
            }
        }
        self.reg.get_mut(source).saw_final_write = true;
        id
    }

    fn finish(&mut self) {
        // Still-live entries whose source has no writer inside the block
        // hold program inputs. They can all coexist from the start, so each
        // swap-in goes directly before the entry's first user; the swap-ins
        // have no incoming deps and may run in any order.
        for ent_id in self.active.all().collect::<Vec<_>>() {
            let source = self.ents.get(ent_id).source;
            if self.reg.get(source).earliest_writer.is_none() {
                let first = self.ents.get(ent_id).first_accessor.unwrap_or_else(|| {
                    panic!("live cache entry {} was never accessed", self.ents.get(ent_id).name)
                });
                self.schedule_swap_in(Some(first), ent_id);
            }
        }

        // Rebuild the refs vector: one refinement per cache entry plus every
        // used backing refinement.
        let mut refs: Vec<Refinement> = Vec::with_capacity(self.ents.len() + self.reg.len());
        for ent in self.ents.iter() {
            let info = self.reg.get(ent.source);
            let mut r = info.backing.clone();
            r.dir = RefDir::None;
            r.from = String::new();
            r.into = ent.name.clone();
            r.interior_shape = ent.shape.clone();
            r.location = self.mem_loc.clone();
            if let Some(unit) = &info.backing.cache_unit {
                r.location.unit = unit.clone();
            }
            r.offset = ent.range.begin;
            refs.push(r);
        }
        for info in self.reg.iter() {
            if info.used {
                refs.push(info.backing.clone());
            }
        }
        refs.sort_by(|a, b| a.into.cmp(&b.into));
        self.block.refs = refs;

        rebuild_transitive_deps(self.block);
    }
}
