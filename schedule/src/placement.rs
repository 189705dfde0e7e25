//! Placement planning: deciding where each statement's refinements live in
//! cache.
//!
//! For one statement the planner produces a [`PlacementPlan`] via a ladder of
//! strategies, from "reuse what the runtime-future already expects, disturb
//! nothing" down to "ignore existing entries and pack sequentially". The
//! first strategy that fits wins; collisions the later strategies accept are
//! paid for with swap-ins when the plan is applied.

use std::collections::BTreeMap;

use smallvec::SmallVec;
use strata_ir::{Affine, RefDir, TensorShape};

use crate::cache::{ActiveIndex, EntArena, EntId};
use crate::io::Io;
use crate::mem::{MemRange, subtract_range};
use crate::ref_info::{RefInfoId, RefRegistry};

/// A proposed cache placement for one statement refinement.
#[derive(Debug, Clone)]
pub struct Placement {
    pub dir: RefDir,
    pub size: u64,
    pub range: MemRange,
    /// The live entry to reuse; `None` until either planning assigns one or
    /// plan application allocates one.
    pub entry: Option<EntId>,
    /// Internal placements cache a partial tile inside the sub-block being
    /// scheduled and cannot be reused across statements.
    pub is_internal: bool,
    /// For internal placements, the sub-block's local name for the tile.
    pub interior_name: String,
}

impl Placement {
    fn sized(dir: RefDir, size: u64, is_internal: bool, interior_name: String) -> Self {
        Self { dir, size, range: MemRange::default(), entry: None, is_internal, interior_name }
    }

    fn reuse(dir: RefDir, range: MemRange, entry: EntId) -> Self {
        Self { dir, size: range.size(), range, entry: Some(entry), is_internal: false, interior_name: String::new() }
    }
}

/// Identity of a placement within one statement's plan.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PlacementKey {
    pub ri: RefInfoId,
    pub cache_shape: TensorShape,
    pub access: SmallVec<[Affine; 4]>,
}

/// A statement's placement decisions, keyed deterministically.
pub type PlacementPlan = BTreeMap<PlacementKey, Placement>;

/// Read-only view of scheduler state the strategies consult.
pub struct Planner<'a> {
    pub reg: &'a RefRegistry,
    pub ents: &'a EntArena,
    pub active: &'a ActiveIndex,
    pub mem_bytes: u64,
    pub alignment: u64,
}

impl Planner<'_> {
    fn full_key(&self, ri: RefInfoId) -> PlacementKey {
        PlacementKey { ri, cache_shape: self.reg.get(ri).exterior_cache_shape.clone(), access: SmallVec::new() }
    }

    /// Partition the statement's IO into already-planned placements backed
    /// by live entries and per-unit todo lists, largest first.
    fn gather_placement_state(&self, ios: &[Io]) -> (PlacementPlan, BTreeMap<Affine, Vec<Io>>) {
        let mut plan = PlacementPlan::new();
        let mut todo_map: BTreeMap<RefInfoId, Io> = BTreeMap::new();

        for io in ios {
            let info = self.reg.get(io.ri);
            tracing::trace!(ref.name = %info.name, dir = ?io.dir, "planning io");
            let pkey = self.full_key(io.ri);
            if let Some(existing) = plan.get_mut(&pkey) {
                existing.dir = existing.dir.union(io.dir);
                continue;
            }

            // A live entry that has not yet seen its earliest writer will
            // still hold this value at the current position; reuse it.
            if let Some(ent_id) = info.cache_entry {
                let ent = self.ents.get(ent_id);
                if !ent.saw_earliest_writer {
                    plan.insert(pkey, Placement::reuse(io.dir, ent.range, ent_id));
                    continue;
                }
            }

            todo_map
                .entry(io.ri)
                .and_modify(|existing| existing.dir = existing.dir.union(io.dir))
                .or_insert_with(|| io.clone());
        }

        let mut todos: BTreeMap<Affine, Vec<Io>> = BTreeMap::new();
        for (ri, io) in todo_map {
            todos.entry(self.reg.get(ri).backing.location.unit.clone()).or_default().push(io);
        }
        for unit_ios in todos.values_mut() {
            unit_ios.sort_by(|lhs, rhs| {
                let l = self.reg.get(lhs.ri);
                let r = self.reg.get(rhs.ri);
                (r.size, &r.name).cmp(&(l.size, &l.name))
            });
        }

        (plan, todos)
    }

    fn full_placements(&self, ios: &[Io]) -> Vec<(PlacementKey, Placement)> {
        ios.iter()
            .map(|io| {
                let size = self.reg.get(io.ri).size;
                (self.full_key(io.ri), Placement::sized(io.dir, size, false, String::new()))
            })
            .collect()
    }

    fn partial_placements(&self, ios: &[Io]) -> Vec<(PlacementKey, Placement)> {
        ios.iter()
            .map(|io| {
                let interior_size = io.interior_shape.byte_size();
                let is_internal = interior_size != self.reg.get(io.ri).size;
                let access = if is_internal { io.access.clone() } else { SmallVec::new() };
                let key = PlacementKey { ri: io.ri, cache_shape: io.interior_shape.clone(), access };
                (key, Placement::sized(io.dir, interior_size, is_internal, io.interior_name.clone()))
            })
            .collect()
    }

    /// The strategy ladder. `is_block` enables the partial rungs, which only
    /// make sense for sub-block statements.
    pub fn try_make_plan(&self, is_block: bool, ios: &[Io]) -> Option<PlacementPlan> {
        let (existing, todos) = self.gather_placement_state(ios);

        let todo_fulls: BTreeMap<&Affine, Vec<_>> =
            todos.iter().map(|(unit, unit_ios)| (unit, self.full_placements(unit_ios))).collect();
        let todo_partials: BTreeMap<&Affine, Vec<_>> =
            todos.iter().map(|(unit, unit_ios)| (unit, self.partial_placements(unit_ios))).collect();

        if let Some(plan) = self.plan_with_no_swaps(&existing, &todo_fulls) {
            tracing::debug!("made plan with full io and no swaps");
            return Some(plan);
        }
        if is_block {
            if let Some(plan) = self.plan_with_no_swaps(&existing, &todo_partials) {
                tracing::debug!("made plan with partial io and no swaps");
                return Some(plan);
            }
        }
        if let Some(plan) = self.plan_with_swaps(&existing, &todo_fulls) {
            tracing::debug!("made plan with full io and swaps");
            return Some(plan);
        }
        if is_block {
            if let Some(plan) = self.plan_with_swaps(&existing, &todo_partials) {
                tracing::debug!("made plan with partial io and swaps");
                return Some(plan);
            }
        }
        if let Some(plan) = self.fallback_plan(&self.full_placements(ios)) {
            tracing::debug!("made fallback plan ignoring existing entries");
            return Some(plan);
        }
        if is_block {
            if let Some(plan) = self.fallback_plan(&self.partial_placements(ios)) {
                tracing::debug!("made partial fallback plan ignoring existing entries");
                return Some(plan);
            }
        }
        tracing::debug!("failed to make a placement plan");
        None
    }

    /// Best-waste first-fit: for each placement (already size-descending),
    /// take the smallest free range that still fits.
    fn try_place_in_ranges(
        &self,
        plan: &mut PlacementPlan,
        placements: &[(PlacementKey, Placement)],
        mut ranges: Vec<MemRange>,
    ) -> bool {
        for (key, placement) in placements {
            if let Some(existing) = plan.get_mut(key) {
                existing.dir = existing.dir.union(placement.dir);
                continue;
            }
            let size = placement.size;
            let mut best: Option<MemRange> = None;
            let mut best_waste = self.mem_bytes;
            for &r in &ranges {
                if r.size() < size {
                    continue;
                }
                let waste = r.size() - size;
                if waste < best_waste {
                    best = Some(r);
                    best_waste = waste;
                }
            }
            let Some(best) = best else {
                return false;
            };
            let assigned = MemRange::new(best.begin, best.begin + size);
            subtract_range(assigned, &mut ranges);
            let mut placed = placement.clone();
            placed.range = assigned;
            plan.insert(key.clone(), placed);
        }
        true
    }

    /// Strategy rungs 1-2: no entry already expected by the runtime-future
    /// may be displaced. A live entry's range is free only when the entry
    /// already has its initial writer (no swap-in would be forced) and the
    /// current statement does not itself require that refinement.
    fn plan_with_no_swaps(
        &self,
        existing: &PlacementPlan,
        todos: &BTreeMap<&Affine, Vec<(PlacementKey, Placement)>>,
    ) -> Option<PlacementPlan> {
        let mut plan = existing.clone();
        for (&unit, placements) in todos {
            let mut ranges = vec![MemRange::new(0, self.mem_bytes)];
            for &ent_id in self.active.list(unit) {
                let ent = self.ents.get(ent_id);
                let pkey = self.full_key(ent.source);
                if !(ent.saw_earliest_writer && !plan.contains_key(&pkey)) {
                    subtract_range(ent.range, &mut ranges);
                }
            }
            if !self.try_place_in_ranges(&mut plan, placements, ranges) {
                return None;
            }
        }
        Some(plan)
    }

    /// Strategy rungs 3-4: any live entry may be displaced (the apply step
    /// schedules the swap-ins), except entries the current statement itself
    /// requires.
    fn plan_with_swaps(
        &self,
        existing: &PlacementPlan,
        todos: &BTreeMap<&Affine, Vec<(PlacementKey, Placement)>>,
    ) -> Option<PlacementPlan> {
        let mut plan = existing.clone();
        for (&unit, placements) in todos {
            let mut ranges = vec![MemRange::new(0, self.mem_bytes)];
            for &ent_id in self.active.list(unit) {
                let ent = self.ents.get(ent_id);
                let pkey = self.full_key(ent.source);
                if plan.contains_key(&pkey) {
                    subtract_range(ent.range, &mut ranges);
                }
            }
            if !self.try_place_in_ranges(&mut plan, placements, ranges) {
                return None;
            }
        }
        Some(plan)
    }

    /// Strategy rungs 5-6: ignore existing entries entirely and pack each
    /// unit sequentially with aligned strides. Succeeds iff every statement
    /// refinement can coexist in memory at all.
    fn fallback_plan(&self, placements: &[(PlacementKey, Placement)]) -> Option<PlacementPlan> {
        let mut plan = PlacementPlan::new();
        let mut offsets: BTreeMap<Affine, u64> = BTreeMap::new();
        for (key, _) in placements {
            offsets.insert(self.reg.get(key.ri).backing.location.unit.clone(), 0);
        }

        for (key, placement) in placements {
            if let Some(existing) = plan.get_mut(key) {
                existing.dir = existing.dir.union(placement.dir);
                continue;
            }
            let unit = self.reg.get(key.ri).backing.location.unit.clone();
            let offset = offsets.get_mut(&unit).unwrap();
            let mut placed = placement.clone();
            placed.range = MemRange::new(*offset, *offset + placement.size);
            *offset += placement.size.div_ceil(self.alignment) * self.alignment;
            tracing::trace!(ref.name = %self.reg.get(key.ri).name, range = %placed.range, "fallback placement");
            plan.insert(key.clone(), placed);
        }

        if offsets.values().any(|&used| self.mem_bytes < used) {
            return None;
        }
        Some(plan)
    }
}
