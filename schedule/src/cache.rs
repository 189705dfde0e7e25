//! Cache entries and the active-entries index.
//!
//! A [`CacheEntry`] is one local instantiation of a backing refinement's
//! value: a byte range in some locality unit plus the runtime-future usage
//! bookkeeping the reverse scan maintains. A value swapped out and back in
//! gets a fresh entry, so one refinement may own several entries over a
//! pass. Entries live in an append-only arena; [`EntId`]s stay valid for the
//! pass's duration.

use std::collections::BTreeMap;
use std::fmt;

use strata_ir::{Affine, AliasInfo, StmtId, TensorShape};

use crate::mem::MemRange;
use crate::placement::{Placement, PlacementKey};
use crate::ref_info::{RefInfoId, RefRegistry};

/// Stable handle to a [`CacheEntry`] in the arena.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntId(u32);

impl EntId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for EntId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// One scheduled allocation of cache bytes.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The backing refinement.
    pub source: RefInfoId,
    /// The entry's refinement name on the output block: `<ref>^<n>`.
    pub name: String,
    /// The entry's byte range while live.
    pub range: MemRange,
    /// Data shape: the interior shape for internal entries, the exterior
    /// cache shape otherwise.
    pub shape: TensorShape,
    /// Internal entries cache a partial tile inside one sub-block and are
    /// never reused across statements.
    pub is_internal: bool,
    /// For internal entries, the name the sub-block uses for the tile.
    pub interior_name: String,

    /// Runtime-earliest statement accessing this entry seen so far.
    pub first_accessor: Option<StmtId>,
    /// Runtime-future writers/readers of the entry's memory, with the alias
    /// summary each used.
    pub writers: BTreeMap<StmtId, AliasInfo>,
    pub readers: BTreeMap<StmtId, AliasInfo>,

    /// True once the runtime-earliest writer of this entry has been seen in
    /// the scan; entries still awaiting their first writer need a swap-in
    /// before their memory may be reused.
    pub saw_earliest_writer: bool,

    /// Portions of `range` not yet shadowed by later-scheduled (runtime
    /// earlier) entries. The entry leaves the active index when this
    /// empties.
    pub uncovered_ranges: Vec<MemRange>,
}

/// Append-only arena of cache entries.
#[derive(Debug, Default)]
pub struct EntArena {
    entries: Vec<CacheEntry>,
}

impl EntArena {
    /// Allocate an entry from an accepted placement, naming it from the
    /// source refinement's entry counter.
    pub fn alloc(&mut self, key: &PlacementKey, placement: &Placement, reg: &mut RefRegistry) -> EntId {
        let source = key.ri;
        let info = reg.get_mut(source);
        let name = format!("{}^{}", info.name, info.next_cache_entry);
        info.next_cache_entry += 1;

        tracing::debug!(
            entry = %name,
            range = %placement.range,
            unit = %info.backing.location.unit,
            shape = %key.cache_shape,
            is_internal = placement.is_internal,
            "created cache entry"
        );

        let id = EntId(self.entries.len() as u32);
        self.entries.push(CacheEntry {
            source,
            name,
            range: placement.range,
            shape: key.cache_shape.clone(),
            is_internal: placement.is_internal,
            interior_name: placement.interior_name.clone(),
            first_accessor: None,
            writers: BTreeMap::new(),
            readers: BTreeMap::new(),
            saw_earliest_writer: false,
            uncovered_ranges: vec![placement.range],
        });
        id
    }

    pub fn get(&self, id: EntId) -> &CacheEntry {
        &self.entries[id.index()]
    }

    pub fn get_mut(&mut self, id: EntId) -> &mut CacheEntry {
        &mut self.entries[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &CacheEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The live cache entries at the current scan position, grouped by locality
/// unit and ordered by range begin.
///
/// Every listed entry has non-empty uncovered ranges. The lists may contain
/// overlapping ranges and several entries for one refinement; entries valid
/// for the current statement are found through the ref registry, not here.
#[derive(Debug, Default)]
pub struct ActiveIndex {
    by_unit: BTreeMap<Affine, Vec<EntId>>,
}

impl ActiveIndex {
    pub fn list(&self, unit: &Affine) -> &[EntId] {
        self.by_unit.get(unit).map_or(&[], Vec::as_slice)
    }

    /// Merge newly created entries into a unit's list, restoring begin
    /// order.
    pub fn splice(&mut self, unit: Affine, added: Vec<EntId>, arena: &EntArena) {
        let list = self.by_unit.entry(unit).or_default();
        list.extend(added);
        list.sort_by_key(|&id| arena.get(id).range.begin);
    }

    pub fn remove(&mut self, unit: &Affine, id: EntId) {
        if let Some(list) = self.by_unit.get_mut(unit) {
            list.retain(|&other| other != id);
        }
    }

    /// All live entries, in unit order then begin order.
    pub fn all(&self) -> impl Iterator<Item = EntId> + '_ {
        self.by_unit.values().flatten().copied()
    }
}
