use smallvec::SmallVec;
use strata_ir::{Block, RefDir, Statement, StmtKind};

use crate::cache::{ActiveIndex, EntArena, EntId};
use crate::io::gather_ios;
use crate::mem::MemRange;
use crate::placement::{Placement, PlacementKey, Planner};
use crate::ref_info::{RefInfoId, RefRegistry};
use crate::test::helpers::{dram_ref, whole_ref_aliases};

struct Fixture {
    reg: RefRegistry,
    ents: EntArena,
    active: ActiveIndex,
}

impl Fixture {
    /// A block of whole-tensor In refs of the given (name, bytes) table.
    fn new(refs: &[(&str, u64)]) -> (Self, Block) {
        let mut block = Block::new("main");
        for (name, bytes) in refs {
            block.refs.push(dram_ref(RefDir::In, name, *bytes));
        }
        let aliases = whole_ref_aliases(&block);
        let reg = RefRegistry::build(&block, &aliases);
        (Self { reg, ents: EntArena::default(), active: ActiveIndex::default() }, block)
    }

    fn key(&self, ri: RefInfoId) -> PlacementKey {
        PlacementKey {
            ri,
            cache_shape: self.reg.get(ri).exterior_cache_shape.clone(),
            access: SmallVec::new(),
        }
    }

    /// Install a live cache entry for `name` at `range`.
    fn live_entry(&mut self, name: &str, range: MemRange) -> EntId {
        let ri = self.reg.lookup(name);
        let key = self.key(ri);
        let placement = Placement {
            dir: RefDir::In,
            size: range.size(),
            range,
            entry: None,
            is_internal: false,
            interior_name: String::new(),
        };
        let ent = self.ents.alloc(&key, &placement, &mut self.reg);
        let unit = self.reg.get(ri).backing.location.unit.clone();
        self.active.splice(unit, vec![ent], &self.ents);
        ent
    }

    fn planner(&self, mem_bytes: u64) -> Planner<'_> {
        Planner { reg: &self.reg, ents: &self.ents, active: &self.active, mem_bytes, alignment: 4 }
    }
}

fn reading(names: &[&str]) -> Statement {
    Statement::new(StmtKind::Special {
        name: "consume".into(),
        inputs: names.iter().map(|n| n.to_string()).collect(),
        outputs: vec![],
    })
}

#[test]
fn empty_cache_places_from_zero() {
    let (fx, _) = Fixture::new(&[("a", 1024)]);
    let ios = gather_ios(&reading(&["a"]), &fx.reg);
    let plan = fx.planner(4096).try_make_plan(false, &ios).unwrap();
    let placement = &plan[&fx.key(fx.reg.lookup("a"))];
    assert_eq!(placement.range, MemRange::new(0, 1024));
    assert!(placement.entry.is_none());
}

#[test]
fn best_waste_prefers_tightest_hole() {
    // Live, writerless entries at [0,512) and [1024,1792) leave holes of
    // 512 and 256 bytes; a 256-byte request takes the exact-fit hole.
    let (mut fx, _) = Fixture::new(&[("a", 256), ("d1", 512), ("d2", 768)]);
    fx.live_entry("d1", MemRange::new(0, 512));
    fx.live_entry("d2", MemRange::new(1024, 1792));

    let ios = gather_ios(&reading(&["a"]), &fx.reg);
    let plan = fx.planner(2048).try_make_plan(false, &ios).unwrap();
    assert_eq!(plan[&fx.key(fx.reg.lookup("a"))].range, MemRange::new(1792, 2048));
}

#[test]
fn unwritten_entry_blocks_no_swap_rung_but_not_swap_rung() {
    // A writerless entry covering all of memory forces the with-swaps rung;
    // the new placement overlaps it and the apply step will owe a swap-in.
    let (mut fx, _) = Fixture::new(&[("a", 1024), ("d", 2048)]);
    fx.live_entry("d", MemRange::new(0, 2048));

    let ios = gather_ios(&reading(&["a"]), &fx.reg);
    let plan = fx.planner(2048).try_make_plan(false, &ios).unwrap();
    assert_eq!(plan[&fx.key(fx.reg.lookup("a"))].range, MemRange::new(0, 1024));
}

#[test]
fn reused_entry_keeps_its_range() {
    let (mut fx, _) = Fixture::new(&[("p", 512)]);
    let ent = fx.live_entry("p", MemRange::new(256, 768));
    let p = fx.reg.lookup("p");
    fx.reg.get_mut(p).cache_entry = Some(ent);

    let ios = gather_ios(&reading(&["p"]), &fx.reg);
    let plan = fx.planner(1024).try_make_plan(false, &ios).unwrap();
    let placement = &plan[&fx.key(fx.reg.lookup("p"))];
    assert_eq!(placement.entry, Some(ent));
    assert_eq!(placement.range, MemRange::new(256, 768));
}

#[test]
fn fallback_repacks_when_reuse_fragments_memory() {
    // p's live entry sits mid-memory, splitting the free space so q cannot
    // fit around it; the fallback rung drops the reuse and packs both
    // sequentially with aligned strides.
    let (mut fx, _) = Fixture::new(&[("p", 500), ("q", 300)]);
    let ent = fx.live_entry("p", MemRange::new(256, 756));
    let p = fx.reg.lookup("p");
    fx.reg.get_mut(p).cache_entry = Some(ent);

    let ios = gather_ios(&reading(&["p", "q"]), &fx.reg);
    let planner = Planner { alignment: 64, ..fx.planner(1024) };
    let plan = planner.try_make_plan(false, &ios).unwrap();

    let p = &plan[&fx.key(fx.reg.lookup("p"))];
    assert!(p.entry.is_none(), "fallback must not reuse the fragmented entry");
    assert_eq!(p.range, MemRange::new(0, 500));
    // q lands on the next 64-byte-aligned offset.
    assert_eq!(plan[&fx.key(fx.reg.lookup("q"))].range, MemRange::new(512, 812));
}

#[test]
fn overflow_yields_no_plan() {
    let (fx, _) = Fixture::new(&[("x", 2048), ("y", 2048)]);
    let ios = gather_ios(&reading(&["x", "y"]), &fx.reg);
    assert!(fx.planner(2048).try_make_plan(false, &ios).is_none());
}

#[test]
fn repeated_ref_unions_directions() {
    let (fx, _) = Fixture::new(&[("a", 1024)]);
    let stmt = Statement::new(StmtKind::Special {
        name: "inc".into(),
        inputs: vec!["a".into()],
        outputs: vec!["a".into()],
    });
    let ios = gather_ios(&stmt, &fx.reg);
    assert_eq!(ios.len(), 1);
    assert_eq!(ios[0].dir, RefDir::InOut);

    let plan = fx.planner(4096).try_make_plan(false, &ios).unwrap();
    assert_eq!(plan[&fx.key(fx.reg.lookup("a"))].dir, RefDir::InOut);
}
