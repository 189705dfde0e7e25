use crate::affine::Affine;
use crate::block::{Block, Refinement};
use crate::error::Error;
use crate::shape::{DType, TensorShape};
use crate::stmt::StmtKind;
use crate::types::{Location, RefDir};

fn shape(n: u64) -> TensorShape {
    TensorShape::dense(DType::F32, &[n])
}

fn block_with_refs(names: &[&str]) -> Block {
    let mut block = Block::new("main");
    for name in names {
        block.refs.push(Refinement::whole(RefDir::In, *name, shape(4), Location::new("dram")));
    }
    block
}

#[test]
fn unique_ref_name_suffixes() {
    let block = block_with_refs(&["a", "a_storage"]);
    assert_eq!(block.unique_ref_name("b"), "b");
    assert_eq!(block.unique_ref_name("a_storage"), "a_storage_0");
}

#[test]
fn unique_idx_name_suffixes() {
    let mut block = Block::new("main");
    block.idxs.push(crate::types::Index::range("i0", 4));
    assert_eq!(block.unique_idx_name("i0"), "i0_0");
    assert_eq!(block.unique_idx_name("i1"), "i1");
}

#[test]
fn validate_accepts_well_formed() {
    let mut block = block_with_refs(&["a"]);
    block.stmts.push_back(StmtKind::Load { from: "a".into(), into: "$x".into() });
    block.validate().unwrap();
}

#[test]
fn validate_rejects_duplicate_names() {
    let block = block_with_refs(&["a", "a"]);
    assert!(matches!(block.validate(), Err(Error::DuplicateRefinement { .. })));
}

#[test]
fn validate_rejects_dangling_names() {
    let mut block = block_with_refs(&["a"]);
    block.stmts.push_back(StmtKind::Load { from: "missing".into(), into: "$x".into() });
    assert!(matches!(block.validate(), Err(Error::DanglingRefName { .. })));
}

#[test]
fn validate_rejects_rank_mismatch() {
    let mut block = block_with_refs(&["a"]);
    block.refs[0].access.push(Affine::default());
    assert!(matches!(block.validate(), Err(Error::AccessRankMismatch { .. })));
}

#[test]
fn fixup_refs_propagates_location() {
    let mut outer = block_with_refs(&["a"]);

    let mut nested = Block::new("inner2");
    let mut leaf = Refinement::whole(RefDir::In, "a_leaf", shape(4), Location::new("dram"));
    leaf.from = "a_mid".into();
    nested.refs.push(leaf);

    let mut mid = Block::new("inner1");
    let mut bridge = Refinement::whole(RefDir::In, "a_mid", shape(4), Location::new("dram"));
    bridge.from = "a".into();
    mid.refs.push(bridge);
    mid.stmts.push_back(StmtKind::Block(nested));

    outer.stmts.push_back(StmtKind::Block(mid));
    outer.ref_by_into_mut("a").unwrap().location = Location::new("sram");

    outer.fixup_refs("a");

    let (_, stmt) = outer.stmts.iter().next().unwrap();
    let StmtKind::Block(mid) = &stmt.kind else { panic!("expected block") };
    assert_eq!(mid.ref_by_into("a_mid").unwrap().location.name, "sram");
    let (_, nested_stmt) = mid.stmts.iter().next().unwrap();
    let StmtKind::Block(nested) = &nested_stmt.kind else { panic!("expected block") };
    assert_eq!(nested.ref_by_into("a_leaf").unwrap().location.name, "sram");
}
