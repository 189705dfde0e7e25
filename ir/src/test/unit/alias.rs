use smallvec::smallvec;
use test_case::test_case;

use crate::affine::Affine;
use crate::alias::{AliasInfo, AliasMap, AliasRelation, Extent};
use crate::block::{Block, Refinement};
use crate::shape::{DType, TensorShape};
use crate::types::{Location, RefDir};

fn info(base: &str, offset: i64, len: u64) -> AliasInfo {
    AliasInfo {
        base_ref: base.to_string(),
        access: smallvec![Affine::constant(offset)],
        shape: TensorShape::dense(DType::F32, &[len]),
        extents: smallvec![Extent { min: offset, max: offset + len as i64 - 1 }],
    }
}

#[test_case(info("a", 0, 4), info("b", 0, 4), AliasRelation::None ; "different_base")]
#[test_case(info("a", 0, 4), info("a", 0, 4), AliasRelation::Exact ; "identical")]
#[test_case(info("a", 0, 4), info("a", 2, 4), AliasRelation::Partial ; "overlapping_extents")]
#[test_case(info("a", 0, 4), info("a", 4, 4), AliasRelation::None ; "disjoint_extents")]
fn compare(a: AliasInfo, b: AliasInfo, expected: AliasRelation) {
    assert_eq!(AliasInfo::compare(&a, &b), expected);
    assert_eq!(AliasInfo::compare(&b, &a), expected);
}

#[test]
fn compare_rank_mismatch_is_partial() {
    let mut b = info("a", 0, 4);
    b.extents.push(Extent { min: 0, max: 3 });
    b.shape = TensorShape::dense(DType::F32, &[4, 4]);
    assert_eq!(AliasInfo::compare(&info("a", 0, 4), &b), AliasRelation::Partial);
}

#[test]
fn whole_ref_registration() {
    let mut block = Block::new("main");
    block.refs.push(Refinement::whole(
        RefDir::In,
        "a",
        TensorShape::dense(DType::F32, &[8]),
        Location::new("dram"),
    ));
    let mut map = AliasMap::new();
    map.insert_whole_ref(&block, "a");
    let ai = map.info("a").unwrap();
    assert_eq!(ai.base_ref, "a");
    assert_eq!(ai.extents[0], Extent { min: 0, max: 7 });
}
