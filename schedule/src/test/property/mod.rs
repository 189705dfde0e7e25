//! Property tests for the memory-range algebra, against a byte-set oracle.

use proptest::prelude::*;

use crate::mem::{MemRange, ranges_overlap, subtract_range};

const DOMAIN: usize = 96;

fn range_strategy() -> impl Strategy<Value = MemRange> {
    (0u64..64, 1u64..16).prop_map(|(begin, len)| MemRange::new(begin, begin + len))
}

fn covered(ranges: &[MemRange]) -> [bool; DOMAIN] {
    let mut bytes = [false; DOMAIN];
    for r in ranges {
        for b in r.begin..r.end {
            bytes[b as usize] = true;
        }
    }
    bytes
}

proptest! {
    /// Subtraction leaves exactly the previously-covered bytes outside
    /// `sub`, and never a piece overlapping `sub` or an empty piece.
    #[test]
    fn subtract_matches_byte_oracle(
        sub in range_strategy(),
        list in prop::collection::vec(range_strategy(), 0..8),
    ) {
        let mut pieces = list.clone();
        subtract_range(sub, &mut pieces);

        let mut expected = covered(&list);
        for b in sub.begin..sub.end {
            expected[b as usize] = false;
        }
        let actual = covered(&pieces);
        prop_assert_eq!(&actual[..], &expected[..]);

        for piece in &pieces {
            prop_assert!(piece.begin < piece.end);
            prop_assert!(!ranges_overlap(*piece, sub));
        }
    }

    /// Overlap agrees with the byte-set intersection.
    #[test]
    fn overlap_matches_byte_oracle(a in range_strategy(), b in range_strategy()) {
        let bytes_a = covered(&[a]);
        let bytes_b = covered(&[b]);
        let intersects = bytes_a.iter().zip(&bytes_b).any(|(x, y)| *x && *y);
        prop_assert_eq!(ranges_overlap(a, b), intersects);
    }
}
