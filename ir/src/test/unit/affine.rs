use crate::affine::Affine;

#[test]
fn add_merges_terms() {
    let a = &Affine::index("i") + &Affine::term("j", 2);
    let b = &a + &Affine::constant(3);
    assert_eq!(b.offset(), 3);
    assert_eq!(b.terms().collect::<Vec<_>>(), vec![("i", 1), ("j", 2)]);
}

#[test]
fn add_cancels_zero_coefficients() {
    let a = &Affine::term("i", 2) + &Affine::term("i", -2);
    assert!(a.is_zero());
    assert_eq!(a, Affine::default());
}

#[test]
fn constant_offset_add() {
    let a = &Affine::index("i") + 5;
    assert_eq!(a.offset(), 5);
    assert!(!a.is_constant());
}

#[test]
fn ordering_is_total_and_stable() {
    let zero = Affine::constant(0);
    let one = Affine::constant(1);
    let i = Affine::index("i");
    let j = Affine::index("j");
    assert!(zero < one);
    assert!(i < j);
    assert_eq!(i.cmp(&i.clone()), std::cmp::Ordering::Equal);
}

#[test]
fn display() {
    assert_eq!(Affine::default().to_string(), "0");
    assert_eq!(Affine::constant(4).to_string(), "4");
    assert_eq!(Affine::index("i").to_string(), "i");
    let sum = &(&Affine::term("i", 2) + &Affine::index("j")) + 3;
    assert_eq!(sum.to_string(), "2*i + j + 3");
}

#[test]
fn vars_in_name_order() {
    let a = &Affine::index("k") + &Affine::index("a");
    assert_eq!(a.vars().collect::<Vec<_>>(), vec!["a", "k"]);
}
