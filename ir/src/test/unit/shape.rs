use test_case::test_case;

use crate::shape::{DType, Dim, TensorShape};

#[test_case(DType::I8, 1)]
#[test_case(DType::F16, 2)]
#[test_case(DType::F32, 4)]
#[test_case(DType::U64, 8)]
fn byte_widths(dtype: DType, width: u64) {
    assert_eq!(dtype.byte_width(), width);
}

#[test]
fn dense_shape_strides() {
    let s = TensorShape::dense(DType::F32, &[2, 3, 4]);
    let strides: Vec<u64> = s.dims.iter().map(|d| d.stride).collect();
    assert_eq!(strides, vec![12, 4, 1]);
    assert_eq!(s.elems(), 24);
    assert_eq!(s.byte_size(), 96);
}

#[test]
fn byte_size_of_strided_view() {
    // A 2x2 view with row stride 8: addresses elements 0, 1, 8, 9.
    let s = TensorShape {
        dtype: DType::F32,
        dims: [Dim { size: 2, stride: 8 }, Dim { size: 2, stride: 1 }].into_iter().collect(),
    };
    assert_eq!(s.byte_size(), 40);
    assert_eq!(s.with_dense_strides().byte_size(), 16);
}

#[test]
fn byte_size_degenerate() {
    let scalar = TensorShape::dense(DType::F64, &[]);
    assert_eq!(scalar.byte_size(), 8);
    let empty = TensorShape::dense(DType::F32, &[4, 0]);
    assert_eq!(empty.byte_size(), 0);
}

#[test]
fn unit_sizes_keep_strides() {
    let s = TensorShape::dense(DType::F32, &[2, 3]);
    let unit = s.with_unit_sizes();
    assert_eq!(unit.sizes().as_slice(), &[1, 1]);
    assert_eq!(unit.dims[0].stride, 3);
}

#[test]
fn display() {
    let s = TensorShape::dense(DType::F32, &[2, 3]);
    assert_eq!(s.to_string(), "f32[2:3, 3:1]");
}
