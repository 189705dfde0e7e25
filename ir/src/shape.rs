//! Tensor shapes: element types, per-dimension size/stride, byte footprints.

use std::fmt;

use smallvec::SmallVec;

/// Fixed-width element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DType {
    I8,
    U8,
    I16,
    U16,
    F16,
    I32,
    U32,
    F32,
    I64,
    U64,
    F64,
}

impl DType {
    /// Width of one element in bytes.
    pub fn byte_width(self) -> u64 {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 | Self::F16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::I8 => "i8",
            Self::U8 => "u8",
            Self::I16 => "i16",
            Self::U16 => "u16",
            Self::F16 => "f16",
            Self::I32 => "i32",
            Self::U32 => "u32",
            Self::F32 => "f32",
            Self::I64 => "i64",
            Self::U64 => "u64",
            Self::F64 => "f64",
        };
        write!(f, "{name}")
    }
}

/// One tensor dimension. Stride is in elements, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Dim {
    pub size: u64,
    pub stride: u64,
}

/// A multi-dimensional tensor layout: element type plus sized, strided dims.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TensorShape {
    pub dtype: DType,
    pub dims: SmallVec<[Dim; 4]>,
}

impl TensorShape {
    /// A dense row-major shape with the given per-dim sizes.
    pub fn dense(dtype: DType, sizes: &[u64]) -> Self {
        let mut dims: SmallVec<[Dim; 4]> = sizes.iter().map(|&size| Dim { size, stride: 0 }).collect();
        let mut stride = 1;
        for dim in dims.iter_mut().rev() {
            dim.stride = stride;
            stride *= dim.size;
        }
        Self { dtype, dims }
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Per-dimension sizes.
    pub fn sizes(&self) -> SmallVec<[u64; 4]> {
        self.dims.iter().map(|d| d.size).collect()
    }

    /// Number of addressed elements (product of sizes).
    pub fn elems(&self) -> u64 {
        self.dims.iter().map(|d| d.size).product()
    }

    /// Byte footprint of the addressed span: the distance from the first to
    /// one past the last addressed element. Equals `elems * byte_width` once
    /// the shape is densely packed.
    pub fn byte_size(&self) -> u64 {
        if self.dims.iter().any(|d| d.size == 0) {
            return 0;
        }
        let last: u64 = self.dims.iter().map(|d| (d.size - 1) * d.stride).sum();
        (last + 1) * self.dtype.byte_width()
    }

    /// The same sizes restrided to dense row-major packing (innermost stride
    /// one).
    pub fn with_dense_strides(&self) -> Self {
        let mut out = self.clone();
        let mut stride = 1;
        for dim in out.dims.iter_mut().rev() {
            dim.stride = stride;
            stride *= dim.size;
        }
        out
    }

    /// A copy with every dimension's size clamped to one; strides kept. Used
    /// for the single-element tile refinements of transfer blocks.
    pub fn with_unit_sizes(&self) -> Self {
        let mut out = self.clone();
        for dim in out.dims.iter_mut() {
            dim.size = 1;
        }
        out
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.dtype)?;
        for (i, dim) in self.dims.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:{}", dim.size, dim.stride)?;
        }
        write!(f, "]")
    }
}
