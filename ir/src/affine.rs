//! Affine expressions over named block indices.
//!
//! An [`Affine`] is an integer linear polynomial over index variables plus a
//! constant offset. Affines describe refinement accesses and memory locality
//! units; they key ordered maps throughout the scheduler, so the type carries
//! a total order in addition to equality and hashing.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Add;

/// Integer linear polynomial over named indices: `Σ cᵢ·idxᵢ + offset`.
///
/// Terms with a zero coefficient are never stored, so structural equality is
/// semantic equality.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Affine {
    terms: BTreeMap<String, i64>,
    offset: i64,
}

impl Affine {
    /// A constant affine.
    pub fn constant(offset: i64) -> Self {
        Self { terms: BTreeMap::new(), offset }
    }

    /// A single index variable with coefficient one.
    pub fn index(name: impl Into<String>) -> Self {
        let mut terms = BTreeMap::new();
        terms.insert(name.into(), 1);
        Self { terms, offset: 0 }
    }

    /// A single index variable with an explicit coefficient.
    pub fn term(name: impl Into<String>, coeff: i64) -> Self {
        let mut terms = BTreeMap::new();
        if coeff != 0 {
            terms.insert(name.into(), coeff);
        }
        Self { terms, offset: 0 }
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty() && self.offset == 0
    }

    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// The non-zero terms, in index-name order.
    pub fn terms(&self) -> impl Iterator<Item = (&str, i64)> {
        self.terms.iter().map(|(name, coeff)| (name.as_str(), *coeff))
    }

    /// The index variables this affine mentions, in name order.
    pub fn vars(&self) -> impl Iterator<Item = &str> {
        self.terms.keys().map(String::as_str)
    }
}

impl Add<&Affine> for &Affine {
    type Output = Affine;

    fn add(self, rhs: &Affine) -> Affine {
        let mut terms = self.terms.clone();
        for (name, coeff) in &rhs.terms {
            let slot = terms.entry(name.clone()).or_insert(0);
            *slot += coeff;
            if *slot == 0 {
                terms.remove(name);
            }
        }
        Affine { terms, offset: self.offset + rhs.offset }
    }
}

impl Add<i64> for &Affine {
    type Output = Affine;

    fn add(self, rhs: i64) -> Affine {
        Affine { terms: self.terms.clone(), offset: self.offset + rhs }
    }
}

impl fmt::Display for Affine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return write!(f, "0");
        }
        let mut first = true;
        for (name, coeff) in &self.terms {
            if !first {
                write!(f, " + ")?;
            }
            first = false;
            if *coeff == 1 {
                write!(f, "{name}")?;
            } else {
                write!(f, "{coeff}*{name}")?;
            }
        }
        if self.offset != 0 {
            if !first {
                write!(f, " + ")?;
            }
            write!(f, "{}", self.offset)?;
        }
        Ok(())
    }
}
