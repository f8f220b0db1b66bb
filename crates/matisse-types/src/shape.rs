// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Matrix shapes.
//!
//! A shape lists one extent per dimension. Extents may be unknown at compile
//! time, and the whole shape may be undefined (not even the dimension count
//! is known). Defined shapes always have at least two dimensions, and
//! trailing singleton dimensions beyond the second are dropped.

use serde::{Deserialize, Serialize};

/// One dimension's extent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dim {
    Known(u64),
    Unknown,
}

impl Dim {
    pub fn known(self) -> Option<u64> {
        match self {
            Dim::Known(n) => Some(n),
            Dim::Unknown => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    dims: Option<Vec<Dim>>,
}

impl Shape {
    pub fn undefined() -> Self {
        Shape { dims: None }
    }

    pub fn new(dims: Vec<Dim>) -> Self {
        let mut dims = dims;
        while dims.len() < 2 {
            dims.push(Dim::Known(1));
        }
        while dims.len() > 2 && dims.last() == Some(&Dim::Known(1)) {
            dims.pop();
        }
        Shape { dims: Some(dims) }
    }

    pub fn fixed(dims: &[u64]) -> Self {
        Shape::new(dims.iter().map(|&d| Dim::Known(d)).collect())
    }

    pub fn scalar() -> Self {
        Shape::fixed(&[1, 1])
    }

    /// `1 x n` row vector.
    pub fn row(n: Dim) -> Self {
        Shape::new(vec![Dim::Known(1), n])
    }

    /// Every extent unknown, dimension count known.
    pub fn unknown(ndims: usize) -> Self {
        Shape::new(vec![Dim::Unknown; ndims.max(2)])
    }

    pub fn dims(&self) -> Option<&[Dim]> {
        self.dims.as_deref()
    }

    pub fn is_undefined(&self) -> bool {
        self.dims.is_none()
    }

    pub fn ndims(&self) -> Option<usize> {
        self.dims.as_ref().map(|d| d.len())
    }

    /// Extent of dimension `index` (0-based). Dimensions past the end are 1.
    pub fn dim(&self, index: usize) -> Dim {
        match &self.dims {
            None => Dim::Unknown,
            Some(dims) => dims.get(index).copied().unwrap_or(Dim::Known(1)),
        }
    }

    pub fn is_fully_defined(&self) -> bool {
        self.known_dims().is_some()
    }

    pub fn known_dims(&self) -> Option<Vec<u64>> {
        self.dims.as_ref()?.iter().map(|d| d.known()).collect()
    }

    pub fn numel(&self) -> Option<u64> {
        self.known_dims().map(|d| d.iter().product())
    }

    pub fn is_scalar(&self) -> bool {
        self.numel() == Some(1)
    }

    /// Whether the shape is `1 x n` or `n x 1`.
    pub fn is_vector(&self) -> bool {
        match &self.dims {
            Some(dims) if dims.len() == 2 => {
                dims[0] == Dim::Known(1) || dims[1] == Dim::Known(1)
            }
            _ => false,
        }
    }

    /// Extents of a value that could have either shape: agreeing extents
    /// are kept, the rest become unknown. Differing dimension counts give
    /// an undefined shape.
    ///
    /// The result must hold on every path, so `1x3` with `1x4` is `1x?`,
    /// never `1x4`.
    pub fn combine(&self, other: &Shape) -> Shape {
        match (&self.dims, &other.dims) {
            (Some(a), Some(b)) if a.len() == b.len() => Shape::new(
                a.iter()
                    .zip(b)
                    .map(|(x, y)| if x == y { *x } else { Dim::Unknown })
                    .collect(),
            ),
            _ => Shape::undefined(),
        }
    }

    /// Same dimension count, every extent unknown.
    pub fn forget_extents(&self) -> Shape {
        match self.ndims() {
            Some(n) => Shape::unknown(n),
            None => Shape::undefined(),
        }
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.dims {
            None => write!(f, "?"),
            Some(dims) => {
                for (i, d) in dims.iter().enumerate() {
                    if i > 0 {
                        write!(f, "x")?;
                    }
                    match d {
                        Dim::Known(n) => write!(f, "{}", n)?,
                        Dim::Unknown => write!(f, "?")?,
                    }
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization() {
        assert_eq!(Shape::fixed(&[3]), Shape::fixed(&[3, 1]));
        assert_eq!(Shape::fixed(&[2, 3, 1, 1]).ndims(), Some(2));
        assert_eq!(Shape::fixed(&[2, 1, 4]).ndims(), Some(3));
    }

    #[test]
    fn numel_and_dims() {
        let s = Shape::fixed(&[2, 3]);
        assert_eq!(s.numel(), Some(6));
        assert_eq!(s.dim(1), Dim::Known(3));
        assert_eq!(s.dim(5), Dim::Known(1));
        assert!(Shape::row(Dim::Unknown).numel().is_none());
        assert!(Shape::undefined().numel().is_none());
        assert!(Shape::scalar().is_scalar());
    }

    #[test]
    fn combine_keeps_agreeing_extents() {
        let a = Shape::fixed(&[1, 3]);
        let b = Shape::fixed(&[1, 4]);
        assert_eq!(a.combine(&b), Shape::row(Dim::Unknown));
        assert_eq!(a.combine(&a), a);
        assert!(a.combine(&Shape::fixed(&[1, 3, 2])).is_undefined());
        assert!(a.combine(&Shape::undefined()).is_undefined());
    }

    #[test]
    fn display() {
        assert_eq!(Shape::fixed(&[1, 3]).to_string(), "1x3");
        assert_eq!(Shape::row(Dim::Unknown).to_string(), "1x?");
        assert_eq!(Shape::undefined().to_string(), "?");
    }
}
