use smallvec::SmallVec;
use std::fmt;

/// Tensor shape with stack-allocated storage for up to 4 dimensions.
///
/// Everything the MAE pipeline moves around is rank 1-4: masks `[L]`,
/// patch sequences `[L, p*p*c]`, batched sequences `[B, L, D]`, image
/// batches `[B, C, H, W]`. Heap allocation only kicks in past rank 4.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: SmallVec<[usize; 4]>,
}

impl Shape {
    /// Create a new shape from dimension sizes.
    pub fn new(dims: &[usize]) -> Self {
        Self { dims: SmallVec::from_slice(dims) }
    }

    /// Scalar shape (rank 0, one element).
    pub fn scalar() -> Self {
        Self { dims: SmallVec::new() }
    }

    /// Number of dimensions (rank).
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements.
    pub fn numel(&self) -> usize {
        if self.dims.is_empty() { 1 } else { self.dims.iter().product() }
    }

    /// Dimension sizes as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Size of one dimension, `None` past the rank.
    pub fn dim(&self, axis: usize) -> Option<usize> {
        self.dims.get(axis).copied()
    }

    /// Whether this is a scalar (rank 0).
    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// Row-major strides for a densely packed layout.
    pub fn contiguous_strides(&self) -> SmallVec<[usize; 4]> {
        let ndim = self.dims.len();
        if ndim == 0 {
            return SmallVec::new();
        }
        let mut strides = SmallVec::from_elem(0usize, ndim);
        strides[ndim - 1] = 1;
        for i in (0..ndim - 1).rev() {
            strides[i] = strides[i + 1] * self.dims[i + 1];
        }
        strides
    }

    /// Broadcast this shape against another (numpy rules, trailing-aligned).
    /// Returns `None` when the shapes are incompatible.
    pub fn broadcast_with(&self, other: &Shape) -> Option<Shape> {
        let max_ndim = self.ndim().max(other.ndim());
        let mut result = SmallVec::with_capacity(max_ndim);

        for i in 0..max_ndim {
            let a = if i < self.ndim() { self.dims[self.ndim() - 1 - i] } else { 1 };
            let b = if i < other.ndim() { other.dims[other.ndim() - 1 - i] } else { 1 };

            if a == b {
                result.push(a);
            } else if a == 1 {
                result.push(b);
            } else if b == 1 {
                result.push(a);
            } else {
                return None;
            }
        }

        result.reverse();
        Some(Shape { dims: result })
    }

    /// Resolve a reshape target against this shape's element count.
    /// At most one dimension may be -1 (inferred from the rest).
    pub fn resolve_reshape(&self, target: &[isize]) -> Option<Shape> {
        let numel = self.numel();
        let mut inferred_idx = None;
        let mut known_product: usize = 1;

        for (i, &d) in target.iter().enumerate() {
            if d == -1 {
                if inferred_idx.is_some() {
                    return None;
                }
                inferred_idx = Some(i);
            } else if d <= 0 {
                return None;
            } else {
                known_product = known_product.checked_mul(d as usize)?;
            }
        }

        let mut result: SmallVec<[usize; 4]> = target
            .iter()
            .map(|&d| if d == -1 { 0 } else { d as usize })
            .collect();

        if let Some(idx) = inferred_idx {
            if known_product == 0 || numel % known_product != 0 {
                return None;
            }
            result[idx] = numel / known_product;
        }

        let resolved = Shape { dims: result };
        if resolved.numel() != numel {
            return None;
        }
        Some(resolved)
    }

    /// Shape with the last two dimensions swapped.
    pub fn transpose(&self) -> Option<Shape> {
        if self.ndim() < 2 {
            return None;
        }
        let mut dims = self.dims.clone();
        let n = dims.len();
        dims.swap(n - 2, n - 1);
        Some(Shape { dims })
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape({:?})", self.dims.as_slice())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::new(dims)
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape { dims: SmallVec::from_vec(dims) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar() {
        let s = Shape::scalar();
        assert_eq!(s.ndim(), 0);
        assert_eq!(s.numel(), 1);
        assert!(s.is_scalar());
    }

    #[test]
    fn test_patch_sequence_shape() {
        // 8x8 grid of 4x4 RGB patches
        let s = Shape::new(&[64, 48]);
        assert_eq!(s.ndim(), 2);
        assert_eq!(s.numel(), 64 * 48);
        assert_eq!(s.dim(0), Some(64));
        assert_eq!(s.dim(2), None);
    }

    #[test]
    fn test_contiguous_strides() {
        let s = Shape::new(&[2, 3, 32, 32]);
        assert_eq!(s.contiguous_strides().as_slice(), &[3072, 1024, 32, 1]);
        assert!(Shape::scalar().contiguous_strides().is_empty());
    }

    #[test]
    fn test_broadcast() {
        // per-sample mask [B, L, 1] against patches [B, L, D]
        let a = Shape::new(&[2, 64, 1]);
        let b = Shape::new(&[2, 64, 48]);
        assert_eq!(a.broadcast_with(&b).unwrap().dims(), &[2, 64, 48]);

        let a = Shape::new(&[2, 3]);
        let b = Shape::new(&[3]);
        assert_eq!(a.broadcast_with(&b).unwrap().dims(), &[2, 3]);

        let a = Shape::new(&[2, 3]);
        let b = Shape::new(&[4, 3]);
        assert!(a.broadcast_with(&b).is_none());
    }

    #[test]
    fn test_resolve_reshape() {
        let s = Shape::new(&[2, 64, 48]);
        assert_eq!(s.resolve_reshape(&[128, 48]).unwrap().dims(), &[128, 48]);
        assert_eq!(s.resolve_reshape(&[-1, 48]).unwrap().dims(), &[128, 48]);
        assert_eq!(s.resolve_reshape(&[2, -1]).unwrap().dims(), &[2, 3072]);
        assert!(s.resolve_reshape(&[-1, -1]).is_none());
        assert!(s.resolve_reshape(&[7, 11]).is_none());
    }

    #[test]
    fn test_transpose() {
        let s = Shape::new(&[4, 17, 8]);
        assert_eq!(s.transpose().unwrap().dims(), &[4, 8, 17]);
        assert!(Shape::new(&[5]).transpose().is_none());
    }
}
