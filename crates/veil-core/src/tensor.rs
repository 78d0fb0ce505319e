use std::fmt;

use smallvec::SmallVec;

use crate::dtype::DType;
use crate::device::Device;
use crate::error::VeilError;
use crate::shape::Shape;
use crate::storage::Storage;
use crate::Result;

/// A multi-dimensional array — the fundamental data structure in Veil.
///
/// Tensors are immutable values over shared storage:
/// - F32 compute data and I64 index data (shuffle orders, permutations)
/// - Zero-copy views (reshape and transpose share storage)
/// - Strided element access for non-contiguous views
///
/// # Examples
///
/// ```
/// use veil_core::Tensor;
///
/// // A 2x2 patch-distance matrix
/// let t = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
/// assert_eq!(t.shape().dims(), &[2, 2]);
///
/// // Reshape (zero-copy view)
/// let flat = t.reshape(&[4]).unwrap();
/// assert_eq!(flat.shape().dims(), &[4]);
/// ```
#[derive(Clone)]
pub struct Tensor {
    storage: Storage,
    shape: Shape,
    strides: SmallVec<[usize; 4]>,
    offset: usize,
}

impl Tensor {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create a tensor from f32 data with the given shape.
    pub fn from_f32(data: &[f32], shape: &[usize]) -> Self {
        let s = Shape::new(shape);
        assert_eq!(
            s.numel(),
            data.len(),
            "shape {:?} requires {} elements, got {}",
            shape,
            s.numel(),
            data.len()
        );
        let strides = s.contiguous_strides();
        Self { storage: Storage::from_f32(data), shape: s, strides, offset: 0 }
    }

    /// Create an index tensor from i64 data with the given shape.
    pub fn from_i64(data: &[i64], shape: &[usize]) -> Self {
        let s = Shape::new(shape);
        assert_eq!(
            s.numel(),
            data.len(),
            "shape {:?} requires {} elements, got {}",
            shape,
            s.numel(),
            data.len()
        );
        let strides = s.contiguous_strides();
        Self { storage: Storage::from_i64(data), shape: s, strides, offset: 0 }
    }

    /// Create a tensor of zeros with the given shape and dtype.
    pub fn zeros(shape: &[usize], dtype: DType) -> Self {
        let s = Shape::new(shape);
        let strides = s.contiguous_strides();
        Self { storage: Storage::zeros(dtype, s.numel()), shape: s, strides, offset: 0 }
    }

    /// Create a tensor of ones (f32).
    pub fn ones(shape: &[usize]) -> Self {
        let numel = Shape::new(shape).numel();
        Self::from_f32(&vec![1.0; numel], shape)
    }

    /// Create a tensor filled with a constant (f32).
    pub fn full(shape: &[usize], value: f32) -> Self {
        let numel = Shape::new(shape).numel();
        Self::from_f32(&vec![value; numel], shape)
    }

    /// Create a 1-D f32 tensor with values from `start` to `end` (exclusive).
    ///
    /// # Panics
    /// Panics if `step` is zero or points away from `end`.
    pub fn arange(start: f32, end: f32, step: f32) -> Self {
        assert!(step != 0.0, "arange: step must be non-zero");
        assert!(
            (end - start) * step > 0.0 || (end - start).abs() < f32::EPSILON,
            "arange: step direction ({step}) does not match start ({start}) -> end ({end})"
        );
        let mut data = Vec::new();
        let mut v = start;
        if step > 0.0 {
            while v < end {
                data.push(v);
                v += step;
            }
        } else {
            while v > end {
                data.push(v);
                v += step;
            }
        }
        let len = data.len();
        Self::from_f32(&data, &[len])
    }

    /// Create a scalar tensor from a single f32 value.
    pub fn scalar(value: f32) -> Self {
        Self {
            storage: Storage::from_f32(&[value]),
            shape: Shape::scalar(),
            strides: SmallVec::new(),
            offset: 0,
        }
    }

    /// Create a tensor from pre-built storage and shape.
    pub fn from_storage(storage: Storage, shape: &[usize]) -> Self {
        let s = Shape::new(shape);
        let strides = s.contiguous_strides();
        Self { storage, shape: s, strides, offset: 0 }
    }

    // =========================================================================
    // Properties
    // =========================================================================

    /// Shape of the tensor.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    /// Total number of elements.
    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    /// Data type.
    pub fn dtype(&self) -> DType {
        self.storage.dtype()
    }

    /// Device.
    pub fn device(&self) -> Device {
        self.storage.device()
    }

    /// Strides (in elements, not bytes).
    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    /// Whether this tensor is contiguous in memory (row-major).
    pub fn is_contiguous(&self) -> bool {
        self.strides == self.shape.contiguous_strides() && self.offset == 0
    }

    // =========================================================================
    // Data access
    // =========================================================================

    /// Underlying f32 data as a slice (contiguous F32 tensors only).
    pub fn as_f32_slice(&self) -> Option<&[f32]> {
        if !self.is_contiguous() {
            return None;
        }
        self.storage.as_f32_slice()
    }

    /// Mutable f32 slice (contiguous, copy-on-write).
    pub fn as_f32_slice_mut(&mut self) -> Option<&mut [f32]> {
        if !self.is_contiguous() {
            return None;
        }
        self.storage.as_f32_slice_mut()
    }

    /// Underlying i64 data as a slice (contiguous I64 tensors only).
    pub fn as_i64_slice(&self) -> Option<&[i64]> {
        if !self.is_contiguous() {
            return None;
        }
        self.storage.as_i64_slice()
    }

    /// Get a single f32 element by logical flat index (stride-aware).
    pub fn get_f32(&self, flat_index: usize) -> Option<f32> {
        let slice = self.storage.as_f32_slice()?;
        let physical = self.flat_to_physical(flat_index)?;
        slice.get(physical).copied()
    }

    /// Get a single i64 element by logical flat index (stride-aware).
    pub fn get_i64(&self, flat_index: usize) -> Option<i64> {
        let slice = self.storage.as_i64_slice()?;
        let physical = self.flat_to_physical(flat_index)?;
        slice.get(physical).copied()
    }

    /// Convert a logical flat index to the physical storage index.
    fn flat_to_physical(&self, flat_index: usize) -> Option<usize> {
        if self.shape.is_scalar() {
            return if flat_index == 0 { Some(self.offset) } else { None };
        }

        if flat_index >= self.numel() {
            return None;
        }

        let mut remaining = flat_index;
        let mut physical = self.offset;
        let contiguous_strides = self.shape.contiguous_strides();

        for (i, &cs) in contiguous_strides.iter().enumerate() {
            let idx = remaining / cs;
            remaining %= cs;
            physical += idx * self.strides[i];
        }

        Some(physical)
    }

    // =========================================================================
    // Shape operations (zero-copy views)
    // =========================================================================

    /// Reshape the tensor (zero-copy; requires contiguous layout).
    /// One dimension may be -1 and is inferred.
    pub fn reshape(&self, new_shape: &[isize]) -> Result<Tensor> {
        let resolved = self.shape.resolve_reshape(new_shape).ok_or_else(|| {
            VeilError::InvalidReshape {
                numel: self.numel(),
                shape: new_shape.iter().map(|&d| d.unsigned_abs()).collect(),
            }
        })?;

        if !self.is_contiguous() {
            return Err(VeilError::StorageError(
                "cannot reshape non-contiguous tensor (call .contiguous() first)".into(),
            ));
        }

        let strides = resolved.contiguous_strides();
        Ok(Tensor {
            storage: self.storage.clone(),
            shape: resolved,
            strides,
            offset: self.offset,
        })
    }

    /// Transpose the last two dimensions (zero-copy view).
    pub fn transpose(&self) -> Result<Tensor> {
        let new_shape = self
            .shape
            .transpose()
            .ok_or(VeilError::InvalidAxis { axis: 0, ndim: self.ndim() })?;

        let ndim = self.ndim();
        let mut new_strides = self.strides.clone();
        new_strides.swap(ndim - 2, ndim - 1);

        Ok(Tensor {
            storage: self.storage.clone(),
            shape: new_shape,
            strides: new_strides,
            offset: self.offset,
        })
    }

    /// Return a contiguous copy of this tensor if it isn't already contiguous.
    pub fn contiguous(&self) -> Tensor {
        if self.is_contiguous() {
            return self.clone();
        }

        match self.dtype() {
            DType::F32 => {
                let numel = self.numel();
                let mut data = vec![0.0f32; numel];
                for (i, slot) in data.iter_mut().enumerate() {
                    *slot = self
                        .get_f32(i)
                        .expect("contiguous: index out of bounds during copy");
                }
                Tensor::from_f32(&data, self.shape.dims())
            }
            DType::I64 => {
                let numel = self.numel();
                let mut data = vec![0i64; numel];
                for (i, slot) in data.iter_mut().enumerate() {
                    *slot = self
                        .get_i64(i)
                        .expect("contiguous: index out of bounds during copy");
                }
                Tensor::from_i64(&data, self.shape.dims())
            }
            // F16/BF16 never live in compute tensors; they are widened on load.
            _ => self.clone(),
        }
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tensor(shape={}, dtype={}, device={}, contiguous={})",
            self.shape,
            self.dtype(),
            self.device(),
            self.is_contiguous(),
        )
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(data) = self.as_f32_slice() {
            if self.numel() <= 20 {
                write!(f, "tensor({:?}, shape={})", data, self.shape)
            } else {
                write!(
                    f,
                    "tensor([{:.4}, {:.4}, ..., {:.4}], shape={})",
                    data[0],
                    data[1],
                    data[self.numel() - 1],
                    self.shape
                )
            }
        } else {
            write!(f, "tensor(shape={}, dtype={})", self.shape, self.dtype())
        }
    }
}
