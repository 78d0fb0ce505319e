use std::sync::Arc;

use crate::{DType, Device, Result, VeilError};

/// Shared, reference-counted tensor storage.
///
/// Storage is a flat byte buffer behind an `Arc` so views (reshape,
/// transpose) share data without copying. Mutation goes through
/// `Arc::make_mut`, so a shared buffer is cloned on first write.
#[derive(Debug, Clone)]
pub struct Storage {
    data: Arc<Vec<u8>>,
    dtype: DType,
    device: Device,
    /// Number of logical elements (not bytes).
    numel: usize,
}

impl Storage {
    /// Allocate zeroed storage for `numel` elements of the given dtype.
    pub fn zeros(dtype: DType, numel: usize) -> Self {
        let data = vec![0u8; dtype.storage_bytes(numel)];
        Self { data: Arc::new(data), dtype, device: Device::Cpu, numel }
    }

    /// Create storage from raw bytes.
    pub fn from_bytes(dtype: DType, numel: usize, bytes: Vec<u8>) -> Result<Self> {
        let expected = dtype.storage_bytes(numel);
        if bytes.len() != expected {
            return Err(VeilError::StorageError(format!(
                "expected {} bytes for {} elements of {}, got {}",
                expected,
                numel,
                dtype,
                bytes.len()
            )));
        }
        Ok(Self { data: Arc::new(bytes), dtype, device: Device::Cpu, numel })
    }

    /// Create F32 storage from a slice of values.
    pub fn from_f32(data: &[f32]) -> Self {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_ne_bytes()).collect();
        Self {
            data: Arc::new(bytes),
            dtype: DType::F32,
            device: Device::Cpu,
            numel: data.len(),
        }
    }

    /// Create I64 storage from a slice of values.
    pub fn from_i64(data: &[i64]) -> Self {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_ne_bytes()).collect();
        Self {
            data: Arc::new(bytes),
            dtype: DType::I64,
            device: Device::Cpu,
            numel: data.len(),
        }
    }

    /// Dtype of this storage.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Device of this storage.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Number of logical elements.
    pub fn numel(&self) -> usize {
        self.numel
    }

    /// Size in bytes.
    pub fn nbytes(&self) -> usize {
        self.data.len()
    }

    /// Read-only access to the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the raw bytes. Clones the buffer if it is shared
    /// with other tensors (copy-on-write).
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        Arc::make_mut(&mut self.data).as_mut_slice()
    }

    /// Interpret storage as a slice of f32 values.
    /// Returns `None` if dtype is not F32.
    pub fn as_f32_slice(&self) -> Option<&[f32]> {
        if self.dtype != DType::F32 {
            return None;
        }
        Some(bytemuck::cast_slice(self.as_bytes()))
    }

    /// Interpret storage as a mutable slice of f32 values (copy-on-write).
    pub fn as_f32_slice_mut(&mut self) -> Option<&mut [f32]> {
        if self.dtype != DType::F32 {
            return None;
        }
        Some(bytemuck::cast_slice_mut(self.as_bytes_mut()))
    }

    /// Interpret storage as a slice of i64 values.
    /// Returns `None` if dtype is not I64.
    pub fn as_i64_slice(&self) -> Option<&[i64]> {
        if self.dtype != DType::I64 {
            return None;
        }
        Some(bytemuck::cast_slice(self.as_bytes()))
    }

    /// Interpret storage as a mutable slice of i64 values (copy-on-write).
    pub fn as_i64_slice_mut(&mut self) -> Option<&mut [i64]> {
        if self.dtype != DType::I64 {
            return None;
        }
        Some(bytemuck::cast_slice_mut(self.as_bytes_mut()))
    }

    /// Whether this storage is uniquely owned (no other references).
    pub fn is_unique(&self) -> bool {
        Arc::strong_count(&self.data) == 1
    }
}
