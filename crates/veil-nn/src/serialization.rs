//! Parameter-blob save/load using the safetensors format.

use std::path::Path;

use safetensors::tensor::{serialize, TensorView};
use safetensors::SafeTensors;
use veil_core::{Tensor, VeilError};

use crate::params::Params;

/// Save a parameter blob to a safetensors file (f32, little-endian).
pub fn save_params(params: &Params, path: &Path) -> Result<(), VeilError> {
    let mut buffers: Vec<(String, Vec<usize>, Vec<u8>)> = Vec::new();

    for (name, tensor) in params.iter() {
        let data = tensor.contiguous();
        let slice = data
            .as_f32_slice()
            .ok_or_else(|| VeilError::UnsupportedDType(tensor.dtype()))?;
        let bytes: Vec<u8> = slice.iter().flat_map(|f| f.to_le_bytes()).collect();
        buffers.push((name.clone(), tensor.shape().dims().to_vec(), bytes));
    }

    let mut views = Vec::new();
    for (name, shape, bytes) in &buffers {
        let view = TensorView::new(safetensors::Dtype::F32, shape.clone(), bytes)
            .map_err(|e| VeilError::StorageError(format!("safetensors view error: {e}")))?;
        views.push((name.as_str(), view));
    }

    let serialized = serialize(views, &None)
        .map_err(|e| VeilError::StorageError(format!("safetensors serialize error: {e}")))?;

    std::fs::write(path, &serialized)
        .map_err(|e| VeilError::StorageError(format!("failed to write {}: {e}", path.display())))?;

    Ok(())
}

/// Load a parameter blob from a safetensors file.
///
/// F16 and BF16 tensors are widened to f32 on load.
pub fn load_params(path: &Path) -> Result<Params, VeilError> {
    let data = std::fs::read(path)
        .map_err(|e| VeilError::StorageError(format!("failed to read {}: {e}", path.display())))?;

    let tensors = SafeTensors::deserialize(&data)
        .map_err(|e| VeilError::StorageError(format!("safetensors parse error: {e}")))?;

    let mut params = Params::new();
    for (name, view) in tensors.tensors() {
        params.insert(name.to_string(), view_to_tensor(&view)?);
    }

    Ok(params)
}

fn view_to_tensor(view: &TensorView<'_>) -> Result<Tensor, VeilError> {
    let shape: Vec<usize> = view.shape().to_vec();
    let data = view.data();

    let f32_data: Vec<f32> = match view.dtype() {
        safetensors::Dtype::F32 => data
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
        safetensors::Dtype::F16 => data
            .chunks_exact(2)
            .map(|b| half::f16::from_bits(u16::from_le_bytes([b[0], b[1]])).to_f32())
            .collect(),
        safetensors::Dtype::BF16 => data
            .chunks_exact(2)
            .map(|b| half::bf16::from_bits(u16::from_le_bytes([b[0], b[1]])).to_f32())
            .collect(),
        other => {
            return Err(VeilError::StorageError(format!(
                "unsupported safetensors dtype: {other:?}"
            )));
        }
    };

    Ok(Tensor::from_f32(&f32_data, &shape))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Linear, Params};
    use veil_core::PrngKey;

    #[test]
    fn test_save_load_roundtrip() {
        let fc = Linear::new(4, 3, true);
        let mut params = Params::new();
        fc.init(PrngKey::new(42), &mut params, "fc");

        let path = std::env::temp_dir().join("veil_test_save_load.safetensors");
        save_params(&params, &path).unwrap();
        assert!(path.exists());

        let loaded = load_params(&path).unwrap();
        assert!(loaded.contains("fc.weight"));
        assert!(loaded.contains("fc.bias"));
        assert_eq!(
            loaded.get("fc.weight").unwrap().shape().dims(),
            params.get("fc.weight").unwrap().shape().dims()
        );

        let orig = params.get("fc.weight").unwrap().as_f32_slice().unwrap().to_vec();
        let back = loaded.get("fc.weight").unwrap().as_f32_slice().unwrap().to_vec();
        for (a, b) in orig.iter().zip(back.iter()) {
            assert!((a - b).abs() < 1e-7, "data mismatch: {a} vs {b}");
        }

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_load_missing_file() {
        let path = std::env::temp_dir().join("veil_test_no_such_file.safetensors");
        assert!(load_params(&path).is_err());
    }
}
