//! Checkpoint naming and save/load on top of the safetensors blob format.

use std::fs;
use std::path::{Path, PathBuf};

use veil_core::{Result, VeilError};
use veil_nn::{load_params, save_params, Params};

/// File name for the checkpoint written after `step` training steps.
pub fn checkpoint_path(dir: &Path, step: usize) -> PathBuf {
    dir.join(format!("mae_step_{step}.safetensors"))
}

/// Write the parameter blob for `step` into `dir`, creating it if needed.
pub fn save_checkpoint(params: &Params, dir: &Path, step: usize) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| VeilError::StorageError(e.to_string()))?;
    let path = checkpoint_path(dir, step);
    save_params(params, &path)?;
    eprintln!("saved checkpoint {}", path.display());
    Ok(path)
}

/// Load a checkpoint and verify it carries every parameter the caller's
/// architecture expects. Extra tensors in the file are kept; they are
/// harmless and let older checkpoints with auxiliary state load cleanly.
pub fn load_checkpoint(path: &Path, expected: &[&str]) -> Result<Params> {
    let params = load_params(path)?;
    for name in expected {
        if !params.contains(name) {
            return Err(VeilError::MissingParam(format!(
                "{name} (checkpoint {})",
                path.display()
            )));
        }
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MAEConfig;
    use crate::model::MAEViT;
    use veil_core::PrngKey;

    #[test]
    fn test_checkpoint_path_format() {
        let p = checkpoint_path(Path::new("/tmp/run"), 1500);
        assert_eq!(p, PathBuf::from("/tmp/run/mae_step_1500.safetensors"));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let model = MAEViT::new(MAEConfig::tiny()).unwrap();
        let params = model.init_params(PrngKey::new(0));

        let dir = std::env::temp_dir().join("veil_mae_ckpt_test");
        let path = save_checkpoint(&params, &dir, 10).unwrap();

        let names = params.names();
        let restored = load_checkpoint(&path, &names).unwrap();
        assert_eq!(restored.len(), params.len());
        for (name, tensor) in params.iter() {
            let got = restored.get(name).unwrap();
            assert_eq!(got.shape().dims(), tensor.shape().dims());
            assert_eq!(got.as_f32_slice().unwrap(), tensor.as_f32_slice().unwrap());
        }

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_missing_param_detected() {
        let model = MAEViT::new(MAEConfig::tiny()).unwrap();
        let params = model.init_params(PrngKey::new(0));

        let dir = std::env::temp_dir().join("veil_mae_ckpt_missing_test");
        let path = save_checkpoint(&params, &dir, 0).unwrap();

        let err = load_checkpoint(&path, &["encoder.blocks.99.norm1.weight"]);
        assert!(matches!(err, Err(VeilError::MissingParam(_))));

        fs::remove_dir_all(&dir).ok();
    }
}
