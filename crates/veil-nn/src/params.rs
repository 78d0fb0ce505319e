//! Flat parameter blob keyed by dotted path.

use std::collections::BTreeMap;

use veil_core::{Result, Tensor, VeilError};

/// All learnable tensors of a model, keyed by dotted path such as
/// `encoder.blocks.0.attn.qkv.weight`.
///
/// A `BTreeMap` keeps iteration order deterministic, so optimizer sweeps and
/// checkpoint files are stable across runs.
#[derive(Debug, Clone, Default)]
pub struct Params {
    tensors: BTreeMap<String, Tensor>,
}

impl Params {
    pub fn new() -> Self {
        Self { tensors: BTreeMap::new() }
    }

    /// Insert or replace a tensor at `path`.
    pub fn insert(&mut self, path: impl Into<String>, tensor: Tensor) {
        self.tensors.insert(path.into(), tensor);
    }

    /// Look up a tensor, failing with `MissingParam` if absent.
    pub fn get(&self, path: &str) -> Result<&Tensor> {
        self.tensors.get(path).ok_or_else(|| VeilError::MissingParam(path.to_string()))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.tensors.contains_key(path)
    }

    /// Number of tensors in the blob.
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Total number of scalar parameters across all tensors.
    pub fn param_count(&self) -> usize {
        self.tensors.values().map(|t| t.numel()).sum()
    }

    /// All paths, in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.tensors.keys().map(|s| s.as_str()).collect()
    }

    /// Iterate over (path, tensor) pairs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Tensor)> {
        self.tensors.iter()
    }

    /// Extract the sub-blob under `prefix.`, with the prefix stripped.
    ///
    /// `subset("encoder")` turns `encoder.cls_token` into `cls_token`.
    pub fn subset(&self, prefix: &str) -> Params {
        let full = format!("{prefix}.");
        let mut out = Params::new();
        for (path, tensor) in &self.tensors {
            if let Some(rest) = path.strip_prefix(&full) {
                out.insert(rest, tensor.clone());
            }
        }
        out
    }

    /// Re-insert every tensor of `other` under `prefix.`.
    pub fn merge_prefixed(&mut self, prefix: &str, other: &Params) {
        for (path, tensor) in other.iter() {
            self.insert(format!("{prefix}.{path}"), tensor.clone());
        }
    }
}

impl IntoIterator for Params {
    type Item = (String, Tensor);
    type IntoIter = std::collections::btree_map::IntoIter<String, Tensor>;

    fn into_iter(self) -> Self::IntoIter {
        self.tensors.into_iter()
    }
}
