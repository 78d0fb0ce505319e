//! 2-layer GELU feed-forward network.

use veil_core::{PrngKey, Result, Tensor};
use veil_nn::{dropout, gelu, Linear, Params};

/// `fc1 -> GELU -> dropout -> fc2 -> dropout`, the MLP half of a
/// transformer block. Parameters live at `{path}.fc1.*` and `{path}.fc2.*`.
#[derive(Debug, Clone, Copy)]
pub struct Mlp {
    pub in_features: usize,
    pub hidden_features: usize,
    pub out_features: usize,
    pub drop_rate: f32,
    fc1: Linear,
    fc2: Linear,
}

impl Mlp {
    pub fn new(
        in_features: usize,
        hidden_features: usize,
        out_features: usize,
        drop_rate: f32,
    ) -> Self {
        Self {
            in_features,
            hidden_features,
            out_features,
            drop_rate,
            fc1: Linear::new(in_features, hidden_features, true),
            fc2: Linear::new(hidden_features, out_features, true),
        }
    }

    pub fn init(&self, key: PrngKey, params: &mut Params, path: &str) {
        self.fc1.init(key.fold_in(0), params, &format!("{path}.fc1"));
        self.fc2.init(key.fold_in(1), params, &format!("{path}.fc2"));
    }

    pub fn forward(
        &self,
        params: &Params,
        path: &str,
        x: &Tensor,
        train: bool,
        key: PrngKey,
    ) -> Result<Tensor> {
        let h = self.fc1.forward(params, &format!("{path}.fc1"), x)?;
        let h = gelu(&h)?;
        let h = dropout(&h, self.drop_rate, train, key.fold_in(0))?;
        let h = self.fc2.forward(params, &format!("{path}.fc2"), &h)?;
        dropout(&h, self.drop_rate, train, key.fold_in(1))
    }
}
